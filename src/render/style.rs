use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TileError};

/// Presentation options for SVG tiles. Missing fields in a style file take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvgStyle {
    /// Width and height of the canvas.
    pub tile_size: f64,
    pub stroke: String,
    pub stroke_width: f64,
    pub stroke_opacity: f64,
    pub fill: String,
    pub fill_opacity: f64,
}

impl Default for SvgStyle {
    fn default() -> Self {
        Self {
            tile_size: 512.0,
            stroke: "#000000".to_string(),
            stroke_width: 1.0,
            stroke_opacity: 1.0,
            fill: "#ffffff".to_string(),
            fill_opacity: 0.0,
        }
    }
}

impl SvgStyle {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let style: Self = serde_json::from_str(json)
            .map_err(|e| TileError::InvalidConfig(format!("failed to parse style, {e}")))?;
        style.validate()?;
        Ok(style)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| TileError::InvalidConfig(format!("failed to read style {}, {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TileError::InvalidConfig(msg));

        if !self.tile_size.is_finite() || self.tile_size <= 0.0 {
            return invalid(format!("tile_size must be positive, got {}", self.tile_size))
        }
        if !self.stroke_width.is_finite() || self.stroke_width < 0.0 {
            return invalid(format!("stroke_width must be non-negative, got {}", self.stroke_width))
        }
        for (name, value) in [("stroke_opacity", self.stroke_opacity), ("fill_opacity", self.fill_opacity)] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be within [0, 1], got {value}"))
            }
        }
        for (name, value) in [("stroke", &self.stroke), ("fill", &self.fill)] {
            if value.trim().is_empty() || value.contains(['"', '<', '>', '&']) {
                return invalid(format!("{name} is not a usable SVG paint: {value:?}"))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let style = SvgStyle::default();
        assert_eq!(style.tile_size, 512.0);
        assert_eq!(style.stroke, "#000000");
        assert_eq!(style.fill_opacity, 0.0);
        assert!(style.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let style = SvgStyle::from_json_str(r##"{"tile_size": 256, "fill": "#ff0000", "fill_opacity": 0.5}"##).unwrap();
        assert_eq!(style.tile_size, 256.0);
        assert_eq!(style.fill, "#ff0000");
        assert_eq!(style.stroke_width, 1.0);
    }

    #[test]
    fn rejects_out_of_range_values() {
        for json in [
            r#"{"tile_size": 0}"#,
            r#"{"tile_size": -5}"#,
            r#"{"stroke_width": -1}"#,
            r#"{"stroke_opacity": 1.5}"#,
            r#"{"fill_opacity": -0.1}"#,
            r#"{"stroke": ""}"#,
            r#"{"fill": "\"><script>"}"#,
            r#"{"tile_size": "big"}"#,
        ] {
            assert!(matches!(SvgStyle::from_json_str(json), Err(TileError::InvalidConfig(_))), "{json}");
        }
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("style.json");
        fs::write(&path, r#"{"stroke_width": 2.5}"#).unwrap();
        assert_eq!(SvgStyle::from_path(&path).unwrap().stroke_width, 2.5);
        assert!(SvgStyle::from_path(&dir.path().join("missing.json")).is_err());
    }
}
