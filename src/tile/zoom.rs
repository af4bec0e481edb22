use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

use crate::error::TileError;
use crate::tile::MAX_ZOOM;

static ZOOM_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*-\s*(\d+)\s*$").expect("zoom range pattern is valid")
});

/// A list of zoom levels, parsed from `"1,2,3"` or an inclusive `"min-max"` range.
///
/// Order and duplicates are kept as given; coverage treats each entry as one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoomLevels(Vec<u8>);

impl ZoomLevels {
    pub fn new(levels: Vec<u8>) -> Result<Self, TileError> {
        match levels.iter().find(|&&z| z > MAX_ZOOM) {
            Some(z) => Err(TileError::InvalidZoomSpec(format!("{z} (maximum is {MAX_ZOOM})"))),
            None => Ok(Self(levels)),
        }
    }

    /// Inclusive range `min..=max`.
    pub fn range(min: u8, max: u8) -> Result<Self, TileError> {
        if min > max {
            return Err(TileError::InvalidZoomSpec(format!("{min}-{max}")))
        }
        Self::new((min..=max).collect())
    }

    #[inline] pub fn levels(&self) -> &[u8] { &self.0 }

    #[inline] pub fn len(&self) -> usize { self.0.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ { self.0.iter().copied() }
}

impl Default for ZoomLevels {
    /// Zoom levels 1 through 20.
    fn default() -> Self { Self((1..=20).collect()) }
}

impl FromStr for ZoomLevels {
    type Err = TileError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || TileError::InvalidZoomSpec(spec.to_string());

        if let Some(caps) = ZOOM_RANGE.captures(spec) {
            let min: u8 = caps[1].parse().map_err(|_| invalid())?;
            let max: u8 = caps[2].parse().map_err(|_| invalid())?;
            if min > max { return Err(invalid()) }
            return Self::range(min, max).map_err(|_| invalid())
        }

        let levels = spec.split(',')
            .map(|item| item.trim().parse::<u8>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(levels).map_err(|_| invalid())
    }
}

impl fmt::Display for ZoomLevels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self.0.iter().map(|z| z.to_string()).collect::<Vec<_>>();
        write!(f, "{}", parts.join(","))
    }
}
