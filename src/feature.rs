//! Geographic records as read from the record source.

use geo::{BoundingRect, Geometry, Rect};
use serde_json::{Map, Value};

use crate::error::{Result, TileError};

/// Default property holding a record's integer identifier.
pub const DEFAULT_ID_PROPERTY: &str = "wof:id";

/// A geographic record: integer identifier, geometry and free-form properties.
///
/// Immutable once constructed; every stage of the pipeline only borrows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    id: i64,
    geometry: Geometry<f64>,
    properties: Map<String, Value>,
}

impl Feature {
    /// Construct a feature, rejecting geometries without a bound (e.g. empty collections).
    pub fn new(id: i64, geometry: Geometry<f64>, properties: Map<String, Value>) -> Result<Self> {
        if geometry.bounding_rect().is_none() {
            return Err(TileError::InvalidFeature(format!("feature {id} has an empty geometry")))
        }
        Ok(Self { id, geometry, properties })
    }

    /// Parse a GeoJSON `Feature` document, reading the identifier from `id_property`.
    pub fn from_geojson(body: &[u8], id_property: &str) -> Result<Self> {
        let feature: geojson::Feature = serde_json::from_slice(body)
            .map_err(|e| TileError::InvalidFeature(format!("failed to unmarshal feature, {e}")))?;

        let properties = feature.properties.unwrap_or_default();
        let id = match properties.get(id_property) {
            Some(value) => parse_id(value)
                .ok_or_else(|| TileError::InvalidFeature(format!("{id_property} is not an integer: {value}")))?,
            None => return Err(TileError::MissingIdentifier(id_property.to_string())),
        };

        let geometry = feature.geometry
            .ok_or_else(|| TileError::InvalidFeature(format!("feature {id} has no geometry")))?;
        let geometry = Geometry::<f64>::try_from(geometry)
            .map_err(|e| TileError::InvalidFeature(format!("feature {id} has an unsupported geometry, {e}")))?;

        Self::new(id, geometry, properties)
    }

    #[inline] pub fn id(&self) -> i64 { self.id }

    #[inline] pub fn geometry(&self) -> &Geometry<f64> { &self.geometry }

    #[inline] pub fn properties(&self) -> &Map<String, Value> { &self.properties }

    /// Bounding rectangle of the geometry.
    pub fn bound(&self) -> Result<Rect<f64>> {
        self.geometry.bounding_rect()
            .ok_or_else(|| TileError::InvalidFeature(format!("feature {} has an empty geometry", self.id)))
    }
}

/// Accept integers, integral floats (GeoJSON numbers often arrive as `123.0`) and integer strings.
fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<Feature> {
        Feature::from_geojson(body.as_bytes(), DEFAULT_ID_PROPERTY)
    }

    #[test]
    fn parses_point_feature() {
        let feature = parse(r#"{"type":"Feature","properties":{"wof:id":101,"wof:name":"x"},
            "geometry":{"type":"Point","coordinates":[1.5,2.5]}}"#).unwrap();
        assert_eq!(feature.id(), 101);
        assert_eq!(feature.properties()["wof:name"], "x");
        let bound = feature.bound().unwrap();
        assert_eq!((bound.min().x, bound.min().y), (1.5, 2.5));
    }

    #[test]
    fn accepts_float_and_string_identifiers() {
        let float = parse(r#"{"type":"Feature","properties":{"wof:id":85922583.0},
            "geometry":{"type":"Point","coordinates":[0,0]}}"#).unwrap();
        assert_eq!(float.id(), 85922583);

        let string = Feature::from_geojson(br#"{"type":"Feature","properties":{"id":"42"},
            "geometry":{"type":"Point","coordinates":[0,0]}}"#, "id").unwrap();
        assert_eq!(string.id(), 42);
    }

    #[test]
    fn missing_identifier() {
        let err = parse(r#"{"type":"Feature","properties":{},
            "geometry":{"type":"Point","coordinates":[0,0]}}"#).unwrap_err();
        assert!(matches!(err, TileError::MissingIdentifier(ref key) if key == "wof:id"));

        let err = parse(r#"{"type":"Feature","properties":null,
            "geometry":{"type":"Point","coordinates":[0,0]}}"#).unwrap_err();
        assert!(matches!(err, TileError::MissingIdentifier(_)));
    }

    #[test]
    fn invalid_features() {
        let cases = [
            "not json",
            r#"{"type":"FeatureCollection","features":[]}"#,
            r#"{"type":"Feature","properties":{"wof:id":1.5},"geometry":{"type":"Point","coordinates":[0,0]}}"#,
            r#"{"type":"Feature","properties":{"wof:id":1},"geometry":null}"#,
            r#"{"type":"Feature","properties":{"wof:id":1},"geometry":{"type":"GeometryCollection","geometries":[]}}"#,
        ];
        for body in cases {
            assert!(matches!(parse(body), Err(TileError::InvalidFeature(_))), "{body}");
        }
    }
}
