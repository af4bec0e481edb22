//! Cropping features to tile extents.

use std::panic::{self, AssertUnwindSafe};

use geo::{
    BooleanOps, BoundingRect, CoordsIter, Geometry, GeometryCollection, Intersects, LineString,
    MultiLineString, MultiPoint, MultiPolygon, Point, Polygon, Rect,
};
use serde_json::{Map, Value};

use crate::error::{Result, TileError};
use crate::feature::Feature;
use crate::tile::Tile;

/// The part of one feature that falls inside one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileFragment {
    pub feature_id: i64,
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

/// Crop `feature` to the extent of `tile`.
pub fn crop_to_tile(feature: &Feature, tile: &Tile) -> Result<Option<TileFragment>> {
    crop_to_bound(feature, &tile.extent())
}

/// Crop `feature` to `bound`. Returns `Ok(None)` when nothing of the feature lies inside.
pub fn crop_to_bound(feature: &Feature, bound: &Rect<f64>) -> Result<Option<TileFragment>> {
    let geometry = clip(feature.geometry(), bound).map_err(|reason| TileError::CropFailure {
        feature_id: feature.id(),
        reason,
    })?;

    Ok(geometry.map(|geometry| TileFragment {
        feature_id: feature.id(),
        geometry,
        properties: feature.properties().clone(),
    }))
}

/// Clip `geometry` to `bound`.
///
/// Points are kept when inside the bound (edges included), lines are cut at the bound, and areas
/// are intersected with it. Geometry collections are clipped member by member.
pub fn clip(geometry: &Geometry<f64>, bound: &Rect<f64>) -> std::result::Result<Option<Geometry<f64>>, String> {
    if let Some(i) = geometry.coords_iter().position(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(format!("non-finite coordinate at index {i}"))
    }
    let (min, max) = (bound.min(), bound.max());
    if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
        return Err(format!("non-finite clip bound {bound:?}"))
    }

    match geometry.bounding_rect() {
        Some(rect) if rect.intersects(bound) => {},
        _ => return Ok(None),
    }

    // The boolean ops panic on some degenerate inputs; surface that as a failure instead.
    panic::catch_unwind(AssertUnwindSafe(|| clip_geometry(geometry, bound)))
        .map_err(|cause| match cause.downcast_ref::<&str>() {
            Some(msg) => format!("clip panicked: {msg}"),
            None => match cause.downcast_ref::<String>() {
                Some(msg) => format!("clip panicked: {msg}"),
                None => "clip panicked".to_string(),
            },
        })
}

fn clip_geometry(geometry: &Geometry<f64>, bound: &Rect<f64>) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::Point(p) => contains(bound, p).then_some(Geometry::Point(*p)),
        Geometry::MultiPoint(mp) => {
            let points: Vec<Point<f64>> = mp.iter().filter(|p| contains(bound, p)).copied().collect();
            match points.len() {
                0 => None,
                1 => Some(Geometry::Point(points[0])),
                _ => Some(Geometry::MultiPoint(MultiPoint::new(points))),
            }
        }
        Geometry::Line(line) => clip_lines(MultiLineString::new(vec![LineString::from(*line)]), bound),
        Geometry::LineString(ls) => clip_lines(MultiLineString::new(vec![ls.clone()]), bound),
        Geometry::MultiLineString(mls) => clip_lines(mls.clone(), bound),
        Geometry::Polygon(poly) => clip_areas(MultiPolygon::new(vec![poly.clone()]), bound),
        Geometry::MultiPolygon(mp) => clip_areas(mp.clone(), bound),
        Geometry::Rect(rect) => clip_areas(MultiPolygon::new(vec![rect.to_polygon()]), bound),
        Geometry::Triangle(tri) => clip_areas(MultiPolygon::new(vec![tri.to_polygon()]), bound),
        Geometry::GeometryCollection(gc) => {
            let members: Vec<_> = gc.iter().filter_map(|g| clip_geometry(g, bound)).collect();
            (!members.is_empty()).then(|| Geometry::GeometryCollection(GeometryCollection(members)))
        }
    }
}

#[inline]
fn contains(bound: &Rect<f64>, p: &Point<f64>) -> bool {
    let (min, max) = (bound.min(), bound.max());
    p.x() >= min.x && p.x() <= max.x && p.y() >= min.y && p.y() <= max.y
}

fn clip_lines(lines: MultiLineString<f64>, bound: &Rect<f64>) -> Option<Geometry<f64>> {
    let clipped = bound.to_polygon().clip(&lines, false);
    let mut parts: Vec<LineString<f64>> = clipped.0.into_iter().filter(|ls| ls.0.len() >= 2).collect();
    match parts.len() {
        0 => None,
        1 => parts.pop().map(Geometry::LineString),
        _ => Some(Geometry::MultiLineString(MultiLineString::new(parts))),
    }
}

fn clip_areas(areas: MultiPolygon<f64>, bound: &Rect<f64>) -> Option<Geometry<f64>> {
    let clipped = areas.intersection(&MultiPolygon::new(vec![bound.to_polygon()]));
    let mut parts: Vec<Polygon<f64>> = clipped.0.into_iter().filter(|p| !p.exterior().0.is_empty()).collect();
    match parts.len() {
        0 => None,
        1 => parts.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(parts))),
    }
}
