//! SVG rendering of tile fragments.

use std::{f64::consts::PI, io::Write};

use geo::{BoundingRect, Coord, CoordsIter, Geometry, LineString, Polygon, Rect};
use tracing::trace;

use crate::crop::TileFragment;
use crate::error::{Result, TileError};
use crate::render::{Renderer, SvgStyle};
use crate::tile::MAX_LATITUDE;

/// Projection function: lon/lat -> SVG coords (x,y)
type Projection = dyn Fn(&Coord<f64>) -> (f64, f64);

/// Padding (degrees) applied to a fragment bound with no width or height.
const DEGENERATE_PAD: f64 = 1e-4;

/// Renders fragments as a square SVG document in Web Mercator, y pointing down.
#[derive(Debug, Clone, Default)]
pub struct SvgRenderer {
    style: SvgStyle,
}

impl SvgRenderer {
    pub fn new(style: SvgStyle) -> Result<Self> {
        style.validate()?;
        Ok(Self { style })
    }

    #[inline] pub fn style(&self) -> &SvgStyle { &self.style }

    /// Render `fragments` onto one canvas, ordered by feature id.
    pub fn render(&self, fragments: &[TileFragment], extent: Option<&Rect<f64>>) -> Result<Vec<u8>> {
        for fragment in fragments {
            if fragment.geometry.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
                return Err(TileError::RenderFailure(format!("feature {} has non-finite coordinates", fragment.feature_id)))
            }
        }

        let size = self.style.tile_size;
        let mut out = Vec::new();

        let bounds = match extent {
            Some(extent) => Some(explicit_bounds(extent)?),
            None => auto_bounds(fragments),
        };
        let Some(bounds) = bounds else {
            write_header(&mut out, size, None)?;
            write_footer(&mut out)?;
            return Ok(out)
        };

        let (min, max) = (mercator(&bounds.min()), mercator(&bounds.max()));
        let (sx, sy) = (size / (max.0 - min.0), size / (max.1 - min.1));
        let project = move |c: &Coord<f64>| {
            let (x, y) = mercator(c);
            ((x - min.0) * sx, (max.1 - y) * sy)
        };

        let mut ordered: Vec<&TileFragment> = fragments.iter().collect();
        ordered.sort_by_key(|fragment| fragment.feature_id);

        write_header(&mut out, size, Some(&bounds))?;
        write_group_open(&mut out, &self.style)?;
        for fragment in ordered {
            draw_geometry(&mut out, fragment.feature_id, &fragment.geometry, &project, &self.style)?;
        }
        writeln!(out, "</g>").map_err(io_failure)?;
        write_footer(&mut out)?;

        trace!(fragments = fragments.len(), bytes = out.len(), "rendered svg");
        Ok(out)
    }
}

impl Renderer for SvgRenderer {
    fn render(&self, fragments: &[TileFragment], extent: Option<&Rect<f64>>) -> Result<Vec<u8>> {
        SvgRenderer::render(self, fragments, extent)
    }

    fn extension(&self) -> &str { "svg" }
}

/// Project lon/lat to spherical Web Mercator (radians of longitude, y growing northwards).
fn mercator(c: &Coord<f64>) -> (f64, f64) {
    let lat = c.y.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    (c.x.to_radians(), (PI / 4.0 + lat / 2.0).tan().ln())
}

fn explicit_bounds(extent: &Rect<f64>) -> Result<Rect<f64>> {
    let (min, max) = (mercator(&extent.min()), mercator(&extent.max()));
    let usable = [min.0, min.1, max.0, max.1].iter().all(|v| v.is_finite())
        && max.0 > min.0 && max.1 > min.1;
    if !usable {
        return Err(TileError::RenderFailure(format!("degenerate extent {extent:?}")))
    }
    Ok(*extent)
}

/// Combined bound of all fragments, padded along any axis with zero span.
fn auto_bounds(fragments: &[TileFragment]) -> Option<Rect<f64>> {
    let rect = fragments.iter()
        .filter_map(|fragment| fragment.geometry.bounding_rect())
        .reduce(|a, b| Rect::new(
            Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
            Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
        ))?;

    let (mut min, mut max) = (rect.min(), rect.max());
    if max.x - min.x <= 0.0 { min.x -= DEGENERATE_PAD; max.x += DEGENERATE_PAD; }
    if max.y - min.y <= 0.0 { min.y -= DEGENERATE_PAD; max.y += DEGENERATE_PAD; }
    Some(Rect::new(min, max))
}

fn io_failure(e: std::io::Error) -> TileError {
    TileError::RenderFailure(format!("failed to write svg, {e}"))
}

fn write_header(out: &mut impl Write, size: f64, bounds: Option<&Rect<f64>>) -> Result<()> {
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#).map_err(io_failure)?;
    let written = match bounds {
        Some(bounds) => writeln!(out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}" data-lon-min="{}" data-lon-max="{}" data-lat-min="{}" data-lat-max="{}">"#,
            bounds.min().x, bounds.max().x, bounds.min().y, bounds.max().y,
        ),
        None => writeln!(out, r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">"#),
    };
    written.map_err(io_failure)
}

fn write_group_open(out: &mut impl Write, style: &SvgStyle) -> Result<()> {
    writeln!(out,
        r#"<g stroke="{}" stroke-width="{}" stroke-opacity="{}" fill="{}" fill-opacity="{}">"#,
        style.stroke, style.stroke_width, style.stroke_opacity, style.fill, style.fill_opacity,
    ).map_err(io_failure)
}

fn write_footer(out: &mut impl Write) -> Result<()> {
    writeln!(out, "</svg>").map_err(io_failure)
}

fn draw_geometry(out: &mut impl Write, id: i64, geometry: &Geometry<f64>, project: &Projection, style: &SvgStyle) -> Result<()> {
    match geometry {
        Geometry::Point(p) => draw_circle(out, id, &p.0, project, style),
        Geometry::MultiPoint(mp) => mp.iter().try_for_each(|p| draw_circle(out, id, &p.0, project, style)),
        Geometry::Line(line) => draw_lines(out, id, &[LineString::from(*line)], project),
        Geometry::LineString(ls) => draw_lines(out, id, std::slice::from_ref(ls), project),
        Geometry::MultiLineString(mls) => draw_lines(out, id, &mls.0, project),
        Geometry::Polygon(poly) => draw_polygons(out, id, std::slice::from_ref(poly), project),
        Geometry::MultiPolygon(mp) => draw_polygons(out, id, &mp.0, project),
        Geometry::Rect(rect) => draw_polygons(out, id, &[rect.to_polygon()], project),
        Geometry::Triangle(tri) => draw_polygons(out, id, &[tri.to_polygon()], project),
        Geometry::GeometryCollection(gc) => gc.iter().try_for_each(|g| draw_geometry(out, id, g, project, style)),
    }
}

fn draw_circle(out: &mut impl Write, id: i64, c: &Coord<f64>, project: &Projection, style: &SvgStyle) -> Result<()> {
    let (x, y) = project(c);
    let r = style.stroke_width.max(1.0);
    writeln!(out, r#"<circle data-id="{id}" cx="{x:.3}" cy="{y:.3}" r="{r}"/>"#).map_err(io_failure)
}

fn draw_lines(out: &mut impl Write, id: i64, lines: &[LineString<f64>], project: &Projection) -> Result<()> {
    let mut d = String::new();
    for line in lines {
        line_to_path(line, project, false, &mut d);
    }
    if d.is_empty() { return Ok(()) }
    writeln!(out, r#"<path data-id="{id}" fill="none" d="{}"/>"#, d.trim_start()).map_err(io_failure)
}

fn draw_polygons(out: &mut impl Write, id: i64, polygons: &[Polygon<f64>], project: &Projection) -> Result<()> {
    let mut d = String::new();
    for polygon in polygons {
        line_to_path(polygon.exterior(), project, true, &mut d);
        for interior in polygon.interiors() {
            line_to_path(interior, project, true, &mut d);
        }
    }
    if d.is_empty() { return Ok(()) }
    writeln!(out, r#"<path data-id="{id}" fill-rule="evenodd" d="{}"/>"#, d.trim_start()).map_err(io_failure)
}

/// Append a line as an SVG subpath: "M x,y L x,y ...", closed with "Z" for rings.
fn line_to_path(line: &LineString<f64>, project: &Projection, close: bool, out: &mut String) {
    let mut coords = line.coords_iter().map(|coord| project(&coord));
    if let Some((x, y)) = coords.next() {
        out.push_str(&format!(" M{x:.3},{y:.3}"));
        for (x, y) in coords {
            out.push_str(&format!(" L{x:.3},{y:.3}"));
        }
        if close { out.push('Z') }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};
    use serde_json::Map;

    use crate::tile::Tile;

    fn fragment(id: i64, geometry: Geometry<f64>) -> TileFragment {
        TileFragment { feature_id: id, geometry, properties: Map::new() }
    }

    fn render(fragments: &[TileFragment], extent: Option<&Rect<f64>>) -> Result<String> {
        let bytes = SvgRenderer::default().render(fragments, extent)?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn empty_list_renders_empty_canvas() {
        let svg = render(&[], None).unwrap();
        assert!(svg.contains(r#"width="512" height="512""#));
        assert!(!svg.contains("<path"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn polygon_fills_tile_canvas() {
        let tile = Tile::new(1, 1, 0);
        let extent = tile.extent();
        let (min, max) = (extent.min(), extent.max());
        let square = polygon![(x: min.x, y: min.y), (x: max.x, y: min.y), (x: max.x, y: max.y), (x: min.x, y: max.y), (x: min.x, y: min.y)];
        let svg = render(&[fragment(1, Geometry::Polygon(square))], Some(&extent)).unwrap();

        assert!(svg.contains(r#"fill-rule="evenodd""#));
        assert!(svg.contains("M0.000,512.000 L512.000,512.000 L512.000,0.000 L0.000,0.000 L0.000,512.000Z"), "{svg}");
        assert!(svg.contains(r##"stroke="#000000" stroke-width="1" stroke-opacity="1" fill="#ffffff" fill-opacity="0""##));
    }

    #[test]
    fn lines_and_points() {
        let extent = Tile::new(0, 0, 0).extent();
        let svg = render(&[
            fragment(2, Geometry::LineString(line_string![(x: -90.0, y: 0.0), (x: 90.0, y: 0.0)])),
            fragment(3, Geometry::Point(point!(x: 0.0, y: 0.0))),
        ], Some(&extent)).unwrap();

        assert!(svg.contains(r#"<path data-id="2" fill="none" d="M128.000,256.000 L384.000,256.000"/>"#), "{svg}");
        assert!(svg.contains(r#"<circle data-id="3" cx="256.000" cy="256.000" r="1"/>"#), "{svg}");
    }

    #[test]
    fn output_does_not_depend_on_fragment_order() {
        let a = fragment(10, Geometry::Point(point!(x: 1.0, y: 1.0)));
        let b = fragment(5, Geometry::Point(point!(x: 2.0, y: 2.0)));
        let extent = Tile::new(2, 2, 1).extent();
        assert_eq!(render(&[a.clone(), b.clone()], Some(&extent)).unwrap(), render(&[b, a], Some(&extent)).unwrap());
    }

    #[test]
    fn single_point_without_extent_is_padded() {
        let svg = render(&[fragment(1, Geometry::Point(point!(x: 3.0, y: 4.0)))], None).unwrap();
        assert!(svg.contains(r#"cx="256.000" cy="256.000""#), "{svg}");
    }

    #[test]
    fn failures() {
        let bad = fragment(1, Geometry::Point(point!(x: f64::NAN, y: 0.0)));
        assert!(matches!(render(&[bad], None), Err(TileError::RenderFailure(_))));

        let flat = Rect::new(Coord { x: 1.0, y: 1.0 }, Coord { x: 1.0, y: 2.0 });
        let ok = fragment(1, Geometry::Point(point!(x: 1.0, y: 1.5)));
        assert!(matches!(render(&[ok], Some(&flat)), Err(TileError::RenderFailure(_))));
    }
}
