use std::{f64::consts::PI, fmt};

use geo::{Coord, Rect};

use crate::error::{Result, TileError};

/// Highest zoom level supported by the grid (tile indices stay within `u32`).
pub const MAX_ZOOM: u8 = 30;

/// Latitude limit of the Web Mercator grid.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// One cell of the Web Mercator XYZ grid.
///
/// Tiles are plain values: two tiles with the same `(z, x, y)` compare and hash equal.
/// Grid math treats a zoom level above [`MAX_ZOOM`] as [`MAX_ZOOM`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tile {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl Tile {
    pub fn new(z: u8, x: u32, y: u32) -> Self { Self { z, x, y } }

    /// Number of tiles along one axis at zoom `z`, capped at [`MAX_ZOOM`].
    #[inline]
    pub fn grid_size(z: u8) -> u64 { 1u64 << z.min(MAX_ZOOM) }

    /// The tile containing the given lon/lat at zoom `z`.
    /// Coordinates outside the grid are clamped onto its edge tiles, and `z` onto [`MAX_ZOOM`].
    pub fn from_lon_lat(lon: f64, lat: f64, z: u8) -> Self {
        let z = z.min(MAX_ZOOM);
        Self::new(z, lon_to_tile_x(lon, z), lat_to_tile_y(lat, z))
    }

    /// Geographic (lon/lat) bound of this tile.
    pub fn extent(&self) -> Rect<f64> {
        Rect::new(
            Coord { x: tile_x_to_lon(self.x as u64, self.z), y: tile_y_to_lat(self.y as u64 + 1, self.z) },
            Coord { x: tile_x_to_lon(self.x as u64 + 1, self.z), y: tile_y_to_lat(self.y as u64, self.z) },
        )
    }

    /// Storage key for this tile: `{z}/{x}/{y}.{ext}`.
    pub fn path(&self, ext: &str) -> String {
        format!("{}/{}/{}.{ext}", self.z, self.x, self.y)
    }

    /// Parse a key produced by [`Tile::path`]. Returns `None` for keys that are not tile paths
    /// with the given extension or that lie outside the grid.
    pub fn from_path(key: &str, ext: &str) -> Option<Self> {
        let stem = key.strip_suffix(ext)?.strip_suffix('.')?;
        let mut parts = stem.split('/');
        let z: u8 = parts.next()?.parse().ok()?;
        let x: u32 = parts.next()?.parse().ok()?;
        let y: u32 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || z > MAX_ZOOM { return None }

        let n = Self::grid_size(z);
        ((x as u64) < n && (y as u64) < n).then_some(Self::new(z, x, y))
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Inclusive rectangle of tile indices at a single zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub z: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    /// The range of tiles whose extent intersects `bound` at zoom `z`.
    pub fn for_bound(bound: &Rect<f64>, z: u8) -> Result<Self> {
        if z > MAX_ZOOM {
            return Err(TileError::Coverage { zoom: z, reason: format!("zoom exceeds maximum of {MAX_ZOOM}") })
        }
        let (min, max) = (bound.min(), bound.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return Err(TileError::Coverage { zoom: z, reason: format!("non-finite bound {bound:?}") })
        }

        // Tile y grows southwards, so the northern edge gives the smallest row.
        Ok(Self {
            z,
            min_x: lon_to_tile_x(min.x, z),
            max_x: lon_to_tile_x(max.x, z),
            min_y: lat_to_tile_y(max.y, z),
            max_y: lat_to_tile_y(min.y, z),
        })
    }

    /// Number of tiles in the range (never zero).
    pub fn tile_count(self) -> u64 {
        (self.max_x - self.min_x + 1) as u64 * (self.max_y - self.min_y + 1) as u64
    }

    /// Row indices, north to south.
    pub fn rows(self) -> std::ops::RangeInclusive<u32> { self.min_y..=self.max_y }

    /// Tiles of one row, west to east.
    pub fn row(self, y: u32) -> impl Iterator<Item = Tile> {
        (self.min_x..=self.max_x).map(move |x| Tile::new(self.z, x, y))
    }

    /// All tiles in row-major order.
    pub fn iter(self) -> impl Iterator<Item = Tile> {
        self.rows().flat_map(move |y| self.row(y))
    }
}

/// Every tile whose extent intersects `bound` at zoom `z`, in row-major order.
pub fn tiles_for_bound(bound: &Rect<f64>, z: u8) -> Result<Vec<Tile>> {
    Ok(TileRange::for_bound(bound, z)?.iter().collect())
}

/// Convert longitude to a tile column at zoom `z`.
fn lon_to_tile_x(lon: f64, z: u8) -> u32 {
    let n = Tile::grid_size(z) as f64;
    let x = ((lon.clamp(-180.0, 180.0) + 180.0) / 360.0 * n).floor();
    x.clamp(0.0, n - 1.0) as u32
}

/// Convert latitude to a tile row at zoom `z` (Web Mercator, north = row 0).
fn lat_to_tile_y(lat: f64, z: u8) -> u32 {
    let n = Tile::grid_size(z) as f64;
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();
    y.clamp(0.0, n - 1.0) as u32
}

/// Western edge longitude of tile column `x`.
fn tile_x_to_lon(x: u64, z: u8) -> f64 {
    x as f64 / Tile::grid_size(z) as f64 * 360.0 - 180.0
}

/// Northern edge latitude of tile row `y`.
fn tile_y_to_lat(y: u64, z: u8) -> f64 {
    let n = PI - 2.0 * PI * y as f64 / Tile::grid_size(z) as f64;
    n.sinh().atan().to_degrees()
}
