//! Web Mercator XYZ tiling primitives and zoom level specifications.

mod tile;
mod zoom;

pub use tile::*;
pub use zoom::ZoomLevels;
