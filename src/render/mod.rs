//! Rendering tile collections to output documents.

mod style;
mod svg;

pub use style::*;
pub use svg::*;

use geo::Rect;

use crate::crop::TileFragment;
use crate::error::Result;

/// Turns the fragments of one tile into an output document.
pub trait Renderer: Sync {
    /// Render `fragments`. When `extent` is given it defines the canvas, otherwise the fragments'
    /// combined bound does.
    fn render(&self, fragments: &[TileFragment], extent: Option<&Rect<f64>>) -> Result<Vec<u8>>;

    /// File extension of rendered documents, without the dot.
    fn extension(&self) -> &str;
}
