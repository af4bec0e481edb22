//! Per-tile accumulation of cropped fragments and the render sweep.

mod aggregator;
mod collection;

pub use aggregator::*;
pub use collection::*;
