#![doc = "Tilecover: per-tile coverage, cropping and SVG rendering of geographic features"]
mod aggregate;
mod coverage;
mod crop;
mod error;
mod feature;
mod pipeline;
mod render;
mod source;
mod store;
mod tile;

#[doc(inline)]
pub use error::{Result, TileError};

#[doc(inline)]
pub use tile::{MAX_LATITUDE, MAX_ZOOM, Tile, TileRange, ZoomLevels, tiles_for_bound};

#[doc(inline)]
pub use feature::{DEFAULT_ID_PROPERTY, Feature};

#[doc(inline)]
pub use coverage::{Coverage, CoverageEngine, CoverageOptions};

#[doc(inline)]
pub use crop::{TileFragment, clip, crop_to_bound, crop_to_tile};

#[doc(inline)]
pub use store::{BlobStore, DiskStore, MemStore};

#[doc(inline)]
pub use aggregate::{INTERMEDIATE_SUFFIX, SweepOptions, SweepReport, TileAggregator, TileCollection};

#[doc(inline)]
pub use render::{Renderer, SvgRenderer, SvgStyle};

#[doc(inline)]
pub use pipeline::{BatchSummary, CropPolicy, FeatureReport, Pipeline, RecordFailure};

#[doc(inline)]
pub use source::{GeoJsonFiles, RECORD_EXTENSION};

/// Cancellation handle accepted by coverage, accumulation and sweeping.
pub use tokio_util::sync::CancellationToken;
