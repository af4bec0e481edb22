//! Error taxonomy shared by every stage of the tile pipeline.

use thiserror::Error;

/// Errors produced while covering, cropping, aggregating or rendering features.
///
/// A crop that does not intersect its tile is not an error; crop functions
/// return `Ok(None)` for that case.
#[derive(Debug, Error)]
pub enum TileError {
    /// Malformed input record, empty geometry or an identifier that is not an integer.
    #[error("invalid feature: {0}")]
    InvalidFeature(String),

    /// The identifier property is absent from the record.
    #[error("feature is missing identifier property {0:?}")]
    MissingIdentifier(String),

    /// Geometry computation failed while clipping a feature.
    #[error("failed to crop feature {feature_id}: {reason}")]
    CropFailure { feature_id: i64, reason: String },

    /// Storage read, write, delete or listing failed.
    #[error("storage failure for {key:?}")]
    Persistence {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to render tile: {0}")]
    RenderFailure(String),

    #[error("invalid zoom specification {0:?}, expected '1,2,3' or 'min-max'")]
    InvalidZoomSpec(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A single zoom unit of a coverage computation failed.
    #[error("coverage failed at zoom {zoom}: {reason}")]
    Coverage { zoom: u8, reason: String },
}

impl TileError {
    pub(crate) fn persistence(key: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Persistence { key: key.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, TileError>;
