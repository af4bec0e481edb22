pub mod extent;
pub mod list;
pub mod render;

use tilecover::{CoverageEngine, CoverageOptions, ZoomLevels};

use crate::cli::CoverageArgs;

/// Build the coverage engine, using `default_zooms` when no zoom levels were given.
fn coverage_engine(args: &CoverageArgs, default_zooms: &str) -> anyhow::Result<CoverageEngine> {
    let zoom_levels = match &args.zoom_levels {
        Some(zooms) => zooms.clone(),
        None => default_zooms.parse::<ZoomLevels>()?,
    };
    let mut options = CoverageOptions {
        zoom_levels,
        id_property: args.id_property.clone(),
        ..Default::default()
    };
    if let Some(threads) = args.threads { options.threads = threads }
    Ok(CoverageEngine::new(options)?)
}
