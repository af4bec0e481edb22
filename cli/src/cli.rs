use std::path::PathBuf;

use tilecover::{CropPolicy, DEFAULT_ID_PROPERTY, ZoomLevels};

/// Tile coverage, cropping and rendering for GeoJSON records
#[derive(clap::Parser, Debug)]
#[command(name = "tilecover", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Print covering tiles as CSV rows: id,z,x,y
    List(ListArgs),

    /// Crop records to their covering tiles and render one SVG per tile
    Render(RenderArgs),

    /// Print the lon/lat extent of a tile
    Extent(ExtentArgs),
}

#[derive(clap::Args, Debug)]
pub struct CoverageArgs {
    /// Comma-separated zoom levels or an inclusive 'min-max' range
    #[arg(short, long)]
    pub zoom_levels: Option<ZoomLevels>,

    /// Property holding each record's integer identifier
    #[arg(long, default_value = DEFAULT_ID_PROPERTY)]
    pub id_property: String,

    /// Worker threads for per-zoom coverage, defaults to available parallelism
    #[arg(long)]
    pub threads: Option<usize>,

    /// GeoJSON files, or directories searched for *.geojson files
    #[arg(required = true, value_hint = clap::ValueHint::AnyPath)]
    pub paths: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub coverage: CoverageArgs,
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub coverage: CoverageArgs,

    /// Directory for intermediate tile collections
    #[arg(long, value_hint = clap::ValueHint::DirPath, required_unless_present = "in_memory")]
    pub work_dir: Option<PathBuf>,

    /// Keep intermediate tile collections in memory instead of a work directory
    #[arg(long, conflicts_with = "work_dir")]
    pub in_memory: bool,

    /// Output directory for rendered tiles
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: PathBuf,

    /// JSON style file (tile_size, stroke, stroke_width, stroke_opacity, fill, fill_opacity)
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub style: Option<PathBuf>,

    /// What to do when a feature cannot be cropped to a tile: skip or abort
    #[arg(long, default_value = "skip")]
    pub crop_policy: CropPolicy,

    /// Stop the sweep at the first tile that fails to render
    #[arg(long)]
    pub fail_on_render_error: bool,
}

#[derive(clap::Args, Debug)]
pub struct ExtentArgs {
    #[arg(short, default_value_t = 15)]
    pub z: u8,

    #[arg(short, default_value_t = 5244)]
    pub x: u32,

    #[arg(short, default_value_t = 12683)]
    pub y: u32,
}
