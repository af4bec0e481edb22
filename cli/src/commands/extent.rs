use anyhow::{bail, Result};
use tilecover::{MAX_ZOOM, Tile};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::ExtentArgs) -> Result<()> {
    if args.z > MAX_ZOOM {
        bail!("[extent] zoom {} exceeds maximum of {MAX_ZOOM}", args.z);
    }
    let n = Tile::grid_size(args.z);
    if args.x as u64 >= n || args.y as u64 >= n {
        bail!("[extent] tile {}/{}/{} is outside the {n}x{n} grid", args.z, args.x, args.y);
    }

    let extent = Tile::new(args.z, args.x, args.y).extent();
    let (min, max) = (extent.min(), extent.max());
    println!("{},{},{},{}", min.x, min.y, max.x, max.y);
    Ok(())
}
