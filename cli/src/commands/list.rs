use std::io::{self, BufWriter, Write};

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use tilecover::{CancellationToken, GeoJsonFiles, TileError};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::ListArgs) -> Result<()> {
    let engine = super::coverage_engine(&args.coverage, "10-18")?;
    let files = GeoJsonFiles::new(args.coverage.paths.iter());
    let cancel = CancellationToken::new();

    // Rows from concurrent records must not interleave.
    let out = Mutex::new(BufWriter::new(io::stdout()));

    let failures = files.for_each_record(|_, body| {
        engine.cover_bytes(body, &cancel, |coverage| {
            let mut out = out.lock();
            for tile in &coverage.tiles {
                writeln!(out, "{},{},{},{}", coverage.id, tile.z, tile.x, tile.y)
                    .map_err(|e| TileError::Persistence { key: "stdout".into(), source: e.into() })?;
            }
            Ok(())
        })
    });

    out.lock().flush().context("[list] Failed to flush stdout")?;

    for (record, error) in &failures {
        eprintln!("[list] {record}: {error}");
    }
    if !failures.is_empty() {
        bail!("[list] {} record(s) failed", failures.len());
    }
    Ok(())
}
