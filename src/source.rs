//! Reading GeoJSON records from files and directory trees.

use std::{fs, path::{Path, PathBuf}};

use anyhow::Context;
use rayon::iter::{ParallelBridge, ParallelIterator};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Result, TileError};

/// Extension of record files picked up inside directories.
pub const RECORD_EXTENSION: &str = "geojson";

/// GeoJSON records under a set of files and directories.
///
/// Paths given explicitly are read whatever their extension; inside directories only
/// `*.geojson` files are.
#[derive(Debug, Clone)]
pub struct GeoJsonFiles {
    roots: Vec<PathBuf>,
}

impl GeoJsonFiles {
    pub fn new<P: Into<PathBuf>>(roots: impl IntoIterator<Item = P>) -> Self {
        Self { roots: roots.into_iter().map(Into::into).collect() }
    }

    /// Record paths in walk order, sorted by file name within each directory.
    pub fn paths(&self) -> impl Iterator<Item = Result<PathBuf>> + Send + '_ {
        self.roots.iter()
            .flat_map(|root| WalkDir::new(root).follow_links(true).sort_by_file_name())
            .filter_map(|entry| match entry {
                Ok(entry) => {
                    let explicit = entry.depth() == 0;
                    let is_record = entry.path().extension().is_some_and(|ext| ext == RECORD_EXTENSION);
                    (entry.file_type().is_file() && (explicit || is_record)).then(|| Ok(entry.into_path()))
                }
                Err(e) => {
                    let key = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                    Some(Err(TileError::persistence(key, e.into())))
                }
            })
    }

    /// Every record as `(path, body)`, read in parallel while the walk proceeds.
    pub fn records(&self) -> impl ParallelIterator<Item = (String, Result<Vec<u8>>)> + '_ {
        self.paths().par_bridge().map(|path| match path {
            Ok(path) => {
                let body = read_record(&path);
                (path.display().to_string(), body)
            }
            Err(e) => (record_name(&e), Err(e)),
        })
    }

    /// Call `f` for each record concurrently. Returns the records that could not be read or that
    /// `f` rejected; one failure does not stop the others.
    pub fn for_each_record<F>(&self, f: F) -> Vec<(String, TileError)>
    where
        F: Fn(&str, &[u8]) -> Result<()> + Sync + Send,
    {
        self.records()
            .filter_map(|(name, body)| match body.and_then(|body| f(&name, &body)) {
                Ok(()) => None,
                Err(e) => {
                    warn!(record = %name, error = %e, "failed to process record");
                    Some((name, e))
                }
            })
            .collect()
    }
}

fn read_record(path: &Path) -> Result<Vec<u8>> {
    fs::read(path)
        .with_context(|| format!("[source] Failed to read {}", path.display()))
        .map_err(|e| TileError::persistence(path.display().to_string(), e))
}

fn record_name(error: &TileError) -> String {
    match error {
        TileError::Persistence { key, .. } => key.clone(),
        _ => String::new(),
    }
}
