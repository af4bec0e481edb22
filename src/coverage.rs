//! Multi-zoom tile coverage for a single feature.
//!
//! Each zoom level is an independent unit of work on a dedicated thread pool. Units share nothing
//! but a copy of the feature's bound; results are fanned back in over a channel and handed to the
//! caller's sink on the calling thread. The channel disconnecting (every unit has dropped its
//! sender) is the join.

use std::{collections::BTreeMap, sync::Arc, thread};

use crossbeam_channel::Sender;
use geo::Rect;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Result, TileError};
use crate::feature::{DEFAULT_ID_PROPERTY, Feature};
use crate::tile::{Tile, TileRange, ZoomLevels};

/// Options for [`CoverageEngine`].
#[derive(Debug, Clone)]
pub struct CoverageOptions {
    /// Zoom levels to compute coverage for.
    pub zoom_levels: ZoomLevels,
    /// Worker threads for zoom units.
    pub threads: usize,
    /// Property holding the record identifier.
    pub id_property: String,
}

impl Default for CoverageOptions {
    fn default() -> Self {
        Self {
            zoom_levels: ZoomLevels::default(),
            threads: thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            id_property: DEFAULT_ID_PROPERTY.to_string(),
        }
    }
}

/// Tiles covering feature `id` at zoom level `zoom`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage {
    pub id: i64,
    pub zoom: u8,
    pub tiles: Vec<Tile>,
}

/// Computes per-zoom tile coverage concurrently.
pub struct CoverageEngine {
    options: CoverageOptions,
    pool: Arc<ThreadPool>,
}

impl CoverageEngine {
    pub fn new(options: CoverageOptions) -> Result<Self> {
        if options.threads == 0 {
            return Err(TileError::InvalidConfig("coverage needs at least one thread".into()))
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .thread_name(|i| format!("coverage-{i}"))
            .build()
            .map_err(|e| TileError::InvalidConfig(format!("failed to build coverage thread pool, {e}")))?;

        Ok(Self { options, pool: Arc::new(pool) })
    }

    #[inline] pub fn options(&self) -> &CoverageOptions { &self.options }

    /// Parse a raw record and stream its coverage into `sink`.
    /// Parse and identifier failures are reported before any zoom unit is dispatched.
    pub fn cover_bytes<F>(&self, body: &[u8], cancel: &CancellationToken, sink: F) -> Result<()>
    where
        F: FnMut(Coverage) -> Result<()>,
    {
        let feature = Feature::from_geojson(body, &self.options.id_property)?;
        self.cover(&feature, cancel, sink)
    }

    /// Stream one [`Coverage`] per configured zoom level into `sink`, in completion order.
    ///
    /// The first unit or sink error aborts the remaining units and is returned. Cancelling `cancel`
    /// stops further sink calls and returns `Ok(())`.
    pub fn cover<F>(&self, feature: &Feature, cancel: &CancellationToken, mut sink: F) -> Result<()>
    where
        F: FnMut(Coverage) -> Result<()>,
    {
        let bound = feature.bound()?;
        if self.options.zoom_levels.is_empty() || cancel.is_cancelled() { return Ok(()) }

        // Child token: cancelled when the caller cancels or when we stop early ourselves.
        let abort = cancel.child_token();
        let (tx, rx) = crossbeam_channel::unbounded();

        for zoom in self.options.zoom_levels.iter() {
            let (tx, abort, id) = (tx.clone(), abort.clone(), feature.id());
            self.pool.spawn(move || cover_zoom(id, bound, zoom, &abort, &tx));
        }
        drop(tx);

        let mut outcome = Ok(());
        for result in rx.iter() {
            if cancel.is_cancelled() {
                debug!(id = feature.id(), "coverage cancelled");
                break;
            }
            if let Err(e) = result.and_then(&mut sink) {
                outcome = Err(e);
                break;
            }
        }

        // Units still queued or running see this and drop their work; their sends fail silently
        // once `rx` is gone.
        abort.cancel();
        outcome
    }

    /// Collect the coverage of `feature` into a map keyed by zoom level.
    pub fn coverage_map(&self, feature: &Feature, cancel: &CancellationToken) -> Result<BTreeMap<u8, Vec<Tile>>> {
        let mut map = BTreeMap::new();
        self.cover(feature, cancel, |coverage| {
            map.insert(coverage.zoom, coverage.tiles);
            Ok(())
        })?;
        Ok(map)
    }
}

/// One zoom unit: enumerate covering tiles row by row, abandoning on abort.
fn cover_zoom(id: i64, bound: Rect<f64>, zoom: u8, abort: &CancellationToken, tx: &Sender<Result<Coverage>>) {
    if abort.is_cancelled() { return }

    let range = match TileRange::for_bound(&bound, zoom) {
        Ok(range) => range,
        Err(e) => {
            let _ = tx.send(Err(e));
            return
        }
    };

    let mut tiles = Vec::with_capacity(range.tile_count().min(1 << 16) as usize);
    for y in range.rows() {
        if abort.is_cancelled() {
            trace!(id, zoom, "coverage unit abandoned");
            return
        }
        tiles.extend(range.row(y));
    }

    trace!(id, zoom, tiles = tiles.len(), "coverage unit finished");
    let _ = tx.send(Ok(Coverage { id, zoom, tiles }));
}
