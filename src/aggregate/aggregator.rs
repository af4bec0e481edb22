use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::TileCollection;
use crate::crop::TileFragment;
use crate::error::{Result, TileError};
use crate::render::Renderer;
use crate::store::BlobStore;
use crate::tile::Tile;

/// Suffix of intermediate collection keys.
pub const INTERMEDIATE_SUFFIX: &str = "geojson";

/// Options for [`TileAggregator::sweep_and_render`].
#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    /// Stop at the first collection that fails to read or render instead of logging it and
    /// keeping the entry.
    pub fail_on_render_error: bool,
    /// Checked between entries. Entries not yet visited are left for a later sweep.
    pub cancel: CancellationToken,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Collections written to the output store.
    pub rendered: usize,
    /// Collections that could not be read or parsed; they remain in the intermediate store.
    pub read_failures: usize,
    /// Collections whose render failed; they remain in the intermediate store.
    pub render_failures: usize,
    /// Collections rendered but not removed from the intermediate store.
    pub delete_failures: usize,
    /// Intermediate keys that are not tile collections.
    pub skipped_keys: Vec<String>,
    pub cancelled: bool,
}

/// Accumulates fragments per tile in a blob store, then renders and retires them.
///
/// Merges take `&self` and may run from any number of threads; only merges for the same tile
/// serialize. Sweeping takes `&mut self`, so it cannot overlap any merge.
pub struct TileAggregator<S> {
    store: S,
    locks: DashMap<String, Arc<Mutex<()>>, ahash::RandomState>,
}

impl<S: BlobStore> TileAggregator<S> {
    pub fn new(store: S) -> Self {
        Self { store, locks: DashMap::with_hasher(ahash::RandomState::new()) }
    }

    #[inline] pub fn store(&self) -> &S { &self.store }

    pub fn into_store(self) -> S { self.store }

    /// Add `fragment` to the collection of `tile`, creating the collection if needed.
    /// Merging a fragment identical to one already stored leaves the collection untouched.
    pub fn merge_fragment(&self, tile: &Tile, fragment: TileFragment) -> Result<()> {
        let key = tile.path(INTERMEDIATE_SUFFIX);
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock();
            self.merge_locked(tile, &key, fragment)
        };

        // Retire the entry once no other merge holds or waits on it. Handing out clones happens
        // under the same shard lock, so a waiter always keeps the count above one.
        drop(lock);
        self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    fn merge_locked(&self, tile: &Tile, key: &str, fragment: TileFragment) -> Result<()> {
        let mut collection = match self.store.exists(key).map_err(|e| TileError::persistence(key, e))? {
            true => self.read_collection(key)?,
            false => TileCollection::new(),
        };
        let feature_id = fragment.feature_id;
        if !collection.merge(fragment) {
            debug!(%tile, feature_id, "fragment already merged");
            return Ok(())
        }

        let bytes = collection.to_bytes().map_err(|e| TileError::persistence(key, e))?;
        self.store.write(key, &bytes).map_err(|e| TileError::persistence(key, e))?;

        debug!(%tile, feature_id, fragments = collection.len(), "merged fragment");
        Ok(())
    }

    /// The collection currently accumulated for `tile`, if any.
    pub fn collection(&self, tile: &Tile) -> Result<Option<TileCollection>> {
        let key = tile.path(INTERMEDIATE_SUFFIX);
        match self.store.exists(&key).map_err(|e| TileError::persistence(&key, e))? {
            true => self.read_collection(&key).map(Some),
            false => Ok(None),
        }
    }

    /// Tiles with an accumulated collection, sorted.
    pub fn tiles(&self) -> Result<Vec<Tile>> {
        let keys = self.store.list("").map_err(|e| TileError::persistence("", e))?;
        Ok(keys.iter().filter_map(|key| Tile::from_path(key, INTERMEDIATE_SUFFIX)).collect())
    }

    /// Render every accumulated collection into `output`, then remove it from the intermediate store.
    ///
    /// Running the sweep again after a partial or cancelled run picks up whatever is left.
    pub fn sweep_and_render<R, O>(&mut self, renderer: &R, output: &O, options: &SweepOptions) -> Result<SweepReport>
    where
        R: Renderer + ?Sized,
        O: BlobStore + ?Sized,
    {
        let keys = self.store.list("").map_err(|e| TileError::persistence("", e))?;
        let mut report = SweepReport::default();

        for key in keys {
            if options.cancel.is_cancelled() {
                report.cancelled = true;
                break
            }
            let Some(tile) = Tile::from_path(&key, INTERMEDIATE_SUFFIX) else {
                warn!(%key, "skipping foreign key in intermediate store");
                report.skipped_keys.push(key);
                continue
            };

            let collection = match self.read_collection(&key) {
                Ok(collection) => collection,
                Err(e) if options.fail_on_render_error => return Err(e),
                Err(e) => {
                    warn!(%tile, error = %e, "failed to read collection, keeping it");
                    report.read_failures += 1;
                    continue
                }
            };
            let body = match renderer.render(collection.fragments(), Some(&tile.extent())) {
                Ok(body) => body,
                Err(e) if options.fail_on_render_error => return Err(e),
                Err(e) => {
                    warn!(%tile, error = %e, "failed to render tile, keeping collection");
                    report.render_failures += 1;
                    continue
                }
            };

            let out_key = tile.path(renderer.extension());
            output.write(&out_key, &body).map_err(|e| TileError::persistence(&out_key, e))?;
            report.rendered += 1;
            debug!(%tile, fragments = collection.len(), bytes = body.len(), "rendered tile");

            if let Err(e) = self.store.delete(&key) {
                warn!(%key, error = %e, "failed to delete rendered collection");
                report.delete_failures += 1;
            }
        }

        info!(
            rendered = report.rendered,
            read_failures = report.read_failures,
            render_failures = report.render_failures,
            delete_failures = report.delete_failures,
            skipped = report.skipped_keys.len(),
            cancelled = report.cancelled,
            "sweep finished",
        );
        Ok(report)
    }

    fn read_collection(&self, key: &str) -> Result<TileCollection> {
        let bytes = self.store.read(key).map_err(|e| TileError::persistence(key, e))?;
        TileCollection::from_bytes(&bytes).map_err(|e| TileError::persistence(key, e))
    }
}
