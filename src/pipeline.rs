//! Per-record accumulation: parse, cover, crop and merge.

use std::{fmt, str::FromStr};

use rayon::iter::ParallelIterator;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::TileAggregator;
use crate::coverage::CoverageEngine;
use crate::crop::crop_to_tile;
use crate::error::{Result, TileError};
use crate::feature::Feature;
use crate::store::BlobStore;

/// What to do when cropping a feature to one of its tiles fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CropPolicy {
    /// Log the failure, skip that tile and keep going.
    #[default]
    Skip,
    /// Fail the feature and cancel the rest of the batch.
    AbortBatch,
}

impl FromStr for CropPolicy {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "skip" => Ok(Self::Skip),
            "abort" | "abort-batch" => Ok(Self::AbortBatch),
            other => Err(TileError::InvalidConfig(format!("unknown crop policy {other:?}, expected 'skip' or 'abort'"))),
        }
    }
}

impl fmt::Display for CropPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::AbortBatch => "abort",
        })
    }
}

/// Counts for one accumulated feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureReport {
    pub id: i64,
    /// Covering tiles visited across all zoom levels.
    pub tiles: usize,
    /// Fragments merged into tile collections.
    pub fragments: usize,
    /// Covering tiles the geometry itself did not reach.
    pub empty: usize,
    pub crop_failures: usize,
    /// Cancellation stopped the feature before every zoom level was merged.
    pub interrupted: bool,
}

/// A record that could not be accumulated.
#[derive(Debug)]
pub struct RecordFailure {
    pub record: String,
    pub error: TileError,
}

/// Totals over a batch of records.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub features_ok: usize,
    /// Features interrupted by cancellation after merging only some of their tiles.
    pub partial: usize,
    pub features_failed: usize,
    pub tiles: usize,
    pub fragments: usize,
    pub crop_failures: usize,
    /// Records not started because the batch was cancelled.
    pub skipped: usize,
    pub failures: Vec<RecordFailure>,
}

impl BatchSummary {
    fn add(&mut self, record: String, result: Option<Result<FeatureReport>>) {
        match result {
            Some(Ok(report)) => {
                match report.interrupted {
                    true => self.partial += 1,
                    false => self.features_ok += 1,
                }
                self.tiles += report.tiles;
                self.fragments += report.fragments;
                self.crop_failures += report.crop_failures;
            }
            Some(Err(error)) => {
                self.features_failed += 1;
                self.failures.push(RecordFailure { record, error });
            }
            None => self.skipped += 1,
        }
    }
}

/// Runs the accumulation phase for records against one coverage engine and aggregator.
pub struct Pipeline<'a, S> {
    coverage: &'a CoverageEngine,
    aggregator: &'a TileAggregator<S>,
    crop_policy: CropPolicy,
}

impl<'a, S: BlobStore> Pipeline<'a, S> {
    pub fn new(coverage: &'a CoverageEngine, aggregator: &'a TileAggregator<S>) -> Self {
        Self { coverage, aggregator, crop_policy: CropPolicy::default() }
    }

    pub fn with_crop_policy(mut self, crop_policy: CropPolicy) -> Self {
        self.crop_policy = crop_policy;
        self
    }

    /// Parse one raw record and accumulate it.
    pub fn accumulate(&self, body: &[u8], cancel: &CancellationToken) -> Result<FeatureReport> {
        let feature = Feature::from_geojson(body, &self.coverage.options().id_property)?;
        self.accumulate_feature(&feature, cancel)
    }

    /// Crop `feature` to each covering tile and merge the non-empty fragments.
    pub fn accumulate_feature(&self, feature: &Feature, cancel: &CancellationToken) -> Result<FeatureReport> {
        let mut report = FeatureReport { id: feature.id(), ..Default::default() };
        let mut zooms_done = 0;

        self.coverage.cover(feature, cancel, |coverage| {
            for tile in &coverage.tiles {
                if cancel.is_cancelled() { return Ok(()) }
                report.tiles += 1;

                match crop_to_tile(feature, tile) {
                    Ok(Some(fragment)) => {
                        self.aggregator.merge_fragment(tile, fragment)?;
                        report.fragments += 1;
                    }
                    Ok(None) => report.empty += 1,
                    Err(e) => match self.crop_policy {
                        CropPolicy::Skip => {
                            warn!(id = feature.id(), %tile, error = %e, "skipping tile");
                            report.crop_failures += 1;
                        }
                        CropPolicy::AbortBatch => {
                            cancel.cancel();
                            return Err(e)
                        }
                    },
                }
            }
            zooms_done += 1;
            Ok(())
        })?;

        report.interrupted = zooms_done < self.coverage.options().zoom_levels.len();
        if report.interrupted {
            warn!(id = report.id, zooms_done, fragments = report.fragments, "feature interrupted by cancellation");
        }
        debug!(id = report.id, tiles = report.tiles, fragments = report.fragments, "accumulated feature");
        Ok(report)
    }

    /// Accumulate `(name, body)` records in parallel. Failures are contained per record.
    ///
    /// Records reached after `cancel` fires are counted as skipped.
    pub fn accumulate_all<I>(&self, records: I, cancel: &CancellationToken) -> BatchSummary
    where
        I: ParallelIterator<Item = (String, Result<Vec<u8>>)>,
    {
        let results: Vec<(String, Option<Result<FeatureReport>>)> = records
            .map(|(name, body)| {
                if cancel.is_cancelled() { return (name, None) }
                let result = body.and_then(|body| self.accumulate(&body, cancel));
                if let Err(e) = &result {
                    warn!(record = %name, error = %e, "failed to accumulate record");
                }
                (name, Some(result))
            })
            .collect();

        let mut summary = BatchSummary::default();
        for (name, result) in results {
            summary.add(name, result);
        }

        info!(
            ok = summary.features_ok,
            partial = summary.partial,
            failed = summary.features_failed,
            skipped = summary.skipped,
            fragments = summary.fragments,
            "accumulation finished",
        );
        summary
    }
}
