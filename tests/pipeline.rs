// End-to-end tests: records -> coverage -> crop -> merge -> sweep -> rendered tiles.

use std::collections::BTreeSet;

use rayon::iter::IntoParallelIterator;
use tilecover::{
    BlobStore, CancellationToken, CoverageEngine, CoverageOptions, CropPolicy, DiskStore, Feature, MemStore,
    Pipeline, SvgRenderer, SweepOptions, Tile, TileAggregator, TileError, crop_to_tile,
};

fn engine(zooms: &str) -> CoverageEngine {
    CoverageEngine::new(CoverageOptions { zoom_levels: zooms.parse().unwrap(), threads: 4, ..Default::default() }).unwrap()
}

fn square(id: i64, min_lon: f64, min_lat: f64, size: f64) -> String {
    let (x0, y0, x1, y1) = (min_lon, min_lat, min_lon + size, min_lat + size);
    format!(
        r#"{{"type":"Feature","properties":{{"wof:id":{id},"name":"square {id}"}},
            "geometry":{{"type":"Polygon","coordinates":[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]}}}}"#
    )
}

fn point(id: i64, lon: f64, lat: f64) -> String {
    format!(r#"{{"type":"Feature","properties":{{"wof:id":{id}}},"geometry":{{"type":"Point","coordinates":[{lon},{lat}]}}}}"#)
}

#[test]
fn point_at_origin_covers_one_tile_per_zoom() {
    let engine = engine("1-2");
    let feature = Feature::from_geojson(point(1, 0.0, 0.0).as_bytes(), "wof:id").unwrap();
    let coverage = engine.coverage_map(&feature, &CancellationToken::new()).unwrap();

    assert_eq!(coverage.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    for (zoom, tiles) in &coverage {
        assert_eq!(tiles.len(), 1, "zoom {zoom}");
        assert!(tiles[0].extent().contains_inclusive(0.0, 0.0));
    }
}

trait ContainsInclusive {
    fn contains_inclusive(&self, lon: f64, lat: f64) -> bool;
}

impl ContainsInclusive for geo::Rect<f64> {
    fn contains_inclusive(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min().x && lon <= self.max().x && lat >= self.min().y && lat <= self.max().y
    }
}

#[test]
fn concurrent_features_share_a_tile_collection() {
    let engine = engine("6");
    let aggregator = TileAggregator::new(MemStore::new());
    let pipeline = Pipeline::new(&engine, &aggregator);

    // Two squares overlapping the same z6 tile, accumulated from parallel workers.
    let records: Vec<(String, tilecover::Result<Vec<u8>>)> = vec![
        ("a".to_string(), Ok(square(101, 10.0, 10.0, 0.5).into_bytes())),
        ("b".to_string(), Ok(square(202, 10.2, 10.2, 0.5).into_bytes())),
    ];
    let summary = pipeline.accumulate_all(records.into_par_iter(), &CancellationToken::new());
    assert_eq!(summary.features_ok, 2);

    let tile = Tile::from_lon_lat(10.3, 10.3, 6);
    let collection = aggregator.collection(&tile).unwrap().unwrap();
    let ids: BTreeSet<i64> = collection.fragments().iter().map(|f| f.feature_id).collect();
    assert_eq!(ids, BTreeSet::from([101, 202]));
}

#[test]
fn merge_order_does_not_change_the_collection() {
    let engine = engine("5-7");
    let bodies: Vec<String> = (0..12).map(|i| square(i, 2.0 + i as f64 * 0.1, 3.0, 0.4)).collect();

    let run = |order: Vec<usize>| {
        let aggregator = TileAggregator::new(MemStore::new());
        let pipeline = Pipeline::new(&engine, &aggregator);
        for i in order {
            pipeline.accumulate(bodies[i].as_bytes(), &CancellationToken::new()).unwrap();
        }
        let store = aggregator.store().clone();
        store.keys().into_iter()
            .map(|key| {
                let tile = Tile::from_path(&key, "geojson").unwrap();
                let collection = aggregator.collection(&tile).unwrap().unwrap();
                let ids: BTreeSet<i64> = collection.fragments().iter().map(|f| f.feature_id).collect();
                (key, ids)
            })
            .collect::<Vec<_>>()
    };

    let forward = run((0..12).collect());
    let reverse = run((0..12).rev().collect());
    assert_eq!(forward, reverse);
}

#[test]
fn records_sharing_an_id_keep_both_geometries() {
    let engine = engine("6");
    let aggregator = TileAggregator::new(MemStore::new());
    let pipeline = Pipeline::new(&engine, &aggregator);

    // An alternate geometry published under the same identifier.
    let records: Vec<(String, tilecover::Result<Vec<u8>>)> = vec![
        ("main".to_string(), Ok(point(55, 10.1, 10.1).into_bytes())),
        ("alt".to_string(), Ok(point(55, 10.3, 10.2).into_bytes())),
    ];
    let summary = pipeline.accumulate_all(records.into_par_iter(), &CancellationToken::new());
    assert_eq!(summary.features_ok, 2);

    let collection = aggregator.collection(&Tile::from_lon_lat(10.1, 10.1, 6)).unwrap().unwrap();
    assert_eq!(collection.len(), 2);
    assert!(collection.fragments().iter().all(|f| f.feature_id == 55));
}

#[test]
fn feature_outside_a_tile_is_not_merged_there() {
    let feature = Feature::from_geojson(square(7, 100.0, -40.0, 1.0).as_bytes(), "wof:id").unwrap();
    let far = Tile::from_lon_lat(-100.0, 40.0, 8);
    assert_eq!(crop_to_tile(&feature, &far).unwrap(), None);

    let engine = engine("8");
    let aggregator = TileAggregator::new(MemStore::new());
    Pipeline::new(&engine, &aggregator).accumulate_feature(&feature, &CancellationToken::new()).unwrap();
    assert_eq!(aggregator.collection(&far).unwrap(), None);
    assert!(!aggregator.store().is_empty());
}

#[test]
fn render_then_delete_on_disk() {
    let work_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();

    let engine = engine("4-5");
    let mut aggregator = TileAggregator::new(DiskStore::new(work_dir.path()).unwrap());
    let output = DiskStore::new(out_dir.path()).unwrap();

    let records: Vec<(String, tilecover::Result<Vec<u8>>)> = vec![
        ("a".to_string(), Ok(square(1, -3.0, 50.0, 2.0).into_bytes())),
        ("b".to_string(), Ok(point(2, -2.0, 51.0).into_bytes())),
    ];
    let summary = Pipeline::new(&engine, &aggregator).accumulate_all(records.into_par_iter(), &CancellationToken::new());
    assert_eq!(summary.features_ok, 2);

    let pending: Vec<String> = aggregator.store().list("").unwrap();
    assert!(!pending.is_empty());

    let report = aggregator.sweep_and_render(&SvgRenderer::default(), &output, &SweepOptions::default()).unwrap();
    assert_eq!(report.rendered, pending.len());
    assert!(aggregator.store().list("").unwrap().is_empty());

    for key in &pending {
        let svg_key = key.replace(".geojson", ".svg");
        let svg = String::from_utf8(output.read(&svg_key).unwrap().to_vec()).unwrap();
        assert!(svg.starts_with("<?xml"), "{svg_key}");
        assert!(svg.contains("<path") || svg.contains("<circle"), "{svg_key}");
    }

    // Sweep idempotence: nothing left, nothing rendered, output unchanged.
    let again = aggregator.sweep_and_render(&SvgRenderer::default(), &output, &SweepOptions::default()).unwrap();
    assert_eq!(again.rendered, 0);
    assert_eq!(output.list("").unwrap().len(), pending.len());
}

/// A line whose last vertex is NaN: its bound stays finite, so it is covered, but it cannot be cropped.
fn uncroppable(id: i64) -> Feature {
    let line = geo::LineString::from(vec![(1.0, 1.0), (2.0, 2.0), (f64::NAN, 1.5)]);
    Feature::new(id, geo::Geometry::LineString(line), serde_json::Map::new()).unwrap()
}

#[test]
fn skip_policy_counts_crop_failures() {
    let engine = engine("3");
    let aggregator = TileAggregator::new(MemStore::new());
    let pipeline = Pipeline::new(&engine, &aggregator);

    let cancel = CancellationToken::new();
    let report = pipeline.accumulate_feature(&uncroppable(9), &cancel).unwrap();
    assert_eq!(report.crop_failures, report.tiles);
    assert_eq!(report.fragments, 0);
    assert!(!cancel.is_cancelled());
    assert!(aggregator.store().is_empty());
}

#[test]
fn abort_policy_cancels_the_batch() {
    let engine = engine("3");
    let aggregator = TileAggregator::new(MemStore::new());
    let pipeline = Pipeline::new(&engine, &aggregator).with_crop_policy(CropPolicy::AbortBatch);

    let cancel = CancellationToken::new();
    let err = pipeline.accumulate_feature(&uncroppable(9), &cancel).unwrap_err();
    assert!(matches!(err, TileError::CropFailure { feature_id: 9, .. }));
    assert!(cancel.is_cancelled());

    // Records reached after the abort are not started.
    let records: Vec<(String, tilecover::Result<Vec<u8>>)> = vec![("late".into(), Ok(point(3, 0.0, 0.0).into_bytes()))];
    let summary = pipeline.accumulate_all(records.into_par_iter(), &cancel);
    assert_eq!(summary.skipped, 1);
    assert!(aggregator.store().is_empty());
}

#[test]
fn unreadable_records_are_reported_not_fatal() {
    let engine = engine("2");
    let aggregator = TileAggregator::new(MemStore::new());
    let pipeline = Pipeline::new(&engine, &aggregator);

    let records: Vec<(String, tilecover::Result<Vec<u8>>)> = vec![
        ("missing".into(), Err(TileError::InvalidFeature("unreadable".into()))),
        ("ok".into(), Ok(point(4, 20.0, 20.0).into_bytes())),
    ];
    let summary = pipeline.accumulate_all(records.into_par_iter(), &CancellationToken::new());
    assert_eq!((summary.features_ok, summary.features_failed), (1, 1));
    assert_eq!(summary.failures[0].record, "missing");
}
