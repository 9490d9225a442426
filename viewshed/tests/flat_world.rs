use std::sync::Arc;
use terrain_rgb::{encode_png, ElevationGrid, TileKey, TILE_SIZE};
use viewshed::{
    merge,
    terrain::{CancelToken, Coordinate, MemStore, TerrainError},
    CoverageArea, CoverageGrid, ViewshedConfig, ViewshedEngine,
};

const OBSERVER: Coordinate = Coordinate::new(47.7126, -121.1477);

fn flat_engine(config: ViewshedConfig) -> ViewshedEngine {
    let png = encode_png(&ElevationGrid::filled(TILE_SIZE, 0.0)).unwrap();
    ViewshedEngine::with_fetcher(
        config,
        Arc::new(move |_key: TileKey| -> Result<Vec<u8>, TerrainError> { Ok(png.clone()) }),
        Arc::new(MemStore::new()),
    )
}

/// Eye level on the ground, so curvature alone decides visibility.
fn four_rays() -> ViewshedConfig {
    ViewshedConfig::default()
        .max_distance_m(1_000.0)
        .sample_interval_m(100.0)
        .angular_resolution_deg(90.0)
        .observer_height_m(0.0)
}

#[test]
fn test_curvature_hides_all_but_nearest_sample() {
    let result = flat_engine(four_rays())
        .calculate(OBSERVER, &CancelToken::new(), None)
        .unwrap();

    let mut bearings: Vec<_> = result
        .visible_points
        .iter()
        .map(|p| p.bearing_deg)
        .collect();
    bearings.sort_by(f64::total_cmp);
    assert_eq!(bearings, vec![0.0, 90.0, 180.0, 270.0]);
    for point in &result.visible_points {
        assert!((point.distance_m - 100.0).abs() < 1e-9);
        assert!((OBSERVER.distance_to(&point.coordinate) - 100.0).abs() < 1e-6);
    }
}

#[test]
fn test_full_resolution_on_flat_world() {
    let config = ViewshedConfig::default().observer_height_m(0.0);
    let result = flat_engine(config)
        .calculate(OBSERVER, &CancelToken::new(), None)
        .unwrap();
    assert_eq!(result.visible_points.len(), 360);
    assert!(result
        .visible_points
        .iter()
        .all(|p| (p.distance_m - config.sample_interval_m).abs() < 1e-9));
}

#[test]
fn test_repeat_calculation_is_deterministic() {
    let engine = flat_engine(ViewshedConfig::default().max_distance_m(1_500.0));
    let grid = CoverageGrid::from_config(engine.config());

    let first = engine.calculate(OBSERVER, &CancelToken::new(), None).unwrap();
    let second = engine.calculate(OBSERVER, &CancelToken::new(), None).unwrap();
    let a = grid.to_grid(&first);
    let b = grid.to_grid(&second);
    assert!(!a.is_empty());
    assert_eq!(a, b);
    assert_eq!(merge(&a, &b), a);

    let mut area = CoverageArea::new(grid);
    area.record(&first);
    area.record(&second);
    assert_eq!(area.cells(), &a);
    assert_eq!(area.to_geojson(), grid.to_geojson(&a));
}

#[test]
fn test_spawned_calculation_can_be_cancelled() {
    let engine = flat_engine(ViewshedConfig::default());
    let handle = engine.spawn(OBSERVER);
    handle.cancel();
    // Cancellation may land after the last ray started, in which case
    // the calculation completes normally.
    match handle.join() {
        Ok(result) => assert!(!result.visible_points.is_empty()),
        Err(e) => assert!(matches!(e, viewshed::ViewshedError::Cancelled)),
    }
}
