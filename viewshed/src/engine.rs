use crate::{Horizon, ViewshedConfig, ViewshedError};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::{channel, Receiver},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use terrain::{
    math::RayIter, CancelToken, Coordinate, ElevationSource, Progress, TileFetcher, TileStore,
};

/// A sampled terrain point with line of sight to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisiblePoint {
    pub coordinate: Coordinate,
    pub distance_m: f64,
    pub bearing_deg: f64,

    /// Ground elevation, without curvature correction.
    pub elevation_m: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewshedResult {
    pub observer: Coordinate,

    /// Ground elevation at the observer plus eye height.
    pub observer_elevation_m: f64,

    /// Visible points of every ray. Points of one ray are in
    /// increasing distance; rays are in bearing order.
    pub visible_points: Vec<VisiblePoint>,

    /// Wall clock time the calculation took.
    pub duration: Duration,

    pub config: ViewshedConfig,
}

/// Computes viewsheds by casting rays over an [`ElevationSource`].
#[derive(Clone)]
pub struct ViewshedEngine {
    source: Arc<ElevationSource>,
    config: ViewshedConfig,
}

impl ViewshedEngine {
    pub fn new(source: Arc<ElevationSource>, config: ViewshedConfig) -> Self {
        Self { source, config }
    }

    /// Returns an engine over a new elevation source configured from
    /// `config`.
    pub fn with_fetcher(
        config: ViewshedConfig,
        fetcher: Arc<dyn TileFetcher>,
        store: Arc<dyn TileStore>,
    ) -> Self {
        let source = ElevationSource::new(config.source_config(), fetcher, store);
        Self::new(Arc::new(source), config)
    }

    pub fn config(&self) -> &ViewshedConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<ElevationSource> {
        &self.source
    }

    /// Computes the viewshed of `observer`.
    ///
    /// Rays are cast in parallel and `progress` hears `(completed,
    /// total)` rays as each one finishes. Once `cancel` is set no new
    /// ray starts and the calculation returns
    /// [`ViewshedError::Cancelled`].
    ///
    /// Missing elevation data never fails a calculation. Samples
    /// without elevation are skipped, and an observer without ground
    /// elevation is placed at sea level.
    pub fn calculate(
        &self,
        observer: Coordinate,
        cancel: &CancelToken,
        progress: Option<&dyn Progress>,
    ) -> Result<ViewshedResult, ViewshedError> {
        let start = Instant::now();
        let config = self.config;
        let ground_m = self.source.elevation(observer).unwrap_or_else(|| {
            warn!("no ground elevation at observer {observer}, using 0 m");
            0.0
        });
        let observer_elevation_m = f64::from(ground_m) + config.observer_height_m;

        let total = config.ray_count();
        let samples = config.samples_per_ray();
        let completed = AtomicUsize::new(0);
        debug!("casting {total} rays of {samples} samples from {observer}");

        let rays: Option<Vec<Vec<VisiblePoint>>> = (0..total)
            .into_par_iter()
            .map(|i| {
                if cancel.is_cancelled() {
                    return None;
                }
                #[allow(clippy::cast_precision_loss)]
                let bearing_deg = i as f64 * config.angular_resolution_deg;
                let visible = self.cast_ray(observer, observer_elevation_m, bearing_deg, samples);
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(progress) = progress {
                    progress.update(done, total);
                }
                Some(visible)
            })
            .collect();

        let Some(rays) = rays else {
            info!("viewshed from {observer} cancelled");
            return Err(ViewshedError::Cancelled);
        };
        let visible_points: Vec<VisiblePoint> = rays.into_iter().flatten().collect();
        let duration = start.elapsed();
        info!(
            "viewshed from {observer}: {} visible points, {duration:?}",
            visible_points.len()
        );
        Ok(ViewshedResult {
            observer,
            observer_elevation_m,
            visible_points,
            duration,
            config,
        })
    }

    /// Runs [`ViewshedEngine::calculate`] on its own thread.
    pub fn spawn(&self, observer: Coordinate) -> ViewshedHandle {
        let engine = self.clone();
        let cancel = CancelToken::new();
        let (progress_tx, progress) = channel();
        let token = cancel.clone();
        let thread = thread::spawn(move || engine.calculate(observer, &token, Some(&progress_tx)));
        ViewshedHandle {
            cancel,
            progress,
            thread,
        }
    }
}

/// Private API.
impl ViewshedEngine {
    /// Returns the visible samples along one bearing, nearest first.
    fn cast_ray(
        &self,
        observer: Coordinate,
        observer_elevation_m: f64,
        bearing_deg: f64,
        samples: usize,
    ) -> Vec<VisiblePoint> {
        let config = &self.config;
        let (distances, coords): (Vec<f64>, Vec<Coordinate>) = RayIter::new(
            observer,
            bearing_deg,
            config.sample_interval_m,
            samples,
            config.earth_radius_m,
        )
        .take_while(|(distance_m, _)| *distance_m <= config.max_distance_m)
        .unzip();
        let elevations = self.source.elevations(&coords);

        let mut horizon = Horizon::new(
            observer_elevation_m,
            config
                .account_for_curvature
                .then_some(config.earth_radius_m),
        );
        distances
            .into_iter()
            .zip(coords)
            .zip(elevations)
            .filter_map(|((distance_m, coordinate), elevation_m)| {
                let elevation_m = elevation_m?;
                horizon
                    .observe(distance_m, f64::from(elevation_m))
                    .then_some(VisiblePoint {
                        coordinate,
                        distance_m,
                        bearing_deg,
                        elevation_m,
                    })
            })
            .collect()
    }
}

/// A viewshed calculation running on a background thread.
pub struct ViewshedHandle {
    cancel: CancelToken,
    progress: Receiver<(usize, usize)>,
    thread: JoinHandle<Result<ViewshedResult, ViewshedError>>,
}

impl ViewshedHandle {
    /// Asks the calculation to stop starting new rays.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the `(completed, total)` ray updates sent so far and
    /// still to come.
    pub fn progress(&self) -> &Receiver<(usize, usize)> {
        &self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the calculation to end.
    pub fn join(self) -> Result<ViewshedResult, ViewshedError> {
        self.thread.join().map_err(|_| ViewshedError::Panicked)?
    }
}

#[cfg(test)]
mod tests {
    use super::ViewshedEngine;
    use crate::{ViewshedConfig, ViewshedError};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use terrain::{
        terrain_rgb::{encode_png, ElevationGrid, TileKey, TILE_SIZE},
        CancelToken, Coordinate, MemStore, TerrainError,
    };

    const OBSERVER: Coordinate = Coordinate::new(47.7126, -121.1477);

    fn engine(config: ViewshedConfig, elevation: f32) -> ViewshedEngine {
        let png = encode_png(&ElevationGrid::filled(TILE_SIZE, elevation)).unwrap();
        ViewshedEngine::with_fetcher(
            config,
            Arc::new(move |_key: TileKey| -> Result<Vec<u8>, TerrainError> { Ok(png.clone()) }),
            Arc::new(MemStore::new()),
        )
    }

    fn small() -> ViewshedConfig {
        ViewshedConfig::default()
            .max_distance_m(1_000.0)
            .sample_interval_m(100.0)
            .angular_resolution_deg(90.0)
            .observer_height_m(0.0)
    }

    #[test]
    fn test_observer_elevation_includes_eye_height() {
        let config = small().observer_height_m(1.7);
        let result = engine(config, 250.0)
            .calculate(OBSERVER, &CancelToken::new(), None)
            .unwrap();
        assert!((result.observer_elevation_m - 251.7).abs() < 1e-3);
        assert_eq!(result.config, config);
    }

    #[test]
    fn test_points_stay_within_range() {
        // Raised eye over flat ground without curvature sees every sample.
        let config = small()
            .max_distance_m(950.0)
            .observer_height_m(1.7)
            .account_for_curvature(false);
        let result = engine(config, 0.0)
            .calculate(OBSERVER, &CancelToken::new(), None)
            .unwrap();
        assert_eq!(result.visible_points.len(), 4 * 9);
        for point in &result.visible_points {
            assert!(point.distance_m <= 950.0);
        }
    }

    #[test]
    fn test_no_data_means_no_points() {
        let engine = ViewshedEngine::with_fetcher(
            small().observer_height_m(1.7),
            Arc::new(|key: TileKey| -> Result<Vec<u8>, TerrainError> {
                Err(TerrainError::MissingTile(key))
            }),
            Arc::new(MemStore::new()),
        );
        let result = engine.calculate(OBSERVER, &CancelToken::new(), None).unwrap();
        assert!(result.visible_points.is_empty());
        assert!((result.observer_elevation_m - 1.7).abs() < 1e-9);
    }

    #[test]
    fn test_unavailable_tiles_are_fetched_once() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = fetches.clone();
        let config = ViewshedConfig::default().max_distance_m(500.0);
        let engine = ViewshedEngine::with_fetcher(
            config,
            Arc::new(move |key: TileKey| -> Result<Vec<u8>, TerrainError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TerrainError::MissingTile(key))
            }),
            Arc::new(MemStore::new()),
        );
        let result = engine.calculate(OBSERVER, &CancelToken::new(), None).unwrap();
        assert!(result.visible_points.is_empty());

        let region = engine.source().tiles_for_region(OBSERVER, 500.0);
        let fetches = fetches.load(Ordering::SeqCst);
        assert!(fetches >= 1);
        assert!(fetches <= region.len(), "{fetches} fetches for {} tiles", region.len());
    }

    #[test]
    fn test_progress_reports_every_ray() {
        let updates = Mutex::new(Vec::new());
        let progress = |done: usize, total: usize| updates.lock().unwrap().push((done, total));
        engine(small(), 0.0)
            .calculate(OBSERVER, &CancelToken::new(), Some(&progress))
            .unwrap();
        let mut updates = updates.into_inner().unwrap();
        updates.sort_unstable();
        assert_eq!(updates, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            engine(small(), 0.0).calculate(OBSERVER, &cancel, None),
            Err(ViewshedError::Cancelled)
        ));
    }

    #[test]
    fn test_spawned_calculation() {
        let handle = engine(small(), 0.0).spawn(OBSERVER);
        let result = handle.join().unwrap();
        assert_eq!(result.visible_points.len(), 4);
    }

    #[test]
    fn test_spawned_progress_channel() {
        let handle = engine(small(), 0.0).spawn(OBSERVER);
        let result_len = {
            let updates: Vec<_> = handle.progress().iter().take(4).collect();
            assert!(updates.iter().all(|&(_, total)| total == 4));
            updates.len()
        };
        assert_eq!(result_len, 4);
        assert!(handle.join().is_ok());
    }
}
