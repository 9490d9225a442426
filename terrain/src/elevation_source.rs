//! Elevation lookup over cached Terrain-RGB tiles.

use crate::{
    CancelToken, Coordinate, FetchGate, Progress, SourceConfig, TerrainError, TileCache,
    TileFetcher, TileStore,
};
use dashmap::DashMap;
use log::{debug, info, warn};
use moka::sync::Cache;
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};
use terrain_rgb::{pixel_offset, ElevationGrid, TileKey, TILE_SIZE};

/// Number of points sampled on a region's circumference when planning
/// which tiles cover it.
const REGION_EDGE_SAMPLES: u32 = 36;

/// Resolves geographic coordinates to elevations.
///
/// Tiles are looked up in a [`TileCache`] and fetched on a miss, with
/// at most [`SourceConfig::max_concurrent_fetches`] fetches in flight.
/// Concurrent requests for the same uncached tile share one fetch,
/// and a tile that failed to load is not fetched again until
/// [`SourceConfig::failure_ttl_secs`] have passed.
pub struct ElevationSource {
    config: SourceConfig,
    fetcher: Arc<dyn TileFetcher>,
    cache: TileCache,
    gate: FetchGate,

    /// Per-tile locks held while a tile is being loaded.
    loading: DashMap<TileKey, Arc<Mutex<()>>>,

    /// Tiles whose last load failed.
    failed: Cache<TileKey, ()>,
}

/// Cached versus required tiles for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCount {
    pub cached: usize,
    pub total: usize,
}

impl ElevationSource {
    pub fn new(
        config: SourceConfig,
        fetcher: Arc<dyn TileFetcher>,
        store: Arc<dyn TileStore>,
    ) -> Self {
        let cache = TileCache::new(store, config.memory_cache_bytes);
        Self::with_cache(config, fetcher, cache)
    }

    pub fn with_cache(config: SourceConfig, fetcher: Arc<dyn TileFetcher>, cache: TileCache) -> Self {
        Self {
            gate: FetchGate::new(config.max_concurrent_fetches),
            config,
            fetcher,
            cache,
            loading: DashMap::new(),
            failed: Cache::builder()
                .time_to_live(Duration::from_secs(config.failure_ttl_secs))
                .build(),
        }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Returns the grid for `key`, fetching and decoding it on a cache
    /// miss.
    ///
    /// Returns [`TerrainError::RecentlyFailed`] without fetching if the
    /// tile's last load failed within the failure TTL.
    pub fn tile(&self, key: TileKey) -> Result<Arc<ElevationGrid>, TerrainError> {
        if let Some(grid) = self.cache.get(key) {
            return Ok(grid);
        }
        self.check_failed(key)?;
        let lock = self.loading.entry(key).or_default().clone();
        let result = {
            let _loading = lock.lock().unwrap_or_else(PoisonError::into_inner);
            // Whoever held the lock before us may have loaded it, or
            // failed to.
            match self.cache.get(key) {
                Some(grid) => Ok(grid),
                None => self.check_failed(key).and_then(|()| self.load(key)),
            }
        };
        self.loading.remove_if(&key, |_, l| Arc::ptr_eq(l, &lock));
        result
    }

    /// Forgets every remembered load failure, so the next request for
    /// any tile fetches it again.
    pub fn forget_failures(&self) {
        self.failed.invalidate_all();
    }

    /// Returns the interpolated elevation at `coord`, or `None` if its
    /// tile is unavailable.
    pub fn elevation(&self, coord: Coordinate) -> Option<f32> {
        let offset = pixel_offset(coord.lat, coord.lon, self.config.zoom, TILE_SIZE);
        match self.tile(offset.key) {
            Ok(grid) => Some(grid.interpolated_elevation(offset.x, offset.y)),
            Err(e @ TerrainError::RecentlyFailed(_)) => {
                debug!("no elevation for {coord}: {e}");
                None
            }
            Err(e) => {
                warn!("no elevation for {coord}: {e}");
                None
            }
        }
    }

    /// Returns the elevation of each of `coords`, in order.
    ///
    /// Each distinct tile is loaded once per call.
    pub fn elevations(&self, coords: &[Coordinate]) -> Vec<Option<f32>> {
        let mut by_tile: BTreeMap<TileKey, Vec<usize>> = BTreeMap::new();
        let offsets: Vec<_> = coords
            .iter()
            .enumerate()
            .map(|(idx, coord)| {
                let offset = pixel_offset(coord.lat, coord.lon, self.config.zoom, TILE_SIZE);
                by_tile.entry(offset.key).or_default().push(idx);
                offset
            })
            .collect();

        let mut elevations = vec![None; coords.len()];
        for (key, indices) in by_tile {
            let grid = match self.tile(key) {
                Ok(grid) => grid,
                Err(e @ TerrainError::RecentlyFailed(_)) => {
                    debug!("{} samples without elevation: {e}", indices.len());
                    continue;
                }
                Err(e) => {
                    warn!("{} samples without elevation, tile {key}: {e}", indices.len());
                    continue;
                }
            };
            for idx in indices {
                let offset = &offsets[idx];
                elevations[idx] = Some(grid.interpolated_elevation(offset.x, offset.y));
            }
        }
        elevations
    }

    /// Returns the tiles covering a circle of `radius_m` around
    /// `center`.
    ///
    /// The cover is the bounding rectangle of the tiles touched by the
    /// center and points sampled along the circle, so it may include
    /// tiles the circle itself does not reach.
    pub fn tiles_for_region(&self, center: Coordinate, radius_m: f64) -> Vec<TileKey> {
        let zoom = self.config.zoom;
        let step = 360.0 / f64::from(REGION_EDGE_SAMPLES);
        let edge = (0..REGION_EDGE_SAMPLES)
            .map(|i| center.destination(f64::from(i) * step, radius_m, self.config.earth_radius_m));
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0, 0);
        for coord in std::iter::once(center).chain(edge) {
            let TileKey { x, y, .. } = TileKey::containing(coord.lat, coord.lon, zoom);
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        (min_y..=max_y)
            .flat_map(|y| (min_x..=max_x).map(move |x| TileKey { zoom, x, y }))
            .collect()
    }

    /// Reports how many of a region's tiles are already cached.
    pub fn cached_tile_count(&self, center: Coordinate, radius_m: f64) -> TileCount {
        let tiles = self.tiles_for_region(center, radius_m);
        TileCount {
            cached: tiles.iter().filter(|key| self.cache.has_tile(**key)).count(),
            total: tiles.len(),
        }
    }

    /// Fetches every uncached tile of a region.
    ///
    /// `progress` is told `(completed, total)` after each tile settles,
    /// whether it was loaded, already cached, or failed. Individual tile
    /// failures are logged and do not stop the batch.
    ///
    /// Returns `false` if `cancel` stopped the download before every
    /// tile was attempted.
    pub fn download_region(
        &self,
        center: Coordinate,
        radius_m: f64,
        progress: Option<&dyn Progress>,
        cancel: &CancelToken,
    ) -> bool {
        let start = Instant::now();
        let tiles = self.tiles_for_region(center, radius_m);
        let total = tiles.len();
        let completed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        tiles.par_iter().for_each(|&key| {
            if cancel.is_cancelled() {
                return;
            }
            if !self.cache.has_tile(key) {
                if let Err(e) = self.tile(key) {
                    warn!("downloading tile {key}: {e}");
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(progress) = progress {
                progress.update(done, total);
            }
        });

        let completed = completed.into_inner();
        let failed = failed.into_inner();
        if completed == total {
            info!(
                "downloaded region around {center}, {total} tiles, {failed} failed, {:?}",
                start.elapsed()
            );
            true
        } else {
            info!("region download around {center} cancelled after {completed} of {total} tiles");
            false
        }
    }
}

/// Private API.
impl ElevationSource {
    fn check_failed(&self, key: TileKey) -> Result<(), TerrainError> {
        if self.failed.contains_key(&key) {
            Err(TerrainError::RecentlyFailed(key))
        } else {
            Ok(())
        }
    }

    fn load(&self, key: TileKey) -> Result<Arc<ElevationGrid>, TerrainError> {
        let result = self.fetch_and_decode(key);
        if result.is_err() && self.config.failure_ttl_secs > 0 {
            self.failed.insert(key, ());
        }
        result
    }

    fn fetch_and_decode(&self, key: TileKey) -> Result<Arc<ElevationGrid>, TerrainError> {
        let bytes = {
            let _permit = self.gate.acquire();
            debug!("fetching tile {key}");
            self.fetcher.fetch(key)?
        };
        let grid = Arc::new(terrain_rgb::decode(&bytes)?);
        self.cache.insert(key, grid.clone());
        Ok(grid)
    }
}
