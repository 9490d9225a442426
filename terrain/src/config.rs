use crate::MEAN_EARTH_RADIUS_M;
use serde::{Deserialize, Serialize};

/// Settings for an [`ElevationSource`](crate::ElevationSource).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SourceConfig {
    /// Zoom level used for every elevation query.
    pub zoom: u8,

    /// Maximum number of tile fetches in flight at once.
    pub max_concurrent_fetches: usize,

    /// Upper bound on decoded grid bytes held in memory.
    pub memory_cache_bytes: u64,

    /// Sphere radius used for region planning.
    pub earth_radius_m: f64,

    /// Seconds a tile that failed to load is answered as unavailable
    /// before it is fetched again. `0` retries on every request.
    pub failure_ttl_secs: u64,
}

impl SourceConfig {
    pub const DEFAULT_ZOOM: u8 = 14;
    pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;
    pub const DEFAULT_MEMORY_CACHE_BYTES: u64 = 256 * 1024 * 1024;
    pub const DEFAULT_FAILURE_TTL_SECS: u64 = 60;

    #[must_use]
    pub fn zoom(self, zoom: u8) -> Self {
        Self { zoom, ..self }
    }

    #[must_use]
    pub fn max_concurrent_fetches(self, max_concurrent_fetches: usize) -> Self {
        Self {
            max_concurrent_fetches,
            ..self
        }
    }

    #[must_use]
    pub fn memory_cache_bytes(self, memory_cache_bytes: u64) -> Self {
        Self {
            memory_cache_bytes,
            ..self
        }
    }

    #[must_use]
    pub fn earth_radius_m(self, earth_radius_m: f64) -> Self {
        Self {
            earth_radius_m,
            ..self
        }
    }

    #[must_use]
    pub fn failure_ttl_secs(self, failure_ttl_secs: u64) -> Self {
        Self {
            failure_ttl_secs,
            ..self
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            zoom: Self::DEFAULT_ZOOM,
            max_concurrent_fetches: Self::DEFAULT_MAX_CONCURRENT_FETCHES,
            memory_cache_bytes: Self::DEFAULT_MEMORY_CACHE_BYTES,
            earth_radius_m: MEAN_EARTH_RADIUS_M,
            failure_ttl_secs: Self::DEFAULT_FAILURE_TTL_SECS,
        }
    }
}
