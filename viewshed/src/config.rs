use serde::{Deserialize, Serialize};
use terrain::{SourceConfig, MEAN_EARTH_RADIUS_M};

/// Parameters of a viewshed calculation.
///
/// Deserializing a partial document fills the missing fields with
/// their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewshedConfig {
    /// How far each ray scans from the observer.
    #[serde(alias = "maxDistanceMeters")]
    pub max_distance_m: f64,

    /// Bearing step between rays.
    #[serde(alias = "angularResolutionDegrees")]
    pub angular_resolution_deg: f64,

    /// Distance step between samples along a ray.
    #[serde(alias = "sampleIntervalMeters")]
    pub sample_interval_m: f64,

    /// Eye height above the ground at the observer.
    #[serde(alias = "observerHeightMeters")]
    pub observer_height_m: f64,

    /// Lower distant samples by `d² / 2R`.
    pub account_for_curvature: bool,

    #[serde(alias = "earthRadiusMeters")]
    pub earth_radius_m: f64,

    /// Side length of a coverage grid cell.
    #[serde(alias = "gridCellSizeMeters")]
    pub grid_cell_size_m: f64,

    /// Latitude at which coverage cells are square. Unset, grids use
    /// the observer's latitude, or the equator when there is none.
    pub grid_reference_lat_deg: Option<f64>,

    #[serde(alias = "tileZoomLevel")]
    pub tile_zoom: u8,

    pub max_concurrent_fetches: usize,
}

impl ViewshedConfig {
    pub const DEFAULT_MAX_DISTANCE_M: f64 = 3000.0;
    pub const DEFAULT_ANGULAR_RESOLUTION_DEG: f64 = 1.0;
    pub const DEFAULT_SAMPLE_INTERVAL_M: f64 = 10.0;
    pub const DEFAULT_OBSERVER_HEIGHT_M: f64 = 1.7;
    pub const DEFAULT_GRID_CELL_SIZE_M: f64 = 100.0;

    /// Number of rays cast, `360 / angular_resolution_deg` rounded
    /// down, and at least one.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn ray_count(&self) -> usize {
        if self.angular_resolution_deg > 0.0 {
            ((360.0 / self.angular_resolution_deg).floor() as usize).max(1)
        } else {
            1
        }
    }

    /// Number of samples along each ray,
    /// `floor(max_distance_m / sample_interval_m)`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn samples_per_ray(&self) -> usize {
        if self.sample_interval_m > 0.0 && self.max_distance_m > 0.0 {
            (self.max_distance_m / self.sample_interval_m).floor() as usize
        } else {
            0
        }
    }

    /// Returns the elevation source settings implied by this config.
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig::default()
            .zoom(self.tile_zoom)
            .max_concurrent_fetches(self.max_concurrent_fetches)
            .earth_radius_m(self.earth_radius_m)
    }

    #[must_use]
    pub fn max_distance_m(self, max_distance_m: f64) -> Self {
        Self {
            max_distance_m,
            ..self
        }
    }

    #[must_use]
    pub fn angular_resolution_deg(self, angular_resolution_deg: f64) -> Self {
        Self {
            angular_resolution_deg,
            ..self
        }
    }

    #[must_use]
    pub fn sample_interval_m(self, sample_interval_m: f64) -> Self {
        Self {
            sample_interval_m,
            ..self
        }
    }

    #[must_use]
    pub fn observer_height_m(self, observer_height_m: f64) -> Self {
        Self {
            observer_height_m,
            ..self
        }
    }

    #[must_use]
    pub fn account_for_curvature(self, account_for_curvature: bool) -> Self {
        Self {
            account_for_curvature,
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
    pub fn grid_cell_size_m(self, grid_cell_size_m: f64) -> Self {
        Self {
            grid_cell_size_m,
            ..self
        }
    }

    #[must_use]
    pub fn grid_reference_lat_deg(self, grid_reference_lat_deg: Option<f64>) -> Self {
        Self {
            grid_reference_lat_deg,
            ..self
        }
    }

    #[must_use]
    pub fn tile_zoom(self, tile_zoom: u8) -> Self {
        Self { tile_zoom, ..self }
    }

    #[must_use]
    pub fn max_concurrent_fetches(self, max_concurrent_fetches: usize) -> Self {
        Self {
            max_concurrent_fetches,
            ..self
        }
    }
}

impl Default for ViewshedConfig {
    fn default() -> Self {
        Self {
            max_distance_m: Self::DEFAULT_MAX_DISTANCE_M,
            angular_resolution_deg: Self::DEFAULT_ANGULAR_RESOLUTION_DEG,
            sample_interval_m: Self::DEFAULT_SAMPLE_INTERVAL_M,
            observer_height_m: Self::DEFAULT_OBSERVER_HEIGHT_M,
            account_for_curvature: true,
            earth_radius_m: MEAN_EARTH_RADIUS_M,
            grid_cell_size_m: Self::DEFAULT_GRID_CELL_SIZE_M,
            grid_reference_lat_deg: None,
            tile_zoom: SourceConfig::DEFAULT_ZOOM,
            max_concurrent_fetches: SourceConfig::DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}
