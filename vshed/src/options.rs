use anyhow::{anyhow, Error as AnyError};
use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, str::FromStr};
use terrain::Coordinate;
use viewshed::ViewshedConfig;

/// Compute viewsheds and cumulative coverage maps from Terrain-RGB
/// tiles.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Tile source, either a URL template containing `{z}`, `{x}` and
    /// `{y}` or a local `{z}/{x}/{y}.png` directory.
    #[arg(short, long)]
    pub tiles: String,

    /// Directory for decoded tiles.
    #[arg(short, long, default_value = "vshed-cache")]
    pub cache_dir: PathBuf,

    /// JSON file with viewshed settings. Flags below override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Maximum scan distance, in meters.
    #[arg(long)]
    pub max_distance: Option<f64>,

    /// Bearing step between rays, in degrees.
    #[arg(long)]
    pub angular_resolution: Option<f64>,

    /// Distance between samples along a ray, in meters.
    #[arg(long)]
    pub sample_interval: Option<f64>,

    /// Eye height above ground, in meters.
    #[arg(long)]
    pub observer_height: Option<f64>,

    /// Ignore earth curvature.
    #[arg(long, default_value_t = false)]
    pub flat_earth: bool,

    #[arg(long)]
    pub earth_radius: Option<f64>,

    /// Coverage grid cell size, in meters.
    #[arg(long)]
    pub grid_cell_size: Option<f64>,

    /// Latitude at which coverage cells are square, in degrees.
    /// Defaults to the first observer's latitude.
    #[arg(long, allow_hyphen_values = true)]
    pub grid_reference_lat: Option<f64>,

    /// Tile zoom level.
    #[arg(short, long)]
    pub zoom: Option<u8>,

    /// Maximum simultaneous tile fetches.
    #[arg(long)]
    pub max_concurrent_fetches: Option<usize>,
}

impl ConfigArgs {
    /// Returns `config` with every flag that was given applied.
    pub fn apply(&self, mut config: ViewshedConfig) -> ViewshedConfig {
        let Self {
            max_distance,
            angular_resolution,
            sample_interval,
            observer_height,
            flat_earth,
            earth_radius,
            grid_cell_size,
            grid_reference_lat,
            zoom,
            max_concurrent_fetches,
        } = self.clone();
        if let Some(v) = max_distance {
            config.max_distance_m = v;
        }
        if let Some(v) = angular_resolution {
            config.angular_resolution_deg = v;
        }
        if let Some(v) = sample_interval {
            config.sample_interval_m = v;
        }
        if let Some(v) = observer_height {
            config.observer_height_m = v;
        }
        if flat_earth {
            config.account_for_curvature = false;
        }
        if let Some(v) = earth_radius {
            config.earth_radius_m = v;
        }
        if let Some(v) = grid_cell_size {
            config.grid_cell_size_m = v;
        }
        if grid_reference_lat.is_some() {
            config.grid_reference_lat_deg = grid_reference_lat;
        }
        if let Some(v) = zoom {
            config.tile_zoom = v;
        }
        if let Some(v) = max_concurrent_fetches {
            config.max_concurrent_fetches = v;
        }
        config
    }
}

/// A "lat,lon" pair in degrees.
#[derive(Clone, Debug, Copy)]
pub struct LatLon(pub Coordinate);

impl FromStr for LatLon {
    type Err = AnyError;
    fn from_str(s: &str) -> Result<Self, AnyError> {
        let (lat_str, lon_str) = s
            .split_once(',')
            .ok_or_else(|| anyhow!("not a valid lat,lon"))?;
        let lat = f64::from_str(lat_str.trim())?;
        let lon = f64::from_str(lon_str.trim())?;
        Ok(Self(Coordinate::new(lat, lon)))
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the GeoJSON coverage of one observer.
    Viewshed {
        /// Observer "lat,lon".
        #[arg(allow_hyphen_values = true)]
        observer: LatLon,

        /// Write GeoJSON here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Accumulate coverage over a sequence of observers.
    Simulate {
        /// Observer "lat,lon" positions, in order.
        #[arg(required = true, allow_hyphen_values = true)]
        observers: Vec<LatLon>,

        /// Write GeoJSON here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Also write the accumulated cells as JSON.
        #[arg(long)]
        cells_out: Option<PathBuf>,
    },

    /// Pre-fetch every tile around a center.
    Download {
        #[arg(allow_hyphen_values = true)]
        center: LatLon,

        /// Radius, in meters.
        #[arg(short, long, default_value_t = 3000.0)]
        radius: f64,
    },

    /// List the tiles around a center and how many are cached.
    Plan {
        #[arg(allow_hyphen_values = true)]
        center: LatLon,

        /// Radius, in meters.
        #[arg(short, long, default_value_t = 3000.0)]
        radius: f64,
    },

    /// Inspect or clear the tile cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Debug, Subcommand, Clone, Copy)]
pub enum CacheCommand {
    /// Print the persisted size.
    Info,

    /// Delete every cached tile.
    Clear,
}
