//! Elevation lookup backed by a tiled Terrain-RGB source.
//!
//! An [`ElevationSource`] turns coordinates into elevations. Tiles come
//! from a [`TileFetcher`], are decoded once, and live in a two tier
//! [`TileCache`] (memory plus a persistent [`TileStore`]).

mod cache;
mod config;
mod coordinate;
mod elevation_source;
mod error;
mod fetch;
mod gate;
pub mod math;
mod progress;
mod store;

pub use crate::{
    cache::{CacheStats, TileCache},
    config::SourceConfig,
    coordinate::Coordinate,
    elevation_source::{ElevationSource, TileCount},
    error::TerrainError,
    fetch::{DirFetcher, HttpFetcher, TileFetcher},
    gate::{FetchGate, Permit},
    progress::{CancelToken, Progress},
    store::{FileStore, MemStore, TileStore},
};
pub use terrain_rgb;

/// Mean earth radius, in meters, used by default for geodesy and
/// curvature.
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_000.0;
