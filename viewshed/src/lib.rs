//! Line of sight viewsheds over Terrain-RGB elevation.
//!
//! [`ViewshedEngine`] casts rays outward from an observer and keeps
//! the samples that rise above every nearer sample on the same ray.
//! [`CoverageGrid`] folds the visible samples into coarse grid cells,
//! which accumulate across calculations in a [`CoverageArea`].
//!
//! # References
//!
//! 1. [Viewshed analysis](https://en.wikipedia.org/wiki/Viewshed_analysis)
//! 1. [Horizon](https://en.wikipedia.org/wiki/Horizon#Distance_to_the_horizon)

mod config;
mod coverage;
mod engine;
mod error;
mod horizon;

pub use crate::{
    config::ViewshedConfig,
    coverage::{merge, CellSet, CoverageArea, CoverageGrid, GridCell, METERS_PER_DEGREE},
    engine::{ViewshedEngine, ViewshedHandle, ViewshedResult, VisiblePoint},
    error::ViewshedError,
    horizon::{curvature_drop, elevation_angle, Horizon},
};
pub use terrain;
