//! Terrain-RGB elevation tiles.
//!
//! Each pixel of a Terrain-RGB tile packs an elevation into its red,
//! green and blue channels:
//!
//! ```text
//! elevation = -10000 + (R * 65536 + G * 256 + B) * 0.1
//! ```
//!
//! Tiles are addressed with the standard spherical Web-Mercator
//! `(zoom, x, y)` scheme.
//!
//! # References
//!
//! 1. [Terrain-RGB](https://docs.mapbox.com/data/tilesets/reference/mapbox-terrain-rgb-v1/)
//! 1. [Slippy map tilenames](https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames)

mod codec;
mod error;
mod grid;
mod tile_math;

pub use crate::{
    codec::{decode, encode_png},
    error::TerrainRgbError,
    grid::ElevationGrid,
    tile_math::{
        meters_per_pixel, pixel_offset, tile_bounds, tile_index, PixelOffset, TileBounds, TileKey,
        MAX_LAT,
    },
};

/// Width and height, in pixels, of every tile.
pub const TILE_SIZE: u32 = 512;
