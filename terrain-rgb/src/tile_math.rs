//! Spherical Web-Mercator tile addressing.
//!
//! Latitudes outside `±MAX_LAT` are not rejected. They project past
//! the edge of the tile pyramid and are pinned to the first or last
//! row, so `tile_bounds` will not contain them.

use geo::{polygon, Polygon};
use std::{f64::consts::PI, fmt};

/// Northern (and, negated, southern) limit of the Web-Mercator
/// projection, in degrees.
pub const MAX_LAT: f64 = 85.051_128_779_806_59;

/// WGS84 equatorial radius used by the Web-Mercator projection.
const MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// Identifies a single raster tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Returns the key of the tile containing `(lat, lon)`.
    pub fn containing(lat: f64, lon: f64, zoom: u8) -> Self {
        let (x, y) = tile_index(lat, lon, zoom);
        Self { zoom, x, y }
    }

    pub fn bounds(&self) -> TileBounds {
        tile_bounds(self.x, self.y, self.zoom)
    }

    /// Returns this tile's outline as a closed lon/lat ring.
    pub fn polygon(&self) -> Polygon<f64> {
        let TileBounds {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        } = self.bounds();
        polygon![
            (x: min_lon, y: min_lat),
            (x: max_lon, y: min_lat),
            (x: max_lon, y: max_lat),
            (x: min_lon, y: max_lat),
            (x: min_lon, y: min_lat)
        ]
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Geographic extent of a tile, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl TileBounds {
    /// Inclusive containment test.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// A tile plus the fractional pixel position inside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelOffset {
    pub key: TileKey,
    /// Column, in `[0, tile_size)`.
    pub x: f64,
    /// Row, in `[0, tile_size)`, increasing southward.
    pub y: f64,
}

/// Projects `(lat, lon)` to continuous tile units at `zoom`.
///
/// Every public conversion goes through here so identical inputs
/// always produce bit-identical outputs.
fn project(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let n = tiles_per_side(zoom);
    let x = (lon + 180.0) / 360.0 * n;
    let y = (1.0 - lat.to_radians().tan().asinh() / PI) / 2.0 * n;
    (x, y)
}

fn tiles_per_side(zoom: u8) -> f64 {
    f64::from(1_u32 << zoom)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_index(t: f64, zoom: u8) -> u32 {
    // Float to int casts saturate, so this pins anything left of or
    // above the pyramid to 0.
    let max = (1_u32 << zoom) - 1;
    (t.floor() as u32).min(max)
}

/// Returns the `(x, y)` index of the tile containing `(lat, lon)`.
pub fn tile_index(lat: f64, lon: f64, zoom: u8) -> (u32, u32) {
    let (x, y) = project(lat, lon, zoom);
    (to_index(x, zoom), to_index(y, zoom))
}

/// Returns the tile containing `(lat, lon)` and the fractional pixel
/// position of the coordinate inside that tile.
pub fn pixel_offset(lat: f64, lon: f64, zoom: u8, tile_size: u32) -> PixelOffset {
    let (tx, ty) = project(lat, lon, zoom);
    let (x, y) = (to_index(tx, zoom), to_index(ty, zoom));
    let size = f64::from(tile_size);
    PixelOffset {
        key: TileKey { zoom, x, y },
        x: (tx - f64::from(x)) * size,
        y: (ty - f64::from(y)) * size,
    }
}

/// Returns the corners of tile `(x, y)` at `zoom`.
pub fn tile_bounds(x: u32, y: u32, zoom: u8) -> TileBounds {
    let n = tiles_per_side(zoom);
    let lon = |x: f64| x / n * 360.0 - 180.0;
    let lat = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
    TileBounds {
        min_lat: lat(f64::from(y) + 1.0),
        max_lat: lat(f64::from(y)),
        min_lon: lon(f64::from(x)),
        max_lon: lon(f64::from(x) + 1.0),
    }
}

/// Ground resolution of one pixel at `lat`.
pub fn meters_per_pixel(lat: f64, zoom: u8, tile_size: u32) -> f64 {
    lat.to_radians().cos() * 2.0 * PI * MERCATOR_RADIUS_M
        / (f64::from(tile_size) * tiles_per_side(zoom))
}
