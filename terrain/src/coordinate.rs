use crate::{math, MEAN_EARTH_RADIUS_M};
use geo::{Coord, Point};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    hash::{Hash, Hasher},
};

/// A geographic position in degrees.
///
/// Equality and hashing compare the exact bit patterns of both
/// fields, so `Coordinate` can key hash maps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other` in meters on a mean-radius
    /// earth.
    pub fn distance_to(&self, other: &Self) -> f64 {
        math::distance(*self, *other, MEAN_EARTH_RADIUS_M)
    }

    /// Initial bearing to `other`, in degrees clockwise from north.
    pub fn bearing_to(&self, other: &Self) -> f64 {
        math::bearing(*self, *other)
    }

    /// Returns the position `distance_m` meters away along
    /// `bearing_deg`, on a sphere of radius `radius_m`.
    pub fn destination(&self, bearing_deg: f64, distance_m: f64, radius_m: f64) -> Self {
        math::destination(*self, bearing_deg, distance_m, radius_m)
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lon.to_bits() == other.lon.to_bits()
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lat.to_bits().hash(state);
        self.lon.to_bits().hash(state);
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

impl From<Coord<f64>> for Coordinate {
    fn from(Coord { x, y }: Coord<f64>) -> Self {
        Self { lat: y, lon: x }
    }
}

impl From<Coordinate> for Coord<f64> {
    fn from(Coordinate { lat, lon }: Coordinate) -> Self {
        Coord { x: lon, y: lat }
    }
}

impl From<Coordinate> for Point<f64> {
    fn from(coord: Coordinate) -> Self {
        Point::from(Coord::from(coord))
    }
}
