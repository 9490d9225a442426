//! Spherical-earth geodesy.
//!
//! The direct and inverse problems are solved on a sphere of caller
//! supplied radius, following the same formulation as the [geo] crate's
//! haversine algorithms but without its fixed earth radius.
//!
//! [geo](https://github.com/georust/geo/blob/eb0cd98f3ccfa226631af23d94d66d214ea66488/geo/src/algorithm/haversine_destination.rs)

use crate::Coordinate;

/// Great-circle distance, in meters, from `a` to `b`.
pub fn distance(a: Coordinate, b: Coordinate, radius_m: f64) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b.lon - a.lon).to_radians();
    let k = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * radius_m * k.sqrt().min(1.0).asin()
}

/// Initial bearing, in degrees clockwise from north in `[0, 360)`,
/// of the great circle from `a` to `b`.
pub fn bearing(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Returns the point `distance_m` meters from `origin` along
/// `bearing_deg`.
pub fn destination(origin: Coordinate, bearing_deg: f64, distance_m: f64, radius_m: f64) -> Coordinate {
    RayParams::new(origin, bearing_deg).at(distance_m / radius_m)
}

/// Evenly spaced points along a great circle leaving `origin` on a
/// fixed bearing.
///
/// Yields `(distance_m, coordinate)` for `step, 2 * step, ..., count *
/// step`. The origin itself is not yielded.
pub struct RayIter {
    params: RayParams,
    step_m: f64,
    radius_m: f64,
    current: usize,
    count: usize,
}

impl RayIter {
    pub fn new(origin: Coordinate, bearing_deg: f64, step_m: f64, count: usize, radius_m: f64) -> Self {
        Self {
            params: RayParams::new(origin, bearing_deg),
            step_m,
            radius_m,
            current: 0,
            count,
        }
    }
}

impl Iterator for RayIter {
    type Item = (f64, Coordinate);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current < self.count {
            self.current += 1;
            #[allow(clippy::cast_precision_loss)]
            let distance_m = self.current as f64 * self.step_m;
            Some((distance_m, self.params.at(distance_m / self.radius_m)))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.current;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RayIter {}

/// Trig terms of the direct problem that only depend on the origin
/// and bearing.
struct RayParams {
    lon: f64,
    lat_sin: f64,
    lat_cos: f64,
    bearing_sin: f64,
    bearing_cos: f64,
}

impl RayParams {
    fn new(origin: Coordinate, bearing_deg: f64) -> Self {
        let (lat_sin, lat_cos) = origin.lat.to_radians().sin_cos();
        let (bearing_sin, bearing_cos) = bearing_deg.to_radians().sin_cos();
        Self {
            lon: origin.lon.to_radians(),
            lat_sin,
            lat_cos,
            bearing_sin,
            bearing_cos,
        }
    }

    /// Returns the point at angular distance `delta` (radians).
    fn at(&self, delta: f64) -> Coordinate {
        let (delta_sin, delta_cos) = delta.sin_cos();
        let lat = (self.lat_sin * delta_cos + self.lat_cos * delta_sin * self.bearing_cos).asin();
        let lon = self.lon
            + (self.bearing_sin * delta_sin * self.lat_cos).atan2(delta_cos - self.lat_sin * lat.sin());
        Coordinate {
            lat: lat.to_degrees(),
            lon: normalize_lon(lon.to_degrees()),
        }
    }
}

/// Wraps a longitude into `[-180, 180)`.
fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}
