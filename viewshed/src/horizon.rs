//! Radial horizon test.

use num_traits::Float;

/// Returns how far a point `distance_m` away drops below the
/// observer's tangent plane on a sphere of radius `earth_radius`.
pub fn curvature_drop<T: Float>(distance_m: T, earth_radius: T) -> T {
    distance_m.powi(2) / ((T::one() + T::one()) * earth_radius)
}

/// Returns the up/down angle (in radians) from an observer at
/// `observer_elev_m` to a point `distance_m` away at `target_elev_m`.
pub fn elevation_angle<T: Float>(observer_elev_m: T, distance_m: T, target_elev_m: T) -> T {
    (target_elev_m - observer_elev_m).atan2(distance_m)
}

/// Running maximum elevation angle along one ray.
///
/// Samples must be offered in increasing distance. A sample is
/// visible iff its angle strictly exceeds every angle offered before
/// it, so the nearest sample is always visible.
#[derive(Debug, Clone, Copy)]
pub struct Horizon<T> {
    observer_elev_m: T,
    earth_radius: Option<T>,
    max_angle: T,
}

impl<T: Float> Horizon<T> {
    /// `earth_radius` enables curvature correction.
    pub fn new(observer_elev_m: T, earth_radius: Option<T>) -> Self {
        Self {
            observer_elev_m,
            earth_radius,
            max_angle: T::neg_infinity(),
        }
    }

    /// Offers the next sample along the ray and returns whether it is
    /// visible.
    pub fn observe(&mut self, distance_m: T, elevation_m: T) -> bool {
        let elevation_m = match self.earth_radius {
            Some(radius) => elevation_m - curvature_drop(distance_m, radius),
            None => elevation_m,
        };
        let angle = elevation_angle(self.observer_elev_m, distance_m, elevation_m);
        if angle > self.max_angle {
            self.max_angle = angle;
            true
        } else {
            false
        }
    }

    /// Returns the steepest angle seen so far.
    pub fn max_angle(&self) -> T {
        self.max_angle
    }
}

#[cfg(test)]
mod tests {
    use super::{curvature_drop, elevation_angle, Horizon};
    use approx::assert_relative_eq;
    use terrain::MEAN_EARTH_RADIUS_M;

    #[test]
    fn test_curvature_drop() {
        assert_relative_eq!(curvature_drop(0.0, MEAN_EARTH_RADIUS_M), 0.0);
        // About 8 cm at 1 km.
        assert_relative_eq!(
            curvature_drop(1_000.0, MEAN_EARTH_RADIUS_M),
            0.078_480_615_288_023_86,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_elevation_angle() {
        assert_relative_eq!(elevation_angle(0.0, 100.0, 100.0), std::f64::consts::FRAC_PI_4);
        assert_relative_eq!(elevation_angle(100.0, 100.0, 0.0), -std::f64::consts::FRAC_PI_4);
        assert_relative_eq!(elevation_angle(5.0, 10.0, 5.0), 0.0);
    }

    #[test]
    fn test_ridge_hides_valley() {
        let mut horizon = Horizon::new(0.0, None);
        assert!(horizon.observe(100.0, 10.0));
        assert!(horizon.observe(200.0, 50.0));
        // Lower than the ridge line.
        assert!(!horizon.observe(300.0, 40.0));
        assert!(!horizon.observe(400.0, 99.0));
        // Rises above it again.
        assert!(horizon.observe(500.0, 200.0));
    }

    #[test]
    fn test_equal_angle_is_hidden() {
        let mut horizon = Horizon::new(0.0, None);
        assert!(horizon.observe(100.0, 10.0));
        assert!(!horizon.observe(200.0, 20.0));
    }

    #[test]
    fn test_flat_world_with_curvature() {
        let mut horizon = Horizon::new(0.0_f64, Some(MEAN_EARTH_RADIUS_M));
        assert!(horizon.observe(100.0, 0.0));
        for i in 2..100 {
            assert!(!horizon.observe(f64::from(i) * 100.0, 0.0));
        }
    }

    #[test]
    fn test_f32() {
        let mut horizon = Horizon::new(1.7_f32, Some(6_371_000.0));
        assert!(horizon.observe(10.0, 0.0));
        assert!(horizon.max_angle() < 0.0);
    }
}
