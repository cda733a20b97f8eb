//! geo.rs — Spherical-earth helpers
//!
//! Haversine distance, forward bearing and great-circle destination on a sphere
//! of radius 6 371 km. Good to well under a meter at the scales the simulator
//! wanders, and exact enough to recover distances from replayed tracks.

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub const KNOTS_TO_MPS: f64 = 0.514444;
pub const MPS_TO_KNOTS: f64 = 1.94384;
pub const KNOTS_TO_KMH: f64 = 1.852;

/// Great-circle distance in meters.
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing from point 1 to point 2, degrees in [0, 360).
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();

    let bearing = y.atan2(x).to_degrees();
    let bearing = if bearing < 0.0 { bearing + 360.0 } else { bearing };
    // -0.0 + 360 rounds to exactly 360
    if bearing >= 360.0 { 0.0 } else { bearing }
}

/// Point reached travelling `distance_m` along `bearing_deg` from (lat, lon).
/// Longitude is normalised into [-180, 180].
pub fn destination(lat: f64, lon: f64, distance_m: f64, bearing_deg: f64) -> (f64, f64) {
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();
    let theta = bearing_deg.to_radians();
    let delta = distance_m / EARTH_RADIUS_M;

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    let mut lon2 = lambda2.to_degrees();
    while lon2 > 180.0 {
        lon2 -= 360.0;
    }
    while lon2 < -180.0 {
        lon2 += 360.0;
    }
    (phi2.to_degrees(), lon2)
}

/// Wrap a course into [0, 360) by repeated wraparound.
pub fn normalize_course(mut course: f64) -> f64 {
    if !course.is_finite() {
        return 0.0;
    }
    while course < 0.0 {
        course += 360.0;
    }
    while course >= 360.0 {
        course -= 360.0;
    }
    course
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_latitude() {
        let d = distance_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn destination_then_distance_round_trips() {
        let (lat, lon) = destination(37.7749, -122.4194, 250.0, 63.0);
        let d = distance_m(37.7749, -122.4194, lat, lon);
        assert!((d - 250.0).abs() < 1e-6, "got {d}");
        let b = bearing_deg(37.7749, -122.4194, lat, lon);
        assert!((b - 63.0).abs() < 1e-3, "got {b}");
    }

    #[test]
    fn cardinal_bearings() {
        assert!((bearing_deg(0.0, 0.0, 1.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((bearing_deg(0.0, 0.0, 0.0, 1.0) - 90.0).abs() < 1e-9);
        assert!((bearing_deg(0.0, 0.0, -1.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((bearing_deg(0.0, 0.0, 0.0, -1.0) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn destination_wraps_antimeridian() {
        let (_, lon) = destination(0.0, 179.9999, 1000.0, 90.0);
        assert!(lon < -179.0, "got {lon}");
    }

    #[test]
    fn course_normalisation() {
        assert_eq!(normalize_course(-30.0), 330.0);
        assert_eq!(normalize_course(720.0), 0.0);
        assert_eq!(normalize_course(359.5), 359.5);
        assert_eq!(normalize_course(f64::NAN), 0.0);
    }
}
