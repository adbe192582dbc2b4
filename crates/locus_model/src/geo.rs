//! Small-scale geodesic helpers.
//!
//! Emitter footprints are at most a few kilometers across, so the
//! equirectangular approximation on a spherical earth is accurate to
//! well under a meter at these scales and avoids pulling in a full
//! geodesy stack.

/// Mean earth radius in meters (IUGG R1).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Approximate distance in meters between two WGS84 points.
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat_mid = (lat1 + lat2) / 2.0;
    let dx = (lon2 - lon1).to_radians() * lat_mid.to_radians().cos() * EARTH_RADIUS_M;
    let dy = (lat2 - lat1).to_radians() * EARTH_RADIUS_M;
    (dx * dx + dy * dy).sqrt()
}

/// Half the diagonal of a bounding box, in meters. Zero for a
/// degenerate (single point) box.
pub fn half_diagonal_m(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> f64 {
    distance_m(min_lat, min_lon, max_lat, max_lon) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_box_has_zero_diagonal() {
        assert_eq!(half_diagonal_m(56.0112, 37.4765, 56.0112, 37.4765), 0.0);
    }

    #[test]
    fn one_degree_of_latitude() {
        // ~111.2 km per degree of latitude
        let d = distance_m(55.0, 37.0, 56.0, 37.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn longitude_shrinks_with_latitude() {
        let at_equator = distance_m(0.0, 10.0, 0.0, 11.0);
        let at_56n = distance_m(56.0, 10.0, 56.0, 11.0);
        assert!(at_56n < at_equator * 0.6);
        assert!(at_56n > at_equator * 0.5);
    }

    #[test]
    fn symmetric() {
        let a = distance_m(56.0112, 37.4765, 56.0125, 37.4801);
        let b = distance_m(56.0125, 37.4801, 56.0112, 37.4765);
        assert!((a - b).abs() < 1e-9);
    }
}
