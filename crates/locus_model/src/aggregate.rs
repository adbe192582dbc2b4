//! Per-emitter aggregate payload.
//!
//! One emitter row holds a bounding box of every position the emitter
//! was observed from, a weighted centroid over those positions, the
//! running weight sum, and the envelope of reported signal strengths.
//! The same shape doubles as a batch-local delta: merging two
//! aggregates is exact for the weighted mean, so a worker can fold all
//! observations of one emitter locally and ship a single delta to
//! storage.

use serde::{Deserialize, Serialize};

use crate::geo;

/// Location aggregate for a single emitter (Wi-Fi, Bluetooth or cell).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterAggregate {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,

    /// Weighted centroid of observed positions.
    pub lat: f64,
    pub lon: f64,
    /// Half-diagonal of the bounding box, meters.
    pub accuracy: f64,
    /// Running sum of observation weights. Positive iff the centroid
    /// is valid.
    pub total_weight: f64,

    pub min_strength: f64,
    pub max_strength: f64,
}

impl EmitterAggregate {
    /// Aggregate around a single observation: a degenerate box with
    /// zero accuracy.
    pub fn observation(lat: f64, lon: f64, weight: f64, strength: f64) -> Self {
        Self {
            min_lat: lat,
            min_lon: lon,
            max_lat: lat,
            max_lon: lon,
            lat,
            lon,
            accuracy: 0.0,
            total_weight: weight,
            min_strength: strength,
            max_strength: strength,
        }
    }

    /// Fold another aggregate into this one.
    ///
    /// The box and strength envelope take the union, the centroid the
    /// weighted mean, and the accuracy is recomputed from the merged
    /// box. Associative up to floating-point rounding, which is what
    /// lets callers fold in any order.
    pub fn merge(&mut self, other: &EmitterAggregate) {
        self.min_lat = self.min_lat.min(other.min_lat);
        self.min_lon = self.min_lon.min(other.min_lon);
        self.max_lat = self.max_lat.max(other.max_lat);
        self.max_lon = self.max_lon.max(other.max_lon);

        let w = self.total_weight + other.total_weight;
        self.lat = (self.lat * self.total_weight + other.lat * other.total_weight) / w;
        self.lon = (self.lon * self.total_weight + other.lon * other.total_weight) / w;
        self.total_weight = w;

        self.min_strength = self.min_strength.min(other.min_strength);
        self.max_strength = self.max_strength.max(other.max_strength);

        self.accuracy =
            geo::half_diagonal_m(self.min_lat, self.min_lon, self.max_lat, self.max_lon);
    }

    /// Structural sanity of a stored row. A violation means the row
    /// was corrupted outside the normal write path; callers fail
    /// closed rather than repairing it.
    pub fn is_consistent(&self) -> bool {
        self.total_weight > 0.0
            && self.min_lat <= self.lat
            && self.lat <= self.max_lat
            && self.min_lon <= self.lon
            && self.lon <= self.max_lon
            && self.min_strength <= self.max_strength
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_observation_is_degenerate() {
        let a = EmitterAggregate::observation(56.0112, 37.4765, 0.5, -81.0);
        assert_eq!(a.accuracy, 0.0);
        assert_eq!(a.total_weight, 0.5);
        assert_eq!((a.min_lat, a.max_lat), (56.0112, 56.0112));
        assert!(a.is_consistent());
    }

    #[test]
    fn merge_keeps_centroid_inside_box() {
        let mut a = EmitterAggregate::observation(56.0112, 37.4765, 1.0, -81.0);
        let points = [
            (56.0130, 37.4790, 0.2, -88.0),
            (56.0100, 37.4740, 0.7, -73.0),
            (56.0121, 37.4777, 0.05, -95.0),
        ];
        for (lat, lon, w, s) in points {
            a.merge(&EmitterAggregate::observation(lat, lon, w, s));
            assert!(a.is_consistent());
        }
        assert_eq!(a.min_strength, -95.0);
        assert_eq!(a.max_strength, -73.0);
        assert!((a.total_weight - 1.95).abs() < 1e-12);
        assert!(a.accuracy > 0.0);
    }

    #[test]
    fn merge_weights_positions() {
        // Round weights chosen so the mean is exact.
        let mut a = EmitterAggregate::observation(0.0, 0.0, 1.0, -72.0);
        a.merge(&EmitterAggregate::observation(1.8, 0.9, 2.0, -56.0));
        assert!((a.lat - 1.2).abs() < 1e-12);
        assert!((a.lon - 0.6).abs() < 1e-12);
        assert_eq!(a.total_weight, 3.0);

        a.merge(&EmitterAggregate::observation(-7.2, -4.5, 2.0, -76.0));
        assert!((a.lat - -2.16).abs() < 1e-12);
        assert!((a.lon - -1.44).abs() < 1e-12);
        assert_eq!(a.total_weight, 5.0);
        assert_eq!(a.min_strength, -76.0);
        assert_eq!(a.max_strength, -56.0);
    }

    #[test]
    fn envelope_is_monotone_under_merges() {
        let mut a = EmitterAggregate::observation(10.0, 10.0, 1.0, -80.0);
        let mut prev_min = a.min_strength;
        let mut prev_max = a.max_strength;
        let mut prev_box = (a.min_lat, a.min_lon, a.max_lat, a.max_lon);
        for (lat, lon, s) in [(10.1, 9.9, -60.0), (10.05, 10.2, -90.0), (9.9, 10.0, -70.0)] {
            a.merge(&EmitterAggregate::observation(lat, lon, 1.0, s));
            assert!(a.min_strength <= prev_min);
            assert!(a.max_strength >= prev_max);
            assert!(a.min_lat <= prev_box.0 && a.min_lon <= prev_box.1);
            assert!(a.max_lat >= prev_box.2 && a.max_lon >= prev_box.3);
            prev_min = a.min_strength;
            prev_max = a.max_strength;
            prev_box = (a.min_lat, a.min_lon, a.max_lat, a.max_lon);
        }
    }

    #[test]
    fn merge_order_agrees_to_rounding() {
        let obs = [
            EmitterAggregate::observation(56.01, 37.47, 0.3, -81.0),
            EmitterAggregate::observation(56.02, 37.48, 0.9, -73.0),
            EmitterAggregate::observation(56.00, 37.46, 0.1, -90.0),
        ];
        let mut fwd = obs[0].clone();
        fwd.merge(&obs[1]);
        fwd.merge(&obs[2]);

        let mut rev = obs[2].clone();
        rev.merge(&obs[1]);
        rev.merge(&obs[0]);

        assert!((fwd.lat - rev.lat).abs() < 1e-9);
        assert!((fwd.lon - rev.lon).abs() < 1e-9);
        assert!((fwd.total_weight - rev.total_weight).abs() < 1e-12);
    }

    #[test]
    fn inconsistency_is_detected() {
        let mut a = EmitterAggregate::observation(10.0, 10.0, 1.0, -80.0);
        a.lat = 11.0; // outside the box
        assert!(!a.is_consistent());

        let mut b = EmitterAggregate::observation(10.0, 10.0, 1.0, -80.0);
        b.total_weight = 0.0;
        assert!(!b.is_consistent());
    }
}
