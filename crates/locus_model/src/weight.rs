//! Signal-strength weighting.
//!
//! Received power in dBm is logarithmic in the power ratio, so a linear
//! weight of `10^((strength - ref) / 10)` weights observations by linear
//! signal power. The clamp keeps a single very strong or very faint
//! reading from dominating or vanishing entirely.

/// Reference strength: readings at or above this weigh the maximum.
pub const REF_STRENGTH_DBM: f64 = -100.0;

/// Lower clamp of the weight range.
pub const WEIGHT_MIN: f64 = 1e-4;

/// Upper clamp of the weight range.
pub const WEIGHT_MAX: f64 = 1.0;

/// Strength assumed when a client omits the reading. A low value keeps
/// the derived weight small, so better-instrumented reports dominate.
pub const DEFAULT_STRENGTH_DBM: f64 = -90.0;

/// Weight of a single observation given its received power in dBm.
pub fn signal_weight(strength_dbm: f64) -> f64 {
    let w = 10f64.powf((strength_dbm - REF_STRENGTH_DBM) / 10.0);
    w.clamp(WEIGHT_MIN, WEIGHT_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_and_clamped() {
        for s in [-200.0, -140.0, -120.0, -100.0, -73.0, -30.0, 0.0] {
            let w = signal_weight(s);
            assert!(w > 0.0, "w({s}) = {w}");
            assert!((WEIGHT_MIN..=WEIGHT_MAX).contains(&w), "w({s}) = {w}");
        }
    }

    #[test]
    fn monotone_between_clamps() {
        assert!(signal_weight(-110.0) < signal_weight(-105.0));
        assert!(signal_weight(-105.0) < signal_weight(-101.0));
    }

    #[test]
    fn reference_points() {
        assert!((signal_weight(-100.0) - 1.0).abs() < 1e-12);
        assert!((signal_weight(-110.0) - 0.1).abs() < 1e-12);
        // clamp floor reached 40 dB below reference
        assert_eq!(signal_weight(-140.0), WEIGHT_MIN);
        assert_eq!(signal_weight(-180.0), WEIGHT_MIN);
        // anything at least as strong as the reference clamps to 1
        assert_eq!(signal_weight(-60.0), WEIGHT_MAX);
    }
}
