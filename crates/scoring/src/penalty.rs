//! Tiered violation penalties

use serde::{Deserialize, Serialize};

/// Discrete score multipliers selected by violation count.
///
/// `tier_multipliers[v]` applies for `v` violations below the table
/// length; any count at or past the end zeroes the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyPolicy {
    pub tier_multipliers: [f64; 3],
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            // no penalty, 30% penalty, 70% penalty; >= 3 violations zeroes
            tier_multipliers: [1.0, 0.7, 0.3],
        }
    }
}

impl PenaltyPolicy {
    /// Multiplier for a violation count
    pub fn multiplier(&self, violations: u32) -> f64 {
        self.tier_multipliers
            .get(violations as usize)
            .copied()
            .unwrap_or(0.0)
    }

    /// Final marks after the tier penalty
    pub fn final_marks(&self, raw_score: f64, violations: u32) -> f64 {
        raw_score * self.multiplier(violations)
    }
}

/// Round to two decimals, half away from zero. Display/API precision
/// only; stored marks keep full precision.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_penalty_tiers_exact() {
        let policy = PenaltyPolicy::default();

        assert!((policy.final_marks(15.0, 0) - 15.0).abs() < 1e-9);
        assert!((policy.final_marks(15.0, 1) - 10.5).abs() < 1e-9);
        assert!((policy.final_marks(15.0, 2) - 4.5).abs() < 1e-9);
        assert_eq!(policy.final_marks(15.0, 3), 0.0);
        assert_eq!(policy.final_marks(15.0, 10), 0.0);
    }

    #[test]
    fn test_final_marks_is_pure() {
        let policy = PenaltyPolicy::default();
        assert_eq!(policy.final_marks(7.25, 2), policy.final_marks(7.25, 2));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(10.456), 10.46);
        assert_eq!(round2(4.5), 4.5);
        assert_eq!(round2(0.004), 0.0);
    }

    proptest! {
        #[test]
        fn prop_multiplier_non_increasing(v in 0u32..10) {
            let policy = PenaltyPolicy::default();
            prop_assert!(policy.multiplier(v + 1) <= policy.multiplier(v));
        }

        #[test]
        fn prop_penalty_never_raises_score(raw in 0.0f64..1000.0, v in 0u32..10) {
            let policy = PenaltyPolicy::default();
            let marks = policy.final_marks(raw, v);
            prop_assert!(marks <= raw);
            prop_assert!(marks >= 0.0);
        }
    }
}
