//! The Bayesian Beta(1,1) confidence-update rule shared by every feedback
//! path (explicit feedback, timeout, undo, ignore).

/// Result of applying one confidence update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceUpdate {
    pub old_confidence: f32,
    pub new_confidence: f32,
    pub delta: f32,
    pub fire_count: i64,
    pub success_count: i64,
}

/// Apply one feedback event to a heuristic's fire/success counters.
///
/// `fire_count` is incremented unconditionally; `success_count` only on a
/// positive outcome. `old_confidence` is recomputed from the counters before
/// this update rather than trusted from the caller, so the result is always
/// internally consistent even if the stored `confidence` column drifted.
pub fn apply_feedback(fire_count: i64, success_count: i64, positive: bool) -> ConfidenceUpdate {
    let old_confidence = expected_confidence(fire_count, success_count);

    let new_fire_count = fire_count + 1;
    let new_success_count = if positive { success_count + 1 } else { success_count };
    let new_confidence = expected_confidence(new_fire_count, new_success_count);

    ConfidenceUpdate {
        old_confidence,
        new_confidence,
        delta: new_confidence - old_confidence,
        fire_count: new_fire_count,
        success_count: new_success_count,
    }
}

/// Beta(1,1) posterior mean: `(1 + success_count) / (2 + fire_count)`.
pub fn expected_confidence(fire_count: i64, success_count: i64) -> f32 {
    (1.0 + success_count as f32) / (2.0 + fire_count as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_confidence_is_half() {
        assert!((expected_confidence(0, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_one_positive() {
        let u = apply_feedback(0, 0, true);
        assert!((u.old_confidence - 0.5).abs() < 1e-6);
        assert!((u.new_confidence - (2.0 / 3.0)).abs() < 1e-6);
        assert!(u.delta > 0.0);
        assert_eq!(u.fire_count, 1);
        assert_eq!(u.success_count, 1);
    }

    #[test]
    fn test_one_positive_one_negative_returns_to_half() {
        let after_positive = apply_feedback(0, 0, true);
        let after_negative = apply_feedback(after_positive.fire_count, after_positive.success_count, false);
        assert!((after_negative.new_confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_always_in_open_unit_interval() {
        let mut fire_count = 0i64;
        let mut success_count = 0i64;
        for i in 0..50 {
            let u = apply_feedback(fire_count, success_count, i % 3 != 0);
            assert!(u.new_confidence > 0.0 && u.new_confidence < 1.0);
            fire_count = u.fire_count;
            success_count = u.success_count;
        }
    }

    #[test]
    fn test_two_successive_positive_updates_strictly_increase() {
        let before = expected_confidence(0, 0);
        let after_1 = apply_feedback(0, 0, true);
        let after_2 = apply_feedback(after_1.fire_count, after_1.success_count, true);
        assert!(after_2.new_confidence > after_1.new_confidence);
        assert!(after_1.new_confidence > before);
    }
}
