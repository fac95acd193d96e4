//! Property-based tests for rcf-math streaming estimators.
//!
//! Uses proptest to check the streaming forms against two-pass reference
//! computations over arbitrary inputs.

use proptest::prelude::*;
use rcf_math::{compensated_sum, ordered_mean, RunningMoments, WindowedMoments};

/// Relative tolerance for moment comparisons.
const TOL: f64 = 1e-8;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    if a.is_nan() || b.is_nan() {
        return false;
    }
    (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
}

fn two_pass(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}

// ============================================================================
// RunningMoments properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Welford matches the two-pass definition.
    #[test]
    fn running_matches_two_pass(values in prop::collection::vec(-1e3..1e3f64, 1..200)) {
        let mut m = RunningMoments::new();
        for v in &values {
            m.push(*v);
        }
        let (mean, var) = two_pass(&values);
        prop_assert!(approx_eq(m.mean(), mean, TOL), "mean {} vs {}", m.mean(), mean);
        prop_assert!(approx_eq(m.variance(), var, 1e-6), "var {} vs {}", m.variance(), var);
    }

    /// Variance is never negative.
    #[test]
    fn running_variance_non_negative(values in prop::collection::vec(-1e6..1e6f64, 1..100)) {
        let mut m = RunningMoments::new();
        for v in &values {
            m.push(*v);
        }
        prop_assert!(m.variance() >= 0.0);
    }

    /// Splitting the stream and merging gives the same moments.
    #[test]
    fn running_merge_is_consistent(
        values in prop::collection::vec(-1e3..1e3f64, 2..200),
        split in 0usize..200,
    ) {
        let split = split % values.len();
        let mut whole = RunningMoments::new();
        let mut a = RunningMoments::new();
        let mut b = RunningMoments::new();
        for (i, v) in values.iter().enumerate() {
            whole.push(*v);
            if i < split { a.push(*v); } else { b.push(*v); }
        }
        a.merge(&b);
        prop_assert_eq!(a.count(), whole.count());
        prop_assert!(approx_eq(a.mean(), whole.mean(), TOL));
        prop_assert!(approx_eq(a.variance(), whole.variance(), 1e-6));
    }
}

// ============================================================================
// WindowedMoments properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The window reports the moments of exactly its last `capacity` inputs.
    #[test]
    fn window_matches_tail(
        values in prop::collection::vec(-1e3..1e3f64, 1..300),
        capacity in 1usize..40,
    ) {
        let mut w = WindowedMoments::new(capacity);
        for v in &values {
            w.push(*v);
        }
        let start = values.len().saturating_sub(capacity);
        let tail = &values[start..];
        let (mean, var) = two_pass(tail);
        prop_assert_eq!(w.len(), tail.len());
        prop_assert!(approx_eq(w.mean(), mean, 1e-7), "mean {} vs {}", w.mean(), mean);
        prop_assert!((w.variance() - var).abs() <= 1e-4 * var.max(1.0),
            "var {} vs {}", w.variance(), var);
    }
}

// ============================================================================
// Ordered reductions
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Mean of a constant slice is that constant.
    #[test]
    fn ordered_mean_of_constant(c in -1e6..1e6f64, n in 1usize..500) {
        let values = vec![c; n];
        prop_assert!(approx_eq(ordered_mean(&values), c, 1e-12));
    }

    /// Compensated sum is at least as accurate as naive summation.
    #[test]
    fn compensated_sum_close_to_naive(values in prop::collection::vec(-1e3..1e3f64, 0..200)) {
        let naive: f64 = values.iter().sum();
        prop_assert!(approx_eq(compensated_sum(&values), naive, 1e-6));
    }

    /// Reductions are deterministic to the bit.
    #[test]
    fn ordered_mean_repeatable(values in prop::collection::vec(-1.0..1.0f64, 1..200)) {
        prop_assert_eq!(ordered_mean(&values).to_bits(), ordered_mean(&values).to_bits());
    }
}
