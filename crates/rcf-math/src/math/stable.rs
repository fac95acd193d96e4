//! Numerically stable, order-deterministic reductions.
//!
//! Forest aggregation must produce the same bits whether the per-tree map
//! ran on one thread or many. These reductions always consume their input
//! in slice order and use Neumaier compensation so that long sums of
//! similarly-sized scores do not drift.

/// Compensated (Neumaier) sum over `values` in slice order.
///
/// Returns 0.0 for empty input. NaN propagates.
pub fn compensated_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut compensation = 0.0;
    for &v in values {
        let t = sum + v;
        if sum.abs() >= v.abs() {
            compensation += (sum - t) + v;
        } else {
            compensation += (v - t) + sum;
        }
        sum = t;
    }
    sum + compensation
}

/// Arithmetic mean computed with [`compensated_sum`].
///
/// Returns 0.0 for empty input so that an empty ensemble scores as "not
/// anomalous" rather than NaN.
pub fn ordered_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    compensated_sum(values) / values.len() as f64
}

/// Population variance from raw power sums.
///
/// `sum` and `sum_sq` are the sums of values and squared values over `n`
/// observations. Cancellation can push the result slightly negative; it is
/// clamped at zero.
pub fn variance_from_sums(n: usize, sum: f64, sum_sq: f64) -> f64 {
    if n == 0 {
        return f64::NAN;
    }
    let nf = n as f64;
    let mean = sum / nf;
    (sum_sq / nf - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        (a - b).abs() <= tol
    }

    #[test]
    fn compensated_sum_empty_is_zero() {
        assert_eq!(compensated_sum(&[]), 0.0);
    }

    #[test]
    fn compensated_sum_recovers_small_terms() {
        // Naive summation loses the 1.0 terms entirely.
        let values = [1e16, 1.0, -1e16, 1.0];
        assert!(approx_eq(compensated_sum(&values), 2.0, 1e-12));
    }

    #[test]
    fn compensated_sum_nan_propagates() {
        assert!(compensated_sum(&[1.0, f64::NAN]).is_nan());
    }

    #[test]
    fn ordered_mean_basic() {
        assert!(approx_eq(ordered_mean(&[1.0, 2.0, 3.0, 4.0]), 2.5, 1e-15));
    }

    #[test]
    fn ordered_mean_empty_is_zero() {
        assert_eq!(ordered_mean(&[]), 0.0);
    }

    #[test]
    fn ordered_mean_is_bitwise_repeatable() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.37).sin()).collect();
        let a = ordered_mean(&values);
        let b = ordered_mean(&values.clone());
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn variance_from_sums_matches_definition() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let sum: f64 = values.iter().sum();
        let sum_sq: f64 = values.iter().map(|v| v * v).sum();
        assert!(approx_eq(variance_from_sums(values.len(), sum, sum_sq), 4.0, 1e-12));
    }

    #[test]
    fn variance_from_sums_clamps_negative() {
        // sum_sq slightly below sum^2/n due to rounding
        let v = variance_from_sums(3, 3.0, 3.0 - 1e-15);
        assert!(v >= 0.0);
    }

    #[test]
    fn variance_from_sums_empty_is_nan() {
        assert!(variance_from_sums(0, 0.0, 0.0).is_nan());
    }
}
