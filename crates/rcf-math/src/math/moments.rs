//! Welford running mean and variance.
//!
//! Single-pass, numerically stable estimator for an unbounded stream. The
//! variance reported is the population variance (divide by `n`), which is
//! what a threshold of the form `mean + k * std_dev` expects once the
//! stream is long enough for the distinction to vanish.

use serde::{Deserialize, Serialize};

/// Running first and second moments of a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMoments {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningMoments {
    /// Empty estimator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation in.
    ///
    /// Non-finite values are ignored; the caller is expected to have
    /// validated them already.
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Number of observations folded in.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean, NaN when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        self.mean
    }

    /// Population variance, NaN when empty.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        (self.m2 / self.count as f64).max(0.0)
    }

    /// Population standard deviation, NaN when empty.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Combine another estimator into this one (Chan et al. parallel update).
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }
        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let delta = other.mean - self.mean;
        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.count += other.count;
    }

    /// Forget all observations.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
