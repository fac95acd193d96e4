//! Bounded-window mean and variance with eviction.
//!
//! Welford's update has no clean inverse, so the window keeps raw power
//! sums (`sum`, `sum_sq`) which support removal. Sums are re-derived from
//! the retained values every `capacity` evictions to stop rounding error
//! from accumulating across a long stream.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::stable::{compensated_sum, variance_from_sums};

/// Moments over the most recent `capacity` observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedMoments {
    capacity: usize,
    values: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
    evictions_since_rebase: usize,
}

impl WindowedMoments {
    /// Create a window holding at most `capacity` observations.
    ///
    /// A capacity of zero is promoted to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
            sum: 0.0,
            sum_sq: 0.0,
            evictions_since_rebase: 0,
        }
    }

    /// Fold one observation in, evicting the oldest when full.
    ///
    /// Returns the evicted value, if any. Non-finite values are ignored.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        let evicted = if self.values.len() == self.capacity {
            self.values.pop_front()
        } else {
            None
        };
        self.values.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;

        if let Some(old) = evicted {
            self.sum -= old;
            self.sum_sq -= old * old;
            self.evictions_since_rebase += 1;
            if self.evictions_since_rebase >= self.capacity {
                self.rebase();
            }
        }
        evicted
    }

    fn rebase(&mut self) {
        let values: Vec<f64> = self.values.iter().copied().collect();
        let squares: Vec<f64> = values.iter().map(|v| v * v).collect();
        self.sum = compensated_sum(&values);
        self.sum_sq = compensated_sum(&squares);
        self.evictions_since_rebase = 0;
    }

    /// Maximum number of retained observations.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained observations.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean over the window, NaN when empty.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        self.sum / self.values.len() as f64
    }

    /// Population variance over the window, NaN when empty.
    pub fn variance(&self) -> f64 {
        variance_from_sums(self.values.len(), self.sum, self.sum_sq)
    }

    /// Population standard deviation over the window, NaN when empty.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Forget all observations, keeping the capacity.
    pub fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
        self.sum_sq = 0.0;
        self.evictions_since_rebase = 0;
    }
}
