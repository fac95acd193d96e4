//! Sliding-window shingling of scalar streams.
//!
//! A shingle of size `P` turns a scalar stream into `P`-dimensional points:
//! each point is the last `P` values in arrival order, newest last.

use std::collections::VecDeque;

use rcf_common::{Error, Result};

/// FIFO window over the last `size` scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct ShingleBuffer {
    size: usize,
    window: VecDeque<f64>,
}

impl ShingleBuffer {
    /// Create a buffer of window length `size`.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Configuration(
                "shingle size must be positive".to_string(),
            ));
        }
        Ok(Self {
            size,
            window: VecDeque::with_capacity(size),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// True once `size` values have arrived.
    pub fn is_full(&self) -> bool {
        self.window.len() == self.size
    }

    /// Push a value; once full, return the current window.
    pub fn push(&mut self, value: f64) -> Option<Vec<f64>> {
        if self.window.len() == self.size {
            self.window.pop_front();
        }
        self.window.push_back(value);
        self.is_full().then(|| self.window.iter().copied().collect())
    }

    /// Forget all buffered values.
    pub fn clear(&mut self) {
        self.window.clear();
    }
}

/// Batch shingling.
///
/// Produces `max(N - size, 0)` windows where window `i` is
/// `sequence[i..i + size]`. The final full window is not emitted, so a
/// sequence no longer than `size` yields nothing.
pub fn shingle(sequence: &[f64], size: usize) -> Result<Vec<Vec<f64>>> {
    if size == 0 {
        return Err(Error::Configuration(
            "shingle size must be positive".to_string(),
        ));
    }
    let count = sequence.len().saturating_sub(size);
    Ok((0..count)
        .map(|i| sequence[i..i + size].to_vec())
        .collect())
}
