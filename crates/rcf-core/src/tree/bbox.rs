//! Axis-aligned bounding boxes over tree subtrees.

use rand::Rng;

/// Per-dimension `[min, max]` ranges of the points beneath a node.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    min: Vec<f64>,
    max: Vec<f64>,
}

/// A random cut: points with `x[dimension] <= value` route left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cut {
    pub dimension: usize,
    pub value: f64,
}

impl Cut {
    /// True when `point` routes to the left child.
    #[inline]
    pub fn goes_left(&self, point: &[f64]) -> bool {
        point[self.dimension] <= self.value
    }
}

impl BoundingBox {
    /// Degenerate box around a single point.
    pub fn from_point(point: &[f64]) -> Self {
        Self {
            min: point.to_vec(),
            max: point.to_vec(),
        }
    }

    /// Build from explicit corners. Callers check `min <= max`.
    pub fn from_corners(min: Vec<f64>, max: Vec<f64>) -> Self {
        Self { min, max }
    }

    pub fn dimensions(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    /// Extent along one dimension.
    #[inline]
    pub fn range(&self, dimension: usize) -> f64 {
        self.max[dimension] - self.min[dimension]
    }

    /// Sum of per-dimension ranges.
    pub fn perimeter(&self) -> f64 {
        self.min
            .iter()
            .zip(&self.max)
            .map(|(lo, hi)| hi - lo)
            .sum()
    }

    /// Perimeter of this box after absorbing `point`, without allocating.
    pub fn perimeter_with(&self, point: &[f64]) -> f64 {
        self.min
            .iter()
            .zip(&self.max)
            .zip(point)
            .map(|((lo, hi), x)| hi.max(*x) - lo.min(*x))
            .sum()
    }

    /// Grow in place to include `point`.
    pub fn extend(&mut self, point: &[f64]) {
        for (d, &x) in point.iter().enumerate() {
            if x < self.min[d] {
                self.min[d] = x;
            }
            if x > self.max[d] {
                self.max[d] = x;
            }
        }
    }

    /// Copy of this box grown to include `point`.
    pub fn merged_with_point(&self, point: &[f64]) -> Self {
        let mut merged = self.clone();
        merged.extend(point);
        merged
    }

    /// Coordinate-wise union of two boxes.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self
                .min
                .iter()
                .zip(&other.min)
                .map(|(a, b)| a.min(*b))
                .collect(),
            max: self
                .max
                .iter()
                .zip(&other.max)
                .map(|(a, b)| a.max(*b))
                .collect(),
        }
    }

    /// Draw a cut uniformly over the box's total range.
    ///
    /// The dimension is chosen with probability proportional to its range
    /// and the value uniformly inside it, so `min <= value < max` on the
    /// chosen dimension. Returns `None` for a degenerate (zero-perimeter) box.
    pub fn random_cut<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Cut> {
        let total = self.perimeter();
        if total.is_nan() || total <= 0.0 {
            return None;
        }
        let mut remaining = rng.random::<f64>() * total;
        let mut last_positive = None;
        for d in 0..self.dimensions() {
            let range = self.range(d);
            if range <= 0.0 {
                continue;
            }
            last_positive = Some(d);
            if remaining < range {
                return Some(self.cut_at(d, self.min[d] + remaining));
            }
            remaining -= range;
        }
        // Rounding can leave `remaining` just past the final range.
        last_positive.map(|d| self.cut_at(d, self.min[d] + 0.5 * self.range(d)))
    }

    /// Keep `value` strictly below `max`; sums can round up onto it.
    fn cut_at(&self, dimension: usize, value: f64) -> Cut {
        let value = if value < self.max[dimension] {
            value
        } else {
            self.min[dimension]
        };
        Cut { dimension, value }
    }
}
