//! Typed hyperparameters for the forest, the anomaly scorer, and shingling.
//!
//! Every field has a built-in default so a partial `config.toml` (or none
//! at all) is valid. Semantic checks live in `validate()` and surface as
//! [`Error::Configuration`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Forest structure and randomness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForestConfig {
    /// Number of independent trees (T).
    pub num_trees: usize,
    /// Bounded sample size per tree (C).
    pub samples_per_tree: usize,
    /// Point dimensionality.
    pub dimensions: usize,
    /// Master seed; tree `i` derives its own stream from it.
    pub seed: u64,
    /// Run the per-tree map on the rayon pool.
    pub parallel: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: 50,
            samples_per_tree: 256,
            dimensions: 1,
            seed: 42,
            parallel: true,
        }
    }
}

impl ForestConfig {
    /// Shorthand for the three structural parameters.
    pub fn new(num_trees: usize, samples_per_tree: usize, dimensions: usize) -> Self {
        Self {
            num_trees,
            samples_per_tree,
            dimensions,
            ..Self::default()
        }
    }

    /// Set the master seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Toggle parallel per-tree work.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reject zero-sized forests.
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(Error::Configuration("num_trees must be positive".to_string()));
        }
        if self.samples_per_tree == 0 {
            return Err(Error::Configuration(
                "samples_per_tree must be positive".to_string(),
            ));
        }
        if self.dimensions == 0 {
            return Err(Error::Configuration("dimensions must be positive".to_string()));
        }
        Ok(())
    }
}

/// Adaptive threshold over the forest's score stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScorerConfig {
    /// Deviation multiplier: anomalous when `score > mean + k * std_dev`.
    pub k: f64,
    /// Observations required before any point can be flagged.
    /// `None` means "the forest's samples_per_tree".
    pub min_observations: Option<usize>,
    /// Track only the most recent `window` scores.
    pub window: Option<usize>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            k: 3.0,
            min_observations: None,
            window: None,
        }
    }
}

impl ScorerConfig {
    /// Set the deviation multiplier.
    pub fn with_k(mut self, k: f64) -> Self {
        self.k = k;
        self
    }

    /// Set an explicit cold-start length.
    pub fn with_min_observations(mut self, n: usize) -> Self {
        self.min_observations = Some(n);
        self
    }

    /// Bound the score history.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = Some(window);
        self
    }

    /// Cold-start length once the forest capacity is known.
    pub fn effective_min_observations(&self, samples_per_tree: usize) -> usize {
        self.min_observations.unwrap_or(samples_per_tree)
    }

    /// Check `k` and the window bound.
    pub fn validate(&self) -> Result<()> {
        if !self.k.is_finite() || self.k < 0.0 {
            return Err(Error::Configuration(format!(
                "scorer k must be finite and non-negative, got {}",
                self.k
            )));
        }
        if let Some(window) = self.window {
            if window < 2 {
                return Err(Error::Configuration(format!(
                    "scorer window must hold at least 2 scores, got {}",
                    window
                )));
            }
        }
        Ok(())
    }
}

/// Scalar-to-vector windowing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShingleConfig {
    /// Window length P; `None` feeds points through unshingled.
    pub size: Option<usize>,
}

impl ShingleConfig {
    /// Shingle size zero is meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.size == Some(0) {
            return Err(Error::Configuration("shingle size must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ForestConfig::default().validate().is_ok());
        assert!(ScorerConfig::default().validate().is_ok());
        assert!(ShingleConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_forest_parameters_rejected() {
        for config in [
            ForestConfig::new(0, 10, 1),
            ForestConfig::new(10, 0, 1),
            ForestConfig::new(10, 10, 0),
        ] {
            let err = config.validate().unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{err}");
        }
    }

    #[test]
    fn scorer_rejects_bad_k() {
        assert!(ScorerConfig::default().with_k(-1.0).validate().is_err());
        assert!(ScorerConfig::default().with_k(f64::NAN).validate().is_err());
        assert!(ScorerConfig::default().with_k(0.0).validate().is_ok());
    }

    #[test]
    fn scorer_rejects_tiny_window() {
        assert!(ScorerConfig::default().with_window(1).validate().is_err());
        assert!(ScorerConfig::default().with_window(2).validate().is_ok());
    }

    #[test]
    fn min_observations_defaults_to_capacity() {
        let scorer = ScorerConfig::default();
        assert_eq!(scorer.effective_min_observations(256), 256);
        let scorer = scorer.with_min_observations(5);
        assert_eq!(scorer.effective_min_observations(256), 5);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let forest: ForestConfig = toml::from_str("num_trees = 7").unwrap();
        assert_eq!(forest.num_trees, 7);
        assert_eq!(forest.samples_per_tree, 256);
    }

    #[test]
    fn unknown_fields_rejected() {
        let parsed: std::result::Result<ForestConfig, _> = toml::from_str("num_tress = 7");
        assert!(parsed.is_err());
    }

    #[test]
    fn zero_shingle_rejected() {
        assert!(ShingleConfig { size: Some(0) }.validate().is_err());
        assert!(ShingleConfig { size: Some(4) }.validate().is_ok());
    }
}
