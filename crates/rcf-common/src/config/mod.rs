//! Configuration loading and validation for Random Cut Forest.
//!
//! This module provides:
//! - Typed forest, scorer, and shingle parameters
//! - Deterministic config resolution (CLI > env > XDG > defaults)
//! - Semantic validation
//! - Config snapshots for logging and model provenance

pub mod params;
pub mod resolve;
pub mod snapshot;

pub use params::{ForestConfig, ScorerConfig, ShingleConfig};
pub use resolve::{ConfigPaths, ConfigResolver};
pub use snapshot::ConfigSnapshot;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The complete configuration for a detector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Forest structure and randomness
    pub forest: ForestConfig,
    /// Adaptive threshold parameters
    pub scorer: ScorerConfig,
    /// Optional scalar windowing
    pub shingle: ShingleConfig,
}

impl Config {
    /// Load configuration with resolution from CLI, env, or defaults.
    pub fn load(resolver: &ConfigResolver) -> Result<(Self, ConfigSnapshot)> {
        let (config, source) = resolver.load()?;
        let snapshot = ConfigSnapshot::new(&config, source)?;
        Ok((config, snapshot))
    }

    /// Parse from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Validate configuration semantically.
    ///
    /// Beyond the per-section checks, a shingled stream must feed the forest
    /// vectors of exactly the forest's dimensionality.
    pub fn validate(&self) -> Result<()> {
        self.forest.validate()?;
        self.scorer.validate()?;
        self.shingle.validate()?;
        if let Some(size) = self.shingle.size {
            if size != self.forest.dimensions {
                return Err(Error::Configuration(format!(
                    "shingle size {} must equal forest dimensions {}",
                    size, self.forest.dimensions
                )));
            }
        }
        Ok(())
    }
}

/// Configuration source for a file.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file, or None if using defaults
    pub path: Option<String>,
    /// SHA-256 hash of file contents, or None if defaults
    pub hash: Option<String>,
    /// How this source was resolved
    pub resolution: ConfigResolution,
}

/// How a config file was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigResolution {
    /// From explicit CLI flag
    CliFlag,
    /// From environment variable
    EnvVar,
    /// From XDG config directory
    XdgConfig,
    /// Using built-in defaults
    Default,
}

impl std::fmt::Display for ConfigResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigResolution::CliFlag => write!(f, "cli"),
            ConfigResolution::EnvVar => write!(f, "env"),
            ConfigResolution::XdgConfig => write!(f, "xdg"),
            ConfigResolution::Default => write!(f, "default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_toml_round_trip() {
        let text = r#"
            [forest]
            num_trees = 20
            samples_per_tree = 64
            dimensions = 4
            seed = 7
            parallel = false

            [scorer]
            k = 2.5
            min_observations = 16
            window = 500

            [shingle]
            size = 4
        "#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.forest.num_trees, 20);
        assert_eq!(config.scorer.window, Some(500));
        assert_eq!(config.shingle.size, Some(4));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shingle_must_match_dimensions() {
        let mut config = Config::default();
        config.shingle.size = Some(8);
        config.forest.dimensions = 4;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("shingle size 8"));
    }

    #[test]
    fn malformed_toml_is_configuration_error() {
        let err = Config::from_toml_str("[forest\nnum_trees = ").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
