//! Configuration snapshots for logging and model provenance.
//!
//! Captures where the active configuration came from and a hash of the
//! effective values, so a saved model can be traced back to the settings
//! that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::resolve::compute_sha256;
use super::{Config, ConfigResolution, ConfigSource};
use crate::error::{Error, Result};

/// Configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Timestamp when snapshot was created
    pub snapshot_at: DateTime<Utc>,

    /// Path of the config file, if any
    pub path: Option<String>,

    /// Hash of the raw file content, if any
    pub file_hash: Option<String>,

    /// Hash of the effective (defaulted, validated) values
    pub effective_hash: String,

    /// How the config was resolved
    pub resolution: ConfigResolution,
}

impl ConfigSnapshot {
    /// Create a new snapshot from a loaded config.
    pub fn new(config: &Config, source: ConfigSource) -> Result<Self> {
        let effective = serde_json::to_string(config)
            .map_err(|e| Error::Configuration(format!("failed to serialize config: {}", e)))?;

        Ok(ConfigSnapshot {
            snapshot_at: Utc::now(),
            path: source.path,
            file_hash: source.hash,
            effective_hash: compute_sha256(&effective),
            resolution: source.resolution,
        })
    }

    /// Create a snapshot for built-in defaults.
    pub fn from_defaults(config: &Config) -> Result<Self> {
        ConfigSnapshot::new(
            config,
            ConfigSource {
                path: None,
                hash: None,
                resolution: ConfigResolution::Default,
            },
        )
    }
}
