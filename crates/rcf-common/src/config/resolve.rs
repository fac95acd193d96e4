//! Configuration resolution for Random Cut Forest.
//!
//! Implements deterministic config resolution order:
//! 1. Explicit CLI flag (--config)
//! 2. Environment variable (RCF_CONFIG)
//! 3. XDG default ($XDG_CONFIG_HOME/rcf/config.toml or ~/.config/rcf/config.toml)
//! 4. Built-in defaults

use std::env;
use std::fs;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use super::{Config, ConfigResolution, ConfigSource};
use crate::error::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "RCF_CONFIG";

/// Config directory name under the XDG config home.
const CONFIG_DIR_NAME: &str = "rcf";

/// Config file name inside the config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file paths.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Explicit path to config.toml
    pub config_path: Option<PathBuf>,
}

/// Configuration resolver with deterministic resolution order.
#[derive(Debug)]
pub struct ConfigResolver {
    /// Paths from CLI flags
    cli_paths: ConfigPaths,
}

impl ConfigResolver {
    /// Create a new resolver with CLI paths.
    pub fn new(paths: ConfigPaths) -> Self {
        ConfigResolver { cli_paths: paths }
    }

    /// Create a resolver with no CLI overrides.
    pub fn with_defaults() -> Self {
        ConfigResolver {
            cli_paths: ConfigPaths::default(),
        }
    }

    /// Resolve the config directory path.
    pub fn resolve_config_dir(&self) -> Option<PathBuf> {
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg).join(CONFIG_DIR_NAME));
        }
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME))
    }

    /// Resolve the config.toml path.
    ///
    /// Explicit paths (CLI, env) are returned even when the file is
    /// missing so that loading reports the error instead of silently
    /// falling back to defaults.
    pub fn resolve_config_path(&self) -> (Option<PathBuf>, ConfigResolution) {
        // 1. CLI flag
        if let Some(ref path) = self.cli_paths.config_path {
            return (Some(path.clone()), ConfigResolution::CliFlag);
        }

        // 2. RCF_CONFIG env var
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return (Some(PathBuf::from(path)), ConfigResolution::EnvVar);
            }
        }

        // 3. XDG config dir
        if let Some(config_dir) = self.resolve_config_dir() {
            let path = config_dir.join(CONFIG_FILE_NAME);
            if path.exists() {
                return (Some(path), ConfigResolution::XdgConfig);
            }
        }

        // 4. Default
        (None, ConfigResolution::Default)
    }

    /// Load config from the resolved path or defaults.
    pub fn load(&self) -> Result<(Config, ConfigSource)> {
        let (path, resolution) = self.resolve_config_path();

        match path {
            Some(p) => {
                let content = fs::read_to_string(&p).map_err(|e| Error::ConfigFile {
                    path: p.clone(),
                    message: format!("failed to read: {}", e),
                })?;

                let hash = compute_sha256(&content);

                let config: Config = toml::from_str(&content).map_err(|e| Error::ConfigFile {
                    path: p.clone(),
                    message: e.to_string(),
                })?;

                config.validate()?;

                Ok((
                    config,
                    ConfigSource {
                        path: Some(p.to_string_lossy().to_string()),
                        hash: Some(hash),
                        resolution,
                    },
                ))
            }
            None => Ok((
                Config::default(),
                ConfigSource {
                    path: None,
                    hash: None,
                    resolution: ConfigResolution::Default,
                },
            )),
        }
    }
}

/// Compute SHA-256 hash of a string.
pub(crate) fn compute_sha256(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sha256_hash() {
        let hash = compute_sha256("test content");
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_load_from_cli_path() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"[forest]\nnum_trees = 12\nsamples_per_tree = 32\n")
            .unwrap();

        let resolver = ConfigResolver::new(ConfigPaths {
            config_path: Some(tmp.path().to_path_buf()),
        });

        let (config, source) = resolver.load().unwrap();
        assert_eq!(source.resolution, ConfigResolution::CliFlag);
        assert!(source.hash.is_some());
        assert_eq!(config.forest.num_trees, 12);
        assert_eq!(config.forest.samples_per_tree, 32);
    }

    #[test]
    fn test_missing_cli_path_is_error() {
        let resolver = ConfigResolver::new(ConfigPaths {
            config_path: Some(PathBuf::from("/nonexistent/rcf/config.toml")),
        });
        let err = resolver.load().unwrap_err();
        assert!(matches!(err, Error::ConfigFile { .. }));
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"[forest]\nnum_trees = 0\n").unwrap();

        let resolver = ConfigResolver::new(ConfigPaths {
            config_path: Some(tmp.path().to_path_buf()),
        });
        let err = resolver.load().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_negative_values_rejected_on_parse() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"[forest]\nnum_trees = -3\n").unwrap();

        let resolver = ConfigResolver::new(ConfigPaths {
            config_path: Some(tmp.path().to_path_buf()),
        });
        let err = resolver.load().unwrap_err();
        assert!(matches!(err, Error::ConfigFile { .. }));
    }
}
