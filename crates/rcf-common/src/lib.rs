//! Random Cut Forest common types, errors, and configuration.
//!
//! This crate provides foundational types shared across rcf-core modules:
//! - The unified error taxonomy with stable codes
//! - Forest, scorer, and shingle configuration with validation
//! - Configuration resolution and snapshots
//! - Output formats for CLI payloads

pub mod config;
pub mod error;
pub mod output;

pub use config::{
    Config, ConfigPaths, ConfigResolver, ConfigSnapshot, ForestConfig, ScorerConfig, ShingleConfig,
};
pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use output::OutputFormat;
