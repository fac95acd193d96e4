//! Error types for Random Cut Forest.
//!
//! One error enum covers the whole engine so that per-point rejections,
//! configuration failures, and model loading problems share:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 20,
//!   "category": "input",
//!   "message": "dimension mismatch: expected 4 coordinates, got 3",
//!   "recoverable": true,
//!   "context": { "expected": 4, "actual": 3 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Random Cut Forest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid hyperparameters or config files.
    Config,
    /// A single point was rejected.
    Input,
    /// Tree or persisted model state problems.
    Model,
    /// File I/O and JSON errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Input => write!(f, "input"),
            ErrorCategory::Model => write!(f, "model"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for Random Cut Forest.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid config file {}: {message}", path.display())]
    ConfigFile { path: PathBuf, message: String },

    // Per-point input errors (20-29)
    #[error("dimension mismatch: expected {expected} coordinates, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("non-finite value {value} at coordinate {coordinate}")]
    InvalidValue { coordinate: usize, value: f64 },

    #[error("input parse error at line {line}: {message}")]
    InputParse { line: usize, message: String },

    // Model errors (30-49)
    #[error("point not found in tree: {0}")]
    NotFound(String),

    #[error("model serialization error: {0}")]
    Serialization(String),

    #[error("model checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Input (per-point) errors
    /// - 30-49: Model errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Configuration(_) => 10,
            Error::ConfigFile { .. } => 11,
            Error::DimensionMismatch { .. } => 20,
            Error::InvalidValue { .. } => 21,
            Error::InputParse { .. } => 22,
            Error::NotFound(_) => 30,
            Error::Serialization(_) => 40,
            Error::ChecksumMismatch { .. } => 41,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Configuration(_) | Error::ConfigFile { .. } => ErrorCategory::Config,
            Error::DimensionMismatch { .. } | Error::InvalidValue { .. } | Error::InputParse { .. } => {
                ErrorCategory::Input
            }
            Error::NotFound(_) | Error::Serialization(_) | Error::ChecksumMismatch { .. } => {
                ErrorCategory::Model
            }
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable.
    ///
    /// Per-point errors are recoverable by skipping the point; a corrupt
    /// model is not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Configuration(_) => true,
            Error::ConfigFile { .. } => true,

            Error::DimensionMismatch { .. } => true,
            Error::InvalidValue { .. } => true,
            Error::InputParse { .. } => true,

            Error::NotFound(_) => false,
            Error::Serialization(_) => false,
            Error::ChecksumMismatch { .. } => false,

            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Whether the error rejects only the current point.
    pub fn is_point_rejection(&self) -> bool {
        matches!(
            self,
            Error::DimensionMismatch { .. } | Error::InvalidValue { .. }
        )
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "Configuration Error",
            Error::ConfigFile { .. } => "Invalid Config File",
            Error::DimensionMismatch { .. } => "Dimension Mismatch",
            Error::InvalidValue { .. } => "Invalid Value",
            Error::InputParse { .. } => "Input Parse Error",
            Error::NotFound(_) => "Point Not Found",
            Error::Serialization(_) => "Model Serialization Error",
            Error::ChecksumMismatch { .. } => "Model Checksum Mismatch",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., dimensions, line number).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::DimensionMismatch { expected, actual } => {
                context.insert("expected".to_string(), serde_json::json!(expected));
                context.insert("actual".to_string(), serde_json::json!(actual));
            }
            Error::InvalidValue { coordinate, .. } => {
                context.insert("coordinate".to_string(), serde_json::json!(coordinate));
            }
            Error::InputParse { line, .. } => {
                context.insert("line".to_string(), serde_json::json!(line));
            }
            Error::ConfigFile { path, .. } => {
                context.insert("path".to_string(), serde_json::json!(path.display().to_string()));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}
