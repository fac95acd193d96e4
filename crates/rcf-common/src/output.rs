//! Output formats for CLI payloads.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Supported output formats for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON document for the whole command (default)
    #[default]
    Json,

    /// One JSON object per line, streamed as points are processed
    Jsonl,

    /// One-line summary for quick status checks
    Summary,

    /// Comma-separated values, one row per point
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Summary => write!(f, "summary"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl OutputFormat {
    /// Whether results are emitted incrementally rather than at the end.
    pub fn is_streaming(&self) -> bool {
        matches!(self, OutputFormat::Jsonl | OutputFormat::Csv)
    }
}
