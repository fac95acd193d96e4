//! Logging configuration.
//!
//! Resolved from `RCF_LOG` (or `RUST_LOG`) and `RCF_LOG_FORMAT`, then the
//! `--log-level` and `--log-format` flags.

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

/// Where log records go is always stderr; this picks their shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line.
    Jsonl,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "pretty" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            other => Err(format!("unknown log format '{other}' (expected human or jsonl)")),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

/// Ordered most verbose first; directive matching relies on it.
const LEVEL_NAMES: [(&str, LogLevel); 6] = [
    ("trace", LogLevel::Trace),
    ("debug", LogLevel::Debug),
    ("info", LogLevel::Info),
    ("warn", LogLevel::Warn),
    ("error", LogLevel::Error),
    ("off", LogLevel::Off),
];

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        LEVEL_NAMES
            .iter()
            .find(|(_, level)| *level == self)
            .map_or("info", |(name, _)| name)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        let name = match lowered.as_str() {
            "warning" => "warn",
            "quiet" | "none" => "off",
            other => other,
        };
        LEVEL_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, level)| *level)
            .ok_or_else(|| format!("unknown log level '{s}'"))
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Human output only; JSONL records always carry a timestamp.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Environment first, then CLI flags on top. Unparseable env values
    /// are ignored rather than failing startup.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        let env_level = match std::env::var("RCF_LOG") {
            Ok(val) => val.parse().ok(),
            Err(_) => std::env::var("RUST_LOG")
                .ok()
                .and_then(|val| level_from_directive(&val)),
        };
        let env_format = std::env::var("RCF_LOG_FORMAT")
            .ok()
            .and_then(|val| val.parse().ok());

        let defaults = LogConfig::default();
        LogConfig {
            level: cli_level.or(env_level).unwrap_or(defaults.level),
            format: cli_format.or(env_format).unwrap_or(defaults.format),
            timestamps: defaults.timestamps,
        }
    }
}

/// Most verbose level named anywhere in a `RUST_LOG` style directive.
fn level_from_directive(directive: &str) -> Option<LogLevel> {
    LEVEL_NAMES[..5]
        .iter()
        .find(|(name, _)| directive.contains(name))
        .map(|(_, level)| *level)
}
