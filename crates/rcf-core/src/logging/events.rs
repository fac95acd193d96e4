//! Event vocabulary shared by the engine and the CLI.
//!
//! Every JSONL record carries a run id, a host id and a stage; the event
//! name doubles as the tracing target.

use serde::{Deserialize, Serialize};

/// Severity as written into JSONL records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Batch forest construction.
    Train,
    /// Batch scoring against a fixed forest.
    Score,
    /// Online score-then-update loop.
    Stream,
    /// Scalar series to shingled points.
    Shingle,
    /// Model save and load.
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Init => "init",
            Stage::Train => "train",
            Stage::Score => "score",
            Stage::Stream => "stream",
            Stage::Shingle => "shingle",
            Stage::Persist => "persist",
        })
    }
}

/// Standard event names, used as tracing targets.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Train stage
    pub const TRAIN_STARTED: &str = "train.started";
    pub const TRAIN_TREE_BUILT: &str = "train.tree_built";
    pub const TRAIN_FINISHED: &str = "train.finished";

    // Score stage
    pub const SCORE_STARTED: &str = "score.started";
    pub const SCORE_POINT_REJECTED: &str = "score.point_rejected";
    pub const SCORE_FINISHED: &str = "score.finished";

    // Stream stage
    pub const STREAM_POINT_REJECTED: &str = "stream.point_rejected";
    pub const STREAM_ANOMALY: &str = "stream.anomaly";
    pub const STREAM_FINISHED: &str = "stream.finished";

    // Shingle stage
    pub const SHINGLE_FILLING: &str = "shingle.filling";

    // Persist stage
    pub const PERSIST_SAVED: &str = "persist.saved";
    pub const PERSIST_LOADED: &str = "persist.loaded";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Correlation ids shared by every event of one invocation.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    /// Model checksum prefix once a model is loaded or written.
    pub model_id: Option<String>,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            model_id: None,
            host_id: host_id.into(),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }
}
