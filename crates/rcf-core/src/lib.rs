//! Random Cut Forest Core Library
//!
//! Streaming anomaly detection over numeric vectors:
//! - Random cut trees and the forest that averages their displacement scores
//! - Per-tree reservoir sampling for bounded-memory streaming updates
//! - An adaptive `k`-sigma threshold over the score stream
//! - Shingling of scalar series into sliding-window vectors
//! - JSON model persistence with exact round trips
//!
//! The binary entry point is in `main.rs`.

pub mod detector;
pub mod exit_codes;
pub mod forest;
pub mod input;
pub mod logging;
pub mod persist;
pub mod sampler;
pub mod scorer;
pub mod shingle;
pub mod tree;

pub use detector::{Detection, StreamingDetector};
pub use forest::{ForestSnapshot, RandomCutForest, ScoreResult, SharedForest};
pub use sampler::{ReservoirSampler, SampleUpdate};
pub use scorer::{AnomalyScorer, Classification};
pub use shingle::{shingle, ShingleBuffer};
pub use tree::RandomCutTree;
