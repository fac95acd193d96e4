//! Adaptive anomaly threshold over the forest's score stream.
//!
//! A score is anomalous when it exceeds `mean + k * std_dev` of the scores
//! seen before it. Until `min_observations` scores have been folded in,
//! nothing is flagged.

use rcf_common::{Result, ScorerConfig};
use rcf_math::{RunningMoments, WindowedMoments};
use serde::Serialize;

/// Verdict for one score, with the statistics it was judged against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub anomalous: bool,
    /// `None` during cold start.
    pub threshold: Option<f64>,
    pub mean: f64,
    pub std_dev: f64,
    /// Scores folded in before this one.
    pub observations: u64,
}

#[derive(Debug, Clone)]
enum ScoreStats {
    Running(RunningMoments),
    Windowed(WindowedMoments),
}

impl ScoreStats {
    fn mean(&self) -> f64 {
        match self {
            ScoreStats::Running(m) => m.mean(),
            ScoreStats::Windowed(w) => w.mean(),
        }
    }

    fn std_dev(&self) -> f64 {
        match self {
            ScoreStats::Running(m) => m.std_dev(),
            ScoreStats::Windowed(w) => w.std_dev(),
        }
    }

    fn push(&mut self, score: f64) {
        match self {
            ScoreStats::Running(m) => m.push(score),
            ScoreStats::Windowed(w) => {
                w.push(score);
            }
        }
    }

    fn reset(&mut self) {
        match self {
            ScoreStats::Running(m) => m.reset(),
            ScoreStats::Windowed(w) => w.reset(),
        }
    }
}

/// Running score distribution with a `k`-sigma threshold.
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    k: f64,
    min_observations: u64,
    observations: u64,
    stats: ScoreStats,
}

impl AnomalyScorer {
    /// Build from config. `samples_per_tree` supplies the default
    /// cold-start length.
    pub fn new(config: &ScorerConfig, samples_per_tree: usize) -> Result<Self> {
        config.validate()?;
        let stats = match config.window {
            Some(window) => ScoreStats::Windowed(WindowedMoments::new(window)),
            None => ScoreStats::Running(RunningMoments::new()),
        };
        Ok(Self {
            k: config.k,
            min_observations: config.effective_min_observations(samples_per_tree) as u64,
            observations: 0,
            stats,
        })
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn min_observations(&self) -> u64 {
        self.min_observations
    }

    /// Scores folded in since construction or the last reset.
    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// True while too few scores have been seen to judge deviation.
    pub fn is_cold(&self) -> bool {
        self.observations < self.min_observations
    }

    /// Current threshold, or `None` during cold start.
    pub fn threshold(&self) -> Option<f64> {
        if self.is_cold() || self.observations == 0 {
            return None;
        }
        Some(self.stats.mean() + self.k * self.stats.std_dev())
    }

    /// Judge `score` against the current statistics without folding it in.
    pub fn classify(&self, score: f64) -> bool {
        self.threshold().is_some_and(|t| score > t)
    }

    /// Fold a score into the running statistics.
    pub fn update(&mut self, score: f64) {
        if !score.is_finite() {
            return;
        }
        self.stats.push(score);
        self.observations += 1;
    }

    /// Classify, then fold in.
    pub fn observe(&mut self, score: f64) -> Classification {
        let threshold = self.threshold();
        let classification = Classification {
            anomalous: threshold.is_some_and(|t| score > t),
            threshold,
            mean: self.stats.mean(),
            std_dev: self.stats.std_dev(),
            observations: self.observations,
        };
        self.update(score);
        classification
    }

    /// Forget all history. Only called on explicit operator request.
    pub fn reset(&mut self) {
        self.stats.reset();
        self.observations = 0;
    }
}
