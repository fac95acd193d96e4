//! Streaming detection pipeline: shingle, forest, threshold.

use rcf_common::{Config, Error, Result};
use serde::Serialize;
use tracing::debug;

use crate::forest::RandomCutForest;
use crate::logging::event_names;
use crate::scorer::AnomalyScorer;
use crate::shingle::ShingleBuffer;

/// Per-point detector output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    /// Zero-based position of the input that produced this point.
    pub index: u64,
    pub score: f64,
    /// `None` during cold start.
    pub threshold: Option<f64>,
    pub anomalous: bool,
    /// False while the scorer is still in cold start.
    pub warm: bool,
}

/// Owns a forest, a scorer, and an optional shingle buffer.
#[derive(Debug, Clone)]
pub struct StreamingDetector {
    forest: RandomCutForest,
    scorer: AnomalyScorer,
    shingle: Option<ShingleBuffer>,
    position: u64,
}

impl StreamingDetector {
    /// Fresh detector with an empty forest.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let forest = RandomCutForest::new(config.forest.clone())?;
        Self::with_forest(config, forest)
    }

    /// Detector continuing from an existing forest.
    pub fn with_forest(config: &Config, forest: RandomCutForest) -> Result<Self> {
        let scorer = AnomalyScorer::new(&config.scorer, forest.samples_per_tree())?;
        let shingle = match config.shingle.size {
            Some(size) => {
                if size != forest.dimensions() {
                    return Err(Error::Configuration(format!(
                        "shingle size {} must equal forest dimensions {}",
                        size,
                        forest.dimensions()
                    )));
                }
                Some(ShingleBuffer::new(size)?)
            }
            None => None,
        };
        Ok(Self {
            forest,
            scorer,
            shingle,
            position: 0,
        })
    }

    pub fn forest(&self) -> &RandomCutForest {
        &self.forest
    }

    pub fn scorer(&self) -> &AnomalyScorer {
        &self.scorer
    }

    pub fn into_forest(self) -> RandomCutForest {
        self.forest
    }

    /// Inputs accepted so far, including those still filling the shingle.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Push one scalar.
    ///
    /// With shingling, returns `None` until the window fills. Without it,
    /// the scalar is a one-dimensional point.
    pub fn push_scalar(&mut self, value: f64) -> Result<Option<Detection>> {
        if !value.is_finite() {
            return Err(Error::InvalidValue {
                coordinate: 0,
                value,
            });
        }
        match self.shingle.as_mut() {
            Some(buffer) => {
                let index = self.position;
                let window = buffer.push(value);
                self.position += 1;
                match window {
                    Some(point) => self.detect(index, &point).map(Some),
                    None => {
                        debug!(
                            target: event_names::SHINGLE_FILLING,
                            index,
                            "shingle window filling"
                        );
                        Ok(None)
                    }
                }
            }
            None => self.push_point(&[value]).map(Some),
        }
    }

    /// Push a complete point, bypassing any shingle.
    pub fn push_point(&mut self, point: &[f64]) -> Result<Detection> {
        let index = self.position;
        let detection = self.detect(index, point)?;
        self.position += 1;
        Ok(detection)
    }

    fn detect(&mut self, index: u64, point: &[f64]) -> Result<Detection> {
        let result = self.forest.observe(point)?;
        let classification = self.scorer.observe(result.score);
        Ok(Detection {
            index,
            score: result.score,
            threshold: classification.threshold,
            anomalous: classification.anomalous,
            warm: classification.threshold.is_some(),
        })
    }

    /// New sampling epoch and fresh score history. Input positions keep
    /// counting.
    pub fn reset(&mut self) {
        self.forest.reset_epoch();
        self.scorer.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcf_common::{ForestConfig, ScorerConfig, ShingleConfig};

    fn config(dims: usize, shingle: Option<usize>) -> Config {
        Config {
            forest: ForestConfig::new(10, 32, dims).with_seed(5),
            scorer: ScorerConfig::default().with_min_observations(16),
            shingle: ShingleConfig { size: shingle },
        }
    }

    #[test]
    fn shingled_stream_waits_for_window() {
        let mut det = StreamingDetector::new(&config(3, Some(3))).unwrap();
        assert!(det.push_scalar(1.0).unwrap().is_none());
        assert!(det.push_scalar(2.0).unwrap().is_none());
        let d = det.push_scalar(3.0).unwrap().unwrap();
        assert_eq!(d.index, 2);
        assert!(!d.warm);
        assert_eq!(det.forest().observed(), 1);
    }

    #[test]
    fn scalar_without_shingle_is_one_dimensional() {
        let mut det = StreamingDetector::new(&config(1, None)).unwrap();
        let d = det.push_scalar(4.0).unwrap().unwrap();
        assert_eq!(d.index, 0);
        assert_eq!(d.score, 0.0);
    }

    #[test]
    fn rejected_points_do_not_advance() {
        let mut det = StreamingDetector::new(&config(2, None)).unwrap();
        det.push_point(&[1.0, 1.0]).unwrap();
        assert!(det.push_point(&[1.0]).is_err());
        assert!(det.push_scalar(f64::NAN).is_err());
        assert_eq!(det.position(), 1);
        assert_eq!(det.scorer().observations(), 1);
    }

    #[test]
    fn spike_is_flagged_after_warmup() {
        let mut cfg = config(1, None);
        cfg.scorer = cfg.scorer.with_window(200);
        let mut det = StreamingDetector::new(&cfg).unwrap();
        for i in 0..300 {
            let x = (i as f64 * 0.3).sin();
            let d = det.push_scalar(x).unwrap().unwrap();
            assert_eq!(d.warm, i >= 16);
        }
        let spike = det.push_scalar(50.0).unwrap().unwrap();
        assert!(spike.warm);
        assert!(spike.anomalous, "spike score {} threshold {:?}", spike.score, spike.threshold);
    }

    #[test]
    fn reset_starts_a_cold_epoch() {
        let mut det = StreamingDetector::new(&config(1, None)).unwrap();
        for i in 0..40 {
            det.push_scalar((i % 5) as f64).unwrap();
        }
        det.reset();
        assert!(det.forest().trees().iter().all(|t| t.is_empty()));
        assert_eq!(det.scorer().observations(), 0);

        let d = det.push_scalar(7.0).unwrap().unwrap();
        assert_eq!(d.index, 40);
        assert_eq!(d.score, 0.0);
        assert!(!d.warm);
    }

    #[test]
    fn shingle_must_match_forest() {
        let mut cfg = config(2, Some(3));
        cfg.forest.dimensions = 2;
        assert!(StreamingDetector::new(&cfg).is_err());
    }
}
