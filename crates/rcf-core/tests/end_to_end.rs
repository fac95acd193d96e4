//! Whole-pipeline scenarios: train, score, threshold, shingle, stream.

use proptest::prelude::*;
use rcf_common::{Config, ForestConfig, ScorerConfig, ShingleConfig};
use rcf_core::{shingle, AnomalyScorer, RandomCutForest, ShingleBuffer, StreamingDetector};

#[test]
fn spike_in_flat_series_is_the_only_anomaly() {
    let mut values = vec![1.0; 9];
    values.push(100.0);
    values.extend([1.0; 5]);
    let points: Vec<Vec<f64>> = values.iter().map(|v| vec![*v]).collect();

    let forest =
        RandomCutForest::train(ForestConfig::new(50, 10, 1).with_seed(2024), &points).unwrap();
    let scores = forest.score_batch(&points).unwrap();

    let mut scorer = AnomalyScorer::new(
        &ScorerConfig::default().with_k(3.0).with_min_observations(5),
        forest.samples_per_tree(),
    )
    .unwrap();
    let flagged: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|(_, s)| scorer.observe(**s).anomalous)
        .map(|(i, _)| i)
        .collect();

    assert_eq!(flagged, vec![9]);
    assert!(scores[9] > scores[0]);
}

#[test]
fn cold_start_never_flags() {
    let config = Config {
        forest: ForestConfig::new(10, 32, 1).with_seed(3),
        scorer: ScorerConfig::default().with_k(0.0),
        shingle: ShingleConfig::default(),
    };
    let mut detector = StreamingDetector::new(&config).unwrap();
    assert_eq!(detector.scorer().min_observations(), 32);

    for i in 0..32 {
        let value = if i == 20 { 1e6 } else { (i % 4) as f64 };
        let detection = detector.push_scalar(value).unwrap().unwrap();
        assert!(!detection.anomalous, "flagged during cold start at {i}");
        assert!(!detection.warm);
        assert_eq!(detection.threshold, None);
    }
    let next = detector.push_scalar(2.0).unwrap().unwrap();
    assert!(next.warm);
    assert!(next.threshold.is_some());
}

#[test]
fn streaming_detector_flags_level_shift_after_warmup() {
    let config = Config {
        forest: ForestConfig::new(40, 64, 4).with_seed(17),
        scorer: ScorerConfig::default().with_k(2.0),
        shingle: ShingleConfig { size: Some(4) },
    };
    let mut detector = StreamingDetector::new(&config).unwrap();

    let mut detections = Vec::new();
    for i in 0..600 {
        let value = (i as f64 * 0.2).sin();
        if let Some(d) = detector.push_scalar(value).unwrap() {
            detections.push(d);
        }
    }
    assert_eq!(detections.len(), 597);
    assert_eq!(detections[0].index, 3);

    let spike = detector.push_scalar(1e4).unwrap().unwrap();
    assert!(spike.warm);
    assert!(spike.anomalous, "score {} threshold {:?}", spike.score, spike.threshold);
    assert_eq!(spike.index, 600);
}

#[test]
fn detector_rejects_bad_points_without_advancing() {
    let config = Config {
        forest: ForestConfig::new(4, 8, 2),
        ..Config::default()
    };
    let mut detector = StreamingDetector::new(&config).unwrap();
    detector.push_point(&[1.0, 2.0]).unwrap();
    assert!(detector.push_point(&[1.0]).is_err());
    assert!(detector.push_point(&[f64::NAN, 0.0]).is_err());
    assert_eq!(detector.position(), 1);
    assert_eq!(detector.forest().observed(), 1);
    assert_eq!(detector.push_point(&[0.0, 0.0]).unwrap().index, 1);
}

#[test]
fn shingle_size_must_match_dimensions() {
    let config = Config {
        forest: ForestConfig::new(4, 8, 3),
        shingle: ShingleConfig { size: Some(2) },
        ..Config::default()
    };
    assert!(StreamingDetector::new(&config).is_err());
}

proptest! {
    /// Window `t` holds `x[t], ..., x[t + P - 1]` and there are `N - P` of
    /// them; the streaming buffer emits the same windows.
    #[test]
    fn shingle_windows_follow_the_sequence(
        values in prop::collection::vec(-1e6f64..1e6, 0..64),
        size in 1usize..8,
    ) {
        let windows = shingle(&values, size).unwrap();
        prop_assert_eq!(windows.len(), values.len().saturating_sub(size));
        for (t, window) in windows.iter().enumerate() {
            prop_assert_eq!(window.as_slice(), &values[t..t + size]);
        }

        let mut buffer = ShingleBuffer::new(size).unwrap();
        let streamed: Vec<Vec<f64>> = values.iter().filter_map(|v| buffer.push(*v)).collect();
        prop_assert_eq!(&streamed[..windows.len()], windows.as_slice());
    }
}
