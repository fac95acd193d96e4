//! Model persistence.
//!
//! A forest is saved as a JSON envelope:
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "created_at": "2026-01-15T14:30:22Z",
//!   "checksum": "<sha256 of the model JSON>",
//!   "model": { "dimensions": 1, "num_trees": 50, "trees": [ ... ] }
//! }
//! ```
//!
//! Each tree carries its compacted node list, its sampler, and the exact
//! position of both random streams, so a reloaded forest scores and
//! streams identically to the one that was saved. Loading re-checks every
//! structural invariant and fails closed on the first violation.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rcf_common::{Error, ForestConfig, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::forest::{check_point, RandomCutForest};
use crate::logging::event_names;
use crate::sampler::ReservoirSampler;
use crate::tree::{BoundingBox, Cut, Node, NodeKind, RandomCutTree};

/// Current model schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// On-disk envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedForest {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub checksum: String,
    pub model: ForestState,
}

/// Complete forest state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestState {
    pub dimensions: usize,
    pub num_trees: usize,
    pub samples_per_tree: usize,
    pub seed: u64,
    pub parallel: bool,
    pub observed: u64,
    pub trees: Vec<TreeState>,
}

/// One tree and its sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeState {
    pub rng: RngState,
    pub root: Option<usize>,
    pub nodes: Vec<NodeState>,
    pub sampler: SamplerState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub parent: Option<usize>,
    pub mass: usize,
    pub bbox_min: Vec<f64>,
    pub bbox_max: Vec<f64>,
    pub kind: NodeKindState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKindState {
    Leaf {
        point: Vec<f64>,
        duplicates: usize,
    },
    Internal {
        cut_dimension: usize,
        cut_value: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerState {
    pub capacity: usize,
    pub seen: u64,
    pub members: Vec<Vec<f64>>,
    pub rng: RngState,
}

/// Position of a ChaCha stream.
///
/// `word_pos` is a 128-bit counter, stored as a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RngState {
    pub seed: String,
    pub stream: u64,
    pub word_pos: String,
}

impl RngState {
    fn capture(rng: &ChaCha8Rng) -> Self {
        RngState {
            seed: hex::encode(rng.get_seed()),
            stream: rng.get_stream(),
            word_pos: rng.get_word_pos().to_string(),
        }
    }

    fn restore(&self) -> Result<ChaCha8Rng> {
        let bytes = hex::decode(&self.seed)
            .map_err(|e| Error::Serialization(format!("rng seed is not hex: {}", e)))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Serialization("rng seed must be 32 bytes".to_string()))?;
        let word_pos: u128 = self
            .word_pos
            .parse()
            .map_err(|e| Error::Serialization(format!("rng word position: {}", e)))?;
        let mut rng = ChaCha8Rng::from_seed(seed);
        rng.set_stream(self.stream);
        rng.set_word_pos(word_pos);
        Ok(rng)
    }
}

impl NodeState {
    fn capture(node: &Node) -> Self {
        let kind = match &node.kind {
            NodeKind::Leaf { point, duplicates } => NodeKindState::Leaf {
                point: point.clone(),
                duplicates: *duplicates,
            },
            NodeKind::Internal { cut, left, right } => NodeKindState::Internal {
                cut_dimension: cut.dimension,
                cut_value: cut.value,
                left: *left,
                right: *right,
            },
        };
        NodeState {
            parent: node.parent,
            mass: node.mass,
            bbox_min: node.bbox.min().to_vec(),
            bbox_max: node.bbox.max().to_vec(),
            kind,
        }
    }

    fn restore(self) -> Node {
        let kind = match self.kind {
            NodeKindState::Leaf { point, duplicates } => NodeKind::Leaf { point, duplicates },
            NodeKindState::Internal {
                cut_dimension,
                cut_value,
                left,
                right,
            } => NodeKind::Internal {
                cut: Cut {
                    dimension: cut_dimension,
                    value: cut_value,
                },
                left,
                right,
            },
        };
        Node {
            parent: self.parent,
            mass: self.mass,
            bbox: BoundingBox::from_corners(self.bbox_min, self.bbox_max),
            kind,
        }
    }
}

impl ForestState {
    /// Capture a forest.
    pub fn capture(forest: &RandomCutForest) -> Self {
        let config = forest.config();
        let trees = forest
            .trees()
            .iter()
            .zip(forest.samplers())
            .map(|(tree, sampler)| {
                let (nodes, root) = tree.compacted();
                TreeState {
                    rng: RngState::capture(tree.rng()),
                    root,
                    nodes: nodes.iter().map(NodeState::capture).collect(),
                    sampler: SamplerState {
                        capacity: sampler.capacity(),
                        seen: sampler.seen(),
                        members: sampler.members().to_vec(),
                        rng: RngState::capture(sampler.rng()),
                    },
                }
            })
            .collect();

        ForestState {
            dimensions: config.dimensions,
            num_trees: config.num_trees,
            samples_per_tree: config.samples_per_tree,
            seed: config.seed,
            parallel: config.parallel,
            observed: forest.observed(),
            trees,
        }
    }

    /// Rebuild a forest, validating every invariant.
    pub fn restore(self) -> Result<RandomCutForest> {
        let config = ForestConfig {
            num_trees: self.num_trees,
            samples_per_tree: self.samples_per_tree,
            dimensions: self.dimensions,
            seed: self.seed,
            parallel: self.parallel,
        };
        config
            .validate()
            .map_err(|e| Error::Serialization(format!("invalid forest parameters: {}", e)))?;
        if self.trees.len() != self.num_trees {
            return Err(Error::Serialization(format!(
                "expected {} trees, found {}",
                self.num_trees,
                self.trees.len()
            )));
        }

        let mut trees = Vec::with_capacity(self.num_trees);
        let mut samplers = Vec::with_capacity(self.num_trees);
        for (index, state) in self.trees.into_iter().enumerate() {
            let (tree, sampler) = restore_tree(&config, state)
                .map_err(|message| Error::Serialization(format!("tree {}: {}", index, message)))?;
            trees.push(tree);
            samplers.push(sampler);
        }

        Ok(RandomCutForest::from_parts(
            config,
            trees,
            samplers,
            self.observed,
        ))
    }
}

fn restore_tree(
    config: &ForestConfig,
    state: TreeState,
) -> std::result::Result<(RandomCutTree, ReservoirSampler), String> {
    let nodes: Vec<Node> = state.nodes.into_iter().map(NodeState::restore).collect();
    let rng = state.rng.restore().map_err(detail)?;
    let tree =
        RandomCutTree::from_parts(config.dimensions, nodes, state.root, rng).map_err(detail)?;

    let sampler = state.sampler;
    if sampler.capacity != config.samples_per_tree {
        return Err(format!(
            "sampler capacity {} != samples_per_tree {}",
            sampler.capacity, config.samples_per_tree
        ));
    }
    if sampler.members.len() > sampler.capacity {
        return Err(format!(
            "sampler holds {} members over capacity {}",
            sampler.members.len(),
            sampler.capacity
        ));
    }
    if sampler.members.len() != tree.len() {
        return Err(format!(
            "sampler holds {} members but tree mass is {}",
            sampler.members.len(),
            tree.len()
        ));
    }
    if sampler.members.len() as u64 > sampler.seen {
        return Err(format!(
            "sampler holds {} members but has seen only {}",
            sampler.members.len(),
            sampler.seen
        ));
    }

    // Copies per value must equal the leaf mass; with the totals equal this
    // pins the sampler and the tree to the same multiset.
    let mut copies: BTreeMap<Vec<u64>, (usize, &[f64])> = BTreeMap::new();
    for member in &sampler.members {
        check_point(member, config.dimensions)
            .map_err(|e| format!("sampler member: {}", e))?;
        copies.entry(value_key(member)).or_insert((0, member.as_slice())).0 += 1;
    }
    for (count, member) in copies.into_values() {
        let held = tree.multiplicity(member);
        if held != count {
            return Err(format!(
                "sampler holds {} copies of {:?} but the tree holds {}",
                count, member, held
            ));
        }
    }

    let rng = sampler.rng.restore().map_err(detail)?;
    let restored = ReservoirSampler::from_parts(
        sampler.capacity,
        config.dimensions,
        sampler.seen,
        sampler.members,
        rng,
    );
    Ok((tree, restored))
}

/// Bit pattern identifying a point by value. Signed zeros compare equal in
/// the tree, so they share a key.
fn value_key(point: &[f64]) -> Vec<u64> {
    point
        .iter()
        .map(|x| if *x == 0.0 { 0 } else { x.to_bits() })
        .collect()
}

/// Inner message of a nested serialization error.
fn detail(err: Error) -> String {
    match err {
        Error::Serialization(message) => message,
        other => other.to_string(),
    }
}

fn model_checksum(model: &ForestState) -> Result<String> {
    let json = serde_json::to_string(model)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

impl PersistedForest {
    /// Wrap a forest with version, timestamp, and checksum.
    pub fn from_forest(forest: &RandomCutForest) -> Result<Self> {
        let model = ForestState::capture(forest);
        let checksum = model_checksum(&model)?;
        Ok(PersistedForest {
            schema_version: SCHEMA_VERSION,
            created_at: Utc::now(),
            checksum,
            model,
        })
    }

    /// Check version and checksum, then rebuild.
    pub fn into_forest(self) -> Result<RandomCutForest> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(Error::Serialization(format!(
                "unsupported schema version {} (expected {})",
                self.schema_version, SCHEMA_VERSION
            )));
        }
        let actual = model_checksum(&self.model)?;
        if actual != self.checksum {
            return Err(Error::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }
        self.model.restore()
    }
}

/// Serialize a forest to a JSON string.
pub fn to_json(forest: &RandomCutForest) -> Result<String> {
    let envelope = PersistedForest::from_forest(forest)?;
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse and validate a forest from JSON.
pub fn from_json(json: &str) -> Result<RandomCutForest> {
    let envelope: PersistedForest = serde_json::from_str(json)
        .map_err(|e| Error::Serialization(format!("malformed model: {}", e)))?;
    envelope.into_forest()
}

/// Write a forest to `path`. Returns the model checksum.
pub fn save(forest: &RandomCutForest, path: &Path) -> Result<String> {
    let envelope = PersistedForest::from_forest(forest)?;
    fs::write(path, serde_json::to_string(&envelope)?)?;
    info!(
        target: event_names::PERSIST_SAVED,
        path = %path.display(),
        model_id = model_id(&envelope.checksum),
        trees = forest.num_trees(),
        "model saved"
    );
    Ok(envelope.checksum)
}

/// Read and validate a forest from `path`.
pub fn load(path: &Path) -> Result<RandomCutForest> {
    load_with_checksum(path).map(|(forest, _)| forest)
}

/// Like [`load`], also returning the verified checksum.
pub fn load_with_checksum(path: &Path) -> Result<(RandomCutForest, String)> {
    let json = fs::read_to_string(path)?;
    let envelope: PersistedForest = serde_json::from_str(&json)
        .map_err(|e| Error::Serialization(format!("malformed model: {}", e)))?;
    let checksum = envelope.checksum.clone();
    let forest = envelope.into_forest()?;
    info!(
        target: event_names::PERSIST_LOADED,
        path = %path.display(),
        model_id = model_id(&checksum),
        trees = forest.num_trees(),
        observed = forest.observed(),
        "model loaded"
    );
    Ok((forest, checksum))
}

/// Short model identity used in logs: the first 12 checksum characters.
pub fn model_id(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest() -> RandomCutForest {
        let points: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![(i as f64).sin(), (i as f64 * 0.5).cos()])
            .collect();
        RandomCutForest::train(ForestConfig::new(4, 16, 2).with_seed(8), &points).unwrap()
    }

    #[test]
    fn rng_state_round_trips() {
        use rand::Rng;
        let mut rng = crate::forest::tree_rng(99, 3);
        let _: u64 = rng.random();
        let _: u32 = rng.random();
        let mut restored = RngState::capture(&rng).restore().unwrap();
        assert_eq!(rng.random::<u64>(), restored.random::<u64>());
    }

    #[test]
    fn json_round_trip_scores_identically() {
        let original = forest();
        let restored = from_json(&to_json(&original).unwrap()).unwrap();
        for q in [[0.0, 0.0], [0.9, -0.3], [5.0, 5.0]] {
            assert_eq!(original.score(&q).unwrap(), restored.score(&q).unwrap());
        }
    }

    #[test]
    fn checksum_mismatch_detected() {
        let mut envelope = PersistedForest::from_forest(&forest()).unwrap();
        envelope.model.observed += 1;
        let json = serde_json::to_string(&envelope).unwrap();
        let err = from_json(&json).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn structural_damage_detected() {
        let mut envelope = PersistedForest::from_forest(&forest()).unwrap();
        envelope.model.trees[0].nodes[0].mass += 1;
        envelope.checksum = model_checksum(&envelope.model).unwrap();
        let err = envelope.into_forest().unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().contains("tree 0"));
    }

    #[test]
    fn out_of_range_child_detected() {
        let mut envelope = PersistedForest::from_forest(&forest()).unwrap();
        if let NodeKindState::Internal { left, .. } = &mut envelope.model.trees[1].nodes[0].kind {
            *left = 10_000;
        }
        envelope.checksum = model_checksum(&envelope.model).unwrap();
        assert!(matches!(
            envelope.into_forest().unwrap_err(),
            Error::Serialization(_)
        ));
    }

    #[test]
    fn sampler_mismatch_detected() {
        let mut envelope = PersistedForest::from_forest(&forest()).unwrap();
        envelope.model.trees[2].sampler.members.pop();
        envelope.checksum = model_checksum(&envelope.model).unwrap();
        let err = envelope.into_forest().unwrap_err();
        assert!(err.to_string().contains("members"));
    }

    #[test]
    fn duplicate_counts_must_match_leaf_mass() {
        let config = ForestConfig::new(1, 3, 1).with_seed(4);
        let forest =
            RandomCutForest::train(config, &[vec![0.0], vec![0.0], vec![1.0]]).unwrap();
        let mut envelope = PersistedForest::from_forest(&forest).unwrap();
        envelope.model.trees[0].sampler.members = vec![vec![0.0], vec![1.0], vec![1.0]];
        envelope.checksum = model_checksum(&envelope.model).unwrap();

        let err = from_json(&serde_json::to_string(&envelope).unwrap()).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().contains("copies of"), "{err}");
    }

    #[test]
    fn signed_zero_members_share_a_leaf() {
        let mut forest = RandomCutForest::new(ForestConfig::new(2, 4, 1).with_seed(6)).unwrap();
        for x in [0.0, -0.0, 3.0] {
            forest.observe(&[x]).unwrap();
        }
        let restored = from_json(&to_json(&forest).unwrap()).unwrap();
        assert_eq!(restored.trees()[0].multiplicity(&[0.0]), 2);
    }

    #[test]
    fn more_members_than_seen_rejected() {
        let mut envelope = PersistedForest::from_forest(&forest()).unwrap();
        envelope.model.trees[1].sampler.seen = 3;
        envelope.checksum = model_checksum(&envelope.model).unwrap();
        let err = envelope.into_forest().unwrap_err();
        assert!(err.to_string().contains("seen only 3"), "{err}");
    }

    #[test]
    fn unknown_schema_rejected() {
        let mut envelope = PersistedForest::from_forest(&forest()).unwrap();
        envelope.schema_version = 2;
        assert!(matches!(
            envelope.into_forest().unwrap_err(),
            Error::Serialization(_)
        ));
    }

    #[test]
    fn malformed_json_is_serialization_error() {
        assert!(matches!(
            from_json("{\"schema_version\": 1").unwrap_err(),
            Error::Serialization(_)
        ));
    }
}
