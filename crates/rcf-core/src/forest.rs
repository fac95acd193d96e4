//! The forest: `T` independent (tree, sampler) pairs.
//!
//! Trees are held behind [`Arc`] and mutated through [`Arc::make_mut`], so a
//! [`ForestSnapshot`] taken before a write keeps scoring the old version
//! without locks while the forest moves on. Per-tree work is an independent
//! map that may run on the rayon pool; the reduce is always a compensated
//! mean in tree-index order, so parallel and sequential runs agree bit for
//! bit.

use std::sync::{Arc, PoisonError, RwLock};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rcf_common::{Error, ForestConfig, Result};
use rcf_math::ordered_mean;
use serde::Serialize;
use tracing::{debug, info};

use crate::logging::event_names;
use crate::sampler::{Offer, ReservoirSampler, SampleUpdate};
use crate::tree::RandomCutTree;

/// Result of streaming one point through the forest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreResult {
    /// Mean displacement against the trees as they were before the point.
    pub score: f64,
    /// Trees whose sampler took the point.
    pub admitted: usize,
    /// Trees that evicted an older point to make room.
    pub evicted: usize,
}

/// Ensemble of random cut trees with per-tree reservoir samples.
#[derive(Debug, Clone)]
pub struct RandomCutForest {
    config: ForestConfig,
    trees: Vec<Arc<RandomCutTree>>,
    samplers: Vec<ReservoirSampler>,
    observed: u64,
}

/// Cut stream for tree `index`.
pub(crate) fn tree_rng(seed: u64, index: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(2 * index as u64);
    rng
}

/// Admission stream for the sampler of tree `index`.
pub(crate) fn sampler_rng(seed: u64, index: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(2 * index as u64 + 1);
    rng
}

/// Reject points of the wrong length or with non-finite coordinates.
pub fn check_point(point: &[f64], dimensions: usize) -> Result<()> {
    if point.len() != dimensions {
        return Err(Error::DimensionMismatch {
            expected: dimensions,
            actual: point.len(),
        });
    }
    if let Some((coordinate, &value)) = point.iter().enumerate().find(|(_, x)| !x.is_finite()) {
        return Err(Error::InvalidValue { coordinate, value });
    }
    Ok(())
}

fn tree_scores(trees: &[Arc<RandomCutTree>], point: &[f64], parallel: bool) -> Vec<f64> {
    if parallel {
        trees.par_iter().map(|t| t.displacement(point)).collect()
    } else {
        trees.iter().map(|t| t.displacement(point)).collect()
    }
}

impl RandomCutForest {
    /// Empty forest for streaming from scratch.
    pub fn new(config: ForestConfig) -> Result<Self> {
        config.validate()?;
        let trees = (0..config.num_trees)
            .map(|i| Arc::new(RandomCutTree::new(config.dimensions, tree_rng(config.seed, i))))
            .collect();
        let samplers = (0..config.num_trees)
            .map(|i| {
                ReservoirSampler::new(
                    config.samples_per_tree,
                    config.dimensions,
                    sampler_rng(config.seed, i),
                )
            })
            .collect();
        Ok(Self {
            config,
            trees,
            samplers,
            observed: 0,
        })
    }

    /// Batch-train on `points`.
    ///
    /// Every tree draws its own uniform subsample of `min(C, N)` points
    /// without replacement and inserts them in draw order. Samplers start
    /// as though they had streamed all `N` points.
    pub fn train(config: ForestConfig, points: &[Vec<f64>]) -> Result<Self> {
        config.validate()?;
        if points.is_empty() {
            return Err(Error::Configuration("training set is empty".to_string()));
        }
        for point in points {
            check_point(point, config.dimensions)?;
        }

        info!(
            target: event_names::TRAIN_STARTED,
            trees = config.num_trees,
            samples_per_tree = config.samples_per_tree,
            dimensions = config.dimensions,
            points = points.len(),
            "training forest"
        );

        let sample_size = config.samples_per_tree.min(points.len());
        let build = |index: usize| -> Result<(Arc<RandomCutTree>, ReservoirSampler)> {
            let mut sampler = ReservoirSampler::new(
                config.samples_per_tree,
                config.dimensions,
                sampler_rng(config.seed, index),
            );
            let chosen = rand::seq::index::sample(sampler.rng_mut(), points.len(), sample_size);
            let members: Vec<Vec<f64>> = chosen.iter().map(|i| points[i].clone()).collect();

            let mut tree = RandomCutTree::new(config.dimensions, tree_rng(config.seed, index));
            for member in &members {
                tree.insert(member)?;
            }
            debug!(
                target: event_names::TRAIN_TREE_BUILT,
                tree = index,
                mass = tree.len(),
                depth = tree.depth(),
                "tree built"
            );
            sampler.seed_sample(members, points.len() as u64);
            Ok((Arc::new(tree), sampler))
        };

        let built: Vec<(Arc<RandomCutTree>, ReservoirSampler)> = if config.parallel {
            (0..config.num_trees)
                .into_par_iter()
                .map(build)
                .collect::<Result<_>>()?
        } else {
            (0..config.num_trees).map(build).collect::<Result<_>>()?
        };
        let (trees, samplers) = built.into_iter().unzip();

        info!(
            target: event_names::TRAIN_FINISHED,
            trees = config.num_trees,
            sample_size,
            "forest trained"
        );

        Ok(Self {
            config,
            trees,
            samplers,
            observed: points.len() as u64,
        })
    }

    /// Reassemble persisted parts. Callers validate consistency.
    pub(crate) fn from_parts(
        config: ForestConfig,
        trees: Vec<RandomCutTree>,
        samplers: Vec<ReservoirSampler>,
        observed: u64,
    ) -> Self {
        Self {
            config,
            trees: trees.into_iter().map(Arc::new).collect(),
            samplers,
            observed,
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn samples_per_tree(&self) -> usize {
        self.config.samples_per_tree
    }

    /// Points trained on or streamed through since construction.
    pub fn observed(&self) -> u64 {
        self.observed
    }

    pub fn trees(&self) -> &[Arc<RandomCutTree>] {
        &self.trees
    }

    pub fn samplers(&self) -> &[ReservoirSampler] {
        &self.samplers
    }

    /// Toggle the rayon map. Results do not depend on it.
    pub fn set_parallel(&mut self, parallel: bool) {
        self.config.parallel = parallel;
    }

    /// Mean displacement of `point` over all trees. Pure read.
    pub fn score(&self, point: &[f64]) -> Result<f64> {
        check_point(point, self.config.dimensions)?;
        Ok(ordered_mean(&tree_scores(
            &self.trees,
            point,
            self.config.parallel,
        )))
    }

    /// Per-tree scores in tree-index order.
    pub fn score_breakdown(&self, point: &[f64]) -> Result<Vec<f64>> {
        check_point(point, self.config.dimensions)?;
        Ok(tree_scores(&self.trees, point, self.config.parallel))
    }

    /// Score many points. Every point is validated before any is scored.
    pub fn score_batch(&self, points: &[Vec<f64>]) -> Result<Vec<f64>> {
        for point in points {
            check_point(point, self.config.dimensions)?;
        }
        let score_one = |point: &Vec<f64>| ordered_mean(&tree_scores(&self.trees, point, false));
        if self.config.parallel {
            Ok(points.par_iter().map(score_one).collect())
        } else {
            Ok(points.iter().map(score_one).collect())
        }
    }

    /// Stream one point: score it against the current trees, then offer it
    /// to every sampler and apply the resulting inserts and deletes.
    ///
    /// All sampler decisions are drawn and checked against their trees
    /// before anything is applied, so an error leaves every tree and
    /// sampler as it was.
    pub fn observe(&mut self, point: &[f64]) -> Result<ScoreResult> {
        check_point(point, self.config.dimensions)?;

        let score = ordered_mean(&tree_scores(&self.trees, point, self.config.parallel));

        let plan = |(tree, sampler): (&Arc<RandomCutTree>, &ReservoirSampler)| -> Result<Offer> {
            let offer = sampler.offer(point)?;
            if let Some(evicted) = sampler.evictee(&offer) {
                if !tree.contains(evicted) {
                    return Err(Error::NotFound(format!("{:?}", evicted)));
                }
            }
            Ok(offer)
        };
        let offers: Vec<Offer> = if self.config.parallel {
            self.trees
                .par_iter()
                .zip(self.samplers.par_iter())
                .map(plan)
                .collect::<Result<_>>()?
        } else {
            self.trees
                .iter()
                .zip(self.samplers.iter())
                .map(plan)
                .collect::<Result<_>>()?
        };

        let apply = |((tree, sampler), offer): (
            (&mut Arc<RandomCutTree>, &mut ReservoirSampler),
            Offer,
        )| {
            let update = sampler.accept(offer, point);
            match &update {
                SampleUpdate::Admitted => Arc::make_mut(tree).insert(point)?,
                SampleUpdate::AdmittedReplacing(evicted) => {
                    let tree = Arc::make_mut(tree);
                    tree.delete(evicted)?;
                    tree.insert(point)?;
                }
                SampleUpdate::Rejected => {}
            }
            Ok::<_, Error>((
                update.is_admitted(),
                matches!(update, SampleUpdate::AdmittedReplacing(_)),
            ))
        };

        let outcomes: Vec<(bool, bool)> = if self.config.parallel {
            self.trees
                .par_iter_mut()
                .zip(self.samplers.par_iter_mut())
                .zip(offers.into_par_iter())
                .map(apply)
                .collect::<Result<_>>()?
        } else {
            self.trees
                .iter_mut()
                .zip(self.samplers.iter_mut())
                .zip(offers)
                .map(apply)
                .collect::<Result<_>>()?
        };
        self.observed += 1;

        Ok(ScoreResult {
            score,
            admitted: outcomes.iter().filter(|(a, _)| *a).count(),
            evicted: outcomes.iter().filter(|(_, e)| *e).count(),
        })
    }

    /// Start a new sampling epoch: every sampler and tree is emptied and
    /// refills from the points that follow. Cut and sampling streams carry
    /// on, so a reset forest stays reproducible.
    pub fn reset_epoch(&mut self) {
        let dimensions = self.config.dimensions;
        for (tree, sampler) in self.trees.iter_mut().zip(&mut self.samplers) {
            sampler.reset_epoch();
            *tree = Arc::new(RandomCutTree::new(dimensions, tree.rng().clone()));
        }
    }

    /// Immutable view of the current trees.
    pub fn snapshot(&self) -> ForestSnapshot {
        ForestSnapshot {
            dimensions: self.config.dimensions,
            parallel: self.config.parallel,
            trees: self.trees.clone(),
        }
    }
}

/// A frozen version of a forest's trees. Scoring needs no lock.
#[derive(Debug, Clone)]
pub struct ForestSnapshot {
    dimensions: usize,
    parallel: bool,
    trees: Vec<Arc<RandomCutTree>>,
}

impl ForestSnapshot {
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn score(&self, point: &[f64]) -> Result<f64> {
        check_point(point, self.dimensions)?;
        Ok(ordered_mean(&tree_scores(&self.trees, point, self.parallel)))
    }
}

/// A forest shared between one writer and many readers.
///
/// Writers hold the lock for the duration of `observe`; readers only hold
/// it long enough to clone the tree handles.
#[derive(Debug)]
pub struct SharedForest {
    inner: RwLock<RandomCutForest>,
}

impl SharedForest {
    pub fn new(forest: RandomCutForest) -> Self {
        Self {
            inner: RwLock::new(forest),
        }
    }

    pub fn observe(&self, point: &[f64]) -> Result<ScoreResult> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(point)
    }

    pub fn snapshot(&self) -> ForestSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub fn score(&self, point: &[f64]) -> Result<f64> {
        self.snapshot().score(point)
    }

    pub fn into_inner(self) -> RandomCutForest {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
