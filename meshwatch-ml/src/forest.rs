//! Isolation Forest implementation
//!
//! Combines many isolation trees into one score. The forest is model data:
//! it can be built from historical feature vectors with a seeded RNG, or
//! supplied from outside as a serialized [`ForestModel`]. Either way the
//! scoring formula is the same.

use log::{debug, info};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    calculate_anomaly_score, AnomalyScore, IsolationTree, MlError, MlResult, Node, Sample,
    DEFAULT_ANOMALY_THRESHOLD, DEFAULT_SAMPLE_SIZE,
};

/// Fewest samples a forest can be built from
pub const MIN_TRAINING_SAMPLES: usize = 2;

/// Configuration for Isolation Forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub num_trees: usize,
    /// Subsample size for each tree
    pub sample_size: usize,
    /// Maximum tree depth, `None` for `ceil(log2(subsample))`
    pub max_depth: Option<u8>,
    /// Random seed
    pub seed: u64,
    /// Scores above this are anomalous
    pub anomaly_threshold: f64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            sample_size: DEFAULT_SAMPLE_SIZE,
            max_depth: None,
            seed: 42,
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
        }
    }
}

impl ForestConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> MlResult<()> {
        if self.num_trees == 0 {
            return Err(MlError::InvalidConfig("num_trees must be positive".into()));
        }
        if self.sample_size < MIN_TRAINING_SAMPLES {
            return Err(MlError::InvalidConfig(format!(
                "sample_size must be at least {}",
                MIN_TRAINING_SAMPLES
            )));
        }
        if !(0.0..=1.0).contains(&self.anomaly_threshold) {
            return Err(MlError::InvalidConfig("anomaly_threshold must be in [0, 1]".into()));
        }
        Ok(())
    }

    /// Depth limit for trees built from `subsample` points
    pub fn depth_for(&self, subsample: usize) -> u8 {
        self.max_depth.unwrap_or_else(|| {
            let bits = usize::BITS - subsample.saturating_sub(1).leading_zeros();
            bits.max(1) as u8
        })
    }
}

/// Serializable forest parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    /// Subsample size the trees were built from, the `n` in `c(n)`
    pub sample_size: usize,
    /// Feature count every scored sample must have
    pub num_features: usize,
    /// Node arenas, one per tree
    pub trees: Vec<Vec<Node>>,
}

/// Isolation Forest for anomaly detection
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForest {
    config: ForestConfig,
    trees: Vec<IsolationTree>,
    sample_size: usize,
    num_features: usize,
}

impl IsolationForest {
    /// Create an empty forest; it scores everything neutral until fitted
    pub fn new(config: ForestConfig) -> MlResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            trees: Vec::new(),
            sample_size: 0,
            num_features: 0,
        })
    }

    /// Build a fitted forest from historical samples
    pub fn build(config: ForestConfig, samples: &[Sample]) -> MlResult<Self> {
        let mut forest = Self::new(config)?;
        forest.fit(samples)?;
        Ok(forest)
    }

    /// Adopt externally supplied trees
    pub fn from_model(config: ForestConfig, model: ForestModel) -> MlResult<Self> {
        config.validate()?;
        if model.sample_size < MIN_TRAINING_SAMPLES {
            return Err(MlError::InvalidModel(format!(
                "sample_size {} is below {}",
                model.sample_size, MIN_TRAINING_SAMPLES
            )));
        }
        if model.trees.is_empty() {
            return Err(MlError::InvalidModel("model has no trees".into()));
        }
        let trees = model
            .trees
            .into_iter()
            .map(IsolationTree::from_nodes)
            .collect::<MlResult<Vec<_>>>()?;
        if let Some(feature) = trees.iter().filter_map(IsolationTree::max_feature).max() {
            if feature as usize >= model.num_features {
                return Err(MlError::InvalidModel(format!(
                    "split on feature {} but model declares {} features",
                    feature, model.num_features
                )));
            }
        }
        Ok(Self {
            config,
            trees,
            sample_size: model.sample_size,
            num_features: model.num_features,
        })
    }

    /// Export the trees as data
    pub fn to_model(&self) -> ForestModel {
        ForestModel {
            sample_size: self.sample_size,
            num_features: self.num_features,
            trees: self.trees.iter().map(|t| t.nodes().to_vec()).collect(),
        }
    }

    /// Rebuild every tree from `samples`
    ///
    /// The same samples and seed always yield the same forest.
    pub fn fit(&mut self, samples: &[Sample]) -> MlResult<()> {
        if samples.len() < MIN_TRAINING_SAMPLES {
            return Err(MlError::InsufficientData {
                needed: MIN_TRAINING_SAMPLES,
                got: samples.len(),
            });
        }

        let subsample = self.config.sample_size.min(samples.len());
        let max_depth = self.config.depth_for(subsample);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut indices: Vec<usize> = (0..samples.len()).collect();

        let mut trees = Vec::with_capacity(self.config.num_trees);
        for _ in 0..self.config.num_trees {
            // Partial Fisher-Yates: first `subsample` indices are a uniform draw
            let (chosen, _) = indices.partial_shuffle(&mut rng, subsample);
            let tree_samples: Vec<Sample> = chosen.iter().map(|&i| samples[i].clone()).collect();
            trees.push(IsolationTree::build(&tree_samples, max_depth, &mut rng)?);
        }

        self.trees = trees;
        self.sample_size = subsample;
        self.num_features = samples[0].len();
        info!(
            "isolation forest fitted trees={} subsample={} max_depth={} features={}",
            self.trees.len(),
            subsample,
            max_depth,
            self.num_features
        );
        Ok(())
    }

    /// Calculate anomaly score for a sample
    ///
    /// An unfitted forest returns the neutral score 0.5.
    pub fn anomaly_score(&self, sample: &Sample) -> MlResult<AnomalyScore> {
        if self.trees.is_empty() {
            return Ok(AnomalyScore::neutral());
        }
        if sample.len() != self.num_features {
            return Err(MlError::InvalidFeature(format!(
                "expected {} features, got {}",
                self.num_features,
                sample.len()
            )));
        }

        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.path_length(sample)?;
        }
        let avg_path_length = total / self.trees.len() as f64;
        let score = calculate_anomaly_score(avg_path_length, self.sample_size);
        debug!("forest score={:.3} avg_path={:.2}", score, avg_path_length);
        Ok(AnomalyScore::new(score, avg_path_length, self.trees.len()))
    }

    /// Check if a sample is an anomaly
    pub fn is_anomaly(&self, sample: &Sample) -> MlResult<bool> {
        Ok(self.anomaly_score(sample)?.is_anomaly(self.config.anomaly_threshold))
    }

    /// Predict anomaly scores for multiple samples
    pub fn predict(&self, samples: &[Sample]) -> MlResult<Vec<AnomalyScore>> {
        samples.iter().map(|s| self.anomaly_score(s)).collect()
    }

    /// True once trees exist
    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Forest configuration
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Get forest statistics
    pub fn stats(&self) -> ForestStats {
        ForestStats {
            num_trees: self.trees.len(),
            total_nodes: self.trees.iter().map(IsolationTree::node_count).sum(),
            max_depth: self.trees.iter().map(IsolationTree::depth).max().unwrap_or(0),
            sample_size: self.sample_size,
            threshold: self.config.anomaly_threshold,
        }
    }
}

/// Forest statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestStats {
    /// Number of trees
    pub num_trees: usize,
    /// Total nodes across all trees
    pub total_nodes: usize,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Subsample size per tree
    pub sample_size: usize,
    /// Anomaly threshold
    pub threshold: f64,
}
