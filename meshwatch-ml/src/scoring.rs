//! Anomaly score calculation
//!
//! Uses the formula `score = 2^(-E(h(x)) / c(n))` where `E(h(x))` is the
//! path length averaged over the forest and `c(n)` normalizes by the
//! expected path length for the subsample size each tree was built from.

use serde::{Deserialize, Serialize};

use crate::c_factor;

/// Score reported when the forest cannot discriminate
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Anomaly score result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    /// Score in (0, 1]; values near 1 are anomalous, near 0.5 or below are normal
    pub score: f64,
    /// Average path length across trees
    pub avg_path_length: f64,
    /// Number of trees used
    pub num_trees: usize,
}

impl AnomalyScore {
    /// Create a new anomaly score
    pub fn new(score: f64, avg_path_length: f64, num_trees: usize) -> Self {
        Self {
            score,
            avg_path_length,
            num_trees,
        }
    }

    /// Neutral score for an empty forest
    pub fn neutral() -> Self {
        Self::new(NEUTRAL_SCORE, 0.0, 0)
    }

    /// Check if score indicates an anomaly
    pub fn is_anomaly(&self, threshold: f64) -> bool {
        self.num_trees > 0 && self.score > threshold
    }
}

/// Calculate anomaly score from an average path length
///
/// `sample_size` is the subsample size the trees were built from. Sizes that
/// give `c(n) = 0` yield the neutral score.
pub fn calculate_anomaly_score(avg_path_length: f64, sample_size: usize) -> f64 {
    let expected_path = c_factor(sample_size);
    if expected_path <= 0.0 {
        return NEUTRAL_SCORE;
    }
    2.0_f64.powf(-avg_path_length / expected_path)
}
