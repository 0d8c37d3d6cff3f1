//! Fingerprint K-nearest-neighbor matching
//!
//! ```text
//! d_j   = sqrt(Σ_shared (q_a - μ_{j,a})²)          RSSI distance to fingerprint j
//! w_j   = 1 / (d_j + ε)
//! p     = Σ w_j·p_j / Σ w_j
//! conf  = (Σ w_j·c_j / Σ w_j) · (1 - 0.5·min(1, mean(d) / distance_scale))
//! unc   = max(sqrt(Σ w_j·|p_j - p|² / Σ w_j), min_uncertainty)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult, Degradation};
use crate::fingerprint::FingerprintStore;
use crate::geometry::Point;

use super::{EstimateInput, EstimatorKind, PositionEstimate, PositionEstimator};

/// Keeps an exact match from producing an infinite weight
const DISTANCE_EPSILON: f64 = 1e-6;

/// KNN parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnConfig {
    /// Neighbors considered
    pub k: usize,
    /// Mean match distance at which the confidence penalty saturates (dB)
    pub distance_scale_db: f64,
    /// Uncertainty floor (meters)
    pub min_uncertainty: f64,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            k: 5,
            distance_scale_db: 20.0,
            min_uncertainty: 0.25,
        }
    }
}

impl KnnConfig {
    /// Range checks
    pub fn validate(&self) -> CoreResult<()> {
        if self.k == 0 {
            return Err(CoreError::InvalidConfig("knn k must be at least 1".into()));
        }
        if !(self.distance_scale_db > 0.0) || self.min_uncertainty < 0.0 {
            return Err(CoreError::InvalidConfig("knn scale parameters out of range".into()));
        }
        Ok(())
    }
}

/// KNN estimator over a shared store
#[derive(Debug, Clone)]
pub struct KnnEstimator {
    config: KnnConfig,
    store: Arc<FingerprintStore>,
}

impl KnnEstimator {
    /// Build over `store`
    pub fn new(config: KnnConfig, store: Arc<FingerprintStore>) -> Self {
        Self { config, store }
    }
}

impl PositionEstimator for KnnEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::FingerprintKnn
    }

    fn estimate(&self, input: &EstimateInput<'_>) -> PositionEstimate {
        if self.store.is_empty() {
            return PositionEstimate::degraded(Point::ORIGIN, Degradation::EmptyFingerprintStore);
        }
        let neighbors = self.store.query(input.readings, self.config.k);
        if neighbors.is_empty() {
            return PositionEstimate::degraded(Point::ORIGIN, Degradation::NoCommonAnchors);
        }

        let weights: Vec<f64> = neighbors.iter().map(|m| 1.0 / (m.distance + DISTANCE_EPSILON)).collect();
        let sum_w: f64 = weights.iter().sum();
        let Some(location) =
            Point::weighted_centroid(neighbors.iter().zip(&weights).map(|(m, w)| (&m.location, *w)))
        else {
            return PositionEstimate::degraded(Point::ORIGIN, Degradation::NoCommonAnchors);
        };

        let base_confidence = neighbors.iter().zip(&weights).map(|(m, w)| w * m.confidence).sum::<f64>() / sum_w;
        let mean_distance = neighbors.iter().map(|m| m.distance).sum::<f64>() / neighbors.len() as f64;
        let penalty = 0.5 * (mean_distance / self.config.distance_scale_db).min(1.0);

        let spread = (neighbors
            .iter()
            .zip(&weights)
            .map(|(m, w)| w * m.location.distance_sq(&location))
            .sum::<f64>()
            / sum_w)
            .sqrt();

        PositionEstimate::new(
            location,
            base_confidence * (1.0 - penalty),
            spread.max(self.config.min_uncertainty),
        )
    }
}
