//! Kernel (RBF) interpolation over the fingerprint store
//!
//! Similarity to fingerprint `j` uses the mean squared RSSI difference over
//! shared anchors, scaled by a nominal RSSI span so `gamma` is unit-free:
//!
//! ```text
//! s_j  = exp(-γ · msd_j / span²)
//! p    = Σ s_j·p_j / Σ s_j                  over the top_n most similar
//! unc  = max(sqrt(Σ s_j·|p_j - p|² / Σ s_j), min_uncertainty)
//! conf = (Σ s_j·c_j / Σ s_j) · max(s)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult, Degradation};
use crate::fingerprint::FingerprintStore;
use crate::geometry::Point;

use super::{EstimateInput, EstimatorKind, PositionEstimate, PositionEstimator};

/// Similarity sum treated as zero
const SIMILARITY_FLOOR: f64 = 1e-12;

/// Kernel parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// RBF width `γ`
    pub gamma: f64,
    /// Fingerprints kept after ranking by similarity
    pub top_n: usize,
    /// RSSI span used to normalize squared differences (dB)
    pub rssi_span_db: f64,
    /// Uncertainty floor (meters)
    pub min_uncertainty: f64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            gamma: 10.0,
            top_n: 10,
            rssi_span_db: 50.0,
            min_uncertainty: 0.25,
        }
    }
}

impl KernelConfig {
    /// Range checks
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.gamma > 0.0) || !(self.rssi_span_db > 0.0) || self.top_n == 0 {
            return Err(CoreError::InvalidConfig("kernel gamma, span and top_n must be positive".into()));
        }
        Ok(())
    }
}

/// Kernel interpolation estimator
#[derive(Debug, Clone)]
pub struct KernelEstimator {
    config: KernelConfig,
    store: Arc<FingerprintStore>,
}

impl KernelEstimator {
    /// Build over `store`
    pub fn new(config: KernelConfig, store: Arc<FingerprintStore>) -> Self {
        Self { config, store }
    }

    /// Similarity for a mean squared difference in dB²
    pub fn similarity(&self, mean_squared_diff: f64) -> f64 {
        let span_sq = self.config.rssi_span_db * self.config.rssi_span_db;
        (-self.config.gamma * mean_squared_diff / span_sq).exp()
    }
}

impl PositionEstimator for KernelEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::KernelInterpolation
    }

    fn estimate(&self, input: &EstimateInput<'_>) -> PositionEstimate {
        if self.store.is_empty() {
            return PositionEstimate::degraded(Point::ORIGIN, Degradation::EmptyFingerprintStore);
        }
        let mut scored: Vec<(Point, f64, f64)> = self
            .store
            .scan(input.readings)
            .into_iter()
            .map(|m| (m.location, self.similarity(m.mean_squared_diff), m.confidence))
            .collect();
        if scored.is_empty() {
            return PositionEstimate::degraded(Point::ORIGIN, Degradation::NoCommonAnchors);
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(self.config.top_n);

        let sum_s: f64 = scored.iter().map(|(_, s, _)| s).sum();
        if sum_s < SIMILARITY_FLOOR {
            return PositionEstimate::degraded(Point::ORIGIN, Degradation::NoSimilarFingerprints);
        }
        let Some(location) = Point::weighted_centroid(scored.iter().map(|(p, s, _)| (p, *s))) else {
            return PositionEstimate::degraded(Point::ORIGIN, Degradation::NoSimilarFingerprints);
        };

        let variance = scored.iter().map(|(p, s, _)| s * p.distance_sq(&location)).sum::<f64>() / sum_s;
        let mean_conf = scored.iter().map(|(_, s, c)| s * c).sum::<f64>() / sum_s;
        let best = scored[0].1;

        PositionEstimate::new(
            location,
            mean_conf * best,
            variance.sqrt().max(self.config.min_uncertainty),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FingerprintConfig;
    use crate::geometry::readings;

    fn line_store() -> Arc<FingerprintStore> {
        let store = Arc::new(FingerprintStore::new(FingerprintConfig::default()).unwrap());
        for i in 0..5 {
            let x = i as f64 * 2.0;
            let r = readings([("a", -40.0 - 4.0 * x), ("b", -80.0 + 4.0 * x)]);
            store.add_point(Point::new(x, 0.0), &r, 0, None).unwrap();
        }
        store
    }

    #[test]
    fn test_similarity_shape() {
        let k = KernelEstimator::new(KernelConfig::default(), line_store());
        assert_eq!(k.similarity(0.0), 1.0);
        assert!(k.similarity(25.0) > k.similarity(100.0));
    }

    #[test]
    fn test_unit_span_is_raw_msd() {
        let raw = KernelEstimator::new(
            KernelConfig {
                rssi_span_db: 1.0,
                ..KernelConfig::default()
            },
            line_store(),
        );
        assert!((raw.similarity(0.5) - (-10.0f64 * 0.5).exp()).abs() < 1e-12);
        // The default span makes gamma 10 act as 0.004 per dB²
        let scaled = KernelEstimator::new(KernelConfig::default(), line_store());
        assert!((scaled.similarity(25.0) - (-0.004f64 * 25.0).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_interpolates_between_neighbors() {
        let kernel = KernelEstimator::new(
            KernelConfig {
                gamma: 200.0,
                ..KernelConfig::default()
            },
            line_store(),
        );
        // Halfway between x=4 and x=6
        let q = readings([("a", -60.0), ("b", -60.0)]);
        let est = kernel.estimate(&EstimateInput { readings: &q, timestamp: 0 });
        assert!((est.location.x - 5.0).abs() < 0.1, "{}", est.location);
        assert!(est.uncertainty >= 0.25);
    }

    #[test]
    fn test_underflow_degrades() {
        let kernel = KernelEstimator::new(
            KernelConfig {
                gamma: 1e6,
                ..KernelConfig::default()
            },
            line_store(),
        );
        let q = readings([("a", 0.0), ("b", 0.0)]);
        let est = kernel.estimate(&EstimateInput { readings: &q, timestamp: 0 });
        assert_eq!(est.degradation, Some(Degradation::NoSimilarFingerprints));
        assert_eq!(est.uncertainty, 100.0);
    }

    #[test]
    fn test_empty_store() {
        let store = Arc::new(FingerprintStore::new(FingerprintConfig::default()).unwrap());
        let kernel = KernelEstimator::new(KernelConfig::default(), store);
        let q = readings([("a", -50.0)]);
        let est = kernel.estimate(&EstimateInput { readings: &q, timestamp: 0 });
        assert_eq!(est.degradation, Some(Degradation::EmptyFingerprintStore));
    }
}
