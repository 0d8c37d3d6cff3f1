//! Position Estimation
//!
//! ## Overview
//!
//! Four independent estimators produce a location with a confidence and an
//! uncertainty; [`fusion`] combines them.
//!
//! ```text
//!               ┌────────────────┐
//!  readings ──┬→│ Trilateration  │──┬──────────────────┐
//!             │ └────────────────┘  │  ┌────────────┐  │
//!             │                     └→ │ Track (KF) │──┤
//!             │ ┌────────────────┐     └────────────┘  │   ┌────────┐
//!             ├→│ Fingerprint KNN│─────────────────────┼──→│  fuse  │──→ FusedEstimate
//!             │ └────────────────┘                     │   └────────┘
//!             │ ┌────────────────┐                     │
//!             └→│ Kernel         │─────────────────────┘
//!               └────────────────┘
//! ```
//!
//! ## Estimator contract
//!
//! Every estimator answers `estimate(input) -> PositionEstimate` and never
//! fails: when data is missing it returns a degraded estimate (confidence 0,
//! uncertainty [`DEGRADED_UNCERTAINTY`]) tagged with the [`Degradation`]
//! reason, so fusion naturally gives it negligible weight.
//!
//! The stateless estimators form a closed set, dispatched through the
//! [`Estimator`] enum. The track filter is stateful per device and consumes
//! the trilateration output, so the locator drives it separately.

pub mod anchors;
pub mod fusion;
pub mod kernel;
pub mod knn;
mod linalg;
pub mod track;
pub mod trilateration;

use serde::{Deserialize, Serialize};

use crate::errors::Degradation;
use crate::geometry::{Point, Readings};
use crate::time::Timestamp;

pub use anchors::AnchorRegistry;
pub use fusion::{fuse, fusion_weights, FusedEstimate, FUSION_EPSILON};
pub use kernel::{KernelConfig, KernelEstimator};
pub use knn::{KnnConfig, KnnEstimator};
pub use track::{TrackBank, TrackConfig, TrackState};
pub use trilateration::{TrilaterationConfig, Trilaterator};

/// Uncertainty reported by a degraded estimate (meters)
pub const DEGRADED_UNCERTAINTY: f64 = 100.0;

/// Which method produced an estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    Trilateration,
    FingerprintKnn,
    KernelInterpolation,
    KalmanTrack,
}

impl EstimatorKind {
    /// Stable name for logs
    pub fn name(&self) -> &'static str {
        match self {
            EstimatorKind::Trilateration => "trilateration",
            EstimatorKind::FingerprintKnn => "fingerprint_knn",
            EstimatorKind::KernelInterpolation => "kernel",
            EstimatorKind::KalmanTrack => "kalman_track",
        }
    }
}

/// Output of one estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    /// Estimated location
    pub location: Point,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// 1-sigma radius (meters), never negative
    pub uncertainty: f64,
    /// Why the estimate is low quality, if it is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<Degradation>,
}

impl PositionEstimate {
    /// Normal estimate; clamps confidence and uncertainty into range
    pub fn new(location: Point, confidence: f64, uncertainty: f64) -> Self {
        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        let uncertainty = if uncertainty.is_finite() {
            uncertainty.max(0.0)
        } else {
            DEGRADED_UNCERTAINTY
        };
        Self {
            location,
            confidence,
            uncertainty,
            degradation: None,
        }
    }

    /// Fallback estimate with zero confidence
    pub fn degraded(location: Point, reason: Degradation) -> Self {
        Self {
            location,
            confidence: 0.0,
            uncertainty: DEGRADED_UNCERTAINTY,
            degradation: Some(reason),
        }
    }

    /// True when a fallback path produced this estimate
    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }
}

/// What an estimator sees
#[derive(Debug, Clone, Copy)]
pub struct EstimateInput<'a> {
    /// Smoothed RSSI per anchor
    pub readings: &'a Readings,
    /// Time the readings were taken
    pub timestamp: Timestamp,
}

/// Common capability of the stateless estimators
pub trait PositionEstimator {
    /// Method tag
    fn kind(&self) -> EstimatorKind;

    /// Estimate a location; degrades instead of failing
    fn estimate(&self, input: &EstimateInput<'_>) -> PositionEstimate;
}

/// Closed set of stateless estimators
#[derive(Debug, Clone)]
pub enum Estimator {
    Trilateration(Trilaterator),
    FingerprintKnn(KnnEstimator),
    Kernel(KernelEstimator),
}

impl PositionEstimator for Estimator {
    fn kind(&self) -> EstimatorKind {
        match self {
            Estimator::Trilateration(e) => e.kind(),
            Estimator::FingerprintKnn(e) => e.kind(),
            Estimator::Kernel(e) => e.kind(),
        }
    }

    fn estimate(&self, input: &EstimateInput<'_>) -> PositionEstimate {
        let estimate = match self {
            Estimator::Trilateration(e) => e.estimate(input),
            Estimator::FingerprintKnn(e) => e.estimate(input),
            Estimator::Kernel(e) => e.estimate(input),
        };
        if let Some(reason) = &estimate.degradation {
            log::debug!("estimator={} degraded reason={}", self.kind().name(), reason);
        }
        estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_clamps() {
        let e = PositionEstimate::new(Point::ORIGIN, 1.7, -3.0);
        assert_eq!(e.confidence, 1.0);
        assert_eq!(e.uncertainty, 0.0);

        let e = PositionEstimate::new(Point::ORIGIN, f64::NAN, f64::INFINITY);
        assert_eq!(e.confidence, 0.0);
        assert_eq!(e.uncertainty, DEGRADED_UNCERTAINTY);
        assert!(!e.is_degraded());
    }

    #[test]
    fn test_degraded_shape() {
        let e = PositionEstimate::degraded(Point::new(1.0, 2.0), Degradation::EmptyFingerprintStore);
        assert_eq!(e.confidence, 0.0);
        assert_eq!(e.uncertainty, DEGRADED_UNCERTAINTY);
        assert!(e.is_degraded());
    }

    #[test]
    fn test_kind_names_are_distinct() {
        let names = [
            EstimatorKind::Trilateration.name(),
            EstimatorKind::FingerprintKnn.name(),
            EstimatorKind::KernelInterpolation.name(),
            EstimatorKind::KalmanTrack.name(),
        ];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
