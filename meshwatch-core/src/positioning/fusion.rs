//! Inverse-uncertainty fusion
//!
//! ```text
//! w_i  = 1 / (u_i + ε)                    ε = 1e-3
//! ŵ_i  = w_i / Σ w                        normalized
//! p    = Σ ŵ_i · p_i
//! conf = Σ ŵ_i · c_i
//! unc  = sqrt(Σ ŵ_i · u_i²)
//! ```
//!
//! Pure and order-preserving: the same inputs in the same order always give
//! bit-identical output.

use serde::{Deserialize, Serialize};

use crate::errors::Degradation;
use crate::geometry::Point;

use super::{EstimatorKind, PositionEstimate, DEGRADED_UNCERTAINTY};

/// Keeps a zero-uncertainty estimate from taking an infinite weight
pub const FUSION_EPSILON: f64 = 1e-3;

/// Fused location with the estimates it was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedEstimate {
    /// Weighted location
    pub location: Point,
    /// Weighted confidence in [0, 1]
    pub confidence: f64,
    /// Combined 1-sigma radius (meters)
    pub uncertainty: f64,
    /// Inputs with their normalized weights, in input order
    pub components: Vec<FusionComponent>,
}

/// One fusion input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionComponent {
    /// Producing method
    pub kind: EstimatorKind,
    /// Normalized weight
    pub weight: f64,
    /// The estimate itself
    pub estimate: PositionEstimate,
}

/// Normalized inverse-uncertainty weights
///
/// Negative or non-finite uncertainties count as [`DEGRADED_UNCERTAINTY`].
/// Returns an empty vector for empty input.
pub fn fusion_weights(uncertainties: &[f64]) -> Vec<f64> {
    let raw: Vec<f64> = uncertainties
        .iter()
        .map(|&u| 1.0 / (sanitize(u) + FUSION_EPSILON))
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

fn sanitize(uncertainty: f64) -> f64 {
    if uncertainty.is_finite() && uncertainty >= 0.0 {
        uncertainty
    } else {
        DEGRADED_UNCERTAINTY
    }
}

/// Fuse estimates into one
///
/// An empty input yields a degraded origin estimate.
pub fn fuse(estimates: &[(EstimatorKind, PositionEstimate)]) -> FusedEstimate {
    if estimates.is_empty() {
        return FusedEstimate {
            location: Point::ORIGIN,
            confidence: 0.0,
            uncertainty: DEGRADED_UNCERTAINTY,
            components: Vec::new(),
        };
    }

    let uncertainties: Vec<f64> = estimates.iter().map(|(_, e)| sanitize(e.uncertainty)).collect();
    let weights = fusion_weights(&uncertainties);

    let (mut x, mut y, mut confidence, mut variance) = (0.0, 0.0, 0.0, 0.0);
    for (((_, e), &w), &u) in estimates.iter().zip(&weights).zip(&uncertainties) {
        x += w * e.location.x;
        y += w * e.location.y;
        confidence += w * e.confidence;
        variance += w * u * u;
    }

    let components = estimates
        .iter()
        .zip(&weights)
        .map(|((kind, estimate), &weight)| FusionComponent {
            kind: *kind,
            weight,
            estimate: estimate.clone(),
        })
        .collect();

    FusedEstimate {
        location: Point::new(x, y),
        confidence: confidence.clamp(0.0, 1.0),
        uncertainty: variance.sqrt(),
        components,
    }
}

impl FusedEstimate {
    /// Degradations reported by the inputs
    pub fn degradations(&self) -> Vec<(EstimatorKind, Degradation)> {
        self.components
            .iter()
            .filter_map(|c| c.estimate.degradation.clone().map(|d| (c.kind, d)))
            .collect()
    }
}
