//! Weighted trilateration
//!
//! ## Algorithm
//!
//! 1. Keep anchors that have both a finite reading and registered coordinates.
//! 2. Convert each reading to a range with the path-loss model, using the
//!    anchor's room exponent, its reference power override, and the
//!    environmental correction at the reading's timestamp.
//! 3. Weight each anchor by the inverse of a confidence-derived variance:
//!
//! ```text
//! c_i = rssi_confidence(rssi_i + correction_i)        ∈ [0.05, 1]
//! σ_i = range_noise_floor + (1 - c_i) · r_i
//! w_i = 1 / σ_i²
//! ```
//!
//! 4. Linearize by differencing against the first anchor:
//!
//! ```text
//! 2(x_i - x_0)·x + 2(y_i - y_0)·y = r_0² - r_i² - x_0² + x_i² - y_0² + y_i²
//! ```
//!
//!    With exactly three anchors the two rows are solved in closed form. With
//!    more, the weighted linear least-squares solution seeds Gauss-Newton on
//!    the true range residuals `r_i - |p - a_i|` (at most `max_iterations`,
//!    stopping once the step is below `convergence_threshold`).
//!
//! 5. Singular geometry (collinear anchors) falls back to Gauss-Newton from
//!    the anchor centroid, then to the centroid itself.
//!
//! ## Quality
//!
//! ```text
//! rms         = sqrt(Σ w_i·(r_i - |p - a_i|)² / Σ w_i)
//! uncertainty = sqrt(rms² + mean(σ)² / n)
//! confidence  = mean(c) / (1 + rms)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult, Degradation};
use crate::geometry::Point;
use crate::ranging::{rssi_confidence, EnvironmentModel, PathLossModel};

use super::anchors::AnchorRegistry;
use super::linalg::{solve2, NormalEquations};
use super::{EstimateInput, EstimatorKind, PositionEstimate, PositionEstimator};

/// Minimum distance from an anchor for the Jacobian to be well defined
const JACOBIAN_EPSILON: f64 = 1e-9;

/// Solver parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrilaterationConfig {
    /// Anchors required before solving
    pub min_anchors: usize,
    /// Gauss-Newton iteration cap
    pub max_iterations: usize,
    /// Step size that counts as converged (meters)
    pub convergence_threshold: f64,
    /// Range standard deviation for a perfect-confidence reading (meters)
    pub range_noise_floor: f64,
}

impl Default for TrilaterationConfig {
    fn default() -> Self {
        Self {
            min_anchors: 3,
            max_iterations: 10,
            convergence_threshold: 1e-6,
            range_noise_floor: 0.1,
        }
    }
}

impl TrilaterationConfig {
    /// Range checks
    pub fn validate(&self) -> CoreResult<()> {
        if self.min_anchors < 3 {
            return Err(CoreError::InvalidConfig("trilateration needs at least 3 anchors".into()));
        }
        if self.max_iterations == 0 || !(self.convergence_threshold > 0.0) || !(self.range_noise_floor > 0.0) {
            return Err(CoreError::InvalidConfig("trilateration solver parameters must be positive".into()));
        }
        Ok(())
    }
}

/// One anchor with its converted range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangedAnchor {
    /// Anchor coordinates
    pub position: Point,
    /// Estimated distance (meters)
    pub range: f64,
    /// Reading confidence
    pub confidence: f64,
    /// Range standard deviation (meters)
    pub sigma: f64,
    /// Least-squares weight, `1/σ²`
    pub weight: f64,
}

/// Trilateration estimator
#[derive(Debug, Clone)]
pub struct Trilaterator {
    config: TrilaterationConfig,
    anchors: Arc<AnchorRegistry>,
    path_loss: Arc<PathLossModel>,
    environment: Arc<EnvironmentModel>,
}

impl Trilaterator {
    /// Build over shared models
    pub fn new(
        config: TrilaterationConfig,
        anchors: Arc<AnchorRegistry>,
        path_loss: Arc<PathLossModel>,
        environment: Arc<EnvironmentModel>,
    ) -> Self {
        Self {
            config,
            anchors,
            path_loss,
            environment,
        }
    }

    /// Solver parameters
    pub fn config(&self) -> &TrilaterationConfig {
        &self.config
    }

    /// Usable anchors with ranges, in anchor-id order
    pub fn ranged_anchors(&self, input: &EstimateInput<'_>) -> Vec<RangedAnchor> {
        input
            .readings
            .iter()
            .filter(|(_, rssi)| rssi.is_finite())
            .filter_map(|(id, &rssi)| {
                let anchor = self.anchors.get(id)?;
                let correction = self.environment.correction_db(id, input.timestamp);
                let exponent = self.path_loss.exponent_for(anchor.room.as_deref());
                let p0 = self.path_loss.reference_power_for(anchor.reference_power);
                let range = self.path_loss.distance(rssi, p0, exponent, correction);
                let confidence = rssi_confidence(rssi + correction);
                let sigma = self.config.range_noise_floor + (1.0 - confidence) * range;
                Some(RangedAnchor {
                    position: anchor.position,
                    range,
                    confidence,
                    sigma,
                    weight: 1.0 / (sigma * sigma),
                })
            })
            .collect()
    }

    /// Solve for a position from ranged anchors
    ///
    /// `None` when the geometry admits no solution.
    pub fn solve(&self, ranged: &[RangedAnchor]) -> Option<Point> {
        if ranged.len() < 3 {
            return None;
        }
        let seed = if ranged.len() == 3 {
            closed_form(ranged)
        } else {
            weighted_linear(ranged).and_then(|p| self.gauss_newton(p, ranged))
        };
        seed.or_else(|| {
            let centroid = Point::centroid(ranged.iter().map(|r| &r.position))?;
            self.gauss_newton(centroid, ranged)
        })
    }

    /// Iterate on the nonlinear range residuals from `start`
    pub fn gauss_newton(&self, start: Point, ranged: &[RangedAnchor]) -> Option<Point> {
        let mut p = start;
        for _ in 0..self.config.max_iterations {
            let mut ne = NormalEquations::default();
            for r in ranged {
                let d = p.distance_to(&r.position);
                if d < JACOBIAN_EPSILON {
                    continue;
                }
                let row = [(p.x - r.position.x) / d, (p.y - r.position.y) / d];
                ne.add_row(row, r.range - d, r.weight);
            }
            let [dx, dy] = ne.solve()?;
            p = Point::new(p.x + dx, p.y + dy);
            if (dx * dx + dy * dy).sqrt() < self.config.convergence_threshold {
                break;
            }
        }
        p.is_finite().then_some(p)
    }
}

impl PositionEstimator for Trilaterator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Trilateration
    }

    fn estimate(&self, input: &EstimateInput<'_>) -> PositionEstimate {
        let ranged = self.ranged_anchors(input);
        let centroid = Point::centroid(ranged.iter().map(|r| &r.position)).unwrap_or(Point::ORIGIN);

        if ranged.len() < self.config.min_anchors {
            return PositionEstimate::degraded(
                centroid,
                Degradation::InsufficientAnchors {
                    usable: ranged.len(),
                    required: self.config.min_anchors,
                },
            );
        }

        let Some(location) = self.solve(&ranged) else {
            return PositionEstimate::degraded(centroid, Degradation::SingularGeometry);
        };

        let n = ranged.len() as f64;
        let sum_w: f64 = ranged.iter().map(|r| r.weight).sum();
        let weighted_sq: f64 = ranged
            .iter()
            .map(|r| r.weight * (r.range - location.distance_to(&r.position)).powi(2))
            .sum();
        let rms = (weighted_sq / sum_w).sqrt();
        let mean_sigma = ranged.iter().map(|r| r.sigma).sum::<f64>() / n;
        let mean_confidence = ranged.iter().map(|r| r.confidence).sum::<f64>() / n;

        let uncertainty = (rms * rms + mean_sigma * mean_sigma / n).sqrt();
        let confidence = mean_confidence / (1.0 + rms);

        log::trace!(
            "trilateration anchors={} at {} rms={:.3} uncertainty={:.2}",
            ranged.len(),
            location,
            rms,
            uncertainty
        );
        PositionEstimate::new(location, confidence, uncertainty)
    }
}

/// Exact solution of the two differenced equations from three anchors
fn closed_form(ranged: &[RangedAnchor]) -> Option<Point> {
    let (rows, rhs): (Vec<[f64; 2]>, Vec<f64>) = differenced_rows(ranged).map(|(row, b, _)| (row, b)).unzip();
    let [x, y] = solve2(&[rows[0], rows[1]], [rhs[0], rhs[1]])?;
    Some(Point::new(x, y))
}

/// Weighted linear least squares over all differenced equations
fn weighted_linear(ranged: &[RangedAnchor]) -> Option<Point> {
    let mut ne = NormalEquations::default();
    for (row, b, w) in differenced_rows(ranged) {
        ne.add_row(row, b, w);
    }
    let [x, y] = ne.solve()?;
    Some(Point::new(x, y))
}

fn differenced_rows(ranged: &[RangedAnchor]) -> impl Iterator<Item = ([f64; 2], f64, f64)> + '_ {
    let first = ranged[0];
    let (x0, y0, r0) = (first.position.x, first.position.y, first.range);
    ranged[1..].iter().map(move |r| {
        let (xi, yi, ri) = (r.position.x, r.position.y, r.range);
        let row = [2.0 * (xi - x0), 2.0 * (yi - y0)];
        let b = r0 * r0 - ri * ri - x0 * x0 + xi * xi - y0 * y0 + yi * yi;
        (row, b, r.weight)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Anchor, Readings};
    use crate::ranging::{EnvironmentConfig, PathLossConfig};

    fn setup(anchors: &[(&str, f64, f64)]) -> Trilaterator {
        let registry = Arc::new(AnchorRegistry::new());
        for (id, x, y) in anchors {
            registry.register(Anchor::new(*id, Point::new(*x, *y))).unwrap();
        }
        Trilaterator::new(
            TrilaterationConfig::default(),
            registry,
            Arc::new(PathLossModel::new(PathLossConfig::default()).unwrap()),
            Arc::new(EnvironmentModel::new(EnvironmentConfig::default()).unwrap()),
        )
    }

    fn noiseless(tri: &Trilaterator, target: Point) -> Readings {
        tri.anchors
            .snapshot()
            .into_iter()
            .map(|a| {
                let d = target.distance_to(&a.position);
                (a.id, tri.path_loss.expected_rssi(d, -59.0, 2.0))
            })
            .collect()
    }

    #[test]
    fn test_square_recovers_center() {
        let tri = setup(&[("a", 0.0, 0.0), ("b", 10.0, 0.0), ("c", 10.0, 10.0), ("d", 0.0, 10.0)]);
        let readings = noiseless(&tri, Point::new(5.0, 5.0));
        let est = tri.estimate(&EstimateInput { readings: &readings, timestamp: 0 });
        assert!(est.location.distance_to(&Point::new(5.0, 5.0)) < 0.5, "{}", est.location);
        assert!(!est.is_degraded());
        assert!(est.confidence > 0.0);
    }

    #[test]
    fn test_three_anchor_closed_form() {
        let tri = setup(&[("a", 0.0, 0.0), ("b", 8.0, 0.0), ("c", 0.0, 6.0)]);
        let target = Point::new(3.0, 2.0);
        let readings = noiseless(&tri, target);
        let est = tri.estimate(&EstimateInput { readings: &readings, timestamp: 0 });
        assert!(est.location.distance_to(&target) < 1e-6, "{}", est.location);
    }

    #[test]
    fn test_off_center_with_five_anchors() {
        let tri = setup(&[
            ("a", 0.0, 0.0),
            ("b", 12.0, 0.0),
            ("c", 12.0, 9.0),
            ("d", 0.0, 9.0),
            ("e", 6.0, 4.0),
        ]);
        let target = Point::new(2.5, 7.0);
        let readings = noiseless(&tri, target);
        let est = tri.estimate(&EstimateInput { readings: &readings, timestamp: 0 });
        assert!(est.location.distance_to(&target) < 1e-3, "{}", est.location);
    }

    #[test]
    fn test_insufficient_anchors_degrades_to_centroid() {
        let tri = setup(&[("a", 0.0, 0.0), ("b", 4.0, 0.0), ("c", 4.0, 4.0)]);
        let readings: Readings = [("a".into(), -60.0), ("b".into(), -62.0), ("zz".into(), -50.0)]
            .into_iter()
            .collect();
        let est = tri.estimate(&EstimateInput { readings: &readings, timestamp: 0 });
        assert_eq!(est.location, Point::new(2.0, 0.0));
        assert_eq!(est.uncertainty, 100.0);
        assert_eq!(est.confidence, 0.0);
        assert_eq!(
            est.degradation,
            Some(Degradation::InsufficientAnchors { usable: 2, required: 3 })
        );
    }

    #[test]
    fn test_no_anchors_degrades_to_origin() {
        let tri = setup(&[]);
        let readings = Readings::new();
        let est = tri.estimate(&EstimateInput { readings: &readings, timestamp: 0 });
        assert_eq!(est.location, Point::ORIGIN);
        assert!(est.is_degraded());
    }

    #[test]
    fn test_collinear_anchors_do_not_panic() {
        let tri = setup(&[("a", 0.0, 0.0), ("b", 5.0, 0.0), ("c", 10.0, 0.0)]);
        let readings = noiseless(&tri, Point::new(5.0, 0.0));
        let est = tri.estimate(&EstimateInput { readings: &readings, timestamp: 0 });
        assert!(est.location.is_finite());
        assert!(est.confidence <= 1.0 && est.uncertainty >= 0.0);
    }

    #[test]
    fn test_weights_favor_strong_signals() {
        let tri = setup(&[("a_near", 0.0, 0.0), ("b_far", 30.0, 0.0)]);
        let readings: Readings = [("a_near".into(), -45.0), ("b_far".into(), -85.0)].into_iter().collect();
        let ranged = tri.ranged_anchors(&EstimateInput { readings: &readings, timestamp: 0 });
        assert_eq!(ranged.len(), 2);
        assert!(ranged[1].weight < ranged[0].weight);
        assert!(ranged[1].sigma > ranged[0].sigma);
    }
}
