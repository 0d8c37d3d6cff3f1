//! Isolation-forest detector over the telemetry feature vector

use log::warn;
use serde_json::json;

use super::{AnomalyDetector, Detection};
use crate::{
    AnomalyKind, DetectionMethod, DeviceHistory, FeatureVector, IsolationForest, Severity, Telemetry,
};

/// Scores each sample with an [`IsolationForest`]
#[derive(Debug, Clone)]
pub struct IsolationDetector {
    forest: IsolationForest,
}

impl IsolationDetector {
    /// Wrap a forest, fitted or not
    pub fn new(forest: IsolationForest) -> Self {
        Self { forest }
    }

    /// The wrapped forest
    pub fn forest(&self) -> &IsolationForest {
        &self.forest
    }

    /// Swap in a new forest
    pub fn replace_forest(&mut self, forest: IsolationForest) {
        self.forest = forest;
    }
}

impl AnomalyDetector for IsolationDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::IsolationForest
    }

    fn detect(&self, history: &DeviceHistory, telemetry: &Telemetry) -> Detection {
        let quiet = |score| Detection::quiet(DetectionMethod::IsolationForest, AnomalyKind::UnusualPattern, score);
        let features = FeatureVector::extract(telemetry, history.last_seen());
        let score = match features.to_sample().and_then(|s| self.forest.anomaly_score(&s)) {
            Ok(score) => score,
            Err(e) => {
                warn!("isolation forest skipped device={} error={}", telemetry.device_id, e);
                return quiet(0.0);
            }
        };

        let threshold = self.forest.config().anomaly_threshold;
        if !score.is_anomaly(threshold) {
            return quiet(score.score);
        }

        let severity = if score.score >= 0.8 {
            Severity::High
        } else if score.score >= 0.7 {
            Severity::Medium
        } else {
            Severity::Low
        };
        Detection {
            method: self.method(),
            fired: true,
            score: score.score,
            confidence: score.score,
            kind: AnomalyKind::UnusualPattern,
            severity,
            description: format!(
                "Behavior isolates in {:.1} splits on average (score {:.2})",
                score.avg_path_length, score.score
            ),
            details: json!({
                "rssi": features.rssi,
                "online": features.online,
                "secs_since_last_seen": features.secs_since_last_seen,
                "type_score": features.type_score,
                "avg_path_length": score.avg_path_length,
                "trees": score.num_trees,
            }),
        }
    }
}
