//! Weighted vote over the four detectors
//!
//! ```text
//! risk = Σ wᵢ · confidenceᵢ · firedᵢ / Σ wᵢ
//! ```
//!
//! Detectors that stay quiet pull the risk towards zero. Recommendations
//! are fixed strings chosen from which detectors fired, so the same inputs
//! always produce the same advice.

use log::{debug, info};
use meshwatch_core::{DeviceId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::{
    detectors::{AnomalyDetector, Detection, Detector, IdentityDetector, IsolationDetector},
    forest::{ForestModel, ForestStats},
    AnomalyKind, AnomalyRecord, DetectionMethod, DeviceHistory, ForestConfig, IsolationForest, MlError,
    MlResult, Sample, Severity, StatisticalConfig, StatisticalDetector, Telemetry, TemporalConfig,
    TemporalDetector,
};

/// Advice attached when the device's mean signal is weak
pub const POOR_SIGNAL_ADVICE: &str = "Improve device positioning or add WiFi extender";

/// Vote weight per detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorWeights {
    pub statistical: f64,
    pub isolation_forest: f64,
    pub temporal: f64,
    pub identity: f64,
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            statistical: 1.0,
            isolation_forest: 1.0,
            temporal: 1.0,
            identity: 1.0,
        }
    }
}

impl DetectorWeights {
    fn for_method(&self, method: DetectionMethod) -> f64 {
        match method {
            DetectionMethod::Statistical => self.statistical,
            DetectionMethod::IsolationForest => self.isolation_forest,
            DetectionMethod::Temporal => self.temporal,
            DetectionMethod::Identity => self.identity,
            DetectionMethod::Trend | DetectionMethod::Presence => 0.0,
        }
    }

    fn validate(&self) -> MlResult<()> {
        let all = [self.statistical, self.isolation_forest, self.temporal, self.identity];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(MlError::InvalidConfig("detector weights must be finite and non-negative".into()));
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err(MlError::InvalidConfig("at least one detector weight must be positive".into()));
        }
        Ok(())
    }
}

/// Ensemble configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub statistical: StatisticalConfig,
    pub temporal: TemporalConfig,
    pub forest: ForestConfig,
    /// Pre-built trees; when absent the forest starts empty until fitted
    pub forest_model: Option<ForestModel>,
    pub weights: DetectorWeights,
    /// Mean RSSI below which positioning advice is added (dBm)
    pub poor_signal_dbm: f64,
    /// Feature vectors needed before the forest is rebuilt from history
    pub min_training_samples: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            statistical: StatisticalConfig::default(),
            temporal: TemporalConfig::default(),
            forest: ForestConfig::default(),
            forest_model: None,
            weights: DetectorWeights::default(),
            poor_signal_dbm: -70.0,
            min_training_samples: 32,
        }
    }
}

impl EnsembleConfig {
    /// Check every nested config
    pub fn validate(&self) -> MlResult<()> {
        self.statistical.validate()?;
        self.forest.validate()?;
        self.weights.validate()?;
        if self.min_training_samples < crate::forest::MIN_TRAINING_SAMPLES {
            return Err(MlError::InvalidConfig(format!(
                "min_training_samples must be at least {}",
                crate::forest::MIN_TRAINING_SAMPLES
            )));
        }
        Ok(())
    }
}

/// Result of evaluating one sample
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleReport {
    /// Evaluated device
    pub device_id: DeviceId,
    /// Sample time
    pub timestamp: Timestamp,
    /// Weighted vote in [0, 1]
    pub risk_score: f64,
    /// Every detector's outcome, fired or not
    pub detections: Vec<Detection>,
    /// Records for the detectors that fired
    pub records: Vec<AnomalyRecord>,
    /// Operator advice, deduplicated, in detector order
    pub recommendations: Vec<String>,
}

impl EnsembleReport {
    /// True if any detector fired
    pub fn is_anomalous(&self) -> bool {
        !self.records.is_empty()
    }

    /// Worst severity among the records
    pub fn highest_severity(&self) -> Option<Severity> {
        self.records.iter().map(|r| r.severity).max()
    }
}

/// The four detectors and their vote
#[derive(Debug, Clone)]
pub struct AnomalyEnsemble {
    config: EnsembleConfig,
    detectors: Vec<Detector>,
}

impl AnomalyEnsemble {
    /// Build every detector from configuration
    pub fn new(config: EnsembleConfig) -> MlResult<Self> {
        config.validate()?;
        let forest = match config.forest_model.clone() {
            Some(model) => IsolationForest::from_model(config.forest.clone(), model)?,
            None => IsolationForest::new(config.forest.clone())?,
        };
        let detectors = vec![
            Detector::Statistical(StatisticalDetector::new(config.statistical.clone())?),
            Detector::Isolation(IsolationDetector::new(forest)),
            Detector::Temporal(TemporalDetector::new(config.temporal.clone())?),
            Detector::Identity(IdentityDetector),
        ];
        Ok(Self { config, detectors })
    }

    /// Ensemble configuration
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Evaluate `telemetry` against history that does not yet include it
    pub fn evaluate(&self, history: &DeviceHistory, telemetry: &Telemetry) -> EnsembleReport {
        let detections: Vec<Detection> = self.detectors.iter().map(|d| d.detect(history, telemetry)).collect();

        let total_weight: f64 = detections
            .iter()
            .map(|d| self.config.weights.for_method(d.method))
            .sum();
        let fired_weight: f64 = detections
            .iter()
            .filter(|d| d.fired)
            .map(|d| self.config.weights.for_method(d.method) * d.confidence)
            .sum();
        let risk_score = if total_weight > 0.0 {
            (fired_weight / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let records: Vec<AnomalyRecord> = detections
            .iter()
            .filter_map(|d| d.to_record(&telemetry.device_id, telemetry.timestamp))
            .collect();

        let mut recommendations: Vec<String> = Vec::new();
        for advice in detections.iter().filter(|d| d.fired).filter_map(recommendation) {
            if !recommendations.iter().any(|r| r == advice) {
                recommendations.push(advice.to_string());
            }
        }
        if history.mean_rssi().is_some_and(|m| m < self.config.poor_signal_dbm) {
            recommendations.push(POOR_SIGNAL_ADVICE.to_string());
        }

        debug!(
            "ensemble device={} risk={:.3} fired={}",
            telemetry.device_id,
            risk_score,
            records.len()
        );
        EnsembleReport {
            device_id: telemetry.device_id.clone(),
            timestamp: telemetry.timestamp,
            risk_score,
            detections,
            records,
            recommendations,
        }
    }

    /// Evaluate, then commit the sample to `history`
    pub fn evaluate_and_record(&self, history: &mut DeviceHistory, telemetry: &Telemetry) -> EnsembleReport {
        let report = self.evaluate(history, telemetry);
        history.record(telemetry);
        report
    }

    /// Rebuild the isolation forest from historical feature vectors
    pub fn fit_forest(&mut self, samples: &[Sample]) -> MlResult<()> {
        if samples.len() < self.config.min_training_samples {
            return Err(MlError::InsufficientData {
                needed: self.config.min_training_samples,
                got: samples.len(),
            });
        }
        let forest = IsolationForest::build(self.config.forest.clone(), samples)?;
        for detector in &mut self.detectors {
            if let Detector::Isolation(isolation) = detector {
                isolation.replace_forest(forest.clone());
            }
        }
        info!("ensemble forest rebuilt samples={}", samples.len());
        Ok(())
    }

    /// Statistics of the current forest
    pub fn forest_stats(&self) -> Option<ForestStats> {
        self.detectors.iter().find_map(|d| match d {
            Detector::Isolation(isolation) => Some(isolation.forest().stats()),
            _ => None,
        })
    }
}

/// Advice for one fired detection
pub fn recommendation(detection: &Detection) -> Option<&'static str> {
    let advice = match (detection.method, detection.kind) {
        (DetectionMethod::Statistical, AnomalyKind::SignalDrop) => {
            "Check device power and look for new obstructions near the device"
        }
        (DetectionMethod::Statistical, _) => "Verify the device has not been moved or replaced",
        (DetectionMethod::IsolationForest, _) => "Review device logs for error patterns",
        (DetectionMethod::Temporal, _) => "Investigate network stability issues",
        (DetectionMethod::Identity, AnomalyKind::NewDevice) => "Verify the new device is authorized on this network",
        (DetectionMethod::Identity, _) => {
            "Possible address spoofing: confirm the device identity and consider isolating it"
        }
        (DetectionMethod::Trend, _) | (DetectionMethod::Presence, _) => return None,
    };
    Some(advice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_core::{time::MS_PER_MINUTE, DeviceType, Protocol};

    fn device() -> DeviceId {
        DeviceId::from_octets([2, 0, 0, 0, 0, 8])
    }

    fn sample(rssi: f64, minute: u64) -> Telemetry {
        Telemetry::new(device(), Protocol::Wifi, minute * MS_PER_MINUTE)
            .with_rssi(rssi)
            .with_vendor("Netgear")
            .with_type(DeviceType::Router)
    }

    fn ensemble() -> AnomalyEnsemble {
        AnomalyEnsemble::new(EnsembleConfig::default()).unwrap()
    }

    #[test]
    fn test_new_device_only() {
        let report = ensemble().evaluate(&DeviceHistory::new(device()), &sample(-55.0, 0));
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].kind, AnomalyKind::NewDevice);
        // 0.3 confidence out of four equal weights
        assert!((report.risk_score - 0.075).abs() < 1e-12);
        assert_eq!(report.recommendations, vec!["Verify the new device is authorized on this network"]);
    }

    #[test]
    fn test_steady_device_is_quiet() {
        let e = ensemble();
        let mut h = DeviceHistory::new(device());
        for i in 0..30 {
            e.evaluate_and_record(&mut h, &sample(-55.0, i));
        }
        let report = e.evaluate(&h, &sample(-55.0, 30));
        assert!(!report.is_anomalous());
        assert_eq!(report.risk_score, 0.0);
        assert!(report.recommendations.is_empty());
        assert_eq!(report.detections.len(), 4);
    }

    #[test]
    fn test_drop_raises_risk_and_advice() {
        let e = ensemble();
        let mut h = DeviceHistory::new(device());
        for i in 0..30 {
            e.evaluate_and_record(&mut h, &sample(-50.0, i));
        }
        let report = e.evaluate(&h, &sample(-90.0, 30));
        let drop = report
            .records
            .iter()
            .find(|r| r.method == DetectionMethod::Statistical)
            .unwrap();
        assert_eq!(drop.kind, AnomalyKind::SignalDrop);
        assert_eq!(drop.severity, Severity::High);
        assert_eq!(report.highest_severity(), Some(Severity::High));
        assert!(report.risk_score >= 0.25);
        assert_eq!(
            report.recommendations[0],
            "Check device power and look for new obstructions near the device"
        );
    }

    #[test]
    fn test_weak_history_adds_positioning_advice() {
        let e = ensemble();
        let mut h = DeviceHistory::new(device());
        for i in 0..10 {
            e.evaluate_and_record(&mut h, &sample(-78.0, i));
        }
        let report = e.evaluate(&h, &sample(-78.0, 10));
        assert_eq!(report.recommendations, vec![POOR_SIGNAL_ADVICE]);
    }

    #[test]
    fn test_fit_forest_needs_enough_samples() {
        let mut e = ensemble();
        let few = vec![Sample::new(&[-50.0, 1.0, 30.0, 0.9]).unwrap(); 5];
        assert!(matches!(e.fit_forest(&few), Err(MlError::InsufficientData { needed: 32, got: 5 })));
        assert_eq!(e.forest_stats().unwrap().num_trees, 0);

        let many: Vec<Sample> = (0..64)
            .map(|i| Sample::new(&[-50.0 - (i % 5) as f64, 1.0, 60.0, 0.9]).unwrap())
            .collect();
        e.fit_forest(&many).unwrap();
        assert_eq!(e.forest_stats().unwrap().num_trees, 100);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let config = EnsembleConfig {
            weights: DetectorWeights {
                statistical: 0.0,
                isolation_forest: 0.0,
                temporal: 0.0,
                identity: 0.0,
            },
            ..Default::default()
        };
        assert!(AnomalyEnsemble::new(config).is_err());
    }
}
