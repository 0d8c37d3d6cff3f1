//! Anomaly detectors
//!
//! Each detector reads a [`DeviceHistory`] plus the sample under test and
//! returns a [`Detection`], fired or not. The set of detectors is closed:
//! [`Detector`] dispatches to the four concrete kinds.

pub mod identity;
pub mod isolation;
pub mod statistical;
pub mod temporal;

use meshwatch_core::{DeviceId, Timestamp};

pub use identity::IdentityDetector;
pub use isolation::IsolationDetector;
pub use statistical::{StatisticalConfig, StatisticalDetector};
pub use temporal::{TemporalConfig, TemporalDetector, TemporalModel};

use crate::{AnomalyKind, AnomalyRecord, DetectionMethod, DeviceHistory, Severity, Telemetry};

/// Outcome of one detector on one sample
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Detector that ran
    pub method: DetectionMethod,
    /// Whether the sample is anomalous
    pub fired: bool,
    /// Raw score in detector units
    pub score: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Kind reported when fired
    pub kind: AnomalyKind,
    /// Severity reported when fired
    pub severity: Severity,
    /// Human-readable summary
    pub description: String,
    /// Detector-specific detail
    pub details: serde_json::Value,
}

impl Detection {
    /// A detector that looked and found nothing
    pub fn quiet(method: DetectionMethod, kind: AnomalyKind, score: f64) -> Self {
        Self {
            method,
            fired: false,
            score,
            confidence: 0.0,
            kind,
            severity: Severity::Low,
            description: String::new(),
            details: serde_json::Value::Null,
        }
    }

    /// Record for a fired detection
    pub fn to_record(&self, device_id: &DeviceId, timestamp: Timestamp) -> Option<AnomalyRecord> {
        if !self.fired {
            return None;
        }
        Some(AnomalyRecord {
            device_id: device_id.clone(),
            kind: self.kind,
            severity: self.severity,
            score: self.score,
            confidence: self.confidence,
            method: self.method,
            description: self.description.clone(),
            timestamp,
            details: self.details.clone(),
        })
    }
}

/// Capability shared by every detector
pub trait AnomalyDetector {
    /// Method tag carried on records
    fn method(&self) -> DetectionMethod;

    /// Evaluate `telemetry` against history that does not yet include it
    fn detect(&self, history: &DeviceHistory, telemetry: &Telemetry) -> Detection;
}

/// Closed set of detectors
#[derive(Debug, Clone)]
pub enum Detector {
    Statistical(StatisticalDetector),
    Isolation(IsolationDetector),
    Temporal(TemporalDetector),
    Identity(IdentityDetector),
}

impl AnomalyDetector for Detector {
    fn method(&self) -> DetectionMethod {
        match self {
            Detector::Statistical(d) => d.method(),
            Detector::Isolation(d) => d.method(),
            Detector::Temporal(d) => d.method(),
            Detector::Identity(d) => d.method(),
        }
    }

    fn detect(&self, history: &DeviceHistory, telemetry: &Telemetry) -> Detection {
        match self {
            Detector::Statistical(d) => d.detect(history, telemetry),
            Detector::Isolation(d) => d.detect(history, telemetry),
            Detector::Temporal(d) => d.detect(history, telemetry),
            Detector::Identity(d) => d.detect(history, telemetry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_detection_has_no_record() {
        let d = Detection::quiet(DetectionMethod::Temporal, AnomalyKind::TemporalAnomaly, 0.1);
        assert!(d.to_record(&DeviceId::from_octets([0; 6]), 0).is_none());
    }

    #[test]
    fn test_fired_detection_converts() {
        let d = Detection {
            fired: true,
            confidence: 0.7,
            severity: Severity::High,
            description: "z=9.0".into(),
            ..Detection::quiet(DetectionMethod::Statistical, AnomalyKind::SignalDrop, 9.0)
        };
        let record = d.to_record(&DeviceId::from_octets([1; 6]), 77).unwrap();
        assert_eq!(record.kind, AnomalyKind::SignalDrop);
        assert_eq!(record.timestamp, 77);
        assert_eq!(record.score, 9.0);
    }
}
