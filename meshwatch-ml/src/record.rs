//! Anomaly records produced by the ensemble

use std::fmt;

use meshwatch_core::{DeviceId, Timestamp};
use serde::{Deserialize, Serialize};

/// What kind of anomaly was seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    SignalDrop,
    DeviceOffline,
    NewDevice,
    PropertyChange,
    TemporalAnomaly,
    UnusualPattern,
}

impl AnomalyKind {
    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            AnomalyKind::SignalDrop => "signal_drop",
            AnomalyKind::DeviceOffline => "device_offline",
            AnomalyKind::NewDevice => "new_device",
            AnomalyKind::PropertyChange => "property_change",
            AnomalyKind::TemporalAnomaly => "temporal_anomaly",
            AnomalyKind::UnusualPattern => "unusual_pattern",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which detector produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Statistical,
    IsolationForest,
    Temporal,
    Identity,
    /// Slope and health analysis over the baseline
    Trend,
    /// Missed-scan counting in the device registry
    Presence,
}

impl DetectionMethod {
    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            DetectionMethod::Statistical => "statistical",
            DetectionMethod::IsolationForest => "isolation_forest",
            DetectionMethod::Temporal => "temporal",
            DetectionMethod::Identity => "identity",
            DetectionMethod::Trend => "trend",
            DetectionMethod::Presence => "presence",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One detected anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    /// Affected device
    pub device_id: DeviceId,
    /// Anomaly kind
    pub kind: AnomalyKind,
    /// Severity
    pub severity: Severity,
    /// Detector score in the detector's own units (z-score, forest score, RMS error)
    pub score: f64,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    /// Detecting method
    pub method: DetectionMethod,
    /// Human-readable summary
    pub description: String,
    /// Evaluation time
    pub timestamp: Timestamp,
    /// Detector-specific detail (field names, flags, raw values)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}
