//! Trend analysis over baselines and signal history
//!
//! Two conditions raise an `unusual_pattern` record with method `trend`:
//! a least-squares RSSI slope steeper than the configured decline, or a
//! baseline whose health puts the device at high or critical risk.

use log::debug;
use meshwatch_core::Timestamp;
use meshwatch_ml::{AnomalyKind, AnomalyRecord, DetectionMethod, DeviceHistory, Severity};
use serde_json::json;

use crate::baseline::{Baseline, RiskLevel};

/// Slope and health checks for one device
#[derive(Debug, Clone, Copy)]
pub struct TrendAnalyzer {
    window: usize,
    decline_db_per_sample: f64,
}

impl TrendAnalyzer {
    /// Analyzer fitting the newest `window` samples
    pub fn new(window: usize, decline_db_per_sample: f64) -> Self {
        Self {
            window: window.max(2),
            decline_db_per_sample,
        }
    }

    /// Records for every trend condition `history` and `baseline` meet
    pub fn analyze(&self, history: &DeviceHistory, baseline: Option<&Baseline>, now: Timestamp) -> Vec<AnomalyRecord> {
        let mut records = Vec::new();
        let device_id = history.device_id().clone();

        if history.signal().len() >= self.window {
            let slope = history.signal().slope(self.window);
            debug!("trend device={} slope={:.3}", device_id, slope);
            if slope < self.decline_db_per_sample {
                let ratio = slope / self.decline_db_per_sample;
                let severity = if ratio >= 4.0 {
                    Severity::High
                } else if ratio >= 2.0 {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                records.push(AnomalyRecord {
                    device_id: device_id.clone(),
                    kind: AnomalyKind::UnusualPattern,
                    severity,
                    score: slope,
                    confidence: (ratio / 4.0).min(1.0),
                    method: DetectionMethod::Trend,
                    description: format!(
                        "Signal of {} declining {:.2} dB per sample over the last {} samples",
                        device_id, -slope, self.window
                    ),
                    timestamp: now,
                    details: json!({ "slope": slope, "window": self.window }),
                });
            }
        }

        if let Some(baseline) = baseline {
            let risk = baseline.risk_level();
            if risk >= RiskLevel::High {
                let health = baseline.health_score();
                records.push(AnomalyRecord {
                    device_id: device_id.clone(),
                    kind: AnomalyKind::UnusualPattern,
                    severity: if risk == RiskLevel::Critical {
                        Severity::Critical
                    } else {
                        Severity::High
                    },
                    score: 1.0 - health,
                    confidence: 1.0 - health,
                    method: DetectionMethod::Trend,
                    description: format!("Health of {} is {:.0}%", device_id, health * 100.0),
                    timestamp: now,
                    details: json!({
                        "health": health,
                        "risk": risk,
                        "uptime": baseline.uptime,
                        "meanRssi": baseline.mean,
                    }),
                });
            }
        }
        records
    }
}
