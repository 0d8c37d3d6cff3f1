//! Z-score detector over the rolling RSSI window
//!
//! ```text
//! z = |rssi - mean| / max(std_dev, min_std_dev)
//!
//! z ≤ t            → normal
//! t < z < 1.25·t   → low
//! 1.25·t ≤ z < 2·t → medium
//! z ≥ 2·t          → high
//! ```
//!
//! When the current hour of day already has enough samples, the smaller of
//! the rolling and seasonal z-scores is used, so a device that is always weak
//! at night does not alarm every night. A single-step fall of at least
//! `sudden_drop_db` fires on its own and is never reported below medium.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{AnomalyDetector, Detection};
use crate::{AnomalyKind, DetectionMethod, DeviceHistory, MlError, MlResult, Severity, Telemetry};

/// Statistical detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalConfig {
    /// History needed before the detector activates
    pub min_samples: usize,
    /// Z-score threshold
    pub z_threshold: f64,
    /// Floor for the standard deviation (dB)
    pub min_std_dev: f64,
    /// Samples in the current hour needed for seasonal scoring
    pub min_seasonal_samples: u64,
    /// Single-step decrease that counts as sudden (dB)
    pub sudden_drop_db: f64,
}

impl Default for StatisticalConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            z_threshold: 2.5,
            min_std_dev: 1.0,
            min_seasonal_samples: 5,
            sudden_drop_db: 20.0,
        }
    }
}

impl StatisticalConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> MlResult<()> {
        if self.min_samples < 2 {
            return Err(MlError::InvalidConfig("min_samples must be at least 2".into()));
        }
        if !(self.z_threshold > 0.0) || !(self.min_std_dev > 0.0) || !(self.sudden_drop_db > 0.0) {
            return Err(MlError::InvalidConfig(
                "z_threshold, min_std_dev and sudden_drop_db must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Rolling and seasonal z-score detector
#[derive(Debug, Clone)]
pub struct StatisticalDetector {
    config: StatisticalConfig,
}

impl StatisticalDetector {
    /// Create with validated configuration
    pub fn new(config: StatisticalConfig) -> MlResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn severity(&self, z: f64, sudden: bool) -> Severity {
        let t = self.config.z_threshold;
        let by_z = if z >= 2.0 * t {
            Severity::High
        } else if z >= 1.25 * t {
            Severity::Medium
        } else {
            Severity::Low
        };
        if sudden {
            by_z.max(Severity::Medium)
        } else {
            by_z
        }
    }
}

impl AnomalyDetector for StatisticalDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Statistical
    }

    fn detect(&self, history: &DeviceHistory, telemetry: &Telemetry) -> Detection {
        let Some(rssi) = telemetry.rssi else {
            return Detection::quiet(self.method(), AnomalyKind::SignalDrop, 0.0);
        };
        let signal = history.signal();
        if signal.len() < self.config.min_samples {
            return Detection::quiet(self.method(), AnomalyKind::SignalDrop, 0.0);
        }
        let (Some(mean), Some(std_dev)) = (signal.mean(), signal.std_dev()) else {
            return Detection::quiet(self.method(), AnomalyKind::SignalDrop, 0.0);
        };

        let rolling_z = (rssi - mean).abs() / std_dev.max(self.config.min_std_dev);
        let hour = history.hour_stats(telemetry.timestamp);
        let seasonal_z = (hour.count() >= self.config.min_seasonal_samples)
            .then(|| (rssi - hour.mean()).abs() / hour.std_dev().max(self.config.min_std_dev));
        let z = seasonal_z.map_or(rolling_z, |s| s.min(rolling_z));

        let sudden = signal
            .last()
            .map(|prev| prev.rssi - rssi >= self.config.sudden_drop_db)
            .unwrap_or(false);

        let kind = if rssi < mean {
            AnomalyKind::SignalDrop
        } else {
            AnomalyKind::UnusualPattern
        };
        let fired = z > self.config.z_threshold || sudden;
        debug!(
            "statistical device={} rssi={:.1} mean={:.1} z={:.2} sudden={} fired={}",
            telemetry.device_id, rssi, mean, z, sudden, fired
        );
        if !fired {
            return Detection::quiet(self.method(), kind, z);
        }

        let mut confidence = (z / (2.0 * self.config.z_threshold)).min(1.0);
        if sudden {
            confidence = confidence.max(0.5);
        }
        let direction = if kind == AnomalyKind::SignalDrop { "below" } else { "above" };
        Detection {
            method: self.method(),
            fired,
            score: z,
            confidence,
            kind,
            severity: self.severity(z, sudden),
            description: format!(
                "RSSI {:.1} dBm is {:.1} standard deviations {} the baseline {:.1} dBm",
                rssi, z, direction, mean
            ),
            details: json!({
                "rssi": rssi,
                "mean": mean,
                "std_dev": std_dev,
                "rolling_z": rolling_z,
                "seasonal_z": seasonal_z,
                "sudden": sudden,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_core::{time::MS_PER_MINUTE, DeviceId, Protocol};

    fn device() -> DeviceId {
        DeviceId::from_octets([2, 0, 0, 0, 0, 3])
    }

    fn history_of(values: &[f64]) -> DeviceHistory {
        let mut h = DeviceHistory::new(device());
        for (i, v) in values.iter().enumerate() {
            h.record(&sample(*v, i as u64));
        }
        h
    }

    fn sample(rssi: f64, minute: u64) -> Telemetry {
        Telemetry::new(device(), Protocol::Wifi, minute * MS_PER_MINUTE).with_rssi(rssi)
    }

    fn detector() -> StatisticalDetector {
        StatisticalDetector::new(StatisticalConfig::default()).unwrap()
    }

    #[test]
    fn test_inactive_below_min_samples() {
        let h = history_of(&[-60.0; 4]);
        let d = detector().detect(&h, &sample(-100.0, 4));
        assert!(!d.fired);
        assert_eq!(d.score, 0.0);
    }

    #[test]
    fn test_steady_signal_is_normal() {
        let h = history_of(&[-60.0; 50]);
        let d = detector().detect(&h, &sample(-60.0, 50));
        assert!(!d.fired);
        assert!(d.score.abs() < 1e-9);
    }

    #[test]
    fn test_severity_bands() {
        // Constant history: std floors at 1 dB so z equals the dB offset
        let h = history_of(&[-60.0; 10]);
        let det = detector();
        assert!(!det.detect(&h, &sample(-62.0, 10)).fired);

        let low = det.detect(&h, &sample(-63.0, 10));
        assert!(low.fired);
        assert_eq!(low.severity, Severity::Low);

        let medium = det.detect(&h, &sample(-64.0, 10));
        assert_eq!(medium.severity, Severity::Medium);

        let high = det.detect(&h, &sample(-66.0, 10));
        assert_eq!(high.severity, Severity::High);
        assert_eq!(high.kind, AnomalyKind::SignalDrop);
        assert_eq!(high.confidence, 1.0);

        let up = det.detect(&h, &sample(-50.0, 10));
        assert_eq!(up.kind, AnomalyKind::UnusualPattern);
    }

    #[test]
    fn test_sudden_drop_forces_medium() {
        // Noisy history: std ≈ 12 dB so a 22 dB step is under 2.5σ
        let values: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { -50.0 } else { -74.0 }).collect();
        let mut h = history_of(&values);
        h.record(&sample(-48.0, 20));
        let d = detector().detect(&h, &sample(-70.0, 21));
        assert!(d.fired);
        assert!(d.score < 2.5);
        assert_eq!(d.severity, Severity::Medium);
        assert_eq!(d.details["sudden"], true);
        assert!(d.confidence >= 0.5);
    }

    #[test]
    fn test_seasonal_score_tempers_rolling() {
        use meshwatch_core::time::MS_PER_HOUR;

        // Strong all day, fading through 02:00 to a low at 03:00 every day
        let mut h = DeviceHistory::new(device());
        for hour in 0..(6 * 24 + 3u64) {
            let rssi = match hour % 24 {
                2 => -62.0,
                3 => -72.0,
                other => -50.0 + (other % 2) as f64,
            };
            h.record(&Telemetry::new(device(), Protocol::Wifi, hour * MS_PER_HOUR).with_rssi(rssi));
        }
        // Rolling z alone would be about 4.2
        let mean = h.mean_rssi().unwrap();
        let std_dev = h.signal().std_dev().unwrap();
        assert!((-72.0 - mean).abs() / std_dev > 4.0);

        let probe = Telemetry::new(device(), Protocol::Wifi, (6 * 24 + 3) * MS_PER_HOUR).with_rssi(-72.0);
        let d = detector().detect(&h, &probe);
        assert!(!d.fired, "seasonal z should be ~0, got {}", d.score);
    }

    #[test]
    fn test_missing_rssi_is_quiet() {
        let h = history_of(&[-60.0; 10]);
        let d = detector().detect(&h, &Telemetry::new(device(), Protocol::Arp, 0));
        assert!(!d.fired);
    }

    #[test]
    fn test_config_validation() {
        let bad = StatisticalConfig {
            z_threshold: 0.0,
            ..Default::default()
        };
        assert!(StatisticalDetector::new(bad).is_err());
    }
}
