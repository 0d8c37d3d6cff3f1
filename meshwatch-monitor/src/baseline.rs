//! Per-device signal baselines and health scoring
//!
//! Baselines are exponentially smoothed with a factor that shrinks as the
//! baseline matures, `α = max(α_min, 0.1 / √n)`, so an established device
//! drifts slowly while a new one converges quickly. The first sample seeds
//! the mean directly.

use std::collections::HashMap;

use meshwatch_core::{DeviceId, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Mean RSSI below which the health score drops by 0.2 (dBm)
const WEAK_SIGNAL_DBM: f64 = -70.0;

/// Mean RSSI below which the health score drops by 0.1 (dBm)
const FAIR_SIGNAL_DBM: f64 = -60.0;

/// Standard deviation above which the signal counts as unstable (dB)
const UNSTABLE_STD_DEV_DB: f64 = 10.0;

/// Maintenance risk derived from the health score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Level for a health score in `[0, 1]`
    pub fn from_health(health: f64) -> Self {
        let percent = health * 100.0;
        if percent >= 80.0 {
            RiskLevel::Low
        } else if percent >= 60.0 {
            RiskLevel::Medium
        } else if percent >= 30.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    /// Maintenance advice, none when the device is healthy
    pub fn recommendation(&self) -> Option<&'static str> {
        match self {
            RiskLevel::Critical => Some("Schedule immediate maintenance inspection"),
            RiskLevel::High => Some("Plan preventive maintenance within 1 week"),
            RiskLevel::Medium => Some("Monitor closely for degradation"),
            RiskLevel::Low => None,
        }
    }
}

/// Smoothed signal and uptime statistics of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    /// Smoothed RSSI mean (dBm)
    pub mean: f64,
    /// Smoothed RSSI variance (dB²)
    pub variance: f64,
    /// RSSI samples folded in
    pub samples: u64,
    /// Smoothed fraction of observations that found the device online
    pub uptime: f64,
    /// Last update
    pub updated_at: Timestamp,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            mean: 0.0,
            variance: 0.0,
            samples: 0,
            uptime: 1.0,
            updated_at: 0,
        }
    }
}

impl Baseline {
    /// Smoothing factor for the next sample
    pub fn alpha(&self, min_alpha: f64) -> f64 {
        let n = (self.samples + 1) as f64;
        (0.1 / n.sqrt()).clamp(min_alpha, 1.0)
    }

    /// Fold in one observation
    pub fn update(&mut self, rssi: Option<f64>, online: bool, timestamp: Timestamp, min_alpha: f64) {
        let alpha = self.alpha(min_alpha);
        if let Some(x) = rssi.filter(|r| r.is_finite()) {
            if self.samples == 0 {
                self.mean = x;
                self.variance = 0.0;
            } else {
                let delta = x - self.mean;
                self.mean += alpha * delta;
                self.variance = (1.0 - alpha) * (self.variance + alpha * delta * delta);
            }
            self.samples += 1;
        }
        let up = if online { 1.0 } else { 0.0 };
        self.uptime = alpha * up + (1.0 - alpha) * self.uptime;
        self.updated_at = timestamp;
    }

    /// Smoothed RSSI standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance.max(0.0).sqrt()
    }

    /// Health score in `[0, 1]`
    pub fn health_score(&self) -> f64 {
        let mut health = 1.0;
        if self.samples > 0 {
            if self.mean < WEAK_SIGNAL_DBM {
                health -= 0.2;
            } else if self.mean < FAIR_SIGNAL_DBM {
                health -= 0.1;
            }
            if self.std_dev() > UNSTABLE_STD_DEV_DB {
                health -= 0.15;
            }
        }
        (health * self.uptime).clamp(0.0, 1.0)
    }

    /// Risk level of the current health score
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_health(self.health_score())
    }
}

/// Baselines keyed by device
pub struct BaselineStore {
    min_alpha: f64,
    baselines: RwLock<HashMap<DeviceId, Baseline>>,
}

impl BaselineStore {
    /// Empty store
    pub fn new(min_alpha: f64) -> Self {
        Self {
            min_alpha,
            baselines: RwLock::new(HashMap::new()),
        }
    }

    /// Fold one observation into the device's baseline
    pub fn update(&self, device: &DeviceId, rssi: Option<f64>, online: bool, timestamp: Timestamp) -> Baseline {
        let mut baselines = self.baselines.write();
        let baseline = baselines.entry(device.clone()).or_default();
        baseline.update(rssi, online, timestamp, self.min_alpha);
        baseline.clone()
    }

    /// Start the device over, used when it comes back after an outage
    pub fn reset(&self, device: &DeviceId) {
        self.baselines.write().remove(device);
    }

    /// Baseline of one device
    pub fn get(&self, device: &DeviceId) -> Option<Baseline> {
        self.baselines.read().get(device).cloned()
    }

    /// Every baseline, ordered by device
    pub fn snapshot(&self) -> Vec<(DeviceId, Baseline)> {
        let mut all: Vec<(DeviceId, Baseline)> = self
            .baselines
            .read()
            .iter()
            .map(|(id, b)| (id.clone(), b.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drop a device
    pub fn remove(&self, device: &DeviceId) -> bool {
        self.baselines.write().remove(device).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceId {
        DeviceId::from_octets([2, 0, 0, 0, 2, 1])
    }

    #[test]
    fn test_first_sample_seeds_mean() {
        let mut b = Baseline::default();
        b.update(Some(-55.0), true, 1, 0.01);
        assert_eq!(b.mean, -55.0);
        assert_eq!(b.samples, 1);
        assert_eq!(b.health_score(), 1.0);
    }

    #[test]
    fn test_alpha_shrinks_with_maturity() {
        let mut b = Baseline::default();
        let early = b.alpha(0.001);
        for i in 0..100 {
            b.update(Some(-60.0), true, i, 0.001);
        }
        assert!(b.alpha(0.001) < early);
        assert!((b.alpha(0.001) - 0.1 / 101f64.sqrt()).abs() < 1e-12);
        // The floor wins once 0.1/√n drops below it
        assert_eq!(b.alpha(0.05), 0.05);
    }

    #[test]
    fn test_mean_moves_towards_new_level() {
        let mut b = Baseline::default();
        b.update(Some(-50.0), true, 0, 0.01);
        b.update(Some(-90.0), true, 1, 0.01);
        assert!(b.mean < -50.0 && b.mean > -60.0);
        assert!(b.variance > 0.0);
    }

    #[test]
    fn test_health_and_risk() {
        let weak = Baseline {
            mean: -75.0,
            variance: 144.0,
            samples: 10,
            uptime: 1.0,
            updated_at: 0,
        };
        assert!((weak.health_score() - 0.65).abs() < 1e-12);
        assert_eq!(weak.risk_level(), RiskLevel::Medium);

        let flaky = Baseline { uptime: 0.4, ..weak.clone() };
        assert_eq!(flaky.risk_level(), RiskLevel::Critical);
        assert_eq!(
            flaky.risk_level().recommendation(),
            Some("Schedule immediate maintenance inspection")
        );
        assert_eq!(RiskLevel::from_health(0.5), RiskLevel::High);
        assert_eq!(RiskLevel::Low.recommendation(), None);
    }

    #[test]
    fn test_offline_observations_lower_uptime() {
        let store = BaselineStore::new(0.01);
        store.update(&device(), Some(-50.0), true, 0);
        let after = store.update(&device(), None, false, 1);
        assert!(after.uptime < 1.0);
        assert_eq!(after.samples, 1);

        store.reset(&device());
        assert!(store.get(&device()).is_none());
    }
}
