//! Monitor configuration
//!
//! ```json
//! {
//!   "locator": { "knn": { "k": 3 } },
//!   "ensemble": { "statistical": { "z_threshold": 3.0 } },
//!   "monitor": {
//!     "discovery_period_secs": 60,
//!     "cooldowns": { "default_secs": 600 }
//!   }
//! }
//! ```
//!
//! Every section falls back to defaults, so an empty object is a valid file.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use meshwatch_core::LocatorConfig;
use meshwatch_ml::{AnomalyKind, EnsembleConfig};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

/// Alert cooldown windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Window applied to kinds without an override
    pub default_secs: u64,
    /// Per-kind windows
    pub per_kind: BTreeMap<AnomalyKind, u64>,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        let mut per_kind = BTreeMap::new();
        per_kind.insert(AnomalyKind::NewDevice, 24 * 60 * 60);
        Self {
            default_secs: 5 * 60,
            per_kind,
        }
    }
}

impl CooldownConfig {
    /// Cooldown for `kind` in milliseconds
    pub fn window_ms(&self, kind: AnomalyKind) -> u64 {
        self.per_kind.get(&kind).copied().unwrap_or(self.default_secs) * 1_000
    }
}

/// Scheduler and alerting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Discovery scan cadence
    pub discovery_period_secs: u64,
    /// Telemetry poll cadence
    pub telemetry_period_secs: u64,
    /// Anomaly analysis cadence
    pub anomaly_period_secs: u64,
    /// Trend analysis cadence
    pub trend_period_secs: u64,
    /// Stale-device pruning cadence
    pub prune_period_secs: u64,
    /// Alert delivery cadence
    pub delivery_period_secs: u64,
    /// Upper bound of the random delay added before each iteration
    pub jitter_ms: u64,
    /// Consecutive missed scans before a device is marked offline
    pub offline_after_misses: u32,
    /// Alert cooldown windows
    pub cooldowns: CooldownConfig,
    /// Devices unseen for longer than this are forgotten
    pub retention_secs: u64,
    /// Time an in-flight iteration may run after shutdown is requested
    pub shutdown_grace_ms: u64,
    /// Collection window for one discovery protocol
    pub discovery_timeout_ms: u64,
    /// Smallest baseline smoothing factor
    pub baseline_min_alpha: f64,
    /// Recent samples used for the trend slope
    pub trend_window: usize,
    /// Slope (dB per sample) below which the signal counts as declining
    pub trend_decline_db_per_sample: f64,
    /// Anomaly ticks between forest refits, 0 disables refitting
    pub forest_refit_ticks: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            discovery_period_secs: 30,
            telemetry_period_secs: 15,
            anomaly_period_secs: 60,
            trend_period_secs: 60,
            prune_period_secs: 60 * 60,
            delivery_period_secs: 10,
            jitter_ms: 500,
            offline_after_misses: 3,
            cooldowns: CooldownConfig::default(),
            retention_secs: 7 * 24 * 60 * 60,
            shutdown_grace_ms: 5_000,
            discovery_timeout_ms: 4_000,
            baseline_min_alpha: 0.01,
            trend_window: 20,
            trend_decline_db_per_sample: -0.5,
            forest_refit_ticks: 10,
        }
    }
}

impl MonitorConfig {
    /// Set the hysteresis threshold
    pub fn with_offline_after(mut self, misses: u32) -> Self {
        self.offline_after_misses = misses;
        self
    }

    /// Set the default cooldown
    pub fn with_default_cooldown(mut self, secs: u64) -> Self {
        self.cooldowns.default_secs = secs;
        self
    }

    /// Set the scheduler jitter
    pub fn with_jitter(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> MonitorResult<()> {
        let periods = [
            ("discovery_period_secs", self.discovery_period_secs),
            ("telemetry_period_secs", self.telemetry_period_secs),
            ("anomaly_period_secs", self.anomaly_period_secs),
            ("trend_period_secs", self.trend_period_secs),
            ("prune_period_secs", self.prune_period_secs),
            ("delivery_period_secs", self.delivery_period_secs),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, secs)| *secs == 0) {
            return Err(MonitorError::Config(format!("{} must be positive", name)));
        }
        if self.offline_after_misses == 0 {
            return Err(MonitorError::Config("offline_after_misses must be at least 1".into()));
        }
        if self.discovery_timeout_ms == 0 {
            return Err(MonitorError::Config("discovery_timeout_ms must be positive".into()));
        }
        if !(self.baseline_min_alpha > 0.0 && self.baseline_min_alpha <= 1.0) {
            return Err(MonitorError::Config("baseline_min_alpha must be in (0, 1]".into()));
        }
        if self.trend_window < 2 {
            return Err(MonitorError::Config("trend_window must be at least 2".into()));
        }
        if !self.trend_decline_db_per_sample.is_finite() || self.trend_decline_db_per_sample >= 0.0 {
            return Err(MonitorError::Config("trend_decline_db_per_sample must be negative".into()));
        }
        Ok(())
    }

    /// Discovery collection window
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// Shutdown grace period
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Retention window in milliseconds
    pub fn retention_ms(&self) -> u64 {
        self.retention_secs.saturating_mul(1_000)
    }
}

/// Complete configuration of a monitoring deployment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub locator: LocatorConfig,
    pub ensemble: EnsembleConfig,
    pub monitor: MonitorConfig,
}

impl Settings {
    /// Validate every section
    pub fn validate(&self) -> MonitorResult<()> {
        self.locator.validate()?;
        self.ensemble.validate()?;
        self.monitor.validate()
    }

    /// Parse and validate JSON
    pub fn from_json_str(json: &str) -> MonitorResult<Self> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| MonitorError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MonitorError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        log::info!("loading monitor settings from {}", path.as_ref().display());
        Self::from_json_str(&raw)
    }
}
