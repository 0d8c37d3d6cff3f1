//! Environmental RSSI correction
//!
//! The correction is added to a raw reading before the path-loss formula:
//!
//! ```text
//! correction_db = shadowing[anchor]
//!               + occupancy_loss_db · hour_multiplier[h] · day_multiplier[d]
//! ```
//!
//! - **Shadowing** is learned per anchor during calibration: each calibration
//!   reading taken at a surveyed location is compared with what the model
//!   expects at that distance, and an EWMA of the residual is kept.
//! - **Occupancy** models bodies absorbing signal during busy hours. The loss
//!   is zero unless configured, so the correction defaults to pure shadowing.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};
use crate::geometry::AnchorId;
use crate::time::{day_of_week, hour_of_day, Timestamp};

/// Environment model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Peak attenuation from occupancy (dB)
    pub occupancy_loss_db: f64,
    /// 24 multipliers, index = UTC hour
    pub hour_multipliers: Vec<f64>,
    /// 7 multipliers, index 0 = Monday
    pub day_multipliers: Vec<f64>,
    /// EWMA factor for the shadowing residual
    pub shadowing_alpha: f64,
    /// Shadowing magnitude cap (dB)
    pub max_shadowing_db: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            occupancy_loss_db: 0.0,
            hour_multipliers: vec![1.0; 24],
            day_multipliers: vec![1.0; 7],
            shadowing_alpha: 0.2,
            max_shadowing_db: 15.0,
        }
    }
}

impl EnvironmentConfig {
    /// Set occupancy attenuation
    pub fn with_occupancy_loss(mut self, db: f64) -> Self {
        self.occupancy_loss_db = db;
        self
    }

    /// Range checks
    pub fn validate(&self) -> CoreResult<()> {
        if self.hour_multipliers.len() != 24 {
            return Err(CoreError::InvalidConfig(format!(
                "expected 24 hour multipliers, got {}",
                self.hour_multipliers.len()
            )));
        }
        if self.day_multipliers.len() != 7 {
            return Err(CoreError::InvalidConfig(format!(
                "expected 7 day multipliers, got {}",
                self.day_multipliers.len()
            )));
        }
        if !(0.0..=1.0).contains(&self.shadowing_alpha) {
            return Err(CoreError::InvalidConfig("shadowing_alpha must be in [0, 1]".into()));
        }
        Ok(())
    }
}

/// Learned and scheduled corrections
#[derive(Debug, Default)]
pub struct EnvironmentModel {
    config: EnvironmentConfig,
    shadowing: RwLock<HashMap<AnchorId, f64>>,
}

impl EnvironmentModel {
    /// Create from a validated configuration
    pub fn new(config: EnvironmentConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            shadowing: RwLock::new(HashMap::new()),
        })
    }

    /// Total correction for a reading from `anchor` at `timestamp`
    pub fn correction_db(&self, anchor: &AnchorId, timestamp: Timestamp) -> f64 {
        self.shadowing_db(anchor) + self.occupancy_db(timestamp)
    }

    /// Learned shadowing term for `anchor`
    pub fn shadowing_db(&self, anchor: &AnchorId) -> f64 {
        self.shadowing.read().get(anchor).copied().unwrap_or(0.0)
    }

    /// Scheduled occupancy term
    pub fn occupancy_db(&self, timestamp: Timestamp) -> f64 {
        if self.config.occupancy_loss_db == 0.0 {
            return 0.0;
        }
        let hour = self.config.hour_multipliers.get(hour_of_day(timestamp)).copied().unwrap_or(1.0);
        let day = self.config.day_multipliers.get(day_of_week(timestamp)).copied().unwrap_or(1.0);
        self.config.occupancy_loss_db * hour * day
    }

    /// Fold one calibration residual into the anchor's shadowing estimate
    ///
    /// Returns the updated shadowing term.
    pub fn observe_calibration(&self, anchor: &AnchorId, observed_rssi: f64, expected_rssi: f64) -> f64 {
        let residual = expected_rssi - observed_rssi;
        if !residual.is_finite() {
            return self.shadowing_db(anchor);
        }
        let alpha = self.config.shadowing_alpha;
        let cap = self.config.max_shadowing_db;

        let mut shadowing = self.shadowing.write();
        let entry = shadowing.entry(anchor.clone()).or_insert(residual);
        *entry = (alpha * residual + (1.0 - alpha) * *entry).clamp(-cap, cap);
        *entry
    }
}
