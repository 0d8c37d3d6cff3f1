//! Log-distance path-loss model
//!
//! ## Model
//!
//! ```text
//! rssi_corrected = rssi + environmental_correction_db
//! d = d0 · 10^((P0 - rssi_corrected) / (10 · n))
//! d ∈ [min_distance, max_distance]
//! ```
//!
//! - `P0`: RSSI at the reference distance `d0` (per anchor, or model default)
//! - `n`:  path-loss exponent, 2.0 in free space, 2.7-4.0 through walls
//!
//! For fixed parameters the mapping is monotonic: a weaker signal never
//! yields a shorter distance. Clamping preserves that (it is a
//! non-decreasing function of a non-decreasing function).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};

/// Path-loss model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathLossConfig {
    /// RSSI at the reference distance (dBm)
    pub reference_power: f64,
    /// Reference distance `d0` (meters)
    pub reference_distance: f64,
    /// Exponent used when an anchor has no room or its room is unlisted
    pub default_exponent: f64,
    /// Per-room exponent overrides
    pub room_exponents: BTreeMap<String, f64>,
    /// Lower clamp (meters)
    pub min_distance: f64,
    /// Upper clamp (meters)
    pub max_distance: f64,
}

impl Default for PathLossConfig {
    fn default() -> Self {
        Self {
            reference_power: -59.0,
            reference_distance: 1.0,
            default_exponent: 2.0,
            room_exponents: BTreeMap::new(),
            min_distance: 0.1,
            max_distance: 100.0,
        }
    }
}

impl PathLossConfig {
    /// Set default exponent
    pub fn with_exponent(mut self, exponent: f64) -> Self {
        self.default_exponent = exponent;
        self
    }

    /// Set reference power
    pub fn with_reference_power(mut self, dbm: f64) -> Self {
        self.reference_power = dbm;
        self
    }

    /// Add a room-specific exponent
    pub fn with_room_exponent(mut self, room: impl Into<String>, exponent: f64) -> Self {
        self.room_exponents.insert(room.into(), exponent);
        self
    }

    /// Range checks
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.default_exponent > 0.0) {
            return Err(CoreError::InvalidConfig(format!(
                "path-loss exponent must be positive, got {}",
                self.default_exponent
            )));
        }
        if let Some((room, n)) = self.room_exponents.iter().find(|(_, n)| !(**n > 0.0)) {
            return Err(CoreError::InvalidConfig(format!(
                "path-loss exponent for room {} must be positive, got {}",
                room, n
            )));
        }
        if !(self.reference_distance > 0.0) {
            return Err(CoreError::InvalidConfig("reference distance must be positive".into()));
        }
        if !(self.min_distance > 0.0 && self.min_distance < self.max_distance) {
            return Err(CoreError::InvalidConfig(format!(
                "distance clamp [{}, {}] is empty",
                self.min_distance, self.max_distance
            )));
        }
        Ok(())
    }
}

/// Log-distance model with room-specific exponents
#[derive(Debug, Clone, Default)]
pub struct PathLossModel {
    config: PathLossConfig,
}

impl PathLossModel {
    /// Create from a validated configuration
    pub fn new(config: PathLossConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Model parameters
    pub fn config(&self) -> &PathLossConfig {
        &self.config
    }

    /// Exponent for `room`, falling back to the default
    pub fn exponent_for(&self, room: Option<&str>) -> f64 {
        room.and_then(|r| self.config.room_exponents.get(r))
            .copied()
            .unwrap_or(self.config.default_exponent)
    }

    /// Reference power, preferring the anchor's own calibration
    pub fn reference_power_for(&self, anchor_override: Option<f64>) -> f64 {
        anchor_override.unwrap_or(self.config.reference_power)
    }

    /// RSSI → meters
    pub fn distance(
        &self,
        rssi: f64,
        reference_power: f64,
        path_loss_exponent: f64,
        environmental_correction_db: f64,
    ) -> f64 {
        let corrected = rssi + environmental_correction_db;
        let exponent = (reference_power - corrected) / (10.0 * path_loss_exponent);
        let d = self.config.reference_distance * 10f64.powf(exponent);
        if d.is_nan() {
            return self.config.max_distance;
        }
        d.clamp(self.config.min_distance, self.config.max_distance)
    }

    /// Meters → RSSI the model expects at that distance (no correction)
    pub fn expected_rssi(&self, distance: f64, reference_power: f64, path_loss_exponent: f64) -> f64 {
        let d = distance.max(self.config.min_distance);
        reference_power - 10.0 * path_loss_exponent * (d / self.config.reference_distance).log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_distance() {
        let model = PathLossModel::default();
        assert!((model.distance(-59.0, -59.0, 2.0, 0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ten_db_per_decade_at_n1() {
        let model = PathLossModel::default();
        let d = model.distance(-69.0, -59.0, 1.0, 0.0);
        assert!((d - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamping() {
        let model = PathLossModel::default();
        assert_eq!(model.distance(10.0, -59.0, 2.0, 0.0), 0.1);
        assert_eq!(model.distance(-127.0, -59.0, 2.0, 0.0), 100.0);
    }

    #[test]
    fn test_correction_is_additive() {
        let model = PathLossModel::default();
        let plain = model.distance(-75.0, -59.0, 2.0, 0.0);
        let corrected = model.distance(-80.0, -59.0, 2.0, 5.0);
        assert!((plain - corrected).abs() < 1e-12);
    }

    #[test]
    fn test_room_exponent_lookup() {
        let model = PathLossModel::new(
            PathLossConfig::default().with_room_exponent("garage", 3.5),
        )
        .unwrap();
        assert_eq!(model.exponent_for(Some("garage")), 3.5);
        assert_eq!(model.exponent_for(Some("attic")), 2.0);
        assert_eq!(model.exponent_for(None), 2.0);
    }

    #[test]
    fn test_expected_rssi_inverts_distance() {
        let model = PathLossModel::default();
        for d in [0.5, 1.0, 3.3, 7.07, 42.0] {
            let rssi = model.expected_rssi(d, -59.0, 2.7);
            assert!((model.distance(rssi, -59.0, 2.7, 0.0) - d).abs() < 1e-9);
        }
    }

    #[test]
    fn test_invalid_config() {
        assert!(PathLossModel::new(PathLossConfig::default().with_exponent(0.0)).is_err());
        assert!(PathLossModel::new(PathLossConfig::default().with_room_exponent("x", -1.0)).is_err());
    }

    #[test]
    fn test_nan_rssi_maps_far() {
        let model = PathLossModel::default();
        assert_eq!(model.distance(f64::NAN, -59.0, 2.0, 0.0), 100.0);
    }
}
