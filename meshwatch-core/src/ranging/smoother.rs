//! RSSI smoothing
//!
//! ## Scalar Kalman filter
//!
//! One instance per (device, anchor) pair:
//!
//! ```text
//! predict:  P  = P + Q
//! correct:  K  = P / (P + R)
//!           x  = x + K·(z - x)
//!           P  = (1 - K)·P
//! ```
//!
//! The first update initializes `x = z` without a correction step. Defaults
//! (Q = 1e-3, R = 0.1, P₀ = 1.0) favor slow drift over fast reaction.
//!
//! ## EWMA
//!
//! A cheaper alternative for callers that want no state beyond one float:
//! `x = α·z + (1-α)·x`, α = 0.3.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::errors::{CoreError, CoreResult};
use crate::geometry::{AnchorId, Readings};

/// Scalar Kalman noise parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// Process variance Q
    pub process_variance: f64,
    /// Measurement variance R
    pub measurement_variance: f64,
    /// Initial error variance P₀
    pub initial_error: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            process_variance: 1e-3,
            measurement_variance: 0.1,
            initial_error: 1.0,
        }
    }
}

impl SmootherConfig {
    /// Set process variance (higher = less trust in the previous estimate)
    pub fn with_process_variance(mut self, q: f64) -> Self {
        self.process_variance = q;
        self
    }

    /// Set measurement variance
    pub fn with_measurement_variance(mut self, r: f64) -> Self {
        self.measurement_variance = r;
        self
    }

    /// Range checks
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.process_variance >= 0.0 && self.measurement_variance > 0.0 && self.initial_error >= 0.0) {
            return Err(CoreError::InvalidConfig(
                "smoother variances must be non-negative and measurement variance positive".into(),
            ));
        }
        Ok(())
    }
}

/// One-dimensional Kalman filter
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarKalman {
    estimate: f64,
    error_variance: f64,
    process_variance: f64,
    measurement_variance: f64,
    initialized: bool,
}

impl ScalarKalman {
    /// Uninitialized filter
    pub fn new(config: SmootherConfig) -> Self {
        Self {
            estimate: 0.0,
            error_variance: config.initial_error,
            process_variance: config.process_variance,
            measurement_variance: config.measurement_variance,
            initialized: false,
        }
    }

    /// Feed one raw reading, get the smoothed value
    pub fn update(&mut self, raw: f64) -> f64 {
        if !self.initialized {
            self.estimate = raw;
            self.initialized = true;
            return raw;
        }

        self.error_variance += self.process_variance;

        let gain = self.error_variance / (self.error_variance + self.measurement_variance);
        self.estimate += gain * (raw - self.estimate);
        self.error_variance *= 1.0 - gain;

        self.estimate
    }

    /// Current estimate, `None` before the first update
    pub fn estimate(&self) -> Option<f64> {
        self.initialized.then_some(self.estimate)
    }

    /// Current error variance
    pub fn error_variance(&self) -> f64 {
        self.error_variance
    }
}

/// Exponentially weighted moving average
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EwmaSmoother {
    alpha: f64,
    value: Option<f64>,
}

impl EwmaSmoother {
    /// Default smoothing factor
    pub const DEFAULT_ALPHA: f64 = 0.3;

    /// Create with `alpha` clamped to [0, 1]
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: None,
        }
    }

    /// Feed one reading
    pub fn update(&mut self, raw: f64) -> f64 {
        let next = match self.value {
            None => raw,
            Some(prev) => self.alpha * raw + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    /// Current value
    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Default for EwmaSmoother {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ALPHA)
    }
}

/// All (device, anchor) filters
///
/// The map lock is held only for the duration of a single update, which
/// also serializes updates for any one key.
#[derive(Debug, Default)]
pub struct SmootherBank {
    config: SmootherConfig,
    filters: Mutex<HashMap<(DeviceId, AnchorId), ScalarKalman>>,
}

impl SmootherBank {
    /// Empty bank
    pub fn new(config: SmootherConfig) -> Self {
        Self {
            config,
            filters: Mutex::new(HashMap::new()),
        }
    }

    /// Smooth one raw reading
    pub fn smooth(&self, device: &DeviceId, anchor: &AnchorId, raw: f64) -> f64 {
        let mut filters = self.filters.lock();
        filters
            .entry((device.clone(), anchor.clone()))
            .or_insert_with(|| ScalarKalman::new(self.config))
            .update(raw)
    }

    /// Latest smoothed value without updating
    pub fn current(&self, device: &DeviceId, anchor: &AnchorId) -> Option<f64> {
        self.filters
            .lock()
            .get(&(device.clone(), anchor.clone()))
            .and_then(ScalarKalman::estimate)
    }

    /// Latest smoothed value for every anchor that has seen `device`
    pub fn readings_for(&self, device: &DeviceId) -> Readings {
        self.filters
            .lock()
            .iter()
            .filter(|((d, _), _)| d == device)
            .filter_map(|((_, a), kf)| kf.estimate().map(|v| (a.clone(), v)))
            .collect()
    }

    /// Drop every filter belonging to `device`
    pub fn forget_device(&self, device: &DeviceId) -> usize {
        let mut filters = self.filters.lock();
        let before = filters.len();
        filters.retain(|(d, _), _| d != device);
        before - filters.len()
    }

    /// Number of live filters
    pub fn len(&self) -> usize {
        self.filters.lock().len()
    }

    /// True when no filters exist
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_passes_through() {
        let mut kf = ScalarKalman::new(SmootherConfig::default());
        assert_eq!(kf.estimate(), None);
        assert_eq!(kf.update(-70.0), -70.0);
        assert_eq!(kf.error_variance(), 1.0);
    }

    #[test]
    fn test_second_update_matches_hand_computation() {
        let mut kf = ScalarKalman::new(SmootherConfig::default());
        kf.update(-70.0);
        let p = 1.0 + 1e-3;
        let k = p / (p + 0.1);
        let expected = -70.0 + k * (-60.0 + 70.0);
        assert!((kf.update(-60.0) - expected).abs() < 1e-12);
        assert!((kf.error_variance() - (1.0 - k) * p).abs() < 1e-12);
    }

    #[test]
    fn test_converges_on_constant_input() {
        let mut kf = ScalarKalman::new(SmootherConfig::default());
        kf.update(-80.0);
        let mut last = 0.0;
        for _ in 0..200 {
            last = kf.update(-60.0);
        }
        assert!((last + 60.0).abs() < 0.5);
    }

    #[test]
    fn test_noise_is_attenuated() {
        let mut kf = ScalarKalman::new(SmootherConfig::default());
        let mut smoothed = Vec::new();
        for i in 0..100 {
            let raw = if i % 2 == 0 { -55.0 } else { -65.0 };
            smoothed.push(kf.update(raw));
        }
        let tail = &smoothed[80..];
        let spread = tail.iter().cloned().fold(f64::MIN, f64::max)
            - tail.iter().cloned().fold(f64::MAX, f64::min);
        assert!(spread < 3.0, "spread {}", spread);
    }

    #[test]
    fn test_ewma() {
        let mut e = EwmaSmoother::default();
        assert_eq!(e.update(-60.0), -60.0);
        assert!((e.update(-70.0) - (-63.0)).abs() < 1e-12);
    }

    #[test]
    fn test_bank_keys_are_independent() {
        let bank = SmootherBank::new(SmootherConfig::default());
        let d: DeviceId = "00:11:22:33:44:55".parse().unwrap();
        let a1: AnchorId = "a1".into();
        let a2: AnchorId = "a2".into();

        assert_eq!(bank.smooth(&d, &a1, -50.0), -50.0);
        assert_eq!(bank.smooth(&d, &a2, -80.0), -80.0);
        assert_eq!(bank.len(), 2);
        assert_eq!(bank.current(&d, &a2), Some(-80.0));
        let readings = bank.readings_for(&d);
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[&a1], -50.0);

        assert_eq!(bank.forget_device(&d), 2);
        assert!(bank.is_empty());
    }
}
