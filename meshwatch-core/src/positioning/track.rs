//! Per-device 2-D position track
//!
//! ## Model
//!
//! State is `(x, y)` with a diagonal covariance `diag(Px, Py)`. The
//! trilateration output is the measurement, with variance equal to its
//! reported uncertainty squared.
//!
//! ```text
//! predict:  Px += q            Py += q
//! correct:  Kx  = Px/(Px + R)  Ky  = Py/(Py + R)      R = max(u², r_min)
//!           x  += Kx·(zx - x)  y  += Ky·(zy - y)
//!           Px *= 1 - Kx       Py *= 1 - Ky
//! ```
//!
//! This is an approximation: each axis gets an independent gain and the
//! cross-covariance is never tracked, where a full 2×2 Kalman gain would
//! couple the axes. It is adequate because the measurement noise here is
//! isotropic.
//!
//! The first measurement initializes the state with `P = R`.
//!
//! ## Concurrency
//!
//! The bank holds one lock per device. Updates for the same device are
//! serialized; different devices proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::errors::{CoreError, CoreResult};
use crate::geometry::Point;
use crate::time::Timestamp;

use super::PositionEstimate;

/// Track filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Variance added per predict step (m²)
    pub process_noise: f64,
    /// Lower bound on measurement variance (m²)
    pub min_measurement_noise: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.05,
            min_measurement_noise: 0.01,
        }
    }
}

impl TrackConfig {
    /// Range checks
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.process_noise >= 0.0) || !(self.min_measurement_noise > 0.0) {
            return Err(CoreError::InvalidConfig("track noise parameters out of range".into()));
        }
        Ok(())
    }
}

/// Filter state for one device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    /// Position estimate
    pub position: Point,
    /// Variance along x
    pub variance_x: f64,
    /// Variance along y
    pub variance_y: f64,
    /// Measurements folded in
    pub updates: u64,
    /// Time of the latest measurement
    pub last_update: Timestamp,
}

impl TrackState {
    fn init(measurement: Point, r: f64, timestamp: Timestamp) -> Self {
        Self {
            position: measurement,
            variance_x: r,
            variance_y: r,
            updates: 1,
            last_update: timestamp,
        }
    }

    fn step(&mut self, measurement: Point, r: f64, q: f64, timestamp: Timestamp) {
        self.variance_x += q;
        self.variance_y += q;

        let kx = self.variance_x / (self.variance_x + r);
        let ky = self.variance_y / (self.variance_y + r);
        self.position = Point::new(
            self.position.x + kx * (measurement.x - self.position.x),
            self.position.y + ky * (measurement.y - self.position.y),
        );
        self.variance_x *= 1.0 - kx;
        self.variance_y *= 1.0 - ky;

        self.updates += 1;
        self.last_update = self.last_update.max(timestamp);
    }

    /// 1-sigma radius, `sqrt((Px + Py) / 2)`
    pub fn uncertainty(&self) -> f64 {
        ((self.variance_x + self.variance_y) / 2.0).sqrt()
    }
}

/// Per-device track filters
#[derive(Debug, Default)]
pub struct TrackBank {
    config: TrackConfig,
    tracks: Mutex<HashMap<DeviceId, Arc<Mutex<Option<TrackState>>>>>,
}

impl TrackBank {
    /// Empty bank
    pub fn new(config: TrackConfig) -> Self {
        Self {
            config,
            tracks: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, device: &DeviceId) -> Arc<Mutex<Option<TrackState>>> {
        self.tracks.lock().entry(device.clone()).or_default().clone()
    }

    /// Fold a trilateration estimate into the device's track
    pub fn update(&self, device: &DeviceId, measurement: &PositionEstimate, timestamp: Timestamp) -> PositionEstimate {
        let r = (measurement.uncertainty * measurement.uncertainty).max(self.config.min_measurement_noise);
        let slot = self.slot(device);
        let mut guard = slot.lock();

        let state = match *guard {
            None => TrackState::init(measurement.location, r, timestamp),
            Some(mut state) => {
                state.step(measurement.location, r, self.config.process_noise, timestamp);
                state
            }
        };
        *guard = Some(state);

        let uncertainty = state.uncertainty();
        // Warm-up: trust grows over the first few measurements
        let maturity = (state.updates as f64 / 3.0).min(1.0);
        PositionEstimate::new(state.position, maturity / (1.0 + uncertainty), uncertainty)
    }

    /// Current state without updating
    pub fn state(&self, device: &DeviceId) -> Option<TrackState> {
        let slot = self.tracks.lock().get(device).cloned()?;
        let state = *slot.lock();
        state
    }

    /// Drop a device's track
    pub fn forget(&self, device: &DeviceId) -> bool {
        self.tracks.lock().remove(device).is_some()
    }

    /// Devices tracked
    pub fn len(&self) -> usize {
        self.tracks.lock().len()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceId {
        "02:00:00:00:00:01".parse().unwrap()
    }

    fn measurement(x: f64, y: f64, u: f64) -> PositionEstimate {
        PositionEstimate::new(Point::new(x, y), 0.8, u)
    }

    #[test]
    fn test_first_measurement_initializes() {
        let bank = TrackBank::new(TrackConfig::default());
        let est = bank.update(&device(), &measurement(3.0, 4.0, 2.0), 10);
        assert_eq!(est.location, Point::new(3.0, 4.0));
        assert!((est.uncertainty - 2.0).abs() < 1e-12);
        let state = bank.state(&device()).unwrap();
        assert_eq!(state.updates, 1);
        assert_eq!(state.variance_x, 4.0);
    }

    #[test]
    fn test_independent_axis_gain() {
        let bank = TrackBank::new(TrackConfig {
            process_noise: 0.0,
            min_measurement_noise: 0.01,
        });
        bank.update(&device(), &measurement(0.0, 0.0, 1.0), 0);
        // P = 1, R = 1 → K = 0.5 on each axis
        let est = bank.update(&device(), &measurement(2.0, -4.0, 1.0), 1);
        assert!((est.location.x - 1.0).abs() < 1e-12);
        assert!((est.location.y + 2.0).abs() < 1e-12);
        assert!((est.uncertainty - 0.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_uncertainty_shrinks_with_consistent_measurements() {
        let bank = TrackBank::new(TrackConfig::default());
        let mut last = f64::MAX;
        for t in 0..20 {
            let est = bank.update(&device(), &measurement(5.0, 5.0, 2.0), t);
            assert!(est.uncertainty <= last + 1e-12);
            last = est.uncertainty;
        }
        assert!(last < 1.0);
    }

    #[test]
    fn test_devices_are_isolated() {
        let bank = TrackBank::new(TrackConfig::default());
        let other: DeviceId = "02:00:00:00:00:02".parse().unwrap();
        bank.update(&device(), &measurement(0.0, 0.0, 1.0), 0);
        bank.update(&other, &measurement(9.0, 9.0, 1.0), 0);
        assert_eq!(bank.state(&device()).unwrap().position, Point::ORIGIN);
        assert_eq!(bank.len(), 2);
        assert!(bank.forget(&other));
        assert!(bank.state(&other).is_none());
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let bank = Arc::new(TrackBank::new(TrackConfig::default()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bank = Arc::clone(&bank);
                std::thread::spawn(move || {
                    for t in 0..50 {
                        bank.update(&device(), &measurement(1.0, 1.0, 1.0), t);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(bank.state(&device()).unwrap().updates, 400);
    }
}
