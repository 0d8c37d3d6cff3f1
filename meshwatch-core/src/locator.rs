//! Locator: owns the positioning state and runs the estimator pipeline
//!
//! ## Ownership
//!
//! The locator is the single owner of every positioning store. Estimators
//! hold shared handles to the models they read:
//!
//! ```text
//! Locator
//!  ├── anchors       Arc<AnchorRegistry>   ← Trilaterator
//!  ├── path_loss     Arc<PathLossModel>    ← Trilaterator
//!  ├── environment   Arc<EnvironmentModel> ← Trilaterator, calibration
//!  ├── fingerprints  Arc<FingerprintStore> ← KNN, Kernel, calibration
//!  ├── smoothers     SmootherBank          per (device, anchor)
//!  └── tracks        TrackBank             per device
//! ```
//!
//! ## Pipeline
//!
//! `estimate_location` runs trilateration, KNN and kernel interpolation on
//! the same readings, feeds the trilateration result into the device's
//! track, and fuses all four.

use std::sync::Arc;

use crate::config::LocatorConfig;
use crate::device::{DeviceId, RangingSample};
use crate::errors::{CoreError, CoreResult};
use crate::fingerprint::{CalibrationSummary, FingerprintStore};
use crate::geometry::{Anchor, Point, Readings};
use crate::positioning::{
    fuse, AnchorRegistry, EstimateInput, Estimator, EstimatorKind, FusedEstimate, KernelEstimator,
    KnnEstimator, PositionEstimate, PositionEstimator, TrackBank, Trilaterator,
};
use crate::ranging::{EnvironmentModel, PathLossModel, SmootherBank};
use crate::time::{TimeSource, Timestamp};

/// Positioning engine
pub struct Locator {
    config: LocatorConfig,
    clock: Arc<dyn TimeSource>,
    anchors: Arc<AnchorRegistry>,
    path_loss: Arc<PathLossModel>,
    environment: Arc<EnvironmentModel>,
    fingerprints: Arc<FingerprintStore>,
    smoothers: SmootherBank,
    tracks: TrackBank,
    estimators: Vec<Estimator>,
}

impl Locator {
    /// Build every model from a validated config
    pub fn new(config: LocatorConfig, clock: Arc<dyn TimeSource>) -> CoreResult<Self> {
        config.validate()?;

        let anchors = Arc::new(AnchorRegistry::new());
        let path_loss = Arc::new(PathLossModel::new(config.path_loss.clone())?);
        let environment = Arc::new(EnvironmentModel::new(config.environment.clone())?);
        let fingerprints = Arc::new(FingerprintStore::new(config.fingerprint.clone())?);

        let estimators = vec![
            Estimator::Trilateration(Trilaterator::new(
                config.trilateration,
                Arc::clone(&anchors),
                Arc::clone(&path_loss),
                Arc::clone(&environment),
            )),
            Estimator::FingerprintKnn(KnnEstimator::new(config.knn, Arc::clone(&fingerprints))),
            Estimator::Kernel(KernelEstimator::new(config.kernel, Arc::clone(&fingerprints))),
        ];

        Ok(Self {
            smoothers: SmootherBank::new(config.smoother),
            tracks: TrackBank::new(config.track),
            config,
            clock,
            anchors,
            path_loss,
            environment,
            fingerprints,
            estimators,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Add or replace an anchor
    pub fn register_anchor(&self, anchor: Anchor) -> CoreResult<()> {
        self.anchors.register(anchor).map(|_| ())
    }

    /// Anchor registry
    pub fn anchors(&self) -> &AnchorRegistry {
        &self.anchors
    }

    /// Calibration map
    pub fn fingerprints(&self) -> &FingerprintStore {
        &self.fingerprints
    }

    /// Environment model
    pub fn environment(&self) -> &EnvironmentModel {
        &self.environment
    }

    /// Per-device tracks
    pub fn tracks(&self) -> &TrackBank {
        &self.tracks
    }

    /// Smooth one raw sample; returns the smoothed RSSI
    pub fn ingest_sample(&self, sample: &RangingSample) -> CoreResult<f64> {
        sample.validate()?;
        Ok(self.smoothers.smooth(&sample.device_id, &sample.anchor_id, sample.rssi))
    }

    /// Smoothed readings accumulated for `device`
    pub fn smoothed_readings(&self, device: &DeviceId) -> Readings {
        self.smoothers.readings_for(device)
    }

    /// Estimate a device's location from readings taken now
    pub fn estimate_location(&self, device: &DeviceId, readings: &Readings) -> FusedEstimate {
        self.estimate_location_at(device, readings, self.clock.now())
    }

    /// Estimate from the device's current smoothed readings
    pub fn estimate_current(&self, device: &DeviceId) -> FusedEstimate {
        let readings = self.smoothed_readings(device);
        self.estimate_location(device, &readings)
    }

    /// Estimate a device's location from readings taken at `timestamp`
    pub fn estimate_location_at(&self, device: &DeviceId, readings: &Readings, timestamp: Timestamp) -> FusedEstimate {
        let input = EstimateInput { readings, timestamp };
        let mut estimates: Vec<(EstimatorKind, PositionEstimate)> = self
            .estimators
            .iter()
            .map(|e| (e.kind(), e.estimate(&input)))
            .collect();

        // Only non-degraded trilateration fixes move the track
        let track = estimates
            .iter()
            .find(|(kind, e)| *kind == EstimatorKind::Trilateration && !e.is_degraded())
            .map(|(_, e)| self.tracks.update(device, e, timestamp))
            .or_else(|| self.tracks.state(device).map(|s| PositionEstimate::new(s.position, 0.0, s.uncertainty())));
        if let Some(track) = track {
            estimates.push((EstimatorKind::KalmanTrack, track));
        }

        let fused = fuse(&estimates);
        log::debug!(
            "location device={} at {} confidence={:.2} uncertainty={:.2}",
            device,
            fused.location,
            fused.confidence,
            fused.uncertainty
        );
        fused
    }

    /// Record a calibration point and refine per-anchor shadowing
    pub fn add_calibration_point(
        &self,
        location: Point,
        readings: &Readings,
        room: Option<&str>,
    ) -> CoreResult<CalibrationSummary> {
        if readings.is_empty() {
            return Err(CoreError::Parse {
                field: "readings",
                reason: "calibration point has no readings".into(),
            });
        }
        let summary = self.fingerprints.add_point(location, readings, self.clock.now(), room)?;

        for (id, &rssi) in readings {
            let Some(anchor) = self.anchors.get(id) else {
                continue;
            };
            let exponent = self.path_loss.exponent_for(anchor.room.as_deref());
            let p0 = self.path_loss.reference_power_for(anchor.reference_power);
            let expected = self.path_loss.expected_rssi(location.distance_to(&anchor.position), p0, exponent);
            self.environment.observe_calibration(id, rssi, expected);
        }
        Ok(summary)
    }

    /// Drop all per-device state
    pub fn forget_device(&self, device: &DeviceId) {
        let filters = self.smoothers.forget_device(device);
        self.tracks.forget(device);
        log::debug!("forgot device={} filters={}", device, filters);
    }
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locator")
            .field("anchors", &self.anchors.len())
            .field("fingerprints", &self.fingerprints.len())
            .field("tracks", &self.tracks.len())
            .finish()
    }
}
