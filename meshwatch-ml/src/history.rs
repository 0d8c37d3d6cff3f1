//! Per-device history consumed by the detectors
//!
//! Detectors never mutate anything. The owner of a [`DeviceHistory`]
//! evaluates a new [`Telemetry`] sample against it first, then commits the
//! sample with [`DeviceHistory::record`], so every statistic a detector sees
//! excludes the sample under test.

use meshwatch_core::{
    buffer::{CircularBuffer, RssiSample, SignalWindow},
    time::hour_of_day,
    DeviceId, DeviceType, DiscoveredDevice, IdentityFingerprint, Protocol, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::{FeatureVector, Sample};

/// RSSI samples kept per device
pub const SIGNAL_HISTORY: usize = 128;

/// Feature vectors kept per device for forest training
pub const FEATURE_HISTORY: usize = 64;

/// One observation of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    /// Observed device
    pub device_id: DeviceId,
    /// Protocol that produced the observation
    pub protocol: Protocol,
    /// Observation time
    pub timestamp: Timestamp,
    /// Signal strength (dBm), when measured
    #[serde(default)]
    pub rssi: Option<f64>,
    /// Whether the device answered
    pub is_online: bool,
    /// Vendor, when known
    #[serde(default)]
    pub vendor: Option<String>,
    /// Device category, when known
    #[serde(default, rename = "type")]
    pub device_type: Option<DeviceType>,
}

impl Telemetry {
    /// Online observation with nothing else known
    pub fn new(device_id: DeviceId, protocol: Protocol, timestamp: Timestamp) -> Self {
        Self {
            device_id,
            protocol,
            timestamp,
            rssi: None,
            is_online: true,
            vendor: None,
            device_type: None,
        }
    }

    /// Set RSSI
    pub fn with_rssi(mut self, rssi: f64) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Set vendor
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    /// Set device type
    pub fn with_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = Some(device_type);
        self
    }

    /// Mark the device as not answering
    pub fn offline(mut self) -> Self {
        self.is_online = false;
        self
    }

    /// Identity tuple for the identity-change detector
    pub fn identity(&self) -> IdentityFingerprint {
        IdentityFingerprint {
            vendor: self.vendor.clone(),
            device_type: self.device_type,
            protocol: self.protocol,
        }
    }

    /// Exposure score of the device type, unknown types score as "other"
    pub fn type_score(&self) -> f64 {
        self.device_type.unwrap_or(DeviceType::Unknown).risk_score()
    }
}

impl From<&DiscoveredDevice> for Telemetry {
    fn from(device: &DiscoveredDevice) -> Self {
        Self {
            device_id: device.address.clone(),
            protocol: device.protocol,
            timestamp: device.last_seen,
            rssi: device.rssi,
            is_online: device.is_online,
            vendor: device.vendor.clone(),
            device_type: device.device_type,
        }
    }
}

/// Welford accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    /// Fold in one value
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Values seen
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation
    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.m2 / self.count as f64).max(0.0).sqrt()
    }
}

/// Everything the detectors know about one device
#[derive(Debug, Clone)]
pub struct DeviceHistory {
    device_id: DeviceId,
    signal: SignalWindow<SIGNAL_HISTORY>,
    hourly: [RunningStats; 24],
    identity: Option<IdentityFingerprint>,
    first_seen: Option<Timestamp>,
    last_seen: Option<Timestamp>,
    features: CircularBuffer<Sample, FEATURE_HISTORY>,
    observations: u64,
}

impl DeviceHistory {
    /// Empty history
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            signal: SignalWindow::new(),
            hourly: [RunningStats::default(); 24],
            identity: None,
            first_seen: None,
            last_seen: None,
            features: CircularBuffer::new(),
            observations: 0,
        }
    }

    /// Commit an evaluated sample
    pub fn record(&mut self, telemetry: &Telemetry) {
        if let Some(rssi) = telemetry.rssi.filter(|r| r.is_finite()) {
            self.signal.push(RssiSample::new(rssi, telemetry.timestamp));
            self.hourly[hour_of_day(telemetry.timestamp)].push(rssi);
        }
        if let Ok(sample) = FeatureVector::extract(telemetry, self.last_seen).to_sample() {
            self.features.push(sample);
        }
        // Fields a sighting does not report keep their last known value
        let mut identity = telemetry.identity();
        if let Some(previous) = &self.identity {
            if identity.vendor.is_none() {
                identity.vendor = previous.vendor.clone();
            }
            if identity.device_type.is_none() {
                identity.device_type = previous.device_type;
            }
        }
        self.identity = Some(identity);
        self.first_seen.get_or_insert(telemetry.timestamp);
        self.last_seen = Some(telemetry.timestamp);
        self.observations += 1;
    }

    /// Device this history belongs to
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Recent RSSI window
    pub fn signal(&self) -> &SignalWindow<SIGNAL_HISTORY> {
        &self.signal
    }

    /// Newest `n` RSSI values, oldest first
    pub fn recent_rssi(&self, n: usize) -> Vec<f64> {
        let skip = self.signal.len().saturating_sub(n);
        self.signal.iter().skip(skip).map(|s| s.rssi).collect()
    }

    /// Mean RSSI over the window
    pub fn mean_rssi(&self) -> Option<f64> {
        self.signal.mean()
    }

    /// Seasonal statistics for the hour of `timestamp`
    pub fn hour_stats(&self, timestamp: Timestamp) -> &RunningStats {
        &self.hourly[hour_of_day(timestamp)]
    }

    /// Identity at the last committed sighting
    pub fn identity(&self) -> Option<&IdentityFingerprint> {
        self.identity.as_ref()
    }

    /// First committed sighting
    pub fn first_seen(&self) -> Option<Timestamp> {
        self.first_seen
    }

    /// Last committed sighting
    pub fn last_seen(&self) -> Option<Timestamp> {
        self.last_seen
    }

    /// Stored feature vectors, oldest first
    pub fn feature_samples(&self) -> impl Iterator<Item = &Sample> {
        self.features.iter()
    }

    /// Committed samples, including those with no RSSI
    pub fn observations(&self) -> u64 {
        self.observations
    }
}
