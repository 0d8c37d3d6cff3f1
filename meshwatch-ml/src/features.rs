//! Feature vectors for the isolation forest
//!
//! Each telemetry sample becomes `[rssi, online, seconds since last seen,
//! type score]`. Samples are fixed-capacity so scoring never allocates.

use heapless::Vec as FixedVec;
use meshwatch_core::Timestamp;

use crate::{history::Telemetry, MlError, MlResult};

/// Maximum features per sample
pub const MAX_FEATURES: usize = 8;

/// RSSI used for a sighting that did not measure signal strength
pub const MISSING_RSSI: f64 = -100.0;

/// Fixed-capacity numeric sample
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sample {
    features: FixedVec<f64, MAX_FEATURES>,
}

impl Sample {
    /// Build from a slice
    ///
    /// Fails on an empty slice, more than [`MAX_FEATURES`] values, or any
    /// non-finite value.
    pub fn new(values: &[f64]) -> MlResult<Self> {
        if values.is_empty() {
            return Err(MlError::InvalidFeature("empty sample".into()));
        }
        if let Some(bad) = values.iter().position(|v| !v.is_finite()) {
            return Err(MlError::InvalidFeature(format!("feature {} is not finite", bad)));
        }
        let features = FixedVec::from_slice(values).map_err(|_| {
            MlError::InvalidFeature(format!("{} features exceeds capacity {}", values.len(), MAX_FEATURES))
        })?;
        Ok(Self { features })
    }

    /// Feature at `index`
    pub fn get_feature(&self, index: usize) -> Option<f64> {
        self.features.get(index).copied()
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True for a sample with no features
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Feature values
    pub fn as_slice(&self) -> &[f64] {
        &self.features
    }
}

/// Named view of the forest features
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    /// Signal strength (dBm), [`MISSING_RSSI`] when unmeasured
    pub rssi: f64,
    /// 1.0 when online
    pub online: f64,
    /// Seconds since the previous sighting, 0 for the first
    pub secs_since_last_seen: f64,
    /// Device-type exposure score
    pub type_score: f64,
}

impl FeatureVector {
    /// Number of features in the vector
    pub const LEN: usize = 4;

    /// Extract features from a sample and the time the device was last seen before it
    pub fn extract(telemetry: &Telemetry, previous_seen: Option<Timestamp>) -> Self {
        let secs = previous_seen
            .map(|prev| telemetry.timestamp.saturating_sub(prev) as f64 / 1_000.0)
            .unwrap_or(0.0);
        Self {
            rssi: telemetry.rssi.unwrap_or(MISSING_RSSI),
            online: if telemetry.is_online { 1.0 } else { 0.0 },
            secs_since_last_seen: secs,
            type_score: telemetry.type_score(),
        }
    }

    /// Convert to a scoring sample
    pub fn to_sample(&self) -> MlResult<Sample> {
        Sample::new(&[self.rssi, self.online, self.secs_since_last_seen, self.type_score])
    }
}
