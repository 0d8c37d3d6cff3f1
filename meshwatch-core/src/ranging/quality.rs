//! Signal quality classification

use serde::{Deserialize, Serialize};

/// RSSI quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalQuality {
    VeryPoor,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl SignalQuality {
    /// Tier for a reading
    pub fn classify(rssi: f64) -> Self {
        if rssi >= -50.0 {
            SignalQuality::Excellent
        } else if rssi >= -60.0 {
            SignalQuality::Good
        } else if rssi >= -70.0 {
            SignalQuality::Fair
        } else if rssi >= -80.0 {
            SignalQuality::Poor
        } else {
            SignalQuality::VeryPoor
        }
    }

    /// Percentage shown to operators
    pub fn percent(&self) -> u8 {
        match self {
            SignalQuality::Excellent => 100,
            SignalQuality::Good => 75,
            SignalQuality::Fair => 50,
            SignalQuality::Poor => 25,
            SignalQuality::VeryPoor => 0,
        }
    }

    /// Signal bars (0-4)
    pub fn bars(&self) -> u8 {
        match self {
            SignalQuality::Excellent => 4,
            SignalQuality::Good => 3,
            SignalQuality::Fair => 2,
            SignalQuality::Poor => 1,
            SignalQuality::VeryPoor => 0,
        }
    }
}

/// Quality summary over a window of readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Tier of the window mean
    pub tier: SignalQuality,
    /// `(mean + 100) / 70`, clamped to [0, 1]
    pub strength: f64,
    /// `1 / (1 + stddev / 10)`
    pub stability: f64,
    /// `0.6·strength + 0.4·stability`
    pub overall: f64,
}

/// Assess a window of RSSI values; `None` when empty
pub fn assess(values: &[f64]) -> Option<QualityReport> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std_dev = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

    let strength = ((mean + 100.0) / 70.0).clamp(0.0, 1.0);
    let stability = signal_stability(std_dev);
    Some(QualityReport {
        tier: SignalQuality::classify(mean),
        strength,
        stability,
        overall: 0.6 * strength + 0.4 * stability,
    })
}

/// Stability score from the standard deviation of a window (dB)
pub fn signal_stability(std_dev: f64) -> f64 {
    1.0 / (1.0 + std_dev.max(0.0) / 10.0)
}

/// Confidence in a single reading, used to weight anchors
///
/// Range [0.05, 1]; -30 dBm or stronger is full confidence.
pub fn rssi_confidence(rssi: f64) -> f64 {
    if !rssi.is_finite() {
        return 0.05;
    }
    ((rssi + 100.0) / 70.0).clamp(0.05, 1.0)
}
