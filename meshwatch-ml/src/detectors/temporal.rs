//! Temporal reconstruction detector
//!
//! ```text
//! window (N) ──normalize──→ z ──W_e──→ tanh ──W_d──→ ẑ
//!                                         error = rms(z - ẑ)
//! ```
//!
//! The encoder/decoder pair is model data. The default projects onto the
//! first `H` non-constant cosine basis vectors, so slow drifts and smooth
//! swings reconstruct well while oscillation and isolated spikes do not. The
//! encoder is scaled down to keep `tanh` near its linear range and the
//! decoder scaled up to match.

use heapless::HistoryBuffer;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{AnomalyDetector, Detection};
use crate::{AnomalyKind, DetectionMethod, DeviceHistory, MlError, MlResult, Severity, Telemetry};

/// Fixed window length the default model is shaped for
pub const WINDOW: usize = 16;

/// Encoder/decoder weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalModel {
    /// `hidden × window` projection
    pub encoder: Vec<Vec<f64>>,
    /// `window × hidden` reconstruction
    pub decoder: Vec<Vec<f64>>,
}

impl TemporalModel {
    /// Cosine-basis model for a `window`-sample input and `hidden` units
    pub fn cosine_basis(window: usize, hidden: usize, encoder_scale: f64) -> Self {
        let n = window as f64;
        let norm = (2.0 / n).sqrt();
        let basis: Vec<Vec<f64>> = (1..=hidden)
            .map(|k| {
                (0..window)
                    .map(|i| norm * (std::f64::consts::PI * k as f64 * (i as f64 + 0.5) / n).cos())
                    .collect()
            })
            .collect();
        let encoder = basis
            .iter()
            .map(|row| row.iter().map(|w| w * encoder_scale).collect())
            .collect();
        let decoder = (0..window)
            .map(|i| basis.iter().map(|row| row[i] / encoder_scale).collect())
            .collect();
        Self { encoder, decoder }
    }

    /// Check the two matrices agree with each other and with `window`
    pub fn validate(&self, window: usize) -> MlResult<()> {
        let hidden = self.encoder.len();
        if hidden == 0 {
            return Err(MlError::InvalidModel("encoder has no rows".into()));
        }
        if self.encoder.iter().any(|row| row.len() != window) {
            return Err(MlError::InvalidModel(format!("encoder rows must have {} columns", window)));
        }
        if self.decoder.len() != window || self.decoder.iter().any(|row| row.len() != hidden) {
            return Err(MlError::InvalidModel(format!(
                "decoder must be {} × {}",
                window, hidden
            )));
        }
        if self.encoder.iter().chain(&self.decoder).flatten().any(|w| !w.is_finite()) {
            return Err(MlError::InvalidModel("weights must be finite".into()));
        }
        Ok(())
    }

    /// Encode then decode a normalized window
    pub fn reconstruct(&self, z: &[f64]) -> Vec<f64> {
        let hidden: Vec<f64> = self
            .encoder
            .iter()
            .map(|row| row.iter().zip(z).map(|(w, x)| w * x).sum::<f64>().tanh())
            .collect();
        self.decoder
            .iter()
            .map(|row| row.iter().zip(&hidden).map(|(w, h)| w * h).sum())
            .collect()
    }
}

/// Temporal detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Hidden units of the default model
    pub hidden: usize,
    /// Scale applied to the default encoder
    pub encoder_scale: f64,
    /// RMS reconstruction error above which the window is anomalous
    pub threshold: f64,
    /// Injected weights, replacing the default model
    pub model: Option<TemporalModel>,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            hidden: 4,
            encoder_scale: 0.1,
            threshold: 0.8,
            model: None,
        }
    }
}

/// Reconstruction-error detector over the newest [`WINDOW`] RSSI samples
#[derive(Debug, Clone)]
pub struct TemporalDetector {
    model: TemporalModel,
    threshold: f64,
}

impl TemporalDetector {
    /// Build from configuration, validating injected weights
    pub fn new(config: TemporalConfig) -> MlResult<Self> {
        if !(config.threshold > 0.0) {
            return Err(MlError::InvalidConfig("temporal threshold must be positive".into()));
        }
        let model = match config.model {
            Some(model) => model,
            None => {
                if config.hidden == 0 || config.hidden >= WINDOW || !(config.encoder_scale > 0.0) {
                    return Err(MlError::InvalidConfig(format!(
                        "hidden must be in 1..{} and encoder_scale positive",
                        WINDOW
                    )));
                }
                TemporalModel::cosine_basis(WINDOW, config.hidden, config.encoder_scale)
            }
        };
        model.validate(WINDOW)?;
        Ok(Self {
            model,
            threshold: config.threshold,
        })
    }

    /// Reconstruction error of a full window, `None` if it is not full
    pub fn window_error(&self, window: &HistoryBuffer<f64, WINDOW>) -> Option<f64> {
        if window.len() < window.capacity() {
            return None;
        }
        let values: Vec<f64> = window.oldest_ordered().copied().collect();
        let z = normalize(&values);
        let recon = self.model.reconstruct(&z);
        let mse = z.iter().zip(&recon).map(|(a, b)| (a - b).powi(2)).sum::<f64>() / z.len() as f64;
        Some(mse.sqrt())
    }

    fn severity(&self, error: f64) -> Severity {
        if error >= 2.0 * self.threshold {
            Severity::High
        } else if error >= 1.5 * self.threshold {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Zero-mean unit-variance copy, all zeros for a constant input
fn normalize(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std_dev = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std_dev < f64::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std_dev).collect()
}

impl AnomalyDetector for TemporalDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Temporal
    }

    fn detect(&self, history: &DeviceHistory, telemetry: &Telemetry) -> Detection {
        let Some(rssi) = telemetry.rssi else {
            return Detection::quiet(self.method(), AnomalyKind::TemporalAnomaly, 0.0);
        };

        let mut window: HistoryBuffer<f64, WINDOW> = HistoryBuffer::new();
        window.extend(history.recent_rssi(WINDOW - 1));
        window.write(rssi);

        // Not enough data yet is not an anomaly
        let Some(error) = self.window_error(&window) else {
            return Detection::quiet(self.method(), AnomalyKind::TemporalAnomaly, 0.0);
        };
        debug!("temporal device={} error={:.3}", telemetry.device_id, error);
        if error <= self.threshold {
            return Detection::quiet(self.method(), AnomalyKind::TemporalAnomaly, error);
        }

        Detection {
            method: self.method(),
            fired: true,
            score: error,
            confidence: (error / (2.0 * self.threshold)).min(1.0),
            kind: AnomalyKind::TemporalAnomaly,
            severity: self.severity(error),
            description: format!(
                "Signal pattern over the last {} samples reconstructs with error {:.2}",
                WINDOW, error
            ),
            details: json!({ "reconstruction_error": error, "window": WINDOW }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_core::{DeviceId, Protocol};

    fn device() -> DeviceId {
        DeviceId::from_octets([2, 0, 0, 0, 0, 5])
    }

    fn detector() -> TemporalDetector {
        TemporalDetector::new(TemporalConfig::default()).unwrap()
    }

    fn error_of(values: &[f64]) -> f64 {
        let mut window = HistoryBuffer::new();
        window.extend(values.iter().copied());
        detector().window_error(&window).unwrap()
    }

    #[test]
    fn test_reports_zero_until_window_full() {
        let mut h = DeviceHistory::new(device());
        for i in 0..(WINDOW as u64 - 2) {
            let v = if i % 2 == 0 { -40.0 } else { -90.0 };
            h.record(&Telemetry::new(device(), Protocol::Wifi, i).with_rssi(v));
        }
        let d = detector().detect(&h, &Telemetry::new(device(), Protocol::Wifi, 99).with_rssi(-40.0));
        assert!(!d.fired);
        assert_eq!(d.score, 0.0);
    }

    #[test]
    fn test_smooth_patterns_reconstruct() {
        let ramp: Vec<f64> = (0..WINDOW).map(|i| -80.0 + i as f64).collect();
        assert!(error_of(&ramp) < 0.2);

        let swing: Vec<f64> = (0..WINDOW)
            .map(|i| -60.0 + 5.0 * (2.0 * std::f64::consts::PI * i as f64 / WINDOW as f64).sin())
            .collect();
        assert!(error_of(&swing) < 0.3);

        assert_eq!(error_of(&[-60.0; WINDOW]), 0.0);
    }

    #[test]
    fn test_oscillation_and_spike_fire() {
        let alternating: Vec<f64> = (0..WINDOW).map(|i| if i % 2 == 0 { -58.0 } else { -62.0 }).collect();
        assert!(error_of(&alternating) > 0.8);

        let mut spike = vec![-60.0; WINDOW];
        spike[WINDOW / 2] = -90.0;
        assert!(error_of(&spike) > 0.8);
    }

    #[test]
    fn test_detect_fires_on_oscillation() {
        let mut h = DeviceHistory::new(device());
        for i in 0..(WINDOW as u64 - 1) {
            let v = if i % 2 == 0 { -58.0 } else { -62.0 };
            h.record(&Telemetry::new(device(), Protocol::Wifi, i).with_rssi(v));
        }
        // WINDOW - 1 is odd, so the next value continues the pattern
        let d = detector().detect(&h, &Telemetry::new(device(), Protocol::Wifi, 99).with_rssi(-62.0));
        assert!(d.fired);
        assert_eq!(d.kind, AnomalyKind::TemporalAnomaly);
        assert!(d.confidence > 0.5);
    }

    #[test]
    fn test_injected_weights_are_validated() {
        let bad = TemporalConfig {
            model: Some(TemporalModel {
                encoder: vec![vec![0.1; WINDOW - 1]],
                decoder: vec![vec![1.0]; WINDOW],
            }),
            ..Default::default()
        };
        assert!(matches!(TemporalDetector::new(bad), Err(MlError::InvalidModel(_))));

        let good = TemporalConfig {
            model: Some(TemporalModel::cosine_basis(WINDOW, 2, 0.1)),
            ..Default::default()
        };
        assert!(TemporalDetector::new(good).is_ok());
    }
}
