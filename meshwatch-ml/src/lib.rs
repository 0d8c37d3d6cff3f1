//! Anomaly Ensemble for Meshwatch
//!
//! ## Overview
//!
//! Four detectors look at the same device history and the newest telemetry
//! sample, and a weighted vote turns their findings into one risk score plus
//! operator recommendations.
//!
//! ```text
//!                      ┌──────────────────────┐
//!                  ┌──→│ Statistical (z/seas.)│──┐
//!                  │   └──────────────────────┘  │
//! DeviceHistory ───┤   ┌──────────────────────┐  │   ┌──────────┐
//!      +           ├──→│ Isolation forest     │──┼──→│ Ensemble │──→ EnsembleReport
//! Telemetry        │   └──────────────────────┘  │   │   vote   │     ├── risk_score
//!                  │   ┌──────────────────────┐  │   └──────────┘     ├── records
//!                  ├──→│ Temporal reconstruct.│──┤                    └── recommendations
//!                  │   └──────────────────────┘  │
//!                  │   ┌──────────────────────┐  │
//!                  └──→│ Identity change      │──┘
//!                      └──────────────────────┘
//! ```
//!
//! ## Why these detectors?
//!
//! 1. **Statistical**: cheap, explains itself (how many sigmas off)
//! 2. **Isolation forest**: catches odd feature combinations the z-score misses
//! 3. **Temporal**: catches shape anomalies (oscillation, spikes) in the window
//! 4. **Identity**: catches new devices and spoofed hardware addresses
//!
//! ## Model parameters
//!
//! The forest topology and the temporal encoder/decoder weights are
//! configuration data. The crate ships deterministic defaults (a forest built
//! from history with a seeded RNG, a cosine-basis projection for the temporal
//! transform) and accepts injected ones through serde.
//!
//! ## Statelessness
//!
//! Detectors hold configuration only. All per-device state lives in
//! [`DeviceHistory`], owned by the caller; evaluation reads it and the caller
//! commits the new sample afterwards.

#![deny(unsafe_code)]

pub mod detectors;
pub mod ensemble;
pub mod features;
pub mod forest;
pub mod history;
pub mod node;
pub mod record;
pub mod scoring;
pub mod tree;

use thiserror::Error;

pub use detectors::{
    AnomalyDetector, Detection, Detector, IdentityDetector, IsolationDetector, StatisticalConfig,
    StatisticalDetector, TemporalConfig, TemporalDetector, TemporalModel,
};
pub use ensemble::{recommendation, AnomalyEnsemble, DetectorWeights, EnsembleConfig, EnsembleReport, POOR_SIGNAL_ADVICE};
pub use features::{FeatureVector, Sample, MAX_FEATURES};
pub use forest::{ForestConfig, ForestModel, ForestStats, IsolationForest};
pub use history::{DeviceHistory, RunningStats, Telemetry};
pub use node::{c_factor, Node, NodeType};
pub use record::{AnomalyKind, AnomalyRecord, DetectionMethod, Severity};
pub use scoring::{calculate_anomaly_score, AnomalyScore};
pub use tree::IsolationTree;

/// Default subsample size per tree
pub const DEFAULT_SAMPLE_SIZE: usize = 256;

/// Default isolation-forest anomaly threshold
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 0.6;

/// Errors raised by model construction and scoring
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MlError {
    /// Not enough samples to build a model
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData {
        /// Minimum required
        needed: usize,
        /// Supplied
        got: usize,
    },

    /// Feature index out of range or feature count mismatch
    #[error("invalid feature: {0}")]
    InvalidFeature(String),

    /// Injected model data is inconsistent
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Configuration rejected by validation
    #[error("invalid ml config: {0}")]
    InvalidConfig(String),
}

/// Result type for ml operations
pub type MlResult<T> = Result<T, MlError>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_display() {
        let e = MlError::InsufficientData { needed: 2, got: 0 };
        assert_eq!(e.to_string(), "insufficient data: need at least 2, got 0");
    }
}
