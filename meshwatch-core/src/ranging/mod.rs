//! Ranging Primitives
//!
//! ## Overview
//!
//! Turns raw RSSI into the two quantities every position estimator needs: a
//! smoothed signal level and a distance.
//!
//! ```text
//! RangingSample ─→ SmootherBank ─→ smoothed RSSI ─┬─→ PathLossModel ─→ meters
//!                  (device, anchor)                │        ↑
//!                                                  │  EnvironmentModel
//!                                                  └─→ quality / confidence
//! ```
//!
//! - [`path_loss`]: log-distance model with room-specific exponents
//! - [`environment`]: additive correction (learned shadowing, occupancy schedule)
//! - [`smoother`]: scalar Kalman per (device, anchor), EWMA alternative
//! - [`quality`]: tiers, stability and per-reading confidence

pub mod environment;
pub mod path_loss;
pub mod quality;
pub mod smoother;

pub use environment::{EnvironmentConfig, EnvironmentModel};
pub use path_loss::{PathLossConfig, PathLossModel};
pub use quality::{assess, rssi_confidence, signal_stability, QualityReport, SignalQuality};
pub use smoother::{EwmaSmoother, ScalarKalman, SmootherBank, SmootherConfig};
