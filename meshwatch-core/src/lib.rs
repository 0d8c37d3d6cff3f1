//! Core positioning engine for Meshwatch
//!
//! Turns RSSI observations of networked devices into locations with a
//! confidence and an uncertainty radius.
//!
//! Key properties:
//! - Every estimator degrades instead of failing on sparse data
//! - Fusion is a pure function of its inputs
//! - Per-device state (smoothers, tracks) is serialized per key
//!
//! ```no_run
//! use std::sync::Arc;
//! use meshwatch_core::{Anchor, Locator, LocatorConfig, Point, SystemTime, readings};
//!
//! let locator = Locator::new(LocatorConfig::default(), Arc::new(SystemTime)).unwrap();
//! locator.register_anchor(Anchor::new("hall", Point::new(0.0, 0.0))).unwrap();
//! locator.register_anchor(Anchor::new("den", Point::new(8.0, 0.0))).unwrap();
//! locator.register_anchor(Anchor::new("loft", Point::new(0.0, 6.0))).unwrap();
//!
//! let device = "aa:bb:cc:dd:ee:ff".parse().unwrap();
//! let fix = locator.estimate_location(&device, &readings([("hall", -62.0), ("den", -70.0), ("loft", -68.0)]));
//! println!("{} ±{:.1} m", fix.location, fix.uncertainty);
//! ```

#![deny(unsafe_code)]

pub mod buffer;
pub mod classify;
pub mod config;
pub mod device;
pub mod errors;
pub mod fingerprint;
pub mod geometry;
pub mod locator;
pub mod positioning;
pub mod ranging;
pub mod time;

// Public API
pub use buffer::{CircularBuffer, RssiSample, SignalWindow};
pub use classify::DeviceClassifier;
pub use config::LocatorConfig;
pub use device::{DeviceId, DeviceType, DiscoveredDevice, IdentityFingerprint, Protocol, RangingSample};
pub use errors::{CoreError, CoreResult, Degradation};
pub use fingerprint::{CalibrationSummary, FingerprintStore, LocationFingerprint};
pub use geometry::{readings, Anchor, AnchorId, Point, Readings};
pub use locator::Locator;
pub use positioning::{EstimatorKind, FusedEstimate, PositionEstimate};
pub use time::{ManualClock, SystemTime, TimeSource, Timestamp};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
