//! Error Types for Ranging, Positioning and Record Validation
//!
//! ## Design Philosophy
//!
//! The engine follows an *isolate and continue* rule: a single bad anchor,
//! sample or device must never halt estimation for everything else. Errors
//! are therefore split into two groups:
//!
//! 1. **Hard errors** (`CoreError`): the caller handed in something that
//!    cannot be interpreted at all, such as a malformed hardware address or a
//!    configuration with a negative path-loss exponent. These are returned as
//!    `Err` and the offending record is dropped.
//!
//! 2. **Degradations** ([`Degradation`]): the inputs are valid but too sparse
//!    for a good answer (fewer than three usable anchors, an empty fingerprint
//!    store). Estimators still return a result, tagged with the degradation
//!    and carrying low confidence and high uncertainty.
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use meshwatch_core::{CoreError, DeviceId};
//!
//! match "aa:bb:cc:dd:ee:zz".parse::<DeviceId>() {
//!     Ok(id) => println!("tracking {}", id),
//!     Err(CoreError::InvalidAddress(raw)) => {
//!         // Discovery layer produced garbage, drop the record
//!         eprintln!("skipping {}", raw);
//!     }
//!     Err(_) => {}
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Hard failures raised by the core engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Hardware address could not be parsed as six hex octets
    #[error("malformed hardware address: {0}")]
    InvalidAddress(String),

    /// A record field is malformed (non-finite RSSI, out-of-range value)
    #[error("malformed record field `{field}`: {reason}")]
    Parse {
        /// Name of the offending field
        field: &'static str,
        /// Human-readable reason
        reason: String,
    },

    /// Anchor referenced by a reading is not registered
    #[error("unknown anchor: {0}")]
    UnknownAnchor(String),

    /// Configuration value outside its valid range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be read or decoded
    #[error("failed to load configuration: {0}")]
    ConfigIo(String),

    /// Linear system has no unique solution (collinear anchors)
    #[error("singular linear system")]
    SingularSystem,
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::ConfigIo(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::ConfigIo(err.to_string())
    }
}

/// Reasons an estimator returned a low-quality answer instead of failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Degradation {
    /// Trilateration needs three anchors with known coordinates
    InsufficientAnchors {
        /// Anchors that had both a reading and known coordinates
        usable: usize,
        /// Minimum required
        required: usize,
    },
    /// No calibration points recorded yet
    EmptyFingerprintStore,
    /// Stored fingerprints share no anchor with the query
    NoCommonAnchors,
    /// Every kernel similarity underflowed to zero
    NoSimilarFingerprints,
    /// Least squares could not be solved; centroid returned
    SingularGeometry,
}

impl core::fmt::Display for Degradation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Degradation::InsufficientAnchors { usable, required } => {
                write!(f, "insufficient anchors: {} of {} required", usable, required)
            }
            Degradation::EmptyFingerprintStore => write!(f, "fingerprint store is empty"),
            Degradation::NoCommonAnchors => write!(f, "no anchors in common with stored fingerprints"),
            Degradation::NoSimilarFingerprints => write!(f, "no similar fingerprints"),
            Degradation::SingularGeometry => write!(f, "anchor geometry is singular"),
        }
    }
}
