//! Monitoring errors
//!
//! Only [`MonitorError::NoDiscoveryTransport`] is fatal. Every other variant
//! is raised inside one protocol, one sink or one loop iteration, logged,
//! and then the affected unit is skipped until its next turn.

use meshwatch_core::{CoreError, Protocol};
use meshwatch_ml::MlError;
use thiserror::Error;

/// Result type for monitoring operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Failures raised by the monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    /// One discovery protocol failed; the others continue
    #[error("discovery via {protocol} failed: {reason}")]
    DiscoveryFailure { protocol: Protocol, reason: String },

    /// One discovery protocol did not finish inside its collection window
    #[error("discovery via {protocol} timed out")]
    DiscoveryTimeout { protocol: Protocol },

    /// A protocol response could not be interpreted; the sample is dropped
    #[error("malformed response from {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    /// One iteration of a periodic task failed or panicked
    #[error("task `{task}` iteration failed: {reason}")]
    SchedulerTaskFailure { task: String, reason: String },

    /// An alert sink rejected a delivery; the alert stays queued
    #[error("alert sink `{sink}` failed: {reason}")]
    AlertDeliverySinkFailure { sink: String, reason: String },

    /// No discovery source could be initialized
    #[error("no usable discovery transport")]
    NoDiscoveryTransport,

    /// `start` was called on a monitor whose loops are already running
    #[error("monitor is already running")]
    AlreadyRunning,

    /// Monitor configuration outside its valid range
    #[error("invalid monitor configuration: {0}")]
    Config(String),

    /// Positioning engine error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Anomaly ensemble error
    #[error(transparent)]
    Ml(#[from] MlError),
}

impl MonitorError {
    /// Whether the monitor cannot run at all after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, MonitorError::NoDiscoveryTransport)
    }
}
