//! Continuous monitoring for Meshwatch
//!
//! ## Overview
//!
//! The monitor runs independently cadenced loops over shared, internally
//! locked stores:
//!
//! | Loop      | Default | Work                                                |
//! |-----------|---------|-----------------------------------------------------|
//! | discovery | 30 s    | scan every protocol, merge, apply presence hysteresis |
//! | telemetry | 15 s    | poll collectors, smooth ranging samples, update baselines |
//! | anomaly   | 60 s    | run the ensemble on queued observations, refit the forest |
//! | trend     | 60 s    | RSSI slope and health checks                          |
//! | prune     | 1 h     | forget devices unseen for the retention window        |
//! | delivery  | 10 s    | push queued alerts to every sink                      |
//!
//! A failing iteration is logged and the loop continues at its next tick.
//! The only fatal condition is having no usable discovery transport at
//! startup.
//!
//! ## Alerting
//!
//! Alerts are deduplicated per `(device, kind)` with a cooldown (5 minutes
//! by default, 24 hours for new devices). Delivery failures leave the alert
//! queued for the failing sink only.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use meshwatch_monitor::{LogSink, Monitor, Settings};
//!
//! # async fn run(arp: Arc<dyn meshwatch_monitor::DiscoverySource>) -> meshwatch_monitor::MonitorResult<()> {
//! let monitor = Monitor::builder(Settings::from_file("meshwatch.json")?)
//!     .discovery(arp)
//!     .sink(Arc::new(LogSink))
//!     .build()?;
//! monitor.start().await?;
//! // ...
//! monitor.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod alerts;
pub mod baseline;
pub mod config;
pub mod error;
pub mod monitor;
pub mod registry;
pub mod scheduler;
pub mod sources;
pub mod trend;

// Public API
pub use alerts::{Alert, AlertId, AlertManager, AlertRequest, AlertStats, MAX_PENDING_DELIVERIES};
pub use baseline::{Baseline, BaselineStore, RiskLevel};
pub use config::{CooldownConfig, MonitorConfig, Settings};
pub use error::{MonitorError, MonitorResult};
pub use monitor::{Monitor, MonitorBuilder};
pub use registry::{merge_sightings, DeviceEntry, DeviceRegistry, PresenceState, ScanReport};
pub use scheduler::{run_blocking, JobSpec, JobStats, PeriodicJob, Supervisor};
pub use sources::{scan_all, AlertSink, DiscoverySource, LogSink, ScanOutcome, TelemetryBatch, TelemetrySource};
pub use trend::TrendAnalyzer;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
