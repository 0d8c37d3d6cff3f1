//! Boundaries to the discovery layer and to alert consumers
//!
//! Protocol transports (multicast listeners, neighbor tables, BLE scanners)
//! implement [`DiscoverySource`]; signal collectors implement
//! [`TelemetrySource`]; notification channels implement [`AlertSink`].
//!
//! A scan is cancelled by dropping its future when the collection window
//! closes, so sources must tie sockets and listeners to values that release
//! them on drop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use meshwatch_core::{DiscoveredDevice, Protocol, RangingSample};
use meshwatch_ml::Telemetry;
use tokio::task::JoinSet;

use crate::alerts::Alert;
use crate::error::{MonitorError, MonitorResult};

/// One discovery protocol
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Name for logs
    fn name(&self) -> &str;

    /// Protocol reported on sightings
    fn protocol(&self) -> Protocol;

    /// Check the transport can be opened, called once at startup
    async fn probe(&self) -> MonitorResult<()> {
        Ok(())
    }

    /// Collect the devices currently answering
    async fn scan(&self) -> MonitorResult<Vec<DiscoveredDevice>>;
}

/// Signal and presence observations gathered between scans
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryBatch {
    /// Per-device observations for baselines and anomaly analysis
    pub telemetry: Vec<Telemetry>,
    /// Per-anchor RSSI samples for positioning
    pub ranging: Vec<RangingSample>,
}

/// Periodic telemetry collector
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Name for logs
    fn name(&self) -> &str;

    /// Everything observed since the previous poll
    async fn poll(&self) -> MonitorResult<TelemetryBatch>;
}

/// Alert consumer
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Name for logs
    fn name(&self) -> &str;

    /// Deliver one alert; an error keeps it queued for this sink
    async fn deliver(&self, alert: &Alert) -> MonitorResult<()>;
}

/// Sink writing alerts to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, alert: &Alert) -> MonitorResult<()> {
        warn!(
            "alert id={} kind={} severity={} message={}",
            alert.id, alert.kind, alert.severity, alert.message
        );
        Ok(())
    }
}

/// Result of one scan across every discovery source
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Valid sightings in source registration order
    pub sightings: Vec<DiscoveredDevice>,
    /// Protocol failures and dropped records
    pub failures: Vec<MonitorError>,
    /// Protocols whose scan finished, in source registration order
    pub completed: Vec<Protocol>,
}

/// Run every source concurrently, each bounded by `timeout`
///
/// A failing, slow or panicking source only loses its own sightings.
pub async fn scan_all(sources: &[Arc<dyn DiscoverySource>], timeout: Duration) -> ScanOutcome {
    let mut tasks = JoinSet::new();
    for (index, source) in sources.iter().enumerate() {
        let source = source.clone();
        tasks.spawn(async move {
            let protocol = source.protocol();
            let result = match tokio::time::timeout(timeout, source.scan()).await {
                Ok(result) => result,
                Err(_) => Err(MonitorError::DiscoveryTimeout { protocol }),
            };
            (index, result)
        });
    }

    let mut results: Vec<(usize, MonitorResult<Vec<DiscoveredDevice>>)> = Vec::with_capacity(sources.len());
    let mut outcome = ScanOutcome::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(entry) => results.push(entry),
            Err(e) => outcome.failures.push(MonitorError::SchedulerTaskFailure {
                task: "discovery".into(),
                reason: e.to_string(),
            }),
        }
    }
    results.sort_by_key(|(index, _)| *index);

    for (index, result) in results {
        let name = sources.get(index).map(|s| s.name()).unwrap_or("?");
        match result {
            Ok(devices) => {
                debug!("discovery source={} sightings={}", name, devices.len());
                if let Some(source) = sources.get(index) {
                    if !outcome.completed.contains(&source.protocol()) {
                        outcome.completed.push(source.protocol());
                    }
                }
                for device in devices {
                    match device.validate() {
                        Ok(()) => outcome.sightings.push(device),
                        Err(e) => {
                            warn!("dropping sighting source={} device={} error={}", name, device.address, e);
                            outcome.failures.push(MonitorError::Parse {
                                source_name: name.to_string(),
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
            Err(e) => {
                warn!("discovery failed source={} error={}", name, e);
                outcome.failures.push(e);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_core::DeviceId;

    struct Fixed {
        protocol: Protocol,
        devices: Vec<DiscoveredDevice>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl DiscoverySource for Fixed {
        fn name(&self) -> &str {
            self.protocol.name()
        }

        fn protocol(&self) -> Protocol {
            self.protocol
        }

        async fn scan(&self) -> MonitorResult<Vec<DiscoveredDevice>> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(MonitorError::DiscoveryFailure {
                    protocol: self.protocol,
                    reason: "no route".into(),
                });
            }
            Ok(self.devices.clone())
        }
    }

    fn source(protocol: Protocol, n: u8, delay_ms: u64, fail: bool) -> Arc<dyn DiscoverySource> {
        Arc::new(Fixed {
            protocol,
            devices: vec![DiscoveredDevice::new(DeviceId::from_octets([2, 0, 0, 0, 4, n]), protocol, 0)],
            delay: Duration::from_millis(delay_ms),
            fail,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_isolated() {
        let sources = vec![
            source(Protocol::Arp, 1, 10, false),
            source(Protocol::Mdns, 2, 10, true),
            source(Protocol::Ssdp, 3, 60_000, false),
            source(Protocol::Ping, 4, 20, false),
        ];
        let outcome = scan_all(&sources, Duration::from_secs(3)).await;

        let protocols: Vec<Protocol> = outcome.sightings.iter().map(|d| d.protocol).collect();
        assert_eq!(protocols, vec![Protocol::Arp, Protocol::Ping]);
        assert_eq!(outcome.completed, vec![Protocol::Arp, Protocol::Ping]);
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome
            .failures
            .iter()
            .any(|e| matches!(e, MonitorError::DiscoveryTimeout { protocol: Protocol::Ssdp })));
    }

    #[tokio::test]
    async fn test_malformed_sightings_are_dropped() {
        let bad = DiscoveredDevice::new(DeviceId::from_octets([2, 0, 0, 0, 4, 9]), Protocol::Wifi, 0).with_rssi(f64::NAN);
        let sources: Vec<Arc<dyn DiscoverySource>> = vec![Arc::new(Fixed {
            protocol: Protocol::Wifi,
            devices: vec![bad, DiscoveredDevice::new(DeviceId::from_octets([2, 0, 0, 0, 4, 8]), Protocol::Wifi, 0)],
            delay: Duration::ZERO,
            fail: false,
        })];
        let outcome = scan_all(&sources, Duration::from_secs(1)).await;
        assert_eq!(outcome.sightings.len(), 1);
        assert!(matches!(outcome.failures[0], MonitorError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_log_sink_accepts() {
        let alert = Alert {
            id: 1,
            severity: meshwatch_ml::Severity::Low,
            kind: meshwatch_ml::AnomalyKind::NewDevice,
            message: "hello".into(),
            recommendation: None,
            device_id: None,
            method: meshwatch_ml::DetectionMethod::Identity,
            resolved: false,
            created_at: 0,
            resolved_at: None,
        };
        assert!(LogSink.deliver(&alert).await.is_ok());
    }
}
