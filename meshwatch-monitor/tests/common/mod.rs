//! Shared fixtures for monitor integration tests
//!
//! - Scripted discovery source whose visible devices a test controls
//! - Queue-backed telemetry source
//! - Recording alert sink that can be switched into failure

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use meshwatch_core::{time::MS_PER_SECOND, DeviceId, DeviceType, DiscoveredDevice, ManualClock, Protocol, TimeSource};
use meshwatch_ml::{AnomalyKind, Telemetry};
use meshwatch_monitor::{
    Alert, AlertSink, DiscoverySource, Monitor, MonitorError, MonitorResult, Settings, TelemetryBatch,
    TelemetrySource,
};
use parking_lot::Mutex;

/// Start of every manual clock
pub const EPOCH: u64 = 1_700_000_000_000;

/// Device id from a small integer
pub fn device(n: u8) -> DeviceId {
    DeviceId::from_octets([0x02, 0, 0, 0, 0x10, n])
}

/// Router telemetry at the clock's current time
pub fn reading(clock: &ManualClock, n: u8, rssi: f64) -> Telemetry {
    Telemetry::new(device(n), Protocol::Wifi, clock.now())
        .with_rssi(rssi)
        .with_vendor("Netgear")
        .with_type(DeviceType::Router)
}

/// Feed `values` through the monitor, advancing the clock by `step_secs` after each
pub fn feed(monitor: &Monitor, clock: &ManualClock, n: u8, values: &[f64], step_secs: u64) {
    for v in values {
        monitor.evaluate_anomalies(&reading(clock, n, *v)).unwrap();
        clock.advance(step_secs * MS_PER_SECOND);
    }
}

/// Active alerts of `kind`
pub fn active_of(monitor: &Monitor, kind: AnomalyKind) -> Vec<Alert> {
    monitor
        .get_active_alerts()
        .into_iter()
        .filter(|a| a.kind == kind)
        .collect()
}

/// Discovery source reporting whatever the test put in `visible`
pub struct ScriptedDiscovery {
    protocol: Protocol,
    clock: Arc<dyn TimeSource>,
    visible: Mutex<Vec<DeviceId>>,
    usable: bool,
    failing: AtomicBool,
}

impl ScriptedDiscovery {
    pub fn new(protocol: Protocol, clock: Arc<dyn TimeSource>) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            clock,
            visible: Mutex::new(Vec::new()),
            usable: true,
            failing: AtomicBool::new(false),
        })
    }

    /// Source whose transport cannot be opened
    pub fn unusable(protocol: Protocol, clock: Arc<dyn TimeSource>) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            clock,
            visible: Mutex::new(Vec::new()),
            usable: false,
            failing: AtomicBool::new(false),
        })
    }

    pub fn show(&self, id: DeviceId) {
        let mut visible = self.visible.lock();
        if !visible.contains(&id) {
            visible.push(id);
        }
    }

    pub fn hide(&self, id: &DeviceId) {
        self.visible.lock().retain(|v| v != id);
    }

    /// Make every following scan fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DiscoverySource for ScriptedDiscovery {
    fn name(&self) -> &str {
        "scripted"
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn probe(&self) -> MonitorResult<()> {
        if self.usable {
            Ok(())
        } else {
            Err(MonitorError::DiscoveryFailure {
                protocol: self.protocol,
                reason: "permission denied".into(),
            })
        }
    }

    async fn scan(&self) -> MonitorResult<Vec<DiscoveredDevice>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitorError::DiscoveryFailure {
                protocol: self.protocol,
                reason: "interface down".into(),
            });
        }
        let now = self.clock.now();
        Ok(self
            .visible
            .lock()
            .iter()
            .map(|id| {
                DiscoveredDevice::new(id.clone(), self.protocol, now)
                    .with_rssi(-55.0)
                    .with_vendor("Netgear")
                    .with_type(DeviceType::Router)
            })
            .collect())
    }
}

/// Telemetry source handing out pre-loaded batches
#[derive(Default)]
pub struct QueuedTelemetry {
    batches: Mutex<VecDeque<TelemetryBatch>>,
}

impl QueuedTelemetry {
    pub fn push(&self, batch: TelemetryBatch) {
        self.batches.lock().push_back(batch);
    }
}

#[async_trait]
impl TelemetrySource for QueuedTelemetry {
    fn name(&self) -> &str {
        "queued"
    }

    async fn poll(&self) -> MonitorResult<TelemetryBatch> {
        Ok(self.batches.lock().pop_front().unwrap_or_default())
    }
}

/// Sink keeping every delivered alert
#[derive(Default)]
pub struct RecordingSink {
    pub failing: AtomicBool,
    pub received: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    pub fn kinds(&self) -> Vec<AnomalyKind> {
        self.received.lock().iter().map(|a| a.kind).collect()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, alert: &Alert) -> MonitorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitorError::AlertDeliverySinkFailure {
                sink: "recording".into(),
                reason: "unreachable".into(),
            });
        }
        self.received.lock().push(alert.clone());
        Ok(())
    }
}

/// Default settings with no scheduler jitter
pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.monitor.jitter_ms = 0;
    settings
}
