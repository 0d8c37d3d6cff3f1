//! Alert manager
//!
//! ## Cooldown
//!
//! Alerts are keyed by `(device, kind)`. A request inside the key's cooldown
//! window is dropped outright: it is not queued, not counted and not
//! returned. The check and the insert happen under one lock, so two
//! detections racing on the same key produce one alert.
//!
//! Resolving an alert clears its key's cooldown, so a condition that clears
//! and comes back is reported again.
//!
//! ## Delivery
//!
//! ```text
//! raise ──→ active ──resolve──→ resolved history
//!   │
//!   └────→ pending ──deliver──→ sink 1 ✓
//!                           └─→ sink 2 ✗ ──→ pending (sink 2 only)
//! ```
//!
//! Each pending entry remembers which sinks still owe it a delivery. The
//! lock is released before any sink is awaited. The queue holds at most
//! [`MAX_PENDING_DELIVERIES`] entries; past that the oldest are dropped and
//! counted in [`AlertStats::dropped`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use log::{info, warn};
use meshwatch_core::{DeviceId, TimeSource, Timestamp};
use meshwatch_ml::{AnomalyKind, DetectionMethod, Severity};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::CooldownConfig;
use crate::sources::AlertSink;

/// Alert identifier, unique per manager
pub type AlertId = u64;

/// An operator-facing alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: AlertId,
    pub severity: Severity,
    pub kind: AnomalyKind,
    pub message: String,
    /// Recommended operator action
    #[serde(default)]
    pub recommendation: Option<String>,
    /// Associated device, if any
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    /// Component that raised the alert
    pub method: DetectionMethod,
    pub resolved: bool,
    pub created_at: Timestamp,
    #[serde(default)]
    pub resolved_at: Option<Timestamp>,
}

/// What a detector wants to report
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRequest {
    pub device_id: Option<DeviceId>,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub message: String,
    pub recommendation: Option<String>,
    pub method: DetectionMethod,
}

impl AlertRequest {
    /// Request for a device-level condition
    pub fn for_device(
        device_id: DeviceId,
        kind: AnomalyKind,
        severity: Severity,
        method: DetectionMethod,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device_id: Some(device_id),
            kind,
            severity,
            message: message.into(),
            recommendation: None,
            method,
        }
    }

    /// Attach a recommended action
    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertStats {
    pub raised: u64,
    pub suppressed: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
    /// Queued deliveries discarded to keep the queue bounded
    pub dropped: u64,
}

type CooldownKey = (Option<DeviceId>, AnomalyKind);

/// Resolved alerts kept for inspection
const RESOLVED_HISTORY: usize = 256;

/// Alerts waiting for at least one sink
pub const MAX_PENDING_DELIVERIES: usize = 1_024;

struct PendingDelivery {
    alert: Alert,
    remaining: Vec<usize>,
}

#[derive(Default)]
struct AlertState {
    next_id: AlertId,
    last_raised: HashMap<CooldownKey, Timestamp>,
    active: BTreeMap<AlertId, Alert>,
    pending: VecDeque<PendingDelivery>,
    resolved: VecDeque<Alert>,
    stats: AlertStats,
}

impl AlertState {
    fn trim_pending(&mut self) {
        while self.pending.len() > MAX_PENDING_DELIVERIES {
            if let Some(entry) = self.pending.pop_front() {
                warn!("alert delivery dropped id={} queue full", entry.alert.id);
                self.stats.dropped += 1;
            }
        }
    }
}

/// Raises, deduplicates, resolves and delivers alerts
pub struct AlertManager {
    cooldowns: CooldownConfig,
    clock: Arc<dyn TimeSource>,
    sinks: Vec<Arc<dyn AlertSink>>,
    state: Mutex<AlertState>,
}

impl AlertManager {
    /// Manager delivering to `sinks`
    pub fn new(cooldowns: CooldownConfig, clock: Arc<dyn TimeSource>, sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self {
            cooldowns,
            clock,
            sinks,
            state: Mutex::new(AlertState {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Raise an alert unless its key is cooling down
    pub fn raise(&self, request: AlertRequest) -> Option<Alert> {
        let now = self.clock.now();
        let window = self.cooldowns.window_ms(request.kind);
        let key = (request.device_id.clone(), request.kind);

        let mut state = self.state.lock();
        let last = state.last_raised.get(&key).copied();
        if let Some(last) = last {
            if now.saturating_sub(last) < window {
                state.stats.suppressed += 1;
                return None;
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        let alert = Alert {
            id,
            severity: request.severity,
            kind: request.kind,
            message: request.message,
            recommendation: request.recommendation,
            device_id: request.device_id,
            method: request.method,
            resolved: false,
            created_at: now,
            resolved_at: None,
        };
        state.last_raised.insert(key, now);
        state.active.insert(id, alert.clone());
        if !self.sinks.is_empty() {
            state.pending.push_back(PendingDelivery {
                alert: alert.clone(),
                remaining: (0..self.sinks.len()).collect(),
            });
            state.trim_pending();
        }
        state.stats.raised += 1;
        drop(state);

        info!(
            "alert raised id={} kind={} severity={} device={}",
            alert.id,
            alert.kind,
            alert.severity,
            alert.device_id.as_ref().map(|d| d.to_string()).unwrap_or_else(|| "-".into())
        );
        Some(alert)
    }

    /// Resolve one alert, false if it is unknown or already resolved
    pub fn resolve(&self, id: AlertId) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let Some(mut alert) = state.active.remove(&id) else {
            return false;
        };
        state.last_raised.remove(&(alert.device_id.clone(), alert.kind));
        alert.resolved = true;
        alert.resolved_at = Some(now);
        info!("alert resolved id={} kind={}", id, alert.kind);
        if state.resolved.len() == RESOLVED_HISTORY {
            state.resolved.pop_front();
        }
        state.resolved.push_back(alert);
        true
    }

    /// Resolve every active alert of `kind` for `device`
    pub fn resolve_matching(&self, device: &DeviceId, kind: AnomalyKind) -> Vec<AlertId> {
        let ids: Vec<AlertId> = self
            .state
            .lock()
            .active
            .values()
            .filter(|a| a.kind == kind && a.device_id.as_ref() == Some(device))
            .map(|a| a.id)
            .collect();
        ids.into_iter().filter(|id| self.resolve(*id)).collect()
    }

    /// Unresolved alerts, oldest first
    pub fn active(&self) -> Vec<Alert> {
        self.state.lock().active.values().cloned().collect()
    }

    /// Recently resolved alerts, oldest first
    pub fn resolved(&self) -> Vec<Alert> {
        self.state.lock().resolved.iter().cloned().collect()
    }

    /// Alerts still owed to at least one sink
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Counters
    pub fn stats(&self) -> AlertStats {
        self.state.lock().stats
    }

    /// Forget cooldowns and active alerts of a pruned device
    pub fn forget_device(&self, device: &DeviceId) {
        let mut state = self.state.lock();
        state.last_raised.retain(|(d, _), _| d.as_ref() != Some(device));
        state.active.retain(|_, a| a.device_id.as_ref() != Some(device));
    }

    /// Push every pending alert to the sinks that still owe it
    ///
    /// Returns the number of successful sink deliveries.
    pub async fn deliver(&self) -> usize {
        let batch: Vec<PendingDelivery> = self.state.lock().pending.drain(..).collect();
        if batch.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        let mut failures = 0;
        let mut retry = Vec::new();
        for mut entry in batch {
            let mut still_owed = Vec::new();
            for index in entry.remaining.drain(..) {
                let Some(sink) = self.sinks.get(index) else {
                    continue;
                };
                match sink.deliver(&entry.alert).await {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        warn!("alert delivery failed id={} error={}", entry.alert.id, e);
                        failures += 1;
                        still_owed.push(index);
                    }
                }
            }
            if !still_owed.is_empty() {
                entry.remaining = still_owed;
                retry.push(entry);
            }
        }

        let mut state = self.state.lock();
        // Retried entries go first so delivery order is preserved
        for entry in retry.into_iter().rev() {
            state.pending.push_front(entry);
        }
        state.trim_pending();
        state.stats.delivered += delivered as u64;
        state.stats.delivery_failures += failures;
        delivered
    }
}
