//! Monitor facade: owns every store and drives the periodic loops
//!
//! ```text
//!                 ┌──────────── Monitor ────────────┐
//! discovery ──→   │ registry ── baselines           │
//! telemetry ──→   │ locator     histories ── ensemble│ ──→ alerts ──→ sinks
//!                 └─────────────────────────────────┘
//! ```
//!
//! Each store does its own locking and no lock is held across an await.
//! Lock order where two are taken together: ensemble, then histories.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use meshwatch_core::{
    device::validate_rssi, Anchor, CalibrationSummary, DeviceClassifier, DeviceId, FusedEstimate, Locator, Point,
    Readings, SystemTime, TimeSource,
};
use meshwatch_ml::{
    recommendation, AnomalyEnsemble, AnomalyKind, AnomalyRecord, DetectionMethod, DeviceHistory, ForestStats,
    Sample, Severity, Telemetry,
};
use parking_lot::{Mutex, RwLock};

use crate::alerts::{Alert, AlertId, AlertManager, AlertRequest};
use crate::baseline::{Baseline, BaselineStore};
use crate::config::{MonitorConfig, Settings};
use crate::error::{MonitorError, MonitorResult};
use crate::registry::{merge_sightings, DeviceRegistry, ScanReport};
use crate::scheduler::{run_blocking, JobSpec, JobStats, PeriodicJob, Supervisor};
use crate::sources::{scan_all, AlertSink, DiscoverySource, TelemetrySource};
use crate::trend::TrendAnalyzer;

/// Observations waiting for the anomaly loop
const MAX_PENDING_TELEMETRY: usize = 4_096;

/// Advice attached to offline alerts
const OFFLINE_ADVICE: &str = "Check device power and network connection";

/// Assembles a [`Monitor`]
pub struct MonitorBuilder {
    settings: Settings,
    clock: Arc<dyn TimeSource>,
    discovery: Vec<Arc<dyn DiscoverySource>>,
    telemetry: Vec<Arc<dyn TelemetrySource>>,
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl MonitorBuilder {
    /// Builder using the system clock
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            clock: Arc::new(SystemTime),
            discovery: Vec::new(),
            telemetry: Vec::new(),
            sinks: Vec::new(),
        }
    }

    /// Replace the clock
    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Add a discovery protocol; registration order decides merge priority
    pub fn discovery(mut self, source: Arc<dyn DiscoverySource>) -> Self {
        self.discovery.push(source);
        self
    }

    /// Add a telemetry collector
    pub fn telemetry(mut self, source: Arc<dyn TelemetrySource>) -> Self {
        self.telemetry.push(source);
        self
    }

    /// Add an alert consumer
    pub fn sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Validate settings and build every store
    pub fn build(self) -> MonitorResult<Monitor> {
        self.settings.validate()?;
        let Settings {
            locator,
            ensemble,
            monitor,
        } = self.settings;

        let inner = Inner {
            locator: Locator::new(locator, self.clock.clone())?,
            ensemble: RwLock::new(AnomalyEnsemble::new(ensemble)?),
            registry: DeviceRegistry::new(monitor.offline_after_misses),
            baselines: BaselineStore::new(monitor.baseline_min_alpha),
            histories: Mutex::new(HashMap::new()),
            alerts: AlertManager::new(monitor.cooldowns.clone(), self.clock.clone(), self.sinks),
            trend: TrendAnalyzer::new(monitor.trend_window, monitor.trend_decline_db_per_sample),
            classifier: DeviceClassifier,
            pending: Mutex::new(VecDeque::new()),
            anomaly_ticks: AtomicU32::new(0),
            discovery: self.discovery,
            telemetry: self.telemetry,
            clock: self.clock,
            config: monitor,
        };
        Ok(Monitor {
            inner: Arc::new(inner),
            supervisor: Mutex::new(None),
        })
    }
}

struct Inner {
    config: MonitorConfig,
    clock: Arc<dyn TimeSource>,
    locator: Locator,
    ensemble: RwLock<AnomalyEnsemble>,
    registry: DeviceRegistry,
    baselines: BaselineStore,
    histories: Mutex<HashMap<DeviceId, DeviceHistory>>,
    alerts: AlertManager,
    trend: TrendAnalyzer,
    classifier: DeviceClassifier,
    pending: Mutex<VecDeque<Telemetry>>,
    anomaly_ticks: AtomicU32,
    discovery: Vec<Arc<dyn DiscoverySource>>,
    telemetry: Vec<Arc<dyn TelemetrySource>>,
}

impl Inner {
    fn enqueue(&self, telemetry: Telemetry) {
        let mut pending = self.pending.lock();
        if pending.len() == MAX_PENDING_TELEMETRY {
            pending.pop_front();
        }
        pending.push_back(telemetry);
    }

    fn evaluate(&self, telemetry: &Telemetry) -> MonitorResult<Vec<AnomalyRecord>> {
        if let Some(rssi) = telemetry.rssi {
            validate_rssi(rssi)?;
        }
        let id = &telemetry.device_id;
        let report = {
            let ensemble = self.ensemble.read();
            let mut histories = self.histories.lock();
            let history = histories
                .entry(id.clone())
                .or_insert_with(|| DeviceHistory::new(id.clone()));
            ensemble.evaluate_and_record(history, telemetry)
        };

        for detection in report.detections.iter().filter(|d| d.fired) {
            let mut request = AlertRequest::for_device(
                id.clone(),
                detection.kind,
                detection.severity,
                detection.method,
                detection.description.clone(),
            );
            if let Some(advice) = recommendation(detection) {
                request = request.with_recommendation(advice);
            }
            self.alerts.raise(request);
        }
        Ok(report.records)
    }

    async fn discovery_tick(&self) -> ScanReport {
        let outcome = scan_all(&self.discovery, self.config.discovery_timeout()).await;
        let mut sightings = merge_sightings(outcome.sightings);
        for sighting in sightings.iter_mut() {
            self.classifier.enrich(sighting);
        }

        if outcome.completed.is_empty() && !self.discovery.is_empty() {
            warn!(
                "no discovery source completed sources={} failures={}",
                self.discovery.len(),
                outcome.failures.len()
            );
        }
        let report = self.registry.observe_scan(&sightings, &outcome.completed);
        for id in &report.reappeared {
            let resolved = self.alerts.resolve_matching(id, AnomalyKind::DeviceOffline);
            self.baselines.reset(id);
            debug!("device reappeared device={} resolved={}", id, resolved.len());
        }
        let now = self.clock.now();
        for id in &report.went_offline {
            self.baselines.update(id, None, false, now);
            let request = AlertRequest::for_device(
                id.clone(),
                AnomalyKind::DeviceOffline,
                Severity::Medium,
                DetectionMethod::Presence,
                format!(
                    "Device {} missed {} consecutive scans",
                    id, self.config.offline_after_misses
                ),
            )
            .with_recommendation(OFFLINE_ADVICE);
            self.alerts.raise(request);
        }
        for sighting in &sightings {
            self.baselines
                .update(&sighting.address, sighting.rssi, sighting.is_online, sighting.last_seen);
            self.enqueue(Telemetry::from(sighting));
        }
        debug!(
            "discovery seen={} new={} offline={} failures={}",
            report.seen,
            report.new_devices.len(),
            report.went_offline.len(),
            outcome.failures.len()
        );
        report
    }

    async fn telemetry_tick(&self) -> usize {
        let mut accepted = 0;
        for source in &self.telemetry {
            let batch = match tokio::time::timeout(self.config.discovery_timeout(), source.poll()).await {
                Ok(Ok(batch)) => batch,
                Ok(Err(e)) => {
                    warn!("telemetry poll failed source={} error={}", source.name(), e);
                    continue;
                }
                Err(_) => {
                    warn!("telemetry poll timed out source={}", source.name());
                    continue;
                }
            };

            for sample in &batch.ranging {
                if let Err(e) = self.locator.ingest_sample(sample) {
                    warn!(
                        "dropping ranging sample source={} device={} error={}",
                        source.name(),
                        sample.device_id,
                        e
                    );
                }
            }
            for telemetry in batch.telemetry {
                if let Some(Err(e)) = telemetry.rssi.map(validate_rssi) {
                    warn!(
                        "dropping telemetry source={} device={} error={}",
                        source.name(),
                        telemetry.device_id,
                        e
                    );
                    continue;
                }
                self.baselines
                    .update(&telemetry.device_id, telemetry.rssi, telemetry.is_online, telemetry.timestamp);
                self.enqueue(telemetry);
                accepted += 1;
            }
        }
        accepted
    }

    fn anomaly_tick(&self) -> usize {
        let batch: Vec<Telemetry> = self.pending.lock().drain(..).collect();
        let mut records = 0;
        for telemetry in &batch {
            match self.evaluate(telemetry) {
                Ok(found) => records += found.len(),
                Err(e) => warn!("skipping telemetry device={} error={}", telemetry.device_id, e),
            }
        }

        let every = self.config.forest_refit_ticks;
        let tick = self.anomaly_ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if every > 0 && tick % every == 0 {
            if let Err(e) = self.refit_forest() {
                warn!("forest refit failed error={}", e);
            }
        }
        records
    }

    fn refit_forest(&self) -> MonitorResult<bool> {
        let samples: Vec<Sample> = self
            .histories
            .lock()
            .values()
            .flat_map(|h| h.feature_samples().cloned())
            .collect();
        let needed = self.ensemble.read().config().min_training_samples;
        if samples.len() < needed {
            debug!("forest refit skipped samples={} needed={}", samples.len(), needed);
            return Ok(false);
        }
        self.ensemble.write().fit_forest(&samples)?;
        Ok(true)
    }

    fn trend_tick(&self) -> usize {
        let now = self.clock.now();
        let findings: Vec<(AnomalyRecord, Option<Baseline>)> = {
            let histories = self.histories.lock();
            histories
                .values()
                .flat_map(|history| {
                    let baseline = self.baselines.get(history.device_id());
                    self.trend
                        .analyze(history, baseline.as_ref(), now)
                        .into_iter()
                        .map(move |record| (record, baseline.clone()))
                })
                .collect()
        };

        let count = findings.len();
        for (record, baseline) in findings {
            let mut request = AlertRequest::for_device(
                record.device_id.clone(),
                record.kind,
                record.severity,
                record.method,
                record.description.clone(),
            );
            if let Some(advice) = baseline.and_then(|b| b.risk_level().recommendation()) {
                request = request.with_recommendation(advice);
            }
            self.alerts.raise(request);
        }
        count
    }

    fn prune_tick(&self) -> Vec<DeviceId> {
        let cutoff = self.clock.now().saturating_sub(self.config.retention_ms());
        let stale = self.registry.prune(cutoff);
        for id in &stale {
            self.baselines.remove(id);
            self.histories.lock().remove(id);
            self.alerts.forget_device(id);
            self.locator.forget_device(id);
            info!("device pruned device={}", id);
        }
        stale
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Discovery,
    Telemetry,
    Anomaly,
    Trend,
    Prune,
    Delivery,
}

impl Task {
    const ALL: [Task; 6] = [
        Task::Discovery,
        Task::Telemetry,
        Task::Anomaly,
        Task::Trend,
        Task::Prune,
        Task::Delivery,
    ];

    fn name(&self) -> &'static str {
        match self {
            Task::Discovery => "discovery",
            Task::Telemetry => "telemetry",
            Task::Anomaly => "anomaly",
            Task::Trend => "trend",
            Task::Prune => "prune",
            Task::Delivery => "delivery",
        }
    }

    fn period_secs(&self, config: &MonitorConfig) -> u64 {
        match self {
            Task::Discovery => config.discovery_period_secs,
            Task::Telemetry => config.telemetry_period_secs,
            Task::Anomaly => config.anomaly_period_secs,
            Task::Trend => config.trend_period_secs,
            Task::Prune => config.prune_period_secs,
            Task::Delivery => config.delivery_period_secs,
        }
    }
}

struct MonitorJob {
    task: Task,
    inner: Arc<Inner>,
}

#[async_trait]
impl PeriodicJob for MonitorJob {
    async fn run_once(&self) -> MonitorResult<()> {
        match self.task {
            Task::Discovery => {
                self.inner.discovery_tick().await;
            }
            Task::Telemetry => {
                self.inner.telemetry_tick().await;
            }
            Task::Anomaly => {
                let inner = self.inner.clone();
                run_blocking(self.task.name(), move || inner.anomaly_tick()).await?;
            }
            Task::Trend => {
                let inner = self.inner.clone();
                run_blocking(self.task.name(), move || inner.trend_tick()).await?;
            }
            Task::Prune => {
                let inner = self.inner.clone();
                run_blocking(self.task.name(), move || inner.prune_tick()).await?;
            }
            Task::Delivery => {
                self.inner.alerts.deliver().await;
            }
        }
        Ok(())
    }
}

/// Continuous monitoring engine
pub struct Monitor {
    inner: Arc<Inner>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl Monitor {
    /// Start assembling a monitor
    pub fn builder(settings: Settings) -> MonitorBuilder {
        MonitorBuilder::new(settings)
    }

    /// Monitor configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Positioning engine
    pub fn locator(&self) -> &Locator {
        &self.inner.locator
    }

    /// Register a ranging anchor
    pub fn register_anchor(&self, anchor: Anchor) -> MonitorResult<()> {
        Ok(self.inner.locator.register_anchor(anchor)?)
    }

    /// Fused location of `device` from `readings`
    pub fn estimate_location(&self, device: &DeviceId, readings: &Readings) -> FusedEstimate {
        self.inner.locator.estimate_location(device, readings)
    }

    /// Record a calibration point
    pub fn add_calibration_point(
        &self,
        location: Point,
        readings: &Readings,
        room: Option<&str>,
    ) -> MonitorResult<CalibrationSummary> {
        Ok(self.inner.locator.add_calibration_point(location, readings, room)?)
    }

    /// Run the ensemble on one observation, commit it and raise alerts
    ///
    /// Every anomaly found is returned; alerts for them are subject to
    /// cooldown.
    pub fn evaluate_anomalies(&self, telemetry: &Telemetry) -> MonitorResult<Vec<AnomalyRecord>> {
        self.inner.evaluate(telemetry)
    }

    /// Unresolved alerts, oldest first
    pub fn get_active_alerts(&self) -> Vec<Alert> {
        self.inner.alerts.active()
    }

    /// Resolve an alert by id
    pub fn resolve_alert(&self, id: AlertId) -> bool {
        self.inner.alerts.resolve(id)
    }

    /// Alert manager
    pub fn alerts(&self) -> &AlertManager {
        &self.inner.alerts
    }

    /// Device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.inner.registry
    }

    /// Baseline of one device
    pub fn baseline(&self, device: &DeviceId) -> Option<Baseline> {
        self.inner.baselines.get(device)
    }

    /// Copy of one device's anomaly history
    pub fn device_history(&self, device: &DeviceId) -> Option<DeviceHistory> {
        self.inner.histories.lock().get(device).cloned()
    }

    /// Isolation forest statistics
    pub fn forest_stats(&self) -> Option<ForestStats> {
        self.inner.ensemble.read().forest_stats()
    }

    /// One discovery scan
    pub async fn discovery_tick(&self) -> ScanReport {
        self.inner.discovery_tick().await
    }

    /// One telemetry poll; returns accepted observations
    pub async fn telemetry_tick(&self) -> usize {
        self.inner.telemetry_tick().await
    }

    /// Evaluate queued observations; returns anomalies found
    pub fn anomaly_tick(&self) -> usize {
        self.inner.anomaly_tick()
    }

    /// Rebuild the forest from every device's feature history
    pub fn refit_forest(&self) -> MonitorResult<bool> {
        self.inner.refit_forest()
    }

    /// Trend analysis over every device; returns findings
    pub fn trend_tick(&self) -> usize {
        self.inner.trend_tick()
    }

    /// Forget devices unseen beyond the retention window
    pub fn prune_tick(&self) -> Vec<DeviceId> {
        self.inner.prune_tick()
    }

    /// Deliver queued alerts; returns successful sink deliveries
    pub async fn delivery_tick(&self) -> usize {
        self.inner.alerts.deliver().await
    }

    /// Probe discovery transports and start every periodic loop
    ///
    /// Fails with [`MonitorError::NoDiscoveryTransport`] when no discovery
    /// source can be opened and with [`MonitorError::AlreadyRunning`] on a
    /// second call before [`Monitor::shutdown`].
    pub async fn start(&self) -> MonitorResult<()> {
        if self.supervisor.lock().is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let mut usable = 0;
        for source in &self.inner.discovery {
            match tokio::time::timeout(self.inner.config.discovery_timeout(), source.probe()).await {
                Ok(Ok(())) => usable += 1,
                Ok(Err(e)) => warn!("discovery source unusable source={} error={}", source.name(), e),
                Err(_) => warn!("discovery source probe timed out source={}", source.name()),
            }
        }
        if usable == 0 {
            error!("no usable discovery transport sources={}", self.inner.discovery.len());
            return Err(MonitorError::NoDiscoveryTransport);
        }

        let config = &self.inner.config;
        let mut supervisor = Supervisor::new(config.shutdown_grace());
        for task in Task::ALL {
            let spec = JobSpec::new(task.name(), Duration::from_secs(task.period_secs(config)))
                .with_jitter(Duration::from_millis(config.jitter_ms));
            let job = Arc::new(MonitorJob {
                task,
                inner: self.inner.clone(),
            });
            supervisor.spawn(spec, job);
        }
        info!("monitor started discovery_sources={} usable={}", self.inner.discovery.len(), usable);
        *self.supervisor.lock() = Some(supervisor);
        Ok(())
    }

    /// Whether the periodic loops are running
    pub fn is_running(&self) -> bool {
        self.supervisor.lock().is_some()
    }

    /// Iteration counters of a running loop
    pub fn task_stats(&self, task: &str) -> Option<Arc<JobStats>> {
        self.supervisor.lock().as_ref().and_then(|s| s.stats(task))
    }

    /// Stop every loop within the grace period
    pub async fn shutdown(&self) {
        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            supervisor.shutdown().await;
            info!("monitor stopped");
        }
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("devices", &self.inner.registry.len())
            .field("active_alerts", &self.inner.alerts.active().len())
            .field("running", &self.is_running())
            .finish()
    }
}
