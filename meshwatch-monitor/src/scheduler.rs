//! Supervised periodic tasks
//!
//! ```text
//! Supervisor ──watch(shutdown)──┬──→ loop "discovery"  every 30s
//!                               ├──→ loop "telemetry"  every 15s
//!                               └──→ loop ...
//!
//! loop: tick ─→ jitter ─→ spawn(iteration) ─→ join ─→ tick ...
//! ```
//!
//! Every iteration runs in its own task, so an error or a panic costs that
//! iteration only and the loop carries on at its next tick. CPU-bound work
//! goes through [`run_blocking`] so it never occupies an async worker. Ticks missed
//! by a slow iteration are skipped rather than replayed. On shutdown an
//! in-flight iteration gets the grace period to finish and is aborted after
//! it; no further iterations start.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};

use crate::error::{MonitorError, MonitorResult};

/// One unit of periodic work
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    /// Run a single iteration
    async fn run_once(&self) -> MonitorResult<()>;
}

/// Cadence of a periodic task
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    /// Task name for logs
    pub name: String,
    /// Time between iteration starts
    pub period: Duration,
    /// Upper bound of the random delay before each iteration
    pub jitter: Duration,
}

impl JobSpec {
    /// Task with no jitter
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            jitter: Duration::ZERO,
        }
    }

    /// Add random start jitter
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Iteration counters of one task
#[derive(Debug, Default)]
pub struct JobStats {
    runs: AtomicU64,
    failures: AtomicU64,
}

impl JobStats {
    /// Completed iterations, failed ones included
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Iterations that returned an error or panicked
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

struct Supervised {
    name: String,
    stats: Arc<JobStats>,
    handle: JoinHandle<()>,
}

/// Owns the periodic tasks and their shutdown signal
pub struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    grace: Duration,
    tasks: Vec<Supervised>,
}

impl Supervisor {
    /// Supervisor allowing `grace` for in-flight iterations at shutdown
    pub fn new(grace: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            grace,
            tasks: Vec::new(),
        }
    }

    /// Start a periodic task; the first iteration runs immediately
    pub fn spawn(&mut self, spec: JobSpec, job: Arc<dyn PeriodicJob>) -> Arc<JobStats> {
        let stats = Arc::new(JobStats::default());
        let shutdown_rx = self.shutdown_tx.subscribe();
        info!("task started task={} period_ms={}", spec.name, spec.period.as_millis());
        let handle = tokio::spawn(run_loop(spec.clone(), job, stats.clone(), shutdown_rx, self.grace));
        self.tasks.push(Supervised {
            name: spec.name,
            stats: stats.clone(),
            handle,
        });
        stats
    }

    /// Counters of a task by name
    pub fn stats(&self, name: &str) -> Option<Arc<JobStats>> {
        self.tasks.iter().find(|t| t.name == name).map(|t| t.stats.clone())
    }

    /// Names of the supervised tasks
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    /// Stop every task and wait for them within the grace period
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        // Each loop bounds its own in-flight iteration by the grace period
        let deadline = Instant::now() + self.grace + self.grace;
        for task in self.tasks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut handle = task.handle;
            match timeout(remaining, &mut handle).await {
                Ok(Ok(())) => info!("task stopped task={}", task.name),
                Ok(Err(e)) => warn!("task ended abnormally task={} error={}", task.name, e),
                Err(_) => {
                    warn!("task abandoned task={} after grace period", task.name);
                    handle.abort();
                }
            }
        }
    }
}

/// Run synchronous work on the blocking pool
///
/// A panic in `work` becomes a [`MonitorError::SchedulerTaskFailure`] for
/// `task`.
pub async fn run_blocking<F, R>(task: &str, work: F) -> MonitorResult<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| MonitorError::SchedulerTaskFailure {
            task: task.to_string(),
            reason: if e.is_panic() {
                "iteration panicked".to_string()
            } else {
                e.to_string()
            },
        })
}

async fn run_loop(
    spec: JobSpec,
    job: Arc<dyn PeriodicJob>,
    stats: Arc<JobStats>,
    mut shutdown_rx: watch::Receiver<bool>,
    grace: Duration,
) {
    let mut ticker = tokio::time::interval(spec.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => break,
        }
        if *shutdown_rx.borrow() {
            break;
        }

        let max_jitter = spec.jitter.as_millis() as u64;
        if max_jitter > 0 {
            let delay = rand::thread_rng().gen_range(0..=max_jitter);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        let iteration_job = job.clone();
        let mut iteration = tokio::spawn(async move { iteration_job.run_once().await });
        let joined = tokio::select! {
            joined = &mut iteration => joined,
            _ = shutdown_rx.changed() => {
                match timeout(grace, &mut iteration).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!("iteration abandoned task={}", spec.name);
                        iteration.abort();
                        break;
                    }
                }
            }
        };

        stats.runs.fetch_add(1, Ordering::Relaxed);
        let failure = match joined {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) if e.is_panic() => Some("iteration panicked".to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = failure {
            stats.failures.fetch_add(1, Ordering::Relaxed);
            let err = MonitorError::SchedulerTaskFailure {
                task: spec.name.clone(),
                reason,
            };
            warn!("{}", err);
        }
        if *shutdown_rx.borrow() {
            break;
        }
    }
    info!("task loop exiting task={}", spec.name);
}
