// ── Poll scheduler ──
//
// Owns the two periodic poll cycles. Each cycle runs under the cluster
// poll lock, fans out one task per source bounded by a semaphore, and
// joins them all before doing any cycle-level work. A failing source
// only affects its own status.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use futures_util::future::join_all;
use strum::{Display, EnumString};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CollectorConfig;
use crate::export::{self, ExportBatch, ExportKind, ExportSink, NullExportSink};
use crate::lock::{COUNTER_POLL_LOCK, LocalPollLock, PollLock, STATUS_POLL_LOCK};
use crate::metrics::{MetricsSink, names};
use crate::poll::{PollOutcome, Poller};
use crate::store::{RecoveryFile, Registry, SourceHandle};

/// The two poll cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PollKind {
    /// Status poll over down sources.
    Status,
    /// Counter poll over ready sources.
    Counters,
}

impl PollKind {
    fn lock_name(self) -> &'static str {
        match self {
            Self::Status => STATUS_POLL_LOCK,
            Self::Counters => COUNTER_POLL_LOCK,
        }
    }
}

/// Why a cycle did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SkipReason {
    /// Another node (or an overlapping cycle) holds the poll lock.
    #[strum(serialize = "poll lock held elsewhere")]
    LockBusy,
    #[strum(serialize = "no sources to poll")]
    NoSources,
}

/// Result of one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub sources: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Interface rows applied across all sources.
    pub interfaces: usize,
    pub elapsed: Duration,
    pub charging_records: usize,
    pub trace_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    Skipped(SkipReason),
    Completed(CycleSummary),
}

impl CycleReport {
    pub fn summary(&self) -> Option<&CycleSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::Skipped(_) => None,
        }
    }
}

// ── Scheduler ───────────────────────────────────────────────────────

/// Drives status and counter polls over a shared [`Registry`].
///
/// Cheaply cloneable. Background tasks are started with [`start`](Self::start)
/// and stopped with [`shutdown`](Self::shutdown); the cycle methods can
/// also be called directly for one-shot polls.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    registry: Arc<Registry>,
    poller: Poller,
    lock: Arc<dyn PollLock>,
    sink: Arc<dyn ExportSink>,
    metrics: Arc<dyn MetricsSink>,
    config: CollectorConfig,
    recovery: Option<RecoveryFile>,
    /// Recovery file mtime as of this process's last read or write.
    snapshot_seen: Mutex<Option<SystemTime>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Builder for [`Scheduler`]. Defaults to an in-process lock, no
/// export destination and no recovery file.
pub struct SchedulerBuilder {
    registry: Arc<Registry>,
    poller: Poller,
    config: CollectorConfig,
    lock: Arc<dyn PollLock>,
    sink: Arc<dyn ExportSink>,
    recovery: Option<RecoveryFile>,
}

impl SchedulerBuilder {
    pub fn config(mut self, config: CollectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn lock(mut self, lock: Arc<dyn PollLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn export_sink(mut self, sink: Arc<dyn ExportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn recovery(mut self, recovery: Option<RecoveryFile>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn build(self) -> Scheduler {
        let metrics = Arc::clone(self.poller.metrics());
        Scheduler {
            inner: Arc::new(SchedulerInner {
                registry: self.registry,
                poller: self.poller,
                lock: self.lock,
                sink: self.sink,
                metrics,
                config: self.config,
                recovery: self.recovery,
                snapshot_seen: Mutex::new(None),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Scheduler {
    pub fn builder(registry: Arc<Registry>, poller: Poller) -> SchedulerBuilder {
        SchedulerBuilder {
            registry,
            poller,
            config: CollectorConfig::default(),
            lock: Arc::new(LocalPollLock::new()),
            sink: Arc::new(NullExportSink),
            recovery: None,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.inner.config
    }

    // ── Cycles ───────────────────────────────────────────────────────

    /// Poll every down source's status.
    pub async fn run_status_cycle(&self) -> CycleReport {
        self.locked(PollKind::Status, || self.status_cycle()).await
    }

    /// Poll counters of every ready source, then export and persist.
    pub async fn run_counter_cycle(&self) -> CycleReport {
        self.locked(PollKind::Counters, || self.counter_cycle()).await
    }

    /// Run `kind` directly.
    pub async fn run_cycle(&self, kind: PollKind) -> CycleReport {
        match kind {
            PollKind::Status => self.run_status_cycle().await,
            PollKind::Counters => self.run_counter_cycle().await,
        }
    }

    async fn locked<F, Fut>(&self, kind: PollKind, cycle: F) -> CycleReport
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CycleReport>,
    {
        let name = kind.lock_name();
        if !self.inner.lock.try_acquire(name, self.inner.config.lock_wait).await {
            debug!(%kind, lock = name, "poll lock not acquired, skipping cycle");
            return CycleReport::Skipped(SkipReason::LockBusy);
        }
        self.sync_snapshot().await;
        let report = cycle().await;
        self.inner.lock.release(name).await;
        report
    }

    async fn status_cycle(&self) -> CycleReport {
        let batch = self.inner.registry.down().await;
        if batch.is_empty() {
            debug!("no down sources");
            return CycleReport::Skipped(SkipReason::NoSources);
        }
        let started = Instant::now();
        let outcomes = self.fan_out(batch, PollKind::Status).await;
        let summary = summarize(&outcomes, started.elapsed());
        info!(
            sources = summary.sources,
            recovered = summary.succeeded,
            elapsed_ms = summary.elapsed.as_millis(),
            "status poll completed"
        );
        CycleReport::Completed(summary)
    }

    async fn counter_cycle(&self) -> CycleReport {
        let batch = self.inner.registry.ready().await;
        if batch.is_empty() {
            debug!("no ready sources, nothing to charge");
            return CycleReport::Skipped(SkipReason::NoSources);
        }
        info!(sources = batch.len(), "start poll sources");

        let started = Instant::now();
        let outcomes = self.fan_out(batch, PollKind::Counters).await;
        let mut summary = summarize(&outcomes, started.elapsed());

        let millis = summary.elapsed.as_millis();
        let cps = if summary.elapsed.is_zero() {
            0.0
        } else {
            to_f64(summary.interfaces) / summary.elapsed.as_secs_f64()
        };
        info!(
            "completed in {millis} ms, collected {} counters from {} sources ({cps:.2} cps)",
            summary.interfaces, summary.sources
        );

        self.emit_cycle_metrics().await;
        let (trace, charging) = self.export().await;
        summary.trace_records = trace;
        summary.charging_records = charging;
        self.persist().await;

        CycleReport::Completed(summary)
    }

    /// Run one poll per source, at most `poll_workers` at a time.
    async fn fan_out(&self, batch: Vec<SourceHandle>, kind: PollKind) -> Vec<PollOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.inner.config.poll_workers.max(1)));
        let mut tasks = Vec::with_capacity(batch.len());

        for handle in batch {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let poller = self.inner.poller.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = match kind {
                    PollKind::Status => poller.poll_status(&handle).await,
                    PollKind::Counters => poller.poll_counters(&handle).await,
                };
                drop(permit);
                outcome
            }));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for joined in join_all(tasks).await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(%kind, error = %e, "poll task failed");
                    self.inner.metrics.increment(names::LOG_ERROR);
                }
            }
        }
        outcomes
    }

    // ── End-of-cycle work ────────────────────────────────────────────

    async fn emit_cycle_metrics(&self) {
        let metrics = &self.inner.metrics;
        let ready = self.inner.registry.ready().await;
        let down = self.inner.registry.down().await;

        let mut responses = Vec::with_capacity(ready.len());
        for handle in &ready {
            responses.push(handle.read().await.poll_response.as_millis());
        }
        if let (Some(min), Some(max)) = (responses.iter().min(), responses.iter().max()) {
            let total: u128 = responses.iter().sum();
            metrics.submit(names::RESPONSE_MIN, millis_f64(*min));
            metrics.submit(names::RESPONSE_MAX, millis_f64(*max));
            metrics.submit(names::RESPONSE_AVG, millis_f64(total) / to_f64(responses.len()));
        }
        metrics.submit(names::SOURCES_READY, to_f64(ready.len()));
        metrics.submit(names::SOURCES_DOWN, to_f64(down.len()));
        metrics.increment(names::POLL);
    }

    /// Render and deliver trace then charging records.
    async fn export(&self) -> (usize, usize) {
        let format = &self.inner.config.export;
        let at = Utc::now();

        let trace = export::trace_records(&self.inner.registry, format).await;
        self.inner
            .metrics
            .submit(names::TRACE_RECORDS, to_f64(trace.records));
        self.deliver(ExportKind::Trace, &trace, at).await;

        let charging = export::charging_records(&self.inner.registry, format).await;
        self.inner
            .metrics
            .submit(names::CHARGING_RECORDS, to_f64(charging.records));
        self.deliver(ExportKind::Charging, &charging, at).await;

        (trace.records, charging.records)
    }

    async fn deliver(&self, kind: ExportKind, batch: &ExportBatch, at: chrono::DateTime<Utc>) {
        if let Err(e) = self.inner.sink.deliver(kind, batch, at).await {
            error!(%kind, error = %e, "export delivery failed");
            self.inner.metrics.increment(names::LOG_ERROR);
        }
    }

    /// Save the registry to the recovery file, if one is configured.
    pub async fn persist(&self) {
        let Some(recovery) = &self.inner.recovery else {
            return;
        };
        let mut seen = self.inner.snapshot_seen.lock().await;
        self.merge_edits(recovery, &mut seen).await;
        match recovery.save(&self.inner.registry).await {
            Ok(0) => {}
            Ok(_) => *seen = recovery.modified().await,
            Err(e) => {
                error!(error = %e, "cannot save recovery state");
                self.inner.metrics.increment(names::LOG_ERROR);
            }
        }
    }

    /// Apply changes other processes (the admin commands) wrote to the
    /// recovery file since this scheduler last read or wrote it.
    pub async fn sync_snapshot(&self) {
        let Some(recovery) = &self.inner.recovery else {
            return;
        };
        let mut seen = self.inner.snapshot_seen.lock().await;
        self.merge_edits(recovery, &mut seen).await;
    }

    async fn merge_edits(&self, recovery: &RecoveryFile, seen: &mut Option<SystemTime>) {
        let modified = recovery.modified().await;
        if modified == *seen {
            return;
        }
        match recovery.load().await {
            Ok(sources) => {
                let merge = self.inner.registry.merge_snapshot(sources).await;
                if !merge.is_empty() {
                    info!(
                        added = merge.added,
                        removed = merge.removed,
                        updated = merge.updated,
                        "recovery file edits applied"
                    );
                }
            }
            Err(e) => {
                error!(error = %e, "cannot read recovery file edits");
                self.inner.metrics.increment(names::LOG_ERROR);
            }
        }
        *seen = modified;
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the periodic status and counter tasks.
    pub async fn start(&self) {
        let config = &self.inner.config;
        let mut handles = self.inner.task_handles.lock().await;

        if config.status_interval.is_zero() {
            warn!("status interval is zero, status polling disabled");
        } else {
            let start = Instant::now();
            handles.push(tokio::spawn(cycle_task(
                self.clone(),
                PollKind::Status,
                start,
                config.status_interval,
            )));
        }

        if config.counter_interval.is_zero() {
            warn!("counter interval is zero, counter polling disabled");
        } else {
            let delay = if config.align_counter_poll {
                until_next_boundary(config.counter_interval)
            } else {
                config.counter_interval
            };
            handles.push(tokio::spawn(cycle_task(
                self.clone(),
                PollKind::Counters,
                Instant::now() + delay,
                config.counter_interval,
            )));
        }

        info!(
            status_interval_s = config.status_interval.as_secs(),
            counter_interval_s = config.counter_interval.as_secs(),
            poll_workers = config.poll_workers,
            sources = self.inner.registry.len(),
            "scheduler started"
        );
    }

    /// Stop the periodic tasks, wait for in-flight cycles, then persist.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "cycle task failed");
                self.inner.metrics.increment(names::LOG_ERROR);
            }
        }
        drop(handles);

        self.persist().await;
        info!("scheduler stopped");
    }
}

/// Periodic driver for one poll kind. A running cycle always finishes
/// before cancellation is observed.
async fn cycle_task(scheduler: Scheduler, kind: PollKind, start: Instant, period: Duration) {
    let cancel = scheduler.inner.cancel.clone();
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let CycleReport::Skipped(reason) = scheduler.run_cycle(kind).await {
                    debug!(%kind, %reason, "cycle skipped");
                }
            }
        }
    }
}

fn summarize(outcomes: &[PollOutcome], elapsed: Duration) -> CycleSummary {
    CycleSummary {
        sources: outcomes.len(),
        succeeded: outcomes.iter().filter(|o| o.is_polled()).count(),
        failed: outcomes
            .iter()
            .filter(|o| matches!(o, PollOutcome::Failed(_)))
            .count(),
        interfaces: outcomes.iter().map(PollOutcome::interfaces).sum(),
        elapsed,
        ..CycleSummary::default()
    }
}

/// Time left until the next wall-clock multiple of `period`, so
/// counter samples line up across restarts (e.g. :00, :05, :10).
fn until_next_boundary(period: Duration) -> Duration {
    let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX).max(1);
    let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    Duration::from_millis(period_ms - now_ms % period_ms)
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn to_f64(n: usize) -> f64 {
    n as f64
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn millis_f64(ms: u128) -> f64 {
    ms as f64
}
