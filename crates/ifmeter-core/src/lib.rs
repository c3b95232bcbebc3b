//! Polling engine, counter reconciliation and source registry for ifmeter.
//!
//! - **[`Registry`]**: Concurrent IP → [`Source`] map (`DashMap` of
//!   per-source `RwLock`s). Classification queries ([`ready`](Registry::ready),
//!   [`down`](Registry::down)), control-plane mutations and projections.
//!
//! - **[`Poller`]**: Status and counter polls for one source. Walks run
//!   without the source lock held; results are applied under a single
//!   write lock. Failures become a [`SourceStatus`], never an error.
//!
//! - **[`reconcile()`]**: Pure delta between two counter samples with
//!   32-bit wrap, fake-overflow, 64-bit wrap and width-change handling.
//!
//! - **[`Scheduler`]**: Lock-gated status and counter cycles with bounded
//!   fan-out, export through an [`ExportSink`] and recovery-file persistence.
//!
//! - **[`RecoveryFile`]**: Atomic JSON snapshot of the registry.

pub mod config;
pub mod error;
pub mod export;
pub mod lock;
pub mod metrics;
pub mod model;
pub mod poll;
pub mod reconcile;
pub mod scheduler;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{CollectorConfig, ExportFormat, SourceDefaults};
pub use error::CoreError;
pub use export::{DirectoryExportSink, ExportBatch, ExportKind, ExportSink, NullExportSink};
pub use lock::{FileLeaseLock, LocalPollLock, PollLock};
pub use metrics::{InMemoryMetrics, MetricsSink, MetricsSnapshot, NoopMetrics};
pub use model::{
    Counter, CounterWidth, FlowDirection, Interface, Source, SourceStatus, VLAN_ID_TAG,
    VLAN_OID_TAG,
};
pub use poll::{AutoChargeNewVlan, ManualCharging, PollOutcome, Poller, VlanChargePolicy};
pub use reconcile::{CounterEvent, Reconciled, reconcile};
pub use scheduler::{CycleReport, CycleSummary, PollKind, Scheduler, SkipReason};
pub use store::{
    InterfaceFilter, InterfaceSelection, InterfaceStats, InterfaceSummary, InterfaceUpdate,
    NewSource, RecoveryFile, Registry, SnapshotMerge, SourceHandle, SourceSummary, SourceUpdate,
};
