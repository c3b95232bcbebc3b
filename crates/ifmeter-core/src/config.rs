// ── Runtime configuration ──
//
// Plain values consumed by the registry, poller and scheduler. The core
// never reads files or the environment; `ifmeter-config` builds these.

use std::time::Duration;

/// Values applied to sources added without explicit SNMP settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDefaults {
    pub community: String,
    pub retries: u32,
    pub timeout: Duration,
}

impl Default for SourceDefaults {
    fn default() -> Self {
        Self {
            community: "public".into(),
            retries: 3,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Layout of exported charging and trace records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFormat {
    /// Single-character field separator.
    pub separator: char,
    /// `chrono` strftime pattern for poll timestamps (rendered in UTC).
    pub timestamp_format: String,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self {
            separator: ';',
            timestamp_format: "%Y-%m-%d %H:%M:%S".into(),
        }
    }
}

/// Everything the scheduler needs to drive poll cycles.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub defaults: SourceDefaults,
    /// Period of the status poll over down sources.
    pub status_interval: Duration,
    /// Period of the counter poll over ready sources.
    pub counter_interval: Duration,
    /// Start counter polls on wall-clock multiples of the interval.
    pub align_counter_poll: bool,
    /// Upper bound on concurrently polled sources.
    pub poll_workers: usize,
    /// How long a cycle waits for the cluster poll lock.
    pub lock_wait: Duration,
    pub export: ExportFormat,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            defaults: SourceDefaults::default(),
            status_interval: Duration::from_secs(180),
            counter_interval: Duration::from_secs(300),
            align_counter_poll: true,
            poll_workers: 40,
            lock_wait: Duration::from_secs(1),
            export: ExportFormat::default(),
        }
    }
}
