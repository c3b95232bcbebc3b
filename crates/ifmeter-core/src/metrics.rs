// ── Metrics sink ──
//
// Fire-and-forget counters and gauges. Implementations must never
// block or fail: polling does not wait on, or care about, the sink.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::Serialize;
use tracing::trace;

/// Well-known metric names.
pub mod names {
    pub const LOG_WARN: &str = "counter.snmp.logWarn";
    pub const LOG_ERROR: &str = "counter.snmp.logError";
    pub const LOG_INFO: &str = "counter.snmp.logInfo";
    pub const POLL: &str = "counter.snmp.poll";

    pub const RESPONSE_MIN: &str = "gauge.snmp.response.min";
    pub const RESPONSE_MAX: &str = "gauge.snmp.response.max";
    pub const RESPONSE_AVG: &str = "gauge.snmp.response.avg";
    pub const SOURCES_READY: &str = "gauge.snmp.sources.ready";
    pub const SOURCES_DOWN: &str = "gauge.snmp.sources.down";
    pub const TRACE_RECORDS: &str = "gauge.snmp.sources.traceRecords";
    pub const CHARGING_RECORDS: &str = "gauge.snmp.sources.chargingRecords";
}

pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str);
    fn submit(&self, name: &str, value: f64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &str) {}
    fn submit(&self, _name: &str, _value: f64) {}
}

/// Point-in-time copy of an [`InMemoryMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
}

/// Lock-free in-process metrics registry.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: DashMap<String, u64>,
    gauges: DashMap<String, f64>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).map_or(0, |v| *v)
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.get(name).map(|v| *v)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            gauges: self
                .gauges
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, name: &str) {
        *self.counters.entry(name.to_owned()).or_insert(0) += 1;
    }

    fn submit(&self, name: &str, value: f64) {
        trace!(metric = name, value, "gauge");
        self.gauges.insert(name.to_owned(), value);
    }
}
