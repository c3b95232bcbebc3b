// ── SNMP poll engine ──
//
// Walks one source's tables and folds the result into its record.
// The walk runs without the source lock held; everything a poll
// changes is then applied under a single write lock, so concurrent
// readers see either the previous or the new state of a source.
//
// Poll-time failures never propagate: they end up in the source's
// status, the log and the metrics sink.

mod counters;
pub mod oids;
mod status;
pub mod vlan;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ifmeter_snmp::{Oid, SnmpTransport, TableRow, Target, Value};
use tokio::time::Instant;
use tracing::{error, info, warn};

use self::oids::EntryColumns;
use crate::metrics::{MetricsSink, names};
use crate::model::{Counter, Interface, Source, SourceStatus};
use crate::reconcile::{self, CounterEvent};

pub use self::vlan::{AutoChargeNewVlan, ManualCharging, VlanChargePolicy};

/// What a single poll did to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The walk succeeded and `interfaces` rows were applied.
    Polled { interfaces: usize },
    /// The agent answered but reports no interfaces.
    NoInterfaces,
    /// The walk failed; the source now carries this status.
    Failed(SourceStatus),
}

impl PollOutcome {
    pub fn is_polled(&self) -> bool {
        matches!(self, Self::Polled { .. })
    }

    /// Interface rows applied (zero unless polled).
    pub fn interfaces(&self) -> usize {
        match self {
            Self::Polled { interfaces } => *interfaces,
            Self::NoInterfaces | Self::Failed(_) => 0,
        }
    }
}

/// Drives status and counter polls against sources.
///
/// Cheap to clone; holds no per-source state.
#[derive(Clone)]
pub struct Poller {
    transport: Arc<dyn SnmpTransport>,
    metrics: Arc<dyn MetricsSink>,
    vendor_vlan_oids: Vec<Oid>,
    vlan_policy: Arc<dyn VlanChargePolicy>,
}

impl Poller {
    pub fn new(transport: Arc<dyn SnmpTransport>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            transport,
            metrics,
            vendor_vlan_oids: Vec::new(),
            vlan_policy: Arc::new(AutoChargeNewVlan),
        }
    }

    /// Vendor VLAN-id columns offered to sources by enterprise number.
    pub fn with_vendor_vlan_oids(mut self, oids: Vec<Oid>) -> Self {
        self.vendor_vlan_oids = oids;
        self
    }

    pub fn with_vlan_policy(mut self, policy: Arc<dyn VlanChargePolicy>) -> Self {
        self.vlan_policy = policy;
        self
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    // ── Shared steps ─────────────────────────────────────────────────

    /// Walk `columns`, timing the round trip.
    async fn walk(
        &self,
        target: &Target,
        columns: &[Oid],
    ) -> (Result<Vec<TableRow>, ifmeter_snmp::Error>, Duration) {
        let started = Instant::now();
        let result = self.transport.walk_table(target, columns).await;
        (result, started.elapsed())
    }

    /// Stamp poll time and latency, then split off the system row.
    ///
    /// On failure the source gets the matching status and everything
    /// else is left as it was.
    fn accept(
        &self,
        source: &mut Source,
        result: Result<Vec<TableRow>, ifmeter_snmp::Error>,
        elapsed: Duration,
    ) -> Result<(TableRow, Vec<TableRow>), SourceStatus> {
        source.poll_time = Some(Utc::now());
        source.poll_response = elapsed;
        let ip = source.ip();

        let failure = match result {
            Ok(rows) if rows.is_empty() => {
                error!(source = %ip, "no response PDU");
                SourceStatus::NoPdu
            }
            Ok(rows) => match split_system_row(rows) {
                Some(split) => return Ok(split),
                None => {
                    error!(source = %ip, "response carries no system row");
                    SourceStatus::OtherError
                }
            },
            Err(e) if e.is_timeout() => {
                error!(source = %ip, error = %e, "poll timed out");
                SourceStatus::Timeout
            }
            Err(e) => {
                error!(source = %ip, error = %e, "poll failed");
                SourceStatus::OtherError
            }
        };
        self.metrics.increment(names::LOG_ERROR);
        source.status = failure;
        Err(failure)
    }

    /// Read sysUpTime from the system row, failing the poll without it.
    fn uptime(&self, source: &mut Source, system: &TableRow, pos: usize) -> Option<u64> {
        let uptime = system.column(pos).and_then(Value::as_u64);
        if uptime.is_none() {
            error!(source = %source.ip(), "response carries no sysUpTime");
            self.metrics.increment(names::LOG_ERROR);
            source.status = SourceStatus::OtherError;
        }
        uptime
    }

    /// Reset counters and suppress the next delta if the device restarted.
    fn check_reboot(&self, source: &mut Source, uptime: u64) -> bool {
        if !source.detect_reboot(uptime) {
            return false;
        }
        warn!(source = %source.ip(), previous = source.sys_uptime, uptime, "source rebooted, counters reset");
        self.metrics.increment(names::LOG_WARN);
        source.reset_interface_counters();
        source.skip_delta = true;
        true
    }

    /// Interface descriptor of `row`, logging rows without one.
    fn descriptor(&self, ip: IpAddr, row: &TableRow, pos: usize) -> Option<String> {
        let descr = row.column(pos).map(Value::to_text);
        if descr.is_none() {
            warn!(source = %ip, if_index = row.first_index(), "row without ifDescr skipped");
            self.metrics.increment(names::LOG_WARN);
        }
        descr
    }

    /// Delta between two samples, reporting any anomaly.
    fn reconcile(&self, ip: IpAddr, descr: &str, current: Counter, previous: Counter) -> u64 {
        let result = reconcile::reconcile(current, previous);
        match result.event {
            None => {}
            Some(CounterEvent::Wrap32) => {
                info!(source = %ip, if_descr = descr, current = %current, last = %previous, "overflow 32bit counter");
                self.metrics.increment(names::LOG_INFO);
            }
            Some(event) => {
                warn!(source = %ip, if_descr = descr, current = %current, last = %previous, "{}", event.describe());
                self.metrics.increment(names::LOG_WARN);
            }
        }
        result.delta
    }
}

/// Apply the ifTable/ifXTable fields common to both walks.
fn update_entry(iface: &mut Interface, row: &TableRow, layout: EntryColumns) {
    iface.if_index = row.first_index();
    if let Some(status) = integer(row.column(layout.admin)) {
        iface.set_admin_status(status);
    }
    if let Some(status) = integer(row.column(layout.oper)) {
        iface.set_oper_status(status);
    }
    if let Some(name) = row.column(layout.name) {
        iface.learn_name(name.to_text());
    }
    if let Some(alias) = row.column(layout.alias) {
        iface.learn_alias(alias.to_text());
    }
}

fn integer(value: Option<&Value>) -> Option<i32> {
    value
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
}

/// Separate the scalar `[0]` row from the interface rows.
fn split_system_row(mut rows: Vec<TableRow>) -> Option<(TableRow, Vec<TableRow>)> {
    let pos = rows.iter().position(|row| row.index == [0])?;
    let system = rows.remove(pos);
    Some((system, rows))
}
