// ── Read-side projections ──
//
// Flat, serializable views of sources and interfaces handed to the
// CLI and export layers. Built under a source's read lock, then
// detached from it.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Counter, FlowDirection, Interface, Source, SourceStatus};

/// One row of the source listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub ip: IpAddr,
    pub status: SourceStatus,
    pub sys_uptime: u64,
    pub sys_name: Option<String>,
    pub sys_descr: Option<String>,
    pub sys_location: Option<String>,
    pub sys_object_id: Option<String>,
    pub community: String,
    pub retries: u32,
    pub timeout_ms: u64,
    pub interfaces: usize,
    pub poll_time: Option<DateTime<Utc>>,
    pub up_interfaces: usize,
    pub down_interfaces: usize,
    pub chargeable_interfaces: usize,
    pub trace_interfaces: usize,
    pub poll_response_ms: u64,
}

impl From<&Source> for SourceSummary {
    fn from(source: &Source) -> Self {
        let up = source.interfaces().filter(|i| i.is_up()).count();
        Self {
            ip: source.ip(),
            status: source.status,
            sys_uptime: source.sys_uptime,
            sys_name: source.sys_name.clone(),
            sys_descr: source.sys_descr.clone(),
            sys_location: source.sys_location.clone(),
            sys_object_id: source.sys_object_id.clone(),
            community: source.community().to_owned(),
            retries: source.retries(),
            timeout_ms: millis(source.timeout()),
            interfaces: source.interface_count(),
            poll_time: source.poll_time,
            up_interfaces: up,
            down_interfaces: source.interface_count() - up,
            chargeable_interfaces: source.interfaces().filter(|i| i.chargeable).count(),
            trace_interfaces: source.interfaces().filter(|i| i.trace()).count(),
            poll_response_ms: millis(source.poll_response),
        }
    }
}

/// One row of an interface listing, carrying its source context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceSummary {
    pub ip: IpAddr,
    pub sys_name: Option<String>,
    pub poll_time: Option<DateTime<Utc>>,
    pub poll_duration: u64,
    pub if_index: u32,
    pub if_descr: String,
    pub if_name: Option<String>,
    pub if_alias: Option<String>,
    pub admin_status: i32,
    pub oper_status: i32,
    pub chargeable: bool,
    pub trace: bool,
    pub polling: bool,
    pub direction: FlowDirection,
    pub up: bool,
    pub poll_in_octets: u64,
    pub poll_out_octets: u64,
    pub in_octets: Counter,
    pub out_octets: Counter,
}

impl InterfaceSummary {
    pub fn new(source: &Source, iface: &Interface) -> Self {
        Self {
            ip: source.ip(),
            sys_name: source.sys_name.clone(),
            poll_time: source.poll_time,
            poll_duration: source.poll_duration,
            if_index: iface.if_index,
            if_descr: iface.descr().to_owned(),
            if_name: iface.if_name.clone(),
            if_alias: iface.if_alias.clone(),
            admin_status: iface.admin_status(),
            oper_status: iface.oper_status(),
            chargeable: iface.chargeable,
            trace: iface.trace(),
            polling: iface.polling(),
            direction: iface.direction,
            up: iface.is_up(),
            poll_in_octets: iface.poll_in_octets(),
            poll_out_octets: iface.poll_out_octets(),
            in_octets: iface.in_octets(),
            out_octets: iface.out_octets(),
        }
    }
}

/// Conjunctive interface filter; `None` fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceFilter {
    pub chargeable: Option<bool>,
    pub trace: Option<bool>,
    pub up: Option<bool>,
}

impl InterfaceFilter {
    pub fn matches(&self, iface: &Interface) -> bool {
        self.chargeable.is_none_or(|c| iface.chargeable == c)
            && self.trace.is_none_or(|t| iface.trace() == t)
            && self.up.is_none_or(|u| iface.is_up() == u)
    }
}

/// Fleet-wide interface totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceStats {
    pub interfaces: usize,
    pub chargeable: usize,
    pub trace: usize,
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use super::*;

    #[test]
    fn filter_fields_are_conjunctive() {
        let mut iface = Interface::new("eth0");
        iface.chargeable = true;
        iface.set_admin_status(1);
        iface.set_oper_status(1);

        assert!(InterfaceFilter::default().matches(&iface));
        let f = InterfaceFilter {
            chargeable: Some(true),
            up: Some(true),
            ..InterfaceFilter::default()
        };
        assert!(f.matches(&iface));
        let f = InterfaceFilter {
            chargeable: Some(true),
            trace: Some(true),
            ..InterfaceFilter::default()
        };
        assert!(!f.matches(&iface));
    }

    #[test]
    fn source_summary_counts_interfaces() {
        let mut source = Source::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            "public",
            3,
            Duration::from_secs(5),
        );
        let eth0 = source.interface_mut("eth0");
        eth0.set_admin_status(1);
        eth0.set_oper_status(1);
        eth0.chargeable = true;
        source.interface_mut("eth1").set_trace(true);

        let summary = SourceSummary::from(&source);
        assert_eq!(summary.interfaces, 2);
        assert_eq!(summary.up_interfaces, 1);
        assert_eq!(summary.down_interfaces, 1);
        assert_eq!(summary.chargeable_interfaces, 1);
        assert_eq!(summary.trace_interfaces, 1);
        assert_eq!(summary.timeout_ms, 5_000);
    }
}
