// ── Source record ──
//
// One monitored device: identity, SNMP target, system info, interface
// table and poll bookkeeping. The unit of concurrency (one lock per
// source in the registry) and the unit of persistence.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ifmeter_snmp::Target;

use super::interface::Interface;
use super::status::SourceStatus;
use super::{VLAN_OID_TAG, adopt_tags};

#[derive(Debug)]
pub struct Source {
    ip: IpAddr,
    community: String,
    retries: u32,
    timeout: Duration,
    target: Arc<Target>,

    pub status: SourceStatus,
    /// Device uptime in 1/100 s ticks at the last successful poll.
    pub sys_uptime: u64,
    pub sys_descr: Option<String>,
    pub sys_object_id: Option<String>,
    pub sys_name: Option<String>,
    pub sys_location: Option<String>,

    interfaces: BTreeMap<String, Interface>,

    /// Wall-clock time the last poll finished.
    pub poll_time: Option<DateTime<Utc>>,
    /// Device-tick delta between the last two counter polls.
    pub poll_duration: u64,
    /// Round-trip time of the last poll's table walk.
    pub poll_response: Duration,
    /// Suppress delta computation on the next counter poll.
    pub skip_delta: bool,
    pub tags: BTreeMap<String, String>,
}

impl Source {
    pub fn new(ip: IpAddr, community: impl Into<String>, retries: u32, timeout: Duration) -> Self {
        let community = community.into();
        let target = Arc::new(Target::new(ip, &community, retries, timeout));
        Self {
            ip,
            community,
            retries,
            timeout,
            target,
            status: SourceStatus::Unknown,
            sys_uptime: 0,
            sys_descr: None,
            sys_object_id: None,
            sys_name: None,
            sys_location: None,
            interfaces: BTreeMap::new(),
            poll_time: None,
            poll_duration: 0,
            poll_response: Duration::ZERO,
            skip_delta: true,
            tags: BTreeMap::new(),
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    // ── SNMP target ──────────────────────────────────────────────────

    pub fn community(&self) -> &str {
        &self.community
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Shared handle to the wire-level target, valid until the next
    /// community/retries/timeout change.
    pub fn target(&self) -> Arc<Target> {
        Arc::clone(&self.target)
    }

    pub fn set_community(&mut self, community: impl Into<String>) {
        self.community = community.into();
        self.rebuild_target();
    }

    pub fn set_retries(&mut self, retries: u32) {
        self.retries = retries;
        self.rebuild_target();
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        self.rebuild_target();
    }

    pub fn port(&self) -> u16 {
        self.target.addr.port()
    }

    /// Agent port override, kept across target rebuilds.
    pub fn set_port(&mut self, port: u16) {
        let target = Target::new(self.ip, &self.community, self.retries, self.timeout);
        self.target = Arc::new(target.with_port(port));
    }

    fn rebuild_target(&mut self) {
        let port = self.target.addr.port();
        let target = Target::new(self.ip, &self.community, self.retries, self.timeout);
        self.target = Arc::new(target.with_port(port));
    }

    // ── Interfaces ───────────────────────────────────────────────────

    /// Get or lazily create the interface keyed by `descr`.
    pub fn interface_mut(&mut self, descr: &str) -> &mut Interface {
        self.interfaces
            .entry(descr.to_owned())
            .or_insert_with(|| Interface::new(descr))
    }

    /// Mutable access without creating the interface.
    pub fn existing_interface_mut(&mut self, descr: &str) -> Option<&mut Interface> {
        self.interfaces.get_mut(descr)
    }

    pub fn interface(&self, descr: &str) -> Option<&Interface> {
        self.interfaces.get(descr)
    }

    pub fn remove_interface(&mut self, descr: &str) -> Option<Interface> {
        self.interfaces.remove(descr)
    }

    /// Interfaces ordered by descriptor.
    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.values()
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    /// Zero raw and delta counters on every interface (reboot path).
    pub fn reset_interface_counters(&mut self) {
        for iface in self.interfaces.values_mut() {
            iface.reset_counters();
        }
    }

    /// Take the operator-set fields of `edited`: SNMP settings, tags and
    /// the flags of interfaces known to both. Poll state is left alone,
    /// and an assigned VLAN OID survives when `edited` has none.
    /// Returns whether anything changed.
    pub fn adopt_settings(&mut self, edited: &Source) -> bool {
        let mut changed = false;
        if self.community != edited.community
            || self.retries != edited.retries
            || self.timeout != edited.timeout
            || self.port() != edited.port()
        {
            self.community.clone_from(&edited.community);
            self.retries = edited.retries;
            self.timeout = edited.timeout;
            self.target = edited.target();
            changed = true;
        }
        changed |= adopt_tags(&mut self.tags, &edited.tags, VLAN_OID_TAG);
        for theirs in edited.interfaces() {
            if let Some(ours) = self.interfaces.get_mut(theirs.descr()) {
                changed |= ours.adopt_flags(theirs);
            }
        }
        changed
    }

    // ── Classification ───────────────────────────────────────────────

    pub fn is_ready(&self) -> bool {
        self.status.is_up()
    }

    /// A previously seen uptime larger than the new one means the device
    /// restarted. Zero means "never polled" and never counts as a reboot.
    pub fn detect_reboot(&self, new_uptime: u64) -> bool {
        self.sys_uptime != 0 && self.sys_uptime > new_uptime
    }

    /// Vendor VLAN column to append to counter walks, if tagged.
    pub fn vlan_oid(&self) -> Option<&str> {
        self.tags
            .get(VLAN_OID_TAG)
            .map(String::as_str)
            .filter(|oid| !oid.is_empty())
    }
}
