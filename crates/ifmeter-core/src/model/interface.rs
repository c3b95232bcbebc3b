// ── Interface record ──
//
// Per-interface state owned by its `Source`. No internal locking: the
// source's lock is the synchronization unit for everything in here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::counter::Counter;
use super::{VLAN_ID_TAG, adopt_tags};

/// ifAdminStatus / ifOperStatus value meaning "up".
pub const IF_STATUS_UP: i32 = 1;

/// Which poll delta is reported as "in" when exporting.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FlowDirection {
    /// Device in/out counters map to exported in/out.
    #[default]
    Ingress,
    /// Exported in/out are swapped (customer-facing port).
    Egress,
}

/// One device interface, keyed by its ifDescr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    descr: String,
    pub if_index: u32,
    pub if_name: Option<String>,
    pub if_alias: Option<String>,
    admin_status: i32,
    oper_status: i32,
    in_octets: Counter,
    out_octets: Counter,
    sampled: bool,
    poll_in_octets: u64,
    poll_out_octets: u64,
    pub chargeable: bool,
    trace: bool,
    polling: bool,
    /// Missing from the previous counter poll; removed if missing again.
    pub marked: bool,
    pub direction: FlowDirection,
    pub tags: BTreeMap<String, String>,
}

impl Interface {
    pub fn new(descr: impl Into<String>) -> Self {
        Self {
            descr: descr.into(),
            if_index: 0,
            if_name: None,
            if_alias: None,
            admin_status: 0,
            oper_status: 0,
            in_octets: Counter::default(),
            out_octets: Counter::default(),
            sampled: false,
            poll_in_octets: 0,
            poll_out_octets: 0,
            chargeable: false,
            trace: false,
            polling: true,
            marked: false,
            direction: FlowDirection::default(),
            tags: BTreeMap::new(),
        }
    }

    pub fn descr(&self) -> &str {
        &self.descr
    }

    // ── Status ───────────────────────────────────────────────────────

    pub fn admin_status(&self) -> i32 {
        self.admin_status
    }

    pub fn oper_status(&self) -> i32 {
        self.oper_status
    }

    /// Update ifAdminStatus; leaving the up state clears poll deltas.
    pub fn set_admin_status(&mut self, status: i32) {
        self.admin_status = status;
        if !self.is_up() {
            self.reset_poll_counters();
        }
    }

    /// Update ifOperStatus; leaving the up state clears poll deltas.
    pub fn set_oper_status(&mut self, status: i32) {
        self.oper_status = status;
        if !self.is_up() {
            self.reset_poll_counters();
        }
    }

    pub fn is_up(&self) -> bool {
        self.admin_status == IF_STATUS_UP && self.oper_status == IF_STATUS_UP
    }

    pub fn is_down(&self) -> bool {
        !self.is_up()
    }

    // ── Descriptive fields (first writer wins) ───────────────────────

    /// Record ifName unless one is already known.
    pub fn learn_name(&mut self, name: String) -> bool {
        learn(&mut self.if_name, name)
    }

    /// Record ifAlias unless one is already known.
    pub fn learn_alias(&mut self, alias: String) -> bool {
        learn(&mut self.if_alias, alias)
    }

    // ── Counters ─────────────────────────────────────────────────────

    pub fn in_octets(&self) -> Counter {
        self.in_octets
    }

    pub fn out_octets(&self) -> Counter {
        self.out_octets
    }

    pub fn set_in_octets(&mut self, counter: Counter) {
        self.in_octets = counter;
        self.sampled = true;
    }

    pub fn set_out_octets(&mut self, counter: Counter) {
        self.out_octets = counter;
        self.sampled = true;
    }

    /// `true` once raw counters have been read since creation or reset.
    pub fn has_baseline(&self) -> bool {
        self.sampled
    }

    pub fn poll_in_octets(&self) -> u64 {
        self.poll_in_octets
    }

    pub fn poll_out_octets(&self) -> u64 {
        self.poll_out_octets
    }

    pub fn set_poll_in_octets(&mut self, octets: u64) {
        self.poll_in_octets = octets;
    }

    pub fn set_poll_out_octets(&mut self, octets: u64) {
        self.poll_out_octets = octets;
    }

    /// Exported (in, out) octets after applying the flow direction.
    pub fn charged_octets(&self) -> (u64, u64) {
        match self.direction {
            FlowDirection::Ingress => (self.poll_in_octets, self.poll_out_octets),
            FlowDirection::Egress => (self.poll_out_octets, self.poll_in_octets),
        }
    }

    /// Zero raw and delta counters (device reboot).
    pub fn reset_counters(&mut self) {
        self.in_octets = Counter::default();
        self.out_octets = Counter::default();
        self.sampled = false;
        self.reset_poll_counters();
    }

    /// Flag an interface absent from a counter poll and drop its deltas.
    pub fn mark_missing(&mut self) {
        self.marked = true;
        self.reset_poll_counters();
    }

    fn reset_poll_counters(&mut self) {
        self.poll_in_octets = 0;
        self.poll_out_octets = 0;
    }

    // ── Export flags ─────────────────────────────────────────────────

    pub fn trace(&self) -> bool {
        self.trace
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn polling(&self) -> bool {
        self.polling
    }

    /// Disabling polling also stops tracing the interface.
    pub fn set_polling(&mut self, polling: bool) {
        if !polling {
            self.trace = false;
        }
        self.polling = polling;
    }

    /// Included in charging exports.
    pub fn is_billable(&self) -> bool {
        self.chargeable && self.polling
    }

    /// Take the operator-set flags and tags of `edited`. The last seen
    /// VLAN id survives when `edited` has none. Returns whether anything
    /// changed.
    pub fn adopt_flags(&mut self, edited: &Interface) -> bool {
        let before = self.flags();
        self.chargeable = edited.chargeable;
        self.trace = edited.trace;
        self.polling = edited.polling;
        self.direction = edited.direction;
        let tags_changed = adopt_tags(&mut self.tags, &edited.tags, VLAN_ID_TAG);
        before != self.flags() || tags_changed
    }

    fn flags(&self) -> (bool, bool, bool, FlowDirection) {
        (self.chargeable, self.trace, self.polling, self.direction)
    }
}

fn learn(slot: &mut Option<String>, value: String) -> bool {
    if slot.as_deref().is_none_or(str::is_empty) {
        *slot = Some(value);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn up_interface() -> Interface {
        let mut iface = Interface::new("eth0");
        iface.set_admin_status(1);
        iface.set_oper_status(1);
        iface
    }

    #[test]
    fn is_up_requires_both_statuses() {
        let mut iface = Interface::new("eth0");
        assert!(!iface.is_up());
        iface.set_admin_status(1);
        assert!(!iface.is_up());
        iface.set_oper_status(1);
        assert!(iface.is_up());
        iface.set_oper_status(2);
        assert!(iface.is_down());
    }

    #[test]
    fn going_down_clears_deltas_but_keeps_raw_counters() {
        let mut iface = up_interface();
        iface.set_in_octets(Counter::bits64(1_000));
        iface.set_out_octets(Counter::bits64(2_000));
        iface.set_poll_in_octets(10);
        iface.set_poll_out_octets(20);

        iface.set_oper_status(2);

        assert_eq!(iface.poll_in_octets(), 0);
        assert_eq!(iface.poll_out_octets(), 0);
        assert_eq!(iface.in_octets(), Counter::bits64(1_000));
        assert_eq!(iface.out_octets(), Counter::bits64(2_000));
    }

    #[test]
    fn staying_up_keeps_deltas() {
        let mut iface = up_interface();
        iface.set_poll_in_octets(10);
        iface.set_admin_status(1);
        assert_eq!(iface.poll_in_octets(), 10);
    }

    #[test]
    fn reset_counters_zeroes_everything() {
        let mut iface = up_interface();
        iface.set_in_octets(Counter::bits64(1_000));
        iface.set_poll_in_octets(10);
        iface.reset_counters();
        assert_eq!(iface.in_octets(), Counter::default());
        assert_eq!(iface.poll_in_octets(), 0);
        assert!(iface.is_up(), "status is untouched by a counter reset");
    }

    #[test]
    fn marking_missing_drops_deltas() {
        let mut iface = up_interface();
        iface.set_in_octets(Counter::bits32(4_000));
        iface.set_poll_in_octets(4_000);
        iface.set_poll_out_octets(7_000);
        iface.mark_missing();
        assert!(iface.marked);
        assert_eq!(iface.charged_octets(), (0, 0));
        assert_eq!(iface.in_octets(), Counter::bits32(4_000));
    }

    #[test]
    fn name_and_alias_are_first_writer_wins() {
        let mut iface = Interface::new("eth0");
        assert!(iface.learn_name("Gi0/1".into()));
        assert!(!iface.learn_name("Gi0/2".into()));
        assert_eq!(iface.if_name.as_deref(), Some("Gi0/1"));

        iface.if_alias = Some(String::new());
        assert!(iface.learn_alias("uplink".into()));
        assert_eq!(iface.if_alias.as_deref(), Some("uplink"));
    }

    #[test]
    fn disabling_polling_turns_trace_off() {
        let mut iface = Interface::new("eth0");
        iface.set_trace(true);
        iface.set_polling(false);
        assert!(!iface.trace());
        assert!(!iface.polling());
    }

    #[test]
    fn adopting_flags_keeps_counters_and_vlan_id() {
        let mut live = up_interface();
        live.set_poll_in_octets(10);
        live.tags.insert(VLAN_ID_TAG.into(), "42".into());

        let mut edited = Interface::new("eth0");
        edited.chargeable = true;
        edited.direction = FlowDirection::Egress;
        edited.tags.insert("customer".into(), "acme".into());

        assert!(live.adopt_flags(&edited));
        assert!(live.chargeable);
        assert_eq!(live.direction, FlowDirection::Egress);
        assert_eq!(live.poll_in_octets(), 10);
        assert!(live.is_up());
        assert_eq!(live.tags.get(VLAN_ID_TAG).map(String::as_str), Some("42"));
        assert_eq!(live.tags.get("customer").map(String::as_str), Some("acme"));

        assert!(!live.adopt_flags(&edited), "second adopt is a no-op");
    }

    #[test]
    fn egress_swaps_exported_direction() {
        let mut iface = up_interface();
        iface.set_poll_in_octets(1);
        iface.set_poll_out_octets(2);
        assert_eq!(iface.charged_octets(), (1, 2));
        iface.direction = FlowDirection::Egress;
        assert_eq!(iface.charged_octets(), (2, 1));
    }
}
