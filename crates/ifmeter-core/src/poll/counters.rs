use std::collections::HashSet;

use ifmeter_snmp::{Oid, Value};
use tracing::{debug, info, warn};

use super::oids::{self, counter_columns};
use super::vlan::observe_vlan;
use super::{PollOutcome, Poller, update_entry};
use crate::metrics::names;
use crate::model::{SourceStatus, select_counter};
use crate::store::SourceHandle;

impl Poller {
    /// Sample octet counters and compute per-interface deltas.
    ///
    /// Deltas are produced for interfaces that are up and already have
    /// a baseline, unless the source just (re)started. Interfaces missing
    /// from the response are marked, and removed if still missing on the
    /// next poll.
    pub async fn poll_counters(&self, handle: &SourceHandle) -> PollOutcome {
        let (ip, target, vlan_oid) = {
            let source = handle.read().await;
            let vlan_oid = source.vlan_oid().and_then(|text| match text.parse::<Oid>() {
                Ok(oid) => Some(oid),
                Err(e) => {
                    warn!(source = %source.ip(), error = %e, "ignoring malformed VLAN OID tag");
                    None
                }
            });
            (source.ip(), source.target(), vlan_oid)
        };
        debug!(source = %ip, "poll counters");

        let columns = counter_columns(vlan_oid.as_ref());
        let (result, elapsed) = self.walk(&target, &columns).await;

        let mut source = handle.write().await;
        let (system, rows) = match self.accept(&mut source, result, elapsed) {
            Ok(split) => split,
            Err(status) => return PollOutcome::Failed(status),
        };
        let Some(uptime) = self.uptime(&mut source, &system, oids::counters::SYS_UPTIME) else {
            return PollOutcome::Failed(SourceStatus::OtherError);
        };

        if !self.check_reboot(&mut source, uptime) {
            source.poll_duration = uptime.saturating_sub(source.sys_uptime);
        }
        source.sys_uptime = uptime;

        let layout = oids::counters::ENTRY;
        let skip_delta = source.skip_delta;
        let mut seen: HashSet<String> = HashSet::with_capacity(rows.len());

        for row in &rows {
            let Some(descr) = self.descriptor(ip, row, layout.descr) else {
                continue;
            };
            let iface = source.interface_mut(&descr);
            update_entry(iface, row, layout);

            if let Some(vlan) = row.column(oids::counters::VLAN_ID) {
                observe_vlan(ip, iface, vlan.to_text(), self.vlan_policy.as_ref());
            }

            let sample = |c32, c64| {
                select_counter(
                    row.column(c32).and_then(Value::as_u64),
                    row.column(c64).and_then(Value::as_u64),
                )
            };
            let in_octets = sample(oids::counters::IN_32, oids::counters::IN_64);
            let out_octets = sample(oids::counters::OUT_32, oids::counters::OUT_64);

            if !skip_delta && iface.is_up() && iface.has_baseline() {
                let delta_in = self.reconcile(ip, &descr, in_octets, iface.in_octets());
                let delta_out = self.reconcile(ip, &descr, out_octets, iface.out_octets());
                iface.set_poll_in_octets(delta_in);
                iface.set_poll_out_octets(delta_out);
            }
            iface.set_in_octets(in_octets);
            iface.set_out_octets(out_octets);

            seen.insert(descr);
        }

        source.skip_delta = false;

        let missing: Vec<String> = source
            .interfaces()
            .filter(|iface| !seen.contains(iface.descr()))
            .map(|iface| iface.descr().to_owned())
            .collect();
        for descr in missing {
            warn!(source = %ip, if_descr = %descr, "interface not found in response");
            self.metrics.increment(names::LOG_WARN);
            let Some(iface) = source.existing_interface_mut(&descr) else {
                continue;
            };
            if iface.marked {
                source.remove_interface(&descr);
                info!(source = %ip, if_descr = %descr, "interface removed");
            } else {
                iface.mark_missing();
            }
        }
        for descr in &seen {
            if let Some(iface) = source.existing_interface_mut(descr) {
                iface.marked = false;
            }
        }

        debug!(source = %ip, uptime, interfaces = seen.len(), "counters polled");
        PollOutcome::Polled {
            interfaces: seen.len(),
        }
    }
}
