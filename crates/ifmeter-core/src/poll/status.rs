use ifmeter_snmp::Value;
use tracing::{debug, info, warn};

use super::oids::{self, STATUS_COLUMNS};
use super::vlan::assign_vlan_oid;
use super::{PollOutcome, Poller, update_entry};
use crate::metrics::names;
use crate::model::SourceStatus;
use crate::store::SourceHandle;

impl Poller {
    /// Refresh reachability, system info and the interface inventory.
    ///
    /// A failed walk only changes the status and poll timing. A
    /// successful one marks the source ready unless it reports no
    /// interfaces.
    pub async fn poll_status(&self, handle: &SourceHandle) -> PollOutcome {
        let (ip, target) = {
            let source = handle.read().await;
            (source.ip(), source.target())
        };
        debug!(source = %ip, "poll status");

        let (result, elapsed) = self.walk(&target, &STATUS_COLUMNS).await;

        let mut source = handle.write().await;
        let (system, rows) = match self.accept(&mut source, result, elapsed) {
            Ok(split) => split,
            Err(status) => return PollOutcome::Failed(status),
        };
        let Some(uptime) = self.uptime(&mut source, &system, oids::status::SYS_UPTIME) else {
            return PollOutcome::Failed(SourceStatus::OtherError);
        };

        self.check_reboot(&mut source, uptime);
        source.sys_uptime = uptime;

        let text = |pos| system.column(pos).map(Value::to_text);
        if let Some(descr) = text(oids::status::SYS_DESCR) {
            source.sys_descr = Some(descr);
        }
        if let Some(object_id) = text(oids::status::SYS_OBJECT_ID) {
            source.sys_object_id = Some(object_id);
        }
        if let Some(name) = text(oids::status::SYS_NAME) {
            source.sys_name = Some(name);
        }
        if let Some(location) = text(oids::status::SYS_LOCATION) {
            source.sys_location = Some(location);
        }

        let if_number = system
            .column(oids::status::IF_NUMBER)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if if_number == 0 {
            warn!(source = %ip, "source has no interfaces");
            self.metrics.increment(names::LOG_WARN);
            source.status = SourceStatus::NoIftable;
            return PollOutcome::NoInterfaces;
        }

        source.status = SourceStatus::Success;
        assign_vlan_oid(&mut source, &self.vendor_vlan_oids);

        let layout = oids::status::ENTRY;
        let mut applied = 0;
        for row in &rows {
            let Some(descr) = self.descriptor(ip, row, layout.descr) else {
                continue;
            };
            update_entry(source.interface_mut(&descr), row, layout);
            applied += 1;
        }

        info!(source = %ip, uptime, if_number, interfaces = applied, "status SUCCESS");
        PollOutcome::Polled {
            interfaces: applied,
        }
    }
}
