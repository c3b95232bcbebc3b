// ── Vendor VLAN handling ──
//
// Sources whose sysObjectID belongs to a vendor with a known VLAN-id
// column get that column appended to their counter walks. What to do
// with an interface seen on a VLAN for the first time is a policy
// decision, pluggable via `VlanChargePolicy`.

use std::fmt;
use std::net::IpAddr;

use ifmeter_snmp::Oid;
use tracing::info;

use super::oids::enterprise_of;
use crate::model::{Interface, Source, VLAN_ID_TAG, VLAN_OID_TAG};

/// Decides whether an interface tagged with a VLAN for the first time
/// starts being charged.
pub trait VlanChargePolicy: Send + Sync + fmt::Debug {
    fn charge_on_first_sighting(&self, iface: &Interface) -> bool;
}

/// Start charging newly discovered VLAN interfaces that are up.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoChargeNewVlan;

impl VlanChargePolicy for AutoChargeNewVlan {
    fn charge_on_first_sighting(&self, iface: &Interface) -> bool {
        iface.is_up()
    }
}

/// Never change charging flags automatically.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualCharging;

impl VlanChargePolicy for ManualCharging {
    fn charge_on_first_sighting(&self, _iface: &Interface) -> bool {
        false
    }
}

/// Tag `source` with the first vendor VLAN OID whose enterprise number
/// matches its sysObjectID. Sources already tagged are left alone.
pub(crate) fn assign_vlan_oid(source: &mut Source, vendor_oids: &[Oid]) -> Option<Oid> {
    if vendor_oids.is_empty() || source.tags.contains_key(VLAN_OID_TAG) {
        return None;
    }
    let sys_oid: Oid = source.sys_object_id.as_deref()?.parse().ok()?;
    let vendor = enterprise_of(&sys_oid)?;
    let found = vendor_oids
        .iter()
        .find(|oid| enterprise_of(oid) == Some(vendor))?
        .clone();

    source.tags.insert(VLAN_OID_TAG.to_owned(), found.to_string());
    info!(source = %source.ip(), vlan_oid = %found, "vendor VLAN column assigned");
    Some(found)
}

/// Record the VLAN id reported for `iface` this cycle.
pub(crate) fn observe_vlan(
    ip: IpAddr,
    iface: &mut Interface,
    vlan_id: String,
    policy: &dyn VlanChargePolicy,
) {
    let previous = iface.tags.get(VLAN_ID_TAG).cloned();
    match previous {
        None => {
            if policy.charge_on_first_sighting(iface) && !iface.chargeable {
                iface.chargeable = true;
                info!(source = %ip, if_descr = iface.descr(), vlan = %vlan_id, "charging enabled for new VLAN");
            }
        }
        Some(previous) if previous != vlan_id => {
            info!(source = %ip, if_descr = iface.descr(), from = %previous, to = %vlan_id, "interface VLAN changed");
        }
        Some(_) => {}
    }
    iface.tags.insert(VLAN_ID_TAG.to_owned(), vlan_id);
}
