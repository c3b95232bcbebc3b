use std::collections::BTreeMap;

pub mod counter;
pub mod interface;
pub mod source;
pub mod status;

pub use counter::{Counter, CounterWidth, select_counter};
pub use interface::{FlowDirection, IF_STATUS_UP, Interface};
pub use source::Source;
pub use status::SourceStatus;

/// Source tag naming a vendor VLAN-id column appended to counter walks.
pub const VLAN_OID_TAG: &str = "VLAN_OID";

/// Interface tag holding the last VLAN id seen on the interface.
pub const VLAN_ID_TAG: &str = "VLAN_ID";

/// Replace `ours` with `theirs`, keeping the collector-maintained
/// `managed` key when `theirs` lacks it. Returns whether `ours` changed.
fn adopt_tags(
    ours: &mut BTreeMap<String, String>,
    theirs: &BTreeMap<String, String>,
    managed: &str,
) -> bool {
    let mut next = theirs.clone();
    if let Some(value) = ours.get(managed) {
        next.entry(managed.to_owned()).or_insert_with(|| value.clone());
    }
    let changed = *ours != next;
    *ours = next;
    changed
}
