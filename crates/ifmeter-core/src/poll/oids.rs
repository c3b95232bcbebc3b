// Fixed column sets for the two table walks.
//
// Position constants index `TableRow::columns` and must follow the
// order of the corresponding column array.

use std::sync::LazyLock;

use ifmeter_snmp::Oid;

pub const SYS_DESCR: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 1];
pub const SYS_OBJECT_ID: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 2];
pub const SYS_UPTIME: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 3];
pub const SYS_NAME: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 5];
pub const SYS_LOCATION: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 6];
pub const IF_NUMBER: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 1];

pub const IF_DESCR: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 2];
pub const IF_ADMIN_STATUS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 7];
pub const IF_OPER_STATUS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 8];
pub const IF_IN_OCTETS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 10];
pub const IF_OUT_OCTETS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 16];

pub const IF_NAME: &[u32] = &[1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 1];
pub const IF_HC_IN_OCTETS: &[u32] = &[1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 6];
pub const IF_HC_OUT_OCTETS: &[u32] = &[1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 10];
pub const IF_ALIAS: &[u32] = &[1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 18];

/// `iso.org.dod.internet.private.enterprises`
pub const ENTERPRISES: &[u32] = &[1, 3, 6, 1, 4, 1];

/// Where the per-interface columns sit within a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryColumns {
    pub descr: usize,
    pub admin: usize,
    pub oper: usize,
    pub name: usize,
    pub alias: usize,
}

// ── Status walk ─────────────────────────────────────────────────────

pub mod status {
    pub const SYS_UPTIME: usize = 0;
    pub const SYS_DESCR: usize = 1;
    pub const SYS_OBJECT_ID: usize = 2;
    pub const SYS_NAME: usize = 3;
    pub const SYS_LOCATION: usize = 4;
    pub const IF_NUMBER: usize = 5;

    pub const ENTRY: super::EntryColumns = super::EntryColumns {
        descr: 6,
        admin: 7,
        oper: 8,
        name: 9,
        alias: 10,
    };
}

pub static STATUS_COLUMNS: LazyLock<Vec<Oid>> = LazyLock::new(|| {
    [
        SYS_UPTIME,
        SYS_DESCR,
        SYS_OBJECT_ID,
        SYS_NAME,
        SYS_LOCATION,
        IF_NUMBER,
        IF_DESCR,
        IF_ADMIN_STATUS,
        IF_OPER_STATUS,
        IF_NAME,
        IF_ALIAS,
    ]
    .into_iter()
    .map(Oid::from)
    .collect()
});

// ── Counter walk ────────────────────────────────────────────────────

pub mod counters {
    pub const SYS_UPTIME: usize = 0;
    pub const IN_32: usize = 2;
    pub const IN_64: usize = 3;
    pub const OUT_32: usize = 4;
    pub const OUT_64: usize = 5;
    /// Appended vendor VLAN-id column, when the source has one.
    pub const VLAN_ID: usize = 10;

    pub const ENTRY: super::EntryColumns = super::EntryColumns {
        descr: 1,
        admin: 6,
        oper: 7,
        name: 8,
        alias: 9,
    };
}

pub static COUNTER_COLUMNS: LazyLock<Vec<Oid>> = LazyLock::new(|| {
    [
        SYS_UPTIME,
        IF_DESCR,
        IF_IN_OCTETS,
        IF_HC_IN_OCTETS,
        IF_OUT_OCTETS,
        IF_HC_OUT_OCTETS,
        IF_ADMIN_STATUS,
        IF_OPER_STATUS,
        IF_NAME,
        IF_ALIAS,
    ]
    .into_iter()
    .map(Oid::from)
    .collect()
});

/// Counter columns, plus the vendor VLAN column if given.
pub fn counter_columns(vlan: Option<&Oid>) -> Vec<Oid> {
    let mut columns = COUNTER_COLUMNS.to_vec();
    columns.extend(vlan.cloned());
    columns
}

/// Private-enterprise number of an OID under `1.3.6.1.4.1`.
pub fn enterprise_of(oid: &Oid) -> Option<u32> {
    oid.arcs().strip_prefix(ENTERPRISES)?.first().copied()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_column_order() {
        assert_eq!(STATUS_COLUMNS.len(), status::ENTRY.alias + 1);
        assert_eq!(COUNTER_COLUMNS.len(), counters::VLAN_ID);
        assert_eq!(STATUS_COLUMNS[status::ENTRY.descr], Oid::from(IF_DESCR));
        assert_eq!(STATUS_COLUMNS[status::IF_NUMBER], Oid::from(IF_NUMBER));
        assert_eq!(COUNTER_COLUMNS[counters::ENTRY.descr], Oid::from(IF_DESCR));
        assert_eq!(COUNTER_COLUMNS[counters::IN_64], Oid::from(IF_HC_IN_OCTETS));
        assert_eq!(COUNTER_COLUMNS[counters::OUT_32], Oid::from(IF_OUT_OCTETS));
        assert_eq!(COUNTER_COLUMNS[counters::ENTRY.alias], Oid::from(IF_ALIAS));
    }

    #[test]
    fn vlan_column_is_appended_last() {
        let vlan: Oid = "1.3.6.1.4.1.9.9.68.1.2.2.1.2".parse().unwrap();
        let columns = counter_columns(Some(&vlan));
        assert_eq!(columns.get(counters::VLAN_ID), Some(&vlan));
        assert_eq!(counter_columns(None).len(), counters::VLAN_ID);
    }

    #[test]
    fn enterprise_number_extraction() {
        assert_eq!(enterprise_of(&Oid::from(&[1, 3, 6, 1, 4, 1, 2636, 1, 1][..])), Some(2636));
        assert_eq!(enterprise_of(&Oid::from(&[1, 3, 6, 1, 4, 1, 9][..])), Some(9));
        assert_eq!(enterprise_of(&Oid::from(ENTERPRISES)), None);
        assert_eq!(enterprise_of(&Oid::from(SYS_NAME)), None);
    }
}
