// ── Column table walk ──
//
// GETNEXT over all still-active columns per request, the way agents
// expect conceptual tables to be read. Rows are keyed by the instance
// suffix below each column OID. Scalars (e.g. sysUpTime) come back as
// the `[0]` instance, so the system row always sorts first.

use std::collections::BTreeMap;

use crate::client::SnmpTransport;
use crate::error::Error;
use crate::oid::Oid;
use crate::target::Target;
use crate::value::Value;

/// Upper bound on GETNEXT round trips for a single walk.
const MAX_WALK_REQUESTS: usize = 100_000;

/// One row of a walked table.
///
/// `columns[i]` holds the value for the i-th requested column OID,
/// or `None` if the agent had no instance at this index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub index: Vec<u32>,
    pub columns: Vec<Option<Value>>,
}

impl TableRow {
    pub fn column(&self, pos: usize) -> Option<&Value> {
        self.columns.get(pos).and_then(Option::as_ref)
    }

    /// First arc of the index (ifIndex for ifTable rows).
    pub fn first_index(&self) -> u32 {
        self.index.first().copied().unwrap_or_default()
    }
}

/// Walk `columns` on `target` using the transport's GETNEXT primitive.
pub async fn walk<T>(transport: &T, target: &Target, columns: &[Oid]) -> Result<Vec<TableRow>, Error>
where
    T: SnmpTransport + ?Sized,
{
    // Current position per column; `None` once the column is exhausted.
    let mut cursors: Vec<Option<Oid>> = columns.iter().cloned().map(Some).collect();
    let mut rows: BTreeMap<Vec<u32>, Vec<Option<Value>>> = BTreeMap::new();

    for _ in 0..MAX_WALK_REQUESTS {
        let active: Vec<usize> = cursors
            .iter()
            .enumerate()
            .filter_map(|(pos, cursor)| cursor.as_ref().map(|_| pos))
            .collect();
        if active.is_empty() {
            break;
        }

        let request: Vec<Oid> = active
            .iter()
            .filter_map(|pos| cursors.get(*pos).cloned().flatten())
            .collect();
        let response = transport.get_next(target, &request).await?;
        if response.len() != request.len() {
            return Err(Error::VarBindCount {
                expected: request.len(),
                got: response.len(),
            });
        }

        for (pos, vb) in active.into_iter().zip(response) {
            let (Some(column), Some(cursor)) = (columns.get(pos), cursors.get_mut(pos)) else {
                continue;
            };
            let Some(previous) = cursor.take() else {
                continue;
            };
            if vb.value.is_exception() || vb.oid <= previous {
                continue;
            }
            let Some(index) = vb.oid.suffix_after(column) else {
                continue;
            };
            if index.is_empty() {
                continue;
            }
            let row = rows
                .entry(index.to_vec())
                .or_insert_with(|| vec![None; columns.len()]);
            if let Some(slot) = row.get_mut(pos) {
                *slot = Some(vb.value);
            }
            *cursor = Some(vb.oid);
        }
    }

    Ok(rows
        .into_iter()
        .map(|(index, columns)| TableRow { index, columns })
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::value::VarBind;

    /// In-memory agent answering GETNEXT from a sorted MIB.
    struct MibAgent {
        mib: BTreeMap<Oid, Value>,
        requests: AtomicUsize,
        fail_after: Option<usize>,
        seen: Mutex<Vec<usize>>,
    }

    impl MibAgent {
        fn new(entries: &[(&str, Value)]) -> Self {
            Self {
                mib: entries
                    .iter()
                    .map(|(oid, v)| (oid.parse().unwrap(), v.clone()))
                    .collect(),
                requests: AtomicUsize::new(0),
                fail_after: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SnmpTransport for MibAgent {
        async fn get(&self, _target: &Target, _oids: &[Oid]) -> Result<Vec<VarBind>, Error> {
            unreachable!("walk only issues GETNEXT")
        }

        async fn get_next(&self, _target: &Target, oids: &[Oid]) -> Result<Vec<VarBind>, Error> {
            let n = self.requests.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| n >= limit) {
                return Err(Error::Timeout { attempts: 1 });
            }
            self.seen.lock().unwrap().push(oids.len());
            Ok(oids
                .iter()
                .map(|oid| {
                    self.mib
                        .range::<Oid, _>((std::ops::Bound::Excluded(oid), std::ops::Bound::Unbounded))
                        .next()
                        .map_or_else(
                            || VarBind::new(oid.clone(), Value::EndOfMibView),
                            |(k, v)| VarBind::new(k.clone(), v.clone()),
                        )
                })
                .collect())
        }
    }

    fn target() -> Target {
        Target::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            "public",
            0,
            Duration::from_millis(10),
        )
    }

    fn text(s: &'static str) -> Value {
        Value::OctetString(Bytes::from_static(s.as_bytes()))
    }

    fn sample_agent() -> MibAgent {
        MibAgent::new(&[
            ("1.3.6.1.2.1.1.3.0", Value::TimeTicks(5000)),
            ("1.3.6.1.2.1.1.5.0", text("core-sw1")),
            ("1.3.6.1.2.1.2.2.1.2.1", text("eth0")),
            ("1.3.6.1.2.1.2.2.1.2.2", text("eth1")),
            ("1.3.6.1.2.1.2.2.1.2.10", text("eth9")),
            ("1.3.6.1.2.1.2.2.1.10.1", Value::Counter32(100)),
            ("1.3.6.1.2.1.2.2.1.10.10", Value::Counter32(900)),
            ("1.3.6.1.2.1.31.1.1.1.1.1", text("Gi0/1")),
        ])
    }

    fn columns(list: &[&str]) -> Vec<Oid> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[tokio::test]
    async fn scalar_row_sorts_first_and_rows_align() {
        let agent = sample_agent();
        let cols = columns(&[
            "1.3.6.1.2.1.1.3",
            "1.3.6.1.2.1.2.2.1.2",
            "1.3.6.1.2.1.2.2.1.10",
        ]);

        let rows = walk(&agent, &target(), &cols).await.unwrap();

        let indexes: Vec<Vec<u32>> = rows.iter().map(|r| r.index.clone()).collect();
        assert_eq!(indexes, vec![vec![0], vec![1], vec![2], vec![10]]);

        assert_eq!(rows[0].column(0), Some(&Value::TimeTicks(5000)));
        assert_eq!(rows[0].column(1), None);
        assert_eq!(rows[1].column(1), Some(&text("eth0")));
        assert_eq!(rows[1].column(2), Some(&Value::Counter32(100)));
        assert_eq!(rows[2].column(2), None, "eth1 has no ifInOctets instance");
        assert_eq!(rows[3].first_index(), 10);
    }

    #[tokio::test]
    async fn exhausted_columns_drop_out_of_requests() {
        let agent = sample_agent();
        let cols = columns(&["1.3.6.1.2.1.1.3", "1.3.6.1.2.1.2.2.1.2"]);

        walk(&agent, &target(), &cols).await.unwrap();

        // sysUpTime finishes after its single instance; ifDescr keeps going.
        let seen = agent.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![2, 2, 1, 1]);
    }

    #[tokio::test]
    async fn end_of_mib_terminates_walk() {
        let agent = sample_agent();
        let cols = columns(&["1.3.6.1.2.1.31.1.1.1.1"]);
        let rows = walk(&agent, &target(), &cols).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].column(0), Some(&text("Gi0/1")));
    }

    #[tokio::test]
    async fn transport_failure_fails_the_walk() {
        let mut agent = sample_agent();
        agent.fail_after = Some(1);
        let cols = columns(&["1.3.6.1.2.1.2.2.1.2"]);
        let err = walk(&agent, &target(), &cols).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn empty_subtree_yields_no_rows() {
        let agent = sample_agent();
        let cols = columns(&["1.3.6.1.4.1.9.9.68.1.2.2.1.2"]);
        let rows = walk(&agent, &target(), &cols).await.unwrap();
        assert!(rows.is_empty());
    }
}
