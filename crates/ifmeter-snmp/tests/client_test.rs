#![allow(clippy::unwrap_used)]
// Integration tests for `SnmpClient` against an in-process UDP agent.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;

use ifmeter_snmp::codec::{self, Message, Pdu, PduKind};
use ifmeter_snmp::{Error, Oid, SnmpClient, SnmpTransport, Target, Value, VarBind};

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Behaviour {
    Answer,
    Silent,
    ErrorStatus(u32),
}

/// Spawn a v2c agent serving `mib` for `community`; returns its port.
async fn spawn_agent(mib: Vec<(&'static str, Value)>, community: &'static str, behaviour: Behaviour) -> u16 {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let mib: Arc<BTreeMap<Oid, Value>> = Arc::new(
        mib.into_iter()
            .map(|(oid, value)| (oid.parse().unwrap(), value))
            .collect(),
    );

    tokio::spawn(async move {
        let mut buf = vec![0u8; 65_535];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Ok(request) = codec::decode_message(&buf[..n]) else {
                continue;
            };
            if request.community.as_ref() != community.as_bytes() {
                continue;
            }
            let (error_status, varbinds) = match behaviour {
                Behaviour::Silent => continue,
                Behaviour::ErrorStatus(status) => (status, request.pdu.varbinds.clone()),
                Behaviour::Answer => (0, answer(&mib, &request.pdu)),
            };
            let response = Message {
                version: request.version,
                community: request.community.clone(),
                pdu: Pdu {
                    kind: PduKind::Response,
                    request_id: request.pdu.request_id,
                    error_status,
                    error_index: u32::from(error_status != 0),
                    varbinds,
                },
            };
            let wire = codec::encode_message(&response).unwrap();
            let _ = socket.send_to(&wire, peer).await;
        }
    });

    port
}

fn answer(mib: &BTreeMap<Oid, Value>, pdu: &Pdu) -> Vec<VarBind> {
    pdu.varbinds
        .iter()
        .map(|vb| match pdu.kind {
            PduKind::GetRequest => VarBind::new(
                vb.oid.clone(),
                mib.get(&vb.oid).cloned().unwrap_or(Value::NoSuchInstance),
            ),
            _ => mib
                .range::<Oid, _>((Bound::Excluded(&vb.oid), Bound::Unbounded))
                .next()
                .map_or_else(
                    || VarBind::new(vb.oid.clone(), Value::EndOfMibView),
                    |(k, v)| VarBind::new(k.clone(), v.clone()),
                ),
        })
        .collect()
}

fn target(port: u16, community: &str, retries: u32, timeout_ms: u64) -> Target {
    Target::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        community,
        retries,
        Duration::from_millis(timeout_ms),
    )
    .with_port(port)
}

fn text(s: &'static str) -> Value {
    Value::OctetString(Bytes::from_static(s.as_bytes()))
}

fn if_mib() -> Vec<(&'static str, Value)> {
    vec![
        ("1.3.6.1.2.1.1.3.0", Value::TimeTicks(777)),
        ("1.3.6.1.2.1.2.1.0", Value::Integer(2)),
        ("1.3.6.1.2.1.2.2.1.2.1", text("eth0")),
        ("1.3.6.1.2.1.2.2.1.2.2", text("eth1")),
        ("1.3.6.1.2.1.31.1.1.1.6.1", Value::Counter64(10_000_000_000)),
        ("1.3.6.1.2.1.31.1.1.1.6.2", Value::Counter64(42)),
    ]
}

fn oid(s: &str) -> Oid {
    s.parse().unwrap()
}

// ── Point queries ───────────────────────────────────────────────────

#[tokio::test]
async fn test_get_returns_requested_instances() {
    let port = spawn_agent(if_mib(), "public", Behaviour::Answer).await;
    let client = SnmpClient::new();

    let result = client
        .get(
            &target(port, "public", 1, 500),
            &[oid("1.3.6.1.2.1.1.3.0"), oid("1.3.6.1.2.1.1.5.0")],
        )
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].value, Value::TimeTicks(777));
    assert_eq!(result[1].value, Value::NoSuchInstance);
}

#[tokio::test]
async fn test_get_next_advances_lexicographically() {
    let port = spawn_agent(if_mib(), "public", Behaviour::Answer).await;
    let client = SnmpClient::new();

    let result = client
        .get_next(&target(port, "public", 1, 500), &[oid("1.3.6.1.2.1.2.2.1.2.1")])
        .await
        .unwrap();

    assert_eq!(result[0].oid, oid("1.3.6.1.2.1.2.2.1.2.2"));
    assert_eq!(result[0].value, text("eth1"));
}

// ── Table walk ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_walk_table_over_udp() {
    let port = spawn_agent(if_mib(), "public", Behaviour::Answer).await;
    let client = SnmpClient::new();

    let rows = client
        .walk_table(
            &target(port, "public", 1, 500),
            &[
                oid("1.3.6.1.2.1.1.3"),
                oid("1.3.6.1.2.1.2.1"),
                oid("1.3.6.1.2.1.2.2.1.2"),
                oid("1.3.6.1.2.1.31.1.1.1.6"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].index, vec![0]);
    assert_eq!(rows[0].column(0), Some(&Value::TimeTicks(777)));
    assert_eq!(rows[0].column(1), Some(&Value::Integer(2)));
    assert_eq!(rows[1].column(2), Some(&text("eth0")));
    assert_eq!(rows[1].column(3), Some(&Value::Counter64(10_000_000_000)));
    assert_eq!(rows[2].column(3), Some(&Value::Counter64(42)));
}

// ── Failure modes ───────────────────────────────────────────────────

#[tokio::test]
async fn test_silent_agent_times_out_after_all_attempts() {
    let port = spawn_agent(if_mib(), "public", Behaviour::Silent).await;
    let client = SnmpClient::new();

    let result = client
        .get(&target(port, "public", 1, 50), &[oid("1.3.6.1.2.1.1.3.0")])
        .await;

    assert!(
        matches!(result, Err(Error::Timeout { attempts: 2 })),
        "expected Timeout after 2 attempts, got: {result:?}"
    );
}

#[tokio::test]
async fn test_wrong_community_is_ignored_by_agent() {
    let port = spawn_agent(if_mib(), "private", Behaviour::Answer).await;
    let client = SnmpClient::new();

    let result = client
        .walk_table(&target(port, "public", 0, 50), &[oid("1.3.6.1.2.1.2.2.1.2")])
        .await;

    assert!(result.unwrap_err().is_timeout());
}

#[tokio::test]
async fn test_error_status_is_surfaced() {
    let port = spawn_agent(if_mib(), "public", Behaviour::ErrorStatus(5)).await;
    let client = SnmpClient::new();

    let result = client
        .get_next(&target(port, "public", 0, 500), &[oid("1.3.6.1.2.1.2.2.1.2")])
        .await;

    assert!(
        matches!(result, Err(Error::ErrorStatus { status: 5, index: 1 })),
        "expected ErrorStatus, got: {result:?}"
    );
}
