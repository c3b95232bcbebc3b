// ── SNMP client ──
//
// `SnmpTransport` is the seam the poll engine depends on; `SnmpClient`
// is the UDP implementation. One ephemeral socket per request keeps
// concurrent polls of different agents fully independent.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::codec::{self, Message, Pdu, PduKind, SNMP_V2C};
use crate::error::Error;
use crate::oid::Oid;
use crate::table::{self, TableRow};
use crate::target::Target;
use crate::value::VarBind;

/// Largest datagram we accept. Agents rarely exceed 1500 octets; this
/// leaves room for jumbo frames and fragmented responses.
const MAX_DATAGRAM: usize = 65_535;

/// Point queries and table walks against an SNMP agent.
#[async_trait]
pub trait SnmpTransport: Send + Sync {
    async fn get(&self, target: &Target, oids: &[Oid]) -> Result<Vec<VarBind>, Error>;

    async fn get_next(&self, target: &Target, oids: &[Oid]) -> Result<Vec<VarBind>, Error>;

    /// Walk the given columns and return rows sorted by index.
    async fn walk_table(&self, target: &Target, columns: &[Oid]) -> Result<Vec<TableRow>, Error> {
        table::walk(self, target, columns).await
    }
}

/// UDP SNMPv2c client.
///
/// Cheap to share behind an `Arc`; holds only the request-id sequence.
#[derive(Debug)]
pub struct SnmpClient {
    next_request_id: AtomicI32,
}

impl Default for SnmpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SnmpClient {
    pub fn new() -> Self {
        // Seed from the pid so restarted collectors don't reuse ids in flight.
        let seed = i32::try_from(std::process::id() & 0x7fff).unwrap_or(1);
        Self {
            next_request_id: AtomicI32::new(seed.max(1)),
        }
    }

    fn request_id(&self) -> i32 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff
    }

    async fn request(
        &self,
        target: &Target,
        kind: PduKind,
        oids: &[Oid],
    ) -> Result<Vec<VarBind>, Error> {
        let request_id = self.request_id();
        let payload = codec::encode_message(&Message {
            version: SNMP_V2C,
            community: target.community_bytes(),
            pdu: Pdu::request(kind, request_id, oids),
        })?;

        let local: SocketAddr = match target.addr.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target.addr).await?;

        let attempts = target.retries.saturating_add(1);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        for attempt in 1..=attempts {
            socket.send(&payload).await?;
            let deadline = Instant::now() + target.timeout;

            loop {
                let received = match tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await
                {
                    Err(_) => break,
                    Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                        // ICMP port unreachable: the agent is not listening.
                        tokio::time::sleep_until(deadline).await;
                        break;
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Ok(Ok(n)) => n,
                };

                let msg = match codec::decode_message(&buf[..received]) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(agent = %target.addr, error = %e, "discarding malformed datagram");
                        continue;
                    }
                };
                if msg.pdu.kind != PduKind::Response || msg.pdu.request_id != request_id {
                    trace!(
                        agent = %target.addr,
                        got = msg.pdu.request_id,
                        want = request_id,
                        "discarding unrelated response"
                    );
                    continue;
                }
                if msg.pdu.error_status != 0 {
                    return Err(Error::ErrorStatus {
                        status: msg.pdu.error_status,
                        index: msg.pdu.error_index,
                    });
                }
                return Ok(msg.pdu.varbinds);
            }

            debug!(agent = %target.addr, attempt, attempts, "snmp request timed out");
        }

        Err(Error::Timeout { attempts })
    }
}

#[async_trait]
impl SnmpTransport for SnmpClient {
    async fn get(&self, target: &Target, oids: &[Oid]) -> Result<Vec<VarBind>, Error> {
        self.request(target, PduKind::GetRequest, oids).await
    }

    async fn get_next(&self, target: &Target, oids: &[Oid]) -> Result<Vec<VarBind>, Error> {
        self.request(target, PduKind::GetNextRequest, oids).await
    }
}
