// Shared fake agent for ifmeter-core integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ifmeter_core::poll::oids;
use ifmeter_snmp::{Error, Oid, SnmpTransport, Target, Value, VarBind};

/// One ifTable row of the fake device.
#[derive(Debug, Clone, Copy)]
pub struct Port {
    pub index: u32,
    pub descr: &'static str,
    pub up: bool,
    pub in_octets: u32,
    pub out_octets: u32,
    /// ifHCIn/OutOctets; absent when `None`.
    pub hc_octets: Option<(u64, u64)>,
}

impl Port {
    pub fn new(index: u32, descr: &'static str, up: bool) -> Self {
        Self {
            index,
            descr,
            up,
            in_octets: 0,
            out_octets: 0,
            hc_octets: None,
        }
    }

    pub fn octets(mut self, in_octets: u32, out_octets: u32) -> Self {
        self.in_octets = in_octets;
        self.out_octets = out_octets;
        self
    }

    pub fn hc_octets(mut self, in_octets: u64, out_octets: u64) -> Self {
        self.hc_octets = Some((in_octets, out_octets));
        self
    }
}

/// In-memory agent answering GETNEXT from a mutable, sorted MIB.
///
/// `walk_table` uses the transport's default implementation, so polls
/// go through the real column walk.
#[derive(Debug, Default)]
pub struct FakeAgent {
    mib: Mutex<BTreeMap<Oid, Value>>,
    failing: AtomicBool,
    requests: AtomicUsize,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counts a GETNEXT as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn instance(column: &[u32], index: u32) -> Oid {
    Oid::from(column).child(&[index])
}

fn text(s: &str) -> Value {
    Value::OctetString(Bytes::copy_from_slice(s.as_bytes()))
}

impl FakeAgent {
    /// A device with system scalars and the given ports.
    pub fn device(uptime: u32, ports: &[Port]) -> Self {
        let agent = Self::default();
        agent.set_uptime(uptime);
        {
            let mut mib = agent.mib.lock().unwrap();
            mib.insert(instance(oids::SYS_DESCR, 0), text("fake switch"));
            mib.insert(
                instance(oids::SYS_OBJECT_ID, 0),
                Value::ObjectIdentifier("1.3.6.1.4.1.9.1.516".parse().unwrap()),
            );
            mib.insert(instance(oids::SYS_NAME, 0), text("sw1"));
            mib.insert(instance(oids::SYS_LOCATION, 0), text("rack 4"));
            mib.insert(
                instance(oids::IF_NUMBER, 0),
                Value::Integer(i64::try_from(ports.len()).unwrap()),
            );
        }
        for port in ports {
            agent.put_port(*port);
        }
        agent
    }

    pub fn set_uptime(&self, ticks: u32) {
        self.mib
            .lock()
            .unwrap()
            .insert(instance(oids::SYS_UPTIME, 0), Value::TimeTicks(ticks));
    }

    pub fn put_port(&self, port: Port) {
        let status = Value::Integer(if port.up { 1 } else { 2 });
        let mut mib = self.mib.lock().unwrap();
        mib.insert(instance(oids::IF_DESCR, port.index), text(port.descr));
        mib.insert(instance(oids::IF_ADMIN_STATUS, port.index), Value::Integer(1));
        mib.insert(instance(oids::IF_OPER_STATUS, port.index), status);
        mib.insert(instance(oids::IF_IN_OCTETS, port.index), Value::Counter32(port.in_octets));
        mib.insert(instance(oids::IF_OUT_OCTETS, port.index), Value::Counter32(port.out_octets));
        let hc = [oids::IF_HC_IN_OCTETS, oids::IF_HC_OUT_OCTETS];
        match port.hc_octets {
            Some((hc_in, hc_out)) => {
                mib.insert(instance(hc[0], port.index), Value::Counter64(hc_in));
                mib.insert(instance(hc[1], port.index), Value::Counter64(hc_out));
            }
            None => {
                for column in hc {
                    mib.remove(&instance(column, port.index));
                }
            }
        }
        mib.insert(instance(oids::IF_NAME, port.index), text(port.descr));
        mib.insert(instance(oids::IF_ALIAS, port.index), text(&format!("port {}", port.index)));
    }

    /// Drop every column instance of `index`.
    pub fn remove_port(&self, index: u32) {
        self.mib.lock().unwrap().retain(|oid, _| {
            let arcs = oid.arcs();
            let is_if_column = arcs.starts_with(&[1, 3, 6, 1, 2, 1, 2, 2, 1])
                || arcs.starts_with(&[1, 3, 6, 1, 2, 1, 31, 1, 1, 1]);
            !(is_if_column && arcs.last() == Some(&index))
        });
    }

    pub fn set_if_number(&self, n: i64) {
        self.mib
            .lock()
            .unwrap()
            .insert(instance(oids::IF_NUMBER, 0), Value::Integer(n));
    }

    /// Make every request time out.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Delay every GETNEXT answer by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Most GETNEXT requests ever outstanding at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }
}

#[async_trait]
impl SnmpTransport for FakeAgent {
    async fn get(&self, _target: &Target, oids: &[Oid]) -> Result<Vec<VarBind>, Error> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Timeout { attempts: 1 });
        }
        let mib = self.mib.lock().unwrap();
        Ok(oids
            .iter()
            .map(|oid| {
                let value = mib.get(oid).cloned().unwrap_or(Value::NoSuchInstance);
                VarBind::new(oid.clone(), value)
            })
            .collect())
    }

    async fn get_next(&self, _target: &Target, oids: &[Oid]) -> Result<Vec<VarBind>, Error> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let _flight = self.enter();
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Timeout { attempts: 1 });
        }
        let mib = self.mib.lock().unwrap();
        Ok(oids
            .iter()
            .map(|oid| {
                mib.range((Bound::Excluded(oid.clone()), Bound::Unbounded))
                    .next()
                    .map_or_else(
                        || VarBind::new(oid.clone(), Value::EndOfMibView),
                        |(next, value)| VarBind::new(next.clone(), value.clone()),
                    )
            })
            .collect())
    }
}
