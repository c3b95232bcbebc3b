// SNMPv2c community target: where to send, with which community,
// and how long to keep trying.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

/// Standard SNMP agent port.
pub const SNMP_PORT: u16 = 161;

/// Addressing and retry policy for one agent.
///
/// Total attempts per request are `1 + retries`, each bounded by `timeout`.
#[derive(Debug)]
pub struct Target {
    pub addr: SocketAddr,
    community: SecretString,
    pub retries: u32,
    pub timeout: Duration,
}

impl Target {
    pub fn new(ip: IpAddr, community: &str, retries: u32, timeout: Duration) -> Self {
        Self {
            addr: SocketAddr::new(ip, SNMP_PORT),
            community: SecretString::from(community.to_owned()),
            retries,
            timeout,
        }
    }

    /// Override the agent port (non-standard agents, test harnesses).
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    pub fn community(&self) -> &SecretString {
        &self.community
    }

    pub(crate) fn community_bytes(&self) -> bytes::Bytes {
        bytes::Bytes::copy_from_slice(self.community.expose_secret().as_bytes())
    }

    /// Worst-case wall time for one request.
    pub fn budget(&self) -> Duration {
        self.timeout.saturating_mul(self.retries.saturating_add(1))
    }
}
