use thiserror::Error;

/// Top-level error type for the `ifmeter-snmp` crate.
///
/// `ifmeter-core` folds these into a source status rather than
/// propagating them, so variants are grouped by how the poller reacts.
#[derive(Debug, Error)]
pub enum Error {
    // ── No response ─────────────────────────────────────────────────
    /// Every attempt expired without a matching response.
    #[error("No response after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    // ── Agent-reported ──────────────────────────────────────────────
    /// The agent answered with a non-zero error-status.
    #[error("Agent returned error-status {status} at index {index}")]
    ErrorStatus { status: u32, index: u32 },

    /// The response carried a different number of varbinds than requested.
    #[error("Expected {expected} varbind(s) in response, got {got}")]
    VarBindCount { expected: usize, got: usize },

    // ── Encoding ────────────────────────────────────────────────────
    /// Malformed BER on the wire.
    #[error("BER decode error: {0}")]
    Decode(String),

    /// Value cannot be represented in BER (e.g. an OID with fewer than two arcs).
    #[error("BER encode error: {0}")]
    Encode(String),

    /// Dotted OID text that does not parse.
    #[error("Invalid OID '{0}'")]
    InvalidOid(String),

    // ── Transport ───────────────────────────────────────────────────
    /// Socket-level failure.
    #[error("UDP transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the agent never answered.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the agent answered but rejected the request.
    pub fn is_agent_error(&self) -> bool {
        matches!(self, Self::ErrorStatus { .. })
    }
}
