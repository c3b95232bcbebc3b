// ── Core error types ──
//
// Errors surfaced synchronously to callers of the registry and
// persistence APIs. Poll-time failures never appear here: the poll
// engine folds them into `SourceStatus` instead of propagating them.

use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Registry errors ──────────────────────────────────────────────
    #[error("Invalid source address '{input}': expected an IPv4 or IPv6 literal")]
    InvalidAddress { input: String },

    #[error("Source {ip} already exists")]
    DuplicateSource { ip: IpAddr },

    #[error("Source {ip} not found")]
    SourceNotFound { ip: String },

    #[error("Interface '{descr}' not found on source {ip}")]
    InterfaceNotFound { ip: IpAddr, descr: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Persistence errors ───────────────────────────────────────────
    #[error("Recovery file {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Recovery file {path} is not usable: {message}")]
    RecoveryFormat { path: PathBuf, message: String },

    // ── Export errors ────────────────────────────────────────────────
    #[error("Export to {target} failed: {message}")]
    Export { target: String, message: String },

    // ── Transport errors (one-off queries only) ──────────────────────
    #[error("SNMP error: {0}")]
    Snmp(#[from] ifmeter_snmp::Error),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for lookups that found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. } | Self::InterfaceNotFound { .. }
        )
    }
}
