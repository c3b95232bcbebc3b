//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and process exit codes.

use miette::Diagnostic;
use thiserror::Error;

use ifmeter_config::ConfigError;
use ifmeter_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const STATE: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(ifmeter::not_found),
        help("Run: ifmeter {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(ifmeter::conflict))]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ifmeter::validation))]
    Validation { field: String, reason: String },

    // ── State ────────────────────────────────────────────────────────
    #[error("No state file configured")]
    #[diagnostic(
        code(ifmeter::no_state_file),
        help(
            "Source changes are kept in the recovery file.\n\
             Set persist.file in {path} or IFMETER_PERSIST__FILE."
        )
    )]
    NoStateFile { path: String },

    #[error("State file error: {message}")]
    #[diagnostic(
        code(ifmeter::state),
        help("Check permissions and contents of the persist.file location.")
    )]
    State { message: String },

    #[error("Export failed: {message}")]
    #[diagnostic(code(ifmeter::export))]
    Export { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Config file already exists at {path}")]
    #[diagnostic(
        code(ifmeter::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(ifmeter::config))]
    Config(Box<figment::Error>),

    #[error("Cannot write config: {0}")]
    #[diagnostic(code(ifmeter::config))]
    ConfigWrite(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(ifmeter::internal))]
    Internal(String),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } | Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            Self::NoStateFile { .. } | Self::State { .. } => exit_code::STATE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidAddress { input } => CliError::Validation {
                field: "ip".into(),
                reason: format!("'{input}' is not an IPv4 or IPv6 address"),
            },

            CoreError::DuplicateSource { ip } => CliError::Conflict {
                resource_type: "source".into(),
                identifier: ip.to_string(),
            },

            CoreError::SourceNotFound { ip } => CliError::NotFound {
                resource_type: "source".into(),
                identifier: ip,
                list_command: "sources list".into(),
            },

            CoreError::InterfaceNotFound { ip, descr } => CliError::NotFound {
                resource_type: "interface".into(),
                identifier: descr,
                list_command: format!("sources interfaces {ip}"),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            err @ (CoreError::Persistence { .. } | CoreError::RecoveryFormat { .. }) => {
                CliError::State {
                    message: err.to_string(),
                }
            }

            CoreError::Export { target, message } => CliError::Export {
                message: format!("{target}: {message}"),
            },

            CoreError::Snmp(e) => CliError::Internal(e.to_string()),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Serialization(e) => CliError::ConfigWrite(e.to_string()),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let dup: CliError = CoreError::DuplicateSource {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
        .into();
        assert_eq!(dup.exit_code(), exit_code::CONFLICT);

        let missing: CliError = CoreError::SourceNotFound {
            ip: "10.0.0.9".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let bad: CliError = CoreError::InvalidAddress {
            input: "nope".into(),
        }
        .into();
        assert_eq!(bad.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn config_validation_keeps_field() {
        let err: CliError = ConfigError::Validation {
            field: "poll.workers".into(),
            reason: "must be at least 1".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
        assert!(err.to_string().contains("poll.workers"));
    }
}
