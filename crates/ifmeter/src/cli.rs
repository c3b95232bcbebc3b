//! Clap derive structures for the `ifmeter` CLI.
//!
//! Defines the command tree, global flags, and shared argument types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ifmeter -- SNMP interface usage metering
#[derive(Debug, Parser)]
#[command(
    name = "ifmeter",
    version,
    about = "Meter interface traffic on SNMP devices",
    long_about = "Polls interface octet counters from SNMPv2c agents, reconciles them\n\
        into per-interval usage and exports charging and trace records.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "IFMETER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "IFMETER_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the collector until interrupted
    Run(RunArgs),

    /// Run a single poll cycle now
    Poll(PollArgs),

    /// Manage polled sources
    #[command(alias = "src", alias = "s")]
    Sources(SourcesArgs),

    /// List or update interfaces across sources
    #[command(alias = "if", alias = "i")]
    Interfaces(InterfacesArgs),

    /// Render charging or trace records
    Export(ExportArgs),

    /// Source and interface counts
    Stats(StatsArgs),

    /// Show or create the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run / Poll ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Run one status and one counter cycle, then exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Args)]
pub struct PollArgs {
    #[command(subcommand)]
    pub command: PollCommand,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum PollCommand {
    /// Status poll of every down source
    Status,
    /// Counter poll of every ready source (exports and persists)
    Counters,
}

// ── Sources ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SourcesArgs {
    #[command(subcommand)]
    pub command: SourcesCommand,
}

#[derive(Debug, Subcommand)]
pub enum SourcesCommand {
    /// List sources
    #[command(alias = "ls")]
    List {
        /// Only sources with this status (e.g. success, timeout, no_pdu)
        #[arg(long, short = 's')]
        status: Option<String>,
    },

    /// Show one source
    #[command(alias = "get")]
    Show {
        /// Source IP address
        ip: String,
    },

    /// Register a new source
    Add {
        /// Source IP address
        ip: String,

        #[command(flatten)]
        snmp: SnmpOverrides,

        /// Agent UDP port
        #[arg(long)]
        port: Option<u16>,

        /// Tag as KEY=VALUE (repeatable)
        #[arg(long = "tag", short = 't', value_parser = parse_key_val)]
        tags: Vec<(String, String)>,
    },

    /// Remove a source
    #[command(alias = "rm")]
    Remove {
        /// Source IP address
        ip: String,
    },

    /// Change SNMP settings or tags of a source
    Update {
        /// Source IP address
        ip: String,

        #[command(flatten)]
        snmp: SnmpOverrides,

        /// Tag as KEY=VALUE (repeatable)
        #[arg(long = "tag", short = 't', value_parser = parse_key_val)]
        tags: Vec<(String, String)>,

        /// Tag key to remove (repeatable)
        #[arg(long = "untag")]
        remove_tags: Vec<String>,
    },

    /// Bulk-add sources from `ip<delimiter>community` lines
    Import {
        /// File to read ("-" for stdin)
        file: PathBuf,

        /// Field delimiter between IP and community
        #[arg(long, short = 'd', default_value = ",")]
        delimiter: String,
    },

    /// List the interfaces of one source
    Interfaces {
        /// Source IP address
        ip: String,

        #[command(flatten)]
        filter: InterfaceFilterArgs,
    },
}

#[derive(Debug, Args)]
pub struct SnmpOverrides {
    /// SNMP community
    #[arg(long)]
    pub community: Option<String>,

    /// Retries after the first attempt
    #[arg(long)]
    pub retries: Option<u32>,

    /// Per-attempt timeout (e.g. 500ms, 5s)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

// ── Interfaces ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct InterfacesArgs {
    #[command(subcommand)]
    pub command: InterfacesCommand,
}

#[derive(Debug, Subcommand)]
pub enum InterfacesCommand {
    /// List interfaces of every source
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        filter: InterfaceFilterArgs,
    },

    /// Change charging, trace or polling flags
    Update {
        /// Source IP address
        ip: String,

        /// Interface descriptor (repeatable; omit with --all)
        #[arg(long = "descr", short = 'd', required_unless_present = "all")]
        descrs: Vec<String>,

        /// Apply to every interface of the source
        #[arg(long, conflicts_with = "descrs")]
        all: bool,

        /// Include in charging export
        #[arg(long)]
        chargeable: Option<bool>,

        /// Include in trace export
        #[arg(long)]
        trace: Option<bool>,

        /// Keep polling counters (false also disables trace)
        #[arg(long)]
        polling: Option<bool>,

        /// Exported direction (ingress, egress)
        #[arg(long)]
        direction: Option<String>,

        /// Tag as KEY=VALUE (repeatable)
        #[arg(long = "tag", short = 't', value_parser = parse_key_val)]
        tags: Vec<(String, String)>,
    },
}

#[derive(Debug, Args)]
pub struct InterfaceFilterArgs {
    /// Only interfaces with this chargeable flag
    #[arg(long)]
    pub chargeable: Option<bool>,

    /// Only interfaces with this trace flag
    #[arg(long)]
    pub trace: Option<bool>,

    /// Only interfaces that are up (true) or down (false)
    #[arg(long)]
    pub up: Option<bool>,
}

// ── Export / Stats ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(subcommand)]
    pub command: ExportCommand,

    /// Write through the configured export sink instead of stdout
    #[arg(long, global = true)]
    pub deliver: bool,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ExportCommand {
    /// Per-interval usage of billable interfaces
    Charging,
    /// Raw counters of traced interfaces
    Trace,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Interface totals instead of per-status source counts
    #[arg(long)]
    pub interfaces: bool,
}

// ── Config / Completions ─────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// ── Value parsers ────────────────────────────────────────────────────

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_val_requires_equals_and_key() {
        assert_eq!(
            parse_key_val("site=ams1").unwrap(),
            ("site".into(), "ams1".into())
        );
        assert_eq!(parse_key_val("note=").unwrap(), ("note".into(), String::new()));
        assert!(parse_key_val("site").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn interface_update_needs_descr_or_all() {
        let err = Cli::try_parse_from(["ifmeter", "interfaces", "update", "10.0.0.1"]);
        assert!(err.is_err());
        let cli = Cli::try_parse_from([
            "ifmeter", "interfaces", "update", "10.0.0.1", "--all", "--chargeable", "true",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Interfaces(InterfacesArgs {
                command: InterfacesCommand::Update { all: true, chargeable: Some(true), .. }
            })
        ));
    }
}
