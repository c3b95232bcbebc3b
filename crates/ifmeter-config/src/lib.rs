//! Configuration for the ifmeter collector.
//!
//! TOML file plus `IFMETER_` environment overrides, layered with
//! figment, and translation to the core runtime types
//! ([`CollectorConfig`], poll lock, export sink, recovery file).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ifmeter_core::{
    AutoChargeNewVlan, CollectorConfig, DirectoryExportSink, ExportFormat, ExportSink,
    FileLeaseLock, LocalPollLock, ManualCharging, NullExportSink, PollLock, RecoveryFile,
    SourceDefaults, VlanChargePolicy,
};
use ifmeter_snmp::Oid;

/// Prefix of environment overrides; nested keys are split on `__`
/// (e.g. `IFMETER_SNMP__COMMUNITY`).
pub const ENV_PREFIX: &str = "IFMETER_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub snmp: SnmpSettings,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub vlan: VlanSettings,
    #[serde(default)]
    pub persist: PersistSettings,
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub lock: LockSettings,
}

/// Defaults for sources added without explicit SNMP settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SnmpSettings {
    pub community: String,
    pub retries: u32,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SnmpSettings {
    fn default() -> Self {
        Self {
            community: "public".into(),
            retries: 3,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollSettings {
    /// Seconds between status polls of down sources.
    pub status_interval: u64,
    /// Seconds between counter polls of ready sources.
    pub counter_interval: u64,
    /// Start counter polls on wall-clock multiples of the interval.
    pub align: bool,
    /// Sources polled concurrently.
    pub workers: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            status_interval: 180,
            counter_interval: 300,
            align: true,
            workers: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VlanSettings {
    /// Vendor VLAN-id column OIDs, matched to sources by enterprise number.
    pub vendor_oids: Vec<String>,
    /// Start charging interfaces the first time they show up on a VLAN.
    pub auto_charge: bool,
}

impl Default for VlanSettings {
    fn default() -> Self {
        Self {
            vendor_oids: Vec::new(),
            auto_charge: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistSettings {
    /// Recovery file path, or `none` to keep state in memory only.
    pub file: String,
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            file: ifmeter_core::store::PERSIST_DISABLED.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Directory receiving charging/trace files; unset discards exports.
    pub dir: Option<PathBuf>,
    pub separator: String,
    pub timestamp_format: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        let format = ExportFormat::default();
        Self {
            dir: None,
            separator: format.separator.to_string(),
            timestamp_format: format.timestamp_format,
        }
    }
}

/// How cluster nodes agree on who polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    /// Single node; only excludes overlapping cycles in-process.
    #[default]
    Local,
    /// Lease files on a directory shared by all nodes.
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LockSettings {
    pub kind: LockKind,
    /// Shared lease directory (required for `file`).
    pub dir: Option<PathBuf>,
    /// Lease lifetime in seconds.
    pub ttl: u64,
    /// Milliseconds a cycle waits for the lock before skipping.
    pub wait_ms: u64,
    /// Lease holder name; defaults to `$HOSTNAME`.
    pub node_id: Option<String>,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            kind: LockKind::Local,
            dir: None,
            ttl: 600,
            wait_ms: 1_000,
            node_id: None,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "ifmeter", "ifmeter").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ifmeter");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// The layered figment: defaults, then the TOML file, then environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate the configuration. `path` overrides the platform
/// config location; a missing file just yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Validation and translation ──────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snmp.community.is_empty() {
            return Err(invalid("snmp.community", "must not be empty"));
        }
        if self.snmp.timeout_ms == 0 {
            return Err(invalid("snmp.timeout_ms", "must be greater than zero"));
        }
        if self.poll.workers == 0 {
            return Err(invalid("poll.workers", "must be at least 1"));
        }
        self.separator()?;
        if StrftimeItems::new(&self.export.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(invalid(
                "export.timestamp_format",
                format!("'{}' is not a valid strftime pattern", self.export.timestamp_format),
            ));
        }
        self.vendor_vlan_oids()?;
        if self.lock.kind == LockKind::File && self.lock.dir.is_none() {
            return Err(invalid("lock.dir", "required when lock.kind = \"file\""));
        }
        Ok(())
    }

    fn separator(&self) -> Result<char, ConfigError> {
        let mut chars = self.export.separator.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c != '\n' => Ok(c),
            _ => Err(invalid(
                "export.separator",
                format!("expected a single character, got '{}'", self.export.separator),
            )),
        }
    }

    pub fn vendor_vlan_oids(&self) -> Result<Vec<Oid>, ConfigError> {
        self.vlan
            .vendor_oids
            .iter()
            .map(|text| {
                text.parse::<Oid>()
                    .map_err(|e| invalid("vlan.vendor_oids", e.to_string()))
            })
            .collect()
    }

    pub fn source_defaults(&self) -> SourceDefaults {
        SourceDefaults {
            community: self.snmp.community.clone(),
            retries: self.snmp.retries,
            timeout: Duration::from_millis(self.snmp.timeout_ms),
        }
    }

    /// Runtime settings for the scheduler.
    pub fn collector_config(&self) -> Result<CollectorConfig, ConfigError> {
        Ok(CollectorConfig {
            defaults: self.source_defaults(),
            status_interval: Duration::from_secs(self.poll.status_interval),
            counter_interval: Duration::from_secs(self.poll.counter_interval),
            align_counter_poll: self.poll.align,
            poll_workers: self.poll.workers,
            lock_wait: Duration::from_millis(self.lock.wait_ms),
            export: ExportFormat {
                separator: self.separator()?,
                timestamp_format: self.export.timestamp_format.clone(),
            },
        })
    }

    pub fn recovery_file(&self) -> Option<RecoveryFile> {
        RecoveryFile::from_setting(&self.persist.file)
    }

    pub fn export_sink(&self) -> Arc<dyn ExportSink> {
        match &self.export.dir {
            Some(dir) => Arc::new(DirectoryExportSink::new(dir)),
            None => Arc::new(NullExportSink),
        }
    }

    pub fn vlan_policy(&self) -> Arc<dyn VlanChargePolicy> {
        if self.vlan.auto_charge {
            Arc::new(AutoChargeNewVlan)
        } else {
            Arc::new(ManualCharging)
        }
    }

    /// Lease holder name for this node.
    pub fn node_id(&self) -> String {
        self.lock
            .node_id
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("ifmeter-{}", std::process::id()))
    }

    pub fn poll_lock(&self) -> Result<Arc<dyn PollLock>, ConfigError> {
        match (self.lock.kind, &self.lock.dir) {
            (LockKind::Local, _) => Ok(Arc::new(LocalPollLock::new())),
            (LockKind::File, Some(dir)) => Ok(Arc::new(FileLeaseLock::new(
                dir,
                Duration::from_secs(self.lock.ttl),
                self.node_id(),
            ))),
            (LockKind::File, None) => Err(invalid("lock.dir", "required when lock.kind = \"file\"")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_collector_defaults() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        let collector = cfg.collector_config().unwrap();
        let expected = CollectorConfig::default();
        assert_eq!(collector.defaults, expected.defaults);
        assert_eq!(collector.status_interval, expected.status_interval);
        assert_eq!(collector.counter_interval, expected.counter_interval);
        assert_eq!(collector.poll_workers, 40);
        assert_eq!(collector.export, expected.export);
        assert!(cfg.recovery_file().is_none());
    }

    #[test]
    fn file_and_environment_are_layered() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ifmeter.toml",
                r#"
                [snmp]
                community = "metering"
                retries = 1

                [poll]
                workers = 8

                [vlan]
                vendor_oids = ["1.3.6.1.4.1.2636.3.40.1.5.1.7.1.5"]
                "#,
            )?;
            jail.set_env("IFMETER_POLL__WORKERS", "16");
            jail.set_env("IFMETER_PERSIST__FILE", "/var/lib/ifmeter/state.json");

            let cfg = load_config(Some(Path::new("ifmeter.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(cfg.snmp.community, "metering");
            assert_eq!(cfg.snmp.retries, 1);
            assert_eq!(cfg.snmp.timeout_ms, 5_000);
            assert_eq!(cfg.poll.workers, 16);
            assert_eq!(cfg.vendor_vlan_oids().map_err(|e| e.to_string())?.len(), 1);
            assert_eq!(
                cfg.recovery_file().map(|r| r.path().to_path_buf()),
                Some(PathBuf::from("/var/lib/ifmeter/state.json"))
            );
            Ok(())
        });
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.export.separator = ";;".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation { field, .. }) if field == "export.separator"));

        let mut cfg = Config::default();
        cfg.vlan.vendor_oids = vec!["1.3.x".into()];
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.lock.kind = LockKind::File;
        assert!(cfg.validate().is_err());
        assert!(cfg.poll_lock().is_err());

        let mut cfg = Config::default();
        cfg.export.timestamp_format = "%Y-%Q".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.lock.kind = LockKind::File;
        cfg.lock.dir = Some(dir.path().join("leases"));
        cfg.export.dir = Some(dir.path().join("export"));

        save_config(&cfg, &path).unwrap();
        let loaded: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .extract()
            .unwrap();
        assert_eq!(loaded, cfg);
    }
}
