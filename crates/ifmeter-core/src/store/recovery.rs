// ── Recovery file ──
//
// JSON snapshot of the registry written at the end of counter cycles
// and on shutdown, read back at startup. Writes go to `<file>.tmp`,
// are fsynced, then renamed over the target so a crash mid-write
// leaves the previous snapshot intact.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use ifmeter_snmp::target::SNMP_PORT;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::registry::Registry;
use crate::error::CoreError;
use crate::model::{Counter, FlowDirection, Interface, Source, SourceStatus};

/// Current on-disk layout version.
pub const RECOVERY_VERSION: u32 = 1;

/// Setting value that disables persistence.
pub const PERSIST_DISABLED: &str = "none";

#[derive(Debug, Serialize, Deserialize)]
struct RecoveryDocument {
    version: u32,
    saved_at: DateTime<Utc>,
    sources: Vec<PersistedSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedSource {
    ip: IpAddr,
    community: String,
    retries: u32,
    timeout_ms: u64,
    #[serde(default = "default_port")]
    port: u16,
    status: SourceStatus,
    sys_uptime: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sys_descr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sys_object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sys_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sys_location: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    interfaces: Vec<PersistedInterface>,
}

fn default_port() -> u16 {
    SNMP_PORT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedInterface {
    descr: String,
    if_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    if_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    if_alias: Option<String>,
    admin_status: i32,
    oper_status: i32,
    in_octets: Counter,
    out_octets: Counter,
    chargeable: bool,
    trace: bool,
    #[serde(default = "default_polling")]
    polling: bool,
    #[serde(default)]
    direction: FlowDirection,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

fn default_polling() -> bool {
    true
}

impl From<&Source> for PersistedSource {
    fn from(source: &Source) -> Self {
        Self {
            ip: source.ip(),
            community: source.community().to_owned(),
            retries: source.retries(),
            timeout_ms: u64::try_from(source.timeout().as_millis()).unwrap_or(u64::MAX),
            port: source.port(),
            status: source.status,
            sys_uptime: source.sys_uptime,
            sys_descr: source.sys_descr.clone(),
            sys_object_id: source.sys_object_id.clone(),
            sys_name: source.sys_name.clone(),
            sys_location: source.sys_location.clone(),
            tags: source.tags.clone(),
            interfaces: source.interfaces().map(PersistedInterface::from).collect(),
        }
    }
}

impl From<&Interface> for PersistedInterface {
    fn from(iface: &Interface) -> Self {
        Self {
            descr: iface.descr().to_owned(),
            if_index: iface.if_index,
            if_name: iface.if_name.clone(),
            if_alias: iface.if_alias.clone(),
            admin_status: iface.admin_status(),
            oper_status: iface.oper_status(),
            in_octets: iface.in_octets(),
            out_octets: iface.out_octets(),
            chargeable: iface.chargeable,
            trace: iface.trace(),
            polling: iface.polling(),
            direction: iface.direction,
            tags: iface.tags.clone(),
        }
    }
}

impl PersistedSource {
    /// Rebuild the live source; the first counter poll after a restart
    /// only re-baselines.
    fn into_source(self) -> Source {
        let mut source = Source::new(
            self.ip,
            self.community,
            self.retries,
            Duration::from_millis(self.timeout_ms),
        );
        if self.port != SNMP_PORT {
            source.set_port(self.port);
        }
        source.status = self.status;
        source.sys_uptime = self.sys_uptime;
        source.sys_descr = self.sys_descr;
        source.sys_object_id = self.sys_object_id;
        source.sys_name = self.sys_name;
        source.sys_location = self.sys_location;
        source.tags = self.tags;
        source.skip_delta = true;

        for p in self.interfaces {
            let iface = source.interface_mut(&p.descr);
            iface.if_index = p.if_index;
            iface.if_name = p.if_name;
            iface.if_alias = p.if_alias;
            iface.set_admin_status(p.admin_status);
            iface.set_oper_status(p.oper_status);
            iface.set_in_octets(p.in_octets);
            iface.set_out_octets(p.out_octets);
            iface.chargeable = p.chargeable;
            iface.set_trace(p.trace);
            iface.set_polling(p.polling);
            iface.direction = p.direction;
            iface.tags = p.tags;
        }
        source
    }
}

/// Location of the registry snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryFile {
    path: PathBuf,
}

impl RecoveryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `None` for an empty setting or the literal `none`.
    pub fn from_setting(setting: &str) -> Option<Self> {
        let setting = setting.trim();
        if setting.is_empty() || setting.eq_ignore_ascii_case(PERSIST_DISABLED) {
            None
        } else {
            Some(Self::new(setting))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time of the file; `None` when it does not exist.
    pub async fn modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
            .ok()
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Snapshot `registry` atomically. Returns the number of sources
    /// written; an empty registry leaves the existing file untouched.
    pub async fn save(&self, registry: &Registry) -> Result<usize, CoreError> {
        let mut sources = Vec::with_capacity(registry.len());
        for handle in registry.all() {
            sources.push(PersistedSource::from(&*handle.read().await));
        }
        if sources.is_empty() {
            debug!(path = %self.path.display(), "registry empty, snapshot skipped");
            return Ok(0);
        }

        let count = sources.len();
        let doc = RecoveryDocument {
            version: RECOVERY_VERSION,
            saved_at: Utc::now(),
            sources,
        };
        let body = serde_json::to_vec_pretty(&doc).map_err(|e| CoreError::RecoveryFormat {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        self.write_atomic(&body).await?;
        info!(path = %self.path.display(), sources = count, "recovery state saved");
        Ok(count)
    }

    async fn write_atomic(&self, body: &[u8]) -> Result<(), CoreError> {
        let tmp = self.tmp_path();
        let io_err = |source: std::io::Error| CoreError::Persistence {
            path: self.path.clone(),
            source,
        };

        match tokio::fs::remove_file(&tmp).await {
            Ok(()) => warn!(path = %tmp.display(), "stale temporary snapshot removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }

        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
        file.write_all(body).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)
    }

    /// Read the snapshot back into fresh sources.
    ///
    /// A missing file yields an empty list.
    pub async fn load(&self) -> Result<Vec<Source>, CoreError> {
        let body = match tokio::fs::read(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no recovery state found");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(CoreError::Persistence {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let doc: RecoveryDocument =
            serde_json::from_slice(&body).map_err(|e| CoreError::RecoveryFormat {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        if doc.version != RECOVERY_VERSION {
            return Err(CoreError::RecoveryFormat {
                path: self.path.clone(),
                message: format!("unsupported version {}", doc.version),
            });
        }
        Ok(doc
            .sources
            .into_iter()
            .map(PersistedSource::into_source)
            .collect())
    }

    /// Load the snapshot into `registry`, logging instead of failing.
    ///
    /// Sources already present in the registry are kept as they are.
    /// Returns the number of sources restored.
    pub async fn restore(&self, registry: &Registry) -> usize {
        let sources = match self.load().await {
            Ok(sources) => sources,
            Err(e) => {
                error!(error = %e, "recovery state unusable, starting with an empty registry");
                return 0;
            }
        };

        let mut restored = 0;
        for source in sources {
            let ip = source.ip();
            match registry.insert(source) {
                Ok(_) => restored += 1,
                Err(e) => warn!(source = %ip, error = %e, "recovered source skipped"),
            }
        }
        info!(path = %self.path.display(), restored, "recovery state loaded");
        restored
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::registry::NewSource;

    async fn populated() -> Registry {
        let reg = Registry::default();
        let handle = reg
            .add(
                "10.0.0.1",
                NewSource {
                    community: Some("private".into()),
                    port: Some(1161),
                    tags: BTreeMap::from([("VLAN_OID".into(), "1.3.6.1.4.1.9.9.68.1.2.2.1.2".into())]),
                    ..NewSource::default()
                },
            )
            .unwrap();
        {
            let mut source = handle.write().await;
            source.status = SourceStatus::Success;
            source.sys_uptime = 123_456;
            source.sys_name = Some("core-1".into());
            source.poll_duration = 30_000;
            let eth0 = source.interface_mut("eth0");
            eth0.if_index = 2;
            eth0.set_admin_status(1);
            eth0.set_oper_status(1);
            eth0.set_in_octets(Counter::bits64(9_000_000_000));
            eth0.set_out_octets(Counter::bits32(42));
            eth0.set_poll_in_octets(77);
            eth0.chargeable = true;
            eth0.set_trace(true);
            eth0.direction = FlowDirection::Egress;
            eth0.marked = true;
            eth0.tags.insert("circuit".into(), "C-1".into());
        }
        reg.add("2001:db8::1", NewSource::default()).unwrap();
        reg
    }

    fn persisted(reg: &Registry) -> Vec<PersistedSource> {
        reg.all()
            .iter()
            .map(|h| PersistedSource::from(&*h.try_read().unwrap()))
            .collect()
    }

    #[tokio::test]
    async fn round_trip_preserves_persisted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let file = RecoveryFile::new(dir.path().join("sources.json"));
        let original = populated().await;

        assert_eq!(file.save(&original).await.unwrap(), 2);
        let restored = Registry::default();
        assert_eq!(file.restore(&restored).await, 2);

        assert_eq!(persisted(&restored), persisted(&original));

        let handle = restored.get("10.0.0.1").unwrap();
        let source = handle.read().await;
        assert!(source.skip_delta);
        assert_eq!(source.port(), 1161);
        assert_eq!(source.poll_duration, 0);
        let eth0 = source.interface("eth0").unwrap();
        assert_eq!(eth0.poll_in_octets(), 0);
        assert!(!eth0.marked);
    }

    #[tokio::test]
    async fn empty_registry_does_not_overwrite_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let file = RecoveryFile::new(dir.path().join("sources.json"));
        file.save(&populated().await).await.unwrap();

        assert_eq!(file.save(&Registry::default()).await.unwrap(), 0);
        assert_eq!(file.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stale_temp_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let file = RecoveryFile::new(dir.path().join("sources.json"));
        std::fs::write(file.tmp_path(), b"half-written").unwrap();

        file.save(&populated().await).await.unwrap();
        assert!(!file.tmp_path().exists());
        assert_eq!(file.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = RecoveryFile::new(dir.path().join("absent.json"));
        assert!(file.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(&path, b"{not json").unwrap();
        let file = RecoveryFile::new(path);

        assert!(matches!(
            file.load().await.unwrap_err(),
            CoreError::RecoveryFormat { .. }
        ));
        let reg = Registry::default();
        assert_eq!(file.restore(&reg).await, 0);
        assert!(reg.is_empty());
    }

    #[test]
    fn none_setting_disables_persistence() {
        assert!(RecoveryFile::from_setting("none").is_none());
        assert!(RecoveryFile::from_setting(" NONE ").is_none());
        assert!(RecoveryFile::from_setting("").is_none());
        assert_eq!(
            RecoveryFile::from_setting("/var/lib/ifmeter/sources.json")
                .map(|f| f.path().to_path_buf()),
            Some(PathBuf::from("/var/lib/ifmeter/sources.json"))
        );
    }
}
