//! Collector wiring shared by every command: registry restored from the
//! recovery file, plus the SNMP client, poller and scheduler built from
//! the loaded configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ifmeter_config::Config;
use ifmeter_core::{MetricsSink, Poller, RecoveryFile, Registry, Scheduler};
use ifmeter_snmp::SnmpClient;
use tracing::debug;

use crate::error::CliError;

pub struct State {
    config: Config,
    config_path: PathBuf,
    registry: Arc<Registry>,
    recovery: Option<RecoveryFile>,
}

impl State {
    /// Build a registry with the configured defaults and load the
    /// recovery file into it. Unlike the collector's own restore, a
    /// broken file is an error here.
    pub async fn load(config: Config, config_path: PathBuf) -> Result<Self, CliError> {
        let registry = Arc::new(Registry::new(config.source_defaults()));
        let recovery = config.recovery_file();
        if let Some(file) = &recovery {
            for source in file.load().await? {
                registry.insert(source)?;
            }
            debug!(path = %file.path().display(), sources = registry.len(), "state loaded");
        }
        Ok(Self {
            config,
            config_path,
            registry,
            recovery,
        })
    }

    /// Like [`State::load`], but an unusable recovery file is logged and
    /// the collector starts with an empty registry.
    pub async fn restore(config: Config, config_path: PathBuf) -> Self {
        let registry = Arc::new(Registry::new(config.source_defaults()));
        let recovery = config.recovery_file();
        if let Some(file) = &recovery {
            file.restore(&registry).await;
        }
        Self {
            config,
            config_path,
            registry,
            recovery,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Fail early for commands whose changes would otherwise be lost.
    pub fn require_recovery(&self) -> Result<&RecoveryFile, CliError> {
        self.recovery.as_ref().ok_or_else(|| CliError::NoStateFile {
            path: self.config_path.display().to_string(),
        })
    }

    /// Write the registry back. An empty registry deletes the file,
    /// since the snapshot writer never writes an empty one.
    pub async fn save(&self) -> Result<(), CliError> {
        let file = self.require_recovery()?;
        if self.registry.is_empty() {
            return remove_if_present(file.path()).await;
        }
        file.save(&self.registry).await?;
        Ok(())
    }

    /// Poller over UDP with the configured VLAN handling.
    fn poller(&self, metrics: Arc<dyn MetricsSink>) -> Result<Poller, CliError> {
        Ok(Poller::new(Arc::new(SnmpClient::new()), metrics)
            .with_vendor_vlan_oids(self.config.vendor_vlan_oids()?)
            .with_vlan_policy(self.config.vlan_policy()))
    }

    /// Scheduler wired to the configured lock, export sink and recovery file.
    pub fn scheduler(&self, metrics: Arc<dyn MetricsSink>) -> Result<Scheduler, CliError> {
        let poller = self.poller(metrics)?;
        Ok(Scheduler::builder(Arc::clone(&self.registry), poller)
            .config(self.config.collector_config()?)
            .lock(self.config.poll_lock()?)
            .export_sink(self.config.export_sink())
            .recovery(self.recovery.clone())
            .build())
    }
}

async fn remove_if_present(path: &Path) -> Result<(), CliError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "registry empty, state file removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CliError::Io(e)),
    }
}
