// ── Source registry ──
//
// Concurrent map of IP -> source. Each source sits behind its own
// async RwLock so a poll batch writes disjoint sources in parallel
// while readers see either the pre- or post-poll state of a source,
// never a mix. Map guards are never held across an `.await`: every
// query clones the handles first, then locks them one by one.

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::summary::{InterfaceFilter, InterfaceStats, InterfaceSummary, SourceSummary};
use crate::config::SourceDefaults;
use crate::error::CoreError;
use crate::model::{FlowDirection, Source, SourceStatus};

/// Shared, lockable handle to one source.
pub type SourceHandle = Arc<RwLock<Source>>;

/// Settings for a new source; unset fields fall back to the defaults.
#[derive(Debug, Clone, Default)]
pub struct NewSource {
    pub community: Option<String>,
    pub retries: Option<u32>,
    pub timeout: Option<Duration>,
    pub port: Option<u16>,
    pub tags: BTreeMap<String, String>,
}

/// Partial update of a source's SNMP settings and tags.
#[derive(Debug, Clone, Default)]
pub struct SourceUpdate {
    pub community: Option<String>,
    pub retries: Option<u32>,
    pub timeout: Option<Duration>,
    /// Tags to insert or overwrite.
    pub tags: BTreeMap<String, String>,
    /// Tag keys to delete.
    pub remove_tags: Vec<String>,
}

/// Partial update applied to one or many interfaces.
#[derive(Debug, Clone, Default)]
pub struct InterfaceUpdate {
    pub chargeable: Option<bool>,
    pub trace: Option<bool>,
    pub polling: Option<bool>,
    pub direction: Option<FlowDirection>,
    pub tags: BTreeMap<String, String>,
}

impl InterfaceUpdate {
    fn is_empty(&self) -> bool {
        self.chargeable.is_none()
            && self.trace.is_none()
            && self.polling.is_none()
            && self.direction.is_none()
            && self.tags.is_empty()
    }
}

/// Which interfaces an [`InterfaceUpdate`] targets.
#[derive(Debug, Clone)]
pub enum InterfaceSelection {
    /// A single descriptor; unknown descriptors are an error.
    One(String),
    /// A batch; unknown descriptors are skipped.
    Many(Vec<String>),
    /// Every interface of the source.
    All,
}

/// What [`Registry::merge_snapshot`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotMerge {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
}

impl SnapshotMerge {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.updated == 0
    }
}

/// The process-wide source map, owned by whoever constructs it.
#[derive(Debug)]
pub struct Registry {
    sources: DashMap<IpAddr, SourceHandle>,
    defaults: SourceDefaults,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(SourceDefaults::default())
    }
}

impl Registry {
    pub fn new(defaults: SourceDefaults) -> Self {
        Self {
            sources: DashMap::new(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &SourceDefaults {
        &self.defaults
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    // ── Structural changes ───────────────────────────────────────────

    /// Register a new source. Fails on a malformed IP or a duplicate.
    pub fn add(&self, ip: &str, new: NewSource) -> Result<SourceHandle, CoreError> {
        let ip = parse_ip(ip)?;
        let community = new
            .community
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.defaults.community.clone());
        let retries = new.retries.unwrap_or(self.defaults.retries);
        let timeout = new.timeout.unwrap_or(self.defaults.timeout);
        if timeout.is_zero() {
            return Err(CoreError::ValidationFailed {
                message: "timeout must be greater than zero".into(),
            });
        }

        let mut source = Source::new(ip, community, retries, timeout);
        if let Some(port) = new.port {
            source.set_port(port);
        }
        source.tags = new.tags;
        let handle = self.insert(source)?;
        info!(source = %ip, "source added");
        Ok(handle)
    }

    /// Insert a fully built source (recovery path).
    pub fn insert(&self, source: Source) -> Result<SourceHandle, CoreError> {
        let ip = source.ip();
        match self.sources.entry(ip) {
            Entry::Occupied(_) => Err(CoreError::DuplicateSource { ip }),
            Entry::Vacant(slot) => {
                let handle = Arc::new(RwLock::new(source));
                slot.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    pub fn remove(&self, ip: &str) -> Result<SourceHandle, CoreError> {
        let addr = parse_ip(ip)?;
        let (_, handle) = self
            .sources
            .remove(&addr)
            .ok_or_else(|| CoreError::SourceNotFound { ip: ip.to_owned() })?;
        info!(source = %addr, "source removed");
        Ok(handle)
    }

    /// Apply a partial update to one source's SNMP settings and tags.
    pub async fn update(&self, ip: &str, update: SourceUpdate) -> Result<(), CoreError> {
        if update.timeout.is_some_and(|t| t.is_zero()) {
            return Err(CoreError::ValidationFailed {
                message: "timeout must be greater than zero".into(),
            });
        }
        if update.community.as_deref().is_some_and(str::is_empty) {
            return Err(CoreError::ValidationFailed {
                message: "community must not be empty".into(),
            });
        }

        let handle = self.get(ip)?;
        let mut source = handle.write().await;
        if let Some(community) = update.community {
            source.set_community(community);
        }
        if let Some(retries) = update.retries {
            source.set_retries(retries);
        }
        if let Some(timeout) = update.timeout {
            source.set_timeout(timeout);
        }
        for key in &update.remove_tags {
            source.tags.remove(key);
        }
        source.tags.extend(update.tags);
        debug!(source = %source.ip(), "source updated");
        Ok(())
    }

    /// Update flags on the selected interfaces; returns how many changed.
    pub async fn update_interfaces(
        &self,
        ip: &str,
        selection: InterfaceSelection,
        update: InterfaceUpdate,
    ) -> Result<usize, CoreError> {
        if update.is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "no interface field to update".into(),
            });
        }

        let handle = self.get(ip)?;
        let mut source = handle.write().await;
        let source_ip = source.ip();

        let descrs: Vec<String> = match selection {
            InterfaceSelection::One(descr) => {
                if source.interface(&descr).is_none() {
                    return Err(CoreError::InterfaceNotFound {
                        ip: source_ip,
                        descr,
                    });
                }
                vec![descr]
            }
            InterfaceSelection::Many(descrs) => descrs,
            InterfaceSelection::All => source.interfaces().map(|i| i.descr().to_owned()).collect(),
        };

        let mut updated = 0;
        for descr in &descrs {
            let Some(iface) = source.existing_interface_mut(descr) else {
                debug!(source = %source_ip, if_descr = %descr, "unknown interface skipped");
                continue;
            };
            if let Some(chargeable) = update.chargeable {
                iface.chargeable = chargeable;
            }
            if let Some(trace) = update.trace {
                iface.set_trace(trace);
            }
            // After trace: disabling polling wins over enabling trace.
            if let Some(polling) = update.polling {
                iface.set_polling(polling);
            }
            if let Some(direction) = update.direction {
                iface.direction = direction;
            }
            iface
                .tags
                .extend(update.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            updated += 1;
        }
        info!(source = %source_ip, updated, requested = descrs.len(), "interfaces updated");
        Ok(updated)
    }

    /// Follow a snapshot edited by another process: listed sources that
    /// are missing get added, unlisted ones removed, and the rest take
    /// the snapshot's settings, tags and interface flags. Poll state of
    /// sources already present is kept.
    pub async fn merge_snapshot(&self, snapshot: Vec<Source>) -> SnapshotMerge {
        let mut merge = SnapshotMerge::default();
        let listed: HashSet<IpAddr> = snapshot.iter().map(Source::ip).collect();

        let live: Vec<IpAddr> = self.sources.iter().map(|entry| *entry.key()).collect();
        for ip in live {
            if !listed.contains(&ip) && self.sources.remove(&ip).is_some() {
                info!(source = %ip, "source removed from snapshot");
                merge.removed += 1;
            }
        }

        for edited in snapshot {
            let ip = edited.ip();
            if let Some(handle) = self.lookup(ip) {
                if handle.write().await.adopt_settings(&edited) {
                    debug!(source = %ip, "source settings taken from snapshot");
                    merge.updated += 1;
                }
                continue;
            }
            match self.insert(edited) {
                Ok(_) => {
                    info!(source = %ip, "source added from snapshot");
                    merge.added += 1;
                }
                Err(e) => warn!(source = %ip, error = %e, "snapshot source skipped"),
            }
        }
        merge
    }

    /// Bulk-add sources from `ip<delimiter>community` lines.
    ///
    /// Blank lines and `#` comments are ignored; malformed or duplicate
    /// lines are logged and skipped. Returns the number of sources added.
    pub fn import(&self, text: &str, delimiter: &str) -> usize {
        let mut added = 0;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (ip, community) = match line.split_once(delimiter) {
                Some((ip, community)) => (ip.trim(), Some(community.trim().to_owned())),
                None => (line, None),
            };
            let new = NewSource {
                community,
                ..NewSource::default()
            };
            match self.add(ip, new) {
                Ok(_) => added += 1,
                Err(CoreError::DuplicateSource { ip }) => {
                    warn!(line = lineno + 1, source = %ip, "duplicate source skipped");
                }
                Err(e) => warn!(line = lineno + 1, error = %e, "source line skipped"),
            }
        }
        added
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn get(&self, ip: &str) -> Result<SourceHandle, CoreError> {
        let addr = parse_ip(ip)?;
        self.lookup(addr)
            .ok_or_else(|| CoreError::SourceNotFound { ip: ip.to_owned() })
    }

    pub fn lookup(&self, ip: IpAddr) -> Option<SourceHandle> {
        self.sources.get(&ip).map(|r| Arc::clone(r.value()))
    }

    /// Every handle, ordered by IP.
    pub fn all(&self) -> Vec<SourceHandle> {
        let mut entries: Vec<(IpAddr, SourceHandle)> = self
            .sources
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();
        entries.sort_by_key(|(ip, _)| *ip);
        entries.into_iter().map(|(_, handle)| handle).collect()
    }

    // ── Classification ───────────────────────────────────────────────

    /// Sources whose last poll succeeded.
    pub async fn ready(&self) -> Vec<SourceHandle> {
        self.filter_status(SourceStatus::is_up).await
    }

    /// Sources needing a status poll (every status but `Success`).
    pub async fn down(&self) -> Vec<SourceHandle> {
        self.filter_status(SourceStatus::is_down).await
    }

    pub async fn by_status(&self, status: SourceStatus) -> Vec<SourceHandle> {
        self.filter_status(|s| s == status).await
    }

    async fn filter_status(&self, keep: impl Fn(SourceStatus) -> bool) -> Vec<SourceHandle> {
        let mut out = Vec::new();
        for handle in self.all() {
            if keep(handle.read().await.status) {
                out.push(handle);
            }
        }
        out
    }

    // ── Projections ──────────────────────────────────────────────────

    pub async fn summaries(&self, status: Option<SourceStatus>) -> Vec<SourceSummary> {
        let mut out = Vec::new();
        for handle in self.all() {
            let source = handle.read().await;
            if status.is_none_or(|s| s == source.status) {
                out.push(SourceSummary::from(&*source));
            }
        }
        out
    }

    pub async fn summary(&self, ip: &str) -> Result<SourceSummary, CoreError> {
        let handle = self.get(ip)?;
        let source = handle.read().await;
        Ok(SourceSummary::from(&*source))
    }

    pub async fn source_interfaces(
        &self,
        ip: &str,
        filter: &InterfaceFilter,
    ) -> Result<Vec<InterfaceSummary>, CoreError> {
        let handle = self.get(ip)?;
        let source = handle.read().await;
        Ok(source
            .interfaces()
            .filter(|i| filter.matches(i))
            .map(|i| InterfaceSummary::new(&source, i))
            .collect())
    }

    /// Interfaces of every source, ordered by source IP then descriptor.
    pub async fn interfaces(&self, filter: &InterfaceFilter) -> Vec<InterfaceSummary> {
        let mut out = Vec::new();
        for handle in self.all() {
            let source = handle.read().await;
            out.extend(
                source
                    .interfaces()
                    .filter(|i| filter.matches(i))
                    .map(|i| InterfaceSummary::new(&source, i)),
            );
        }
        out
    }

    pub async fn interface_stats(&self) -> InterfaceStats {
        let mut stats = InterfaceStats::default();
        for handle in self.all() {
            let source = handle.read().await;
            for iface in source.interfaces() {
                stats.interfaces += 1;
                stats.chargeable += usize::from(iface.chargeable);
                stats.trace += usize::from(iface.trace());
            }
        }
        stats
    }

    /// Source counts grouped by status.
    pub async fn stats(&self) -> BTreeMap<SourceStatus, usize> {
        let mut stats = BTreeMap::new();
        for handle in self.all() {
            *stats.entry(handle.read().await.status).or_insert(0) += 1;
        }
        stats
    }
}

/// Parse an IPv4 or IPv6 literal.
pub fn parse_ip(input: &str) -> Result<IpAddr, CoreError> {
    input
        .trim()
        .parse()
        .map_err(|_| CoreError::InvalidAddress {
            input: input.to_owned(),
        })
}
