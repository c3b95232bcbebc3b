// ── Poll lock ──
//
// Cluster-wide "who polls" gate. A node that fails to acquire the lock
// for a cycle simply skips it: that is the steady state on standby
// nodes, not an error.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lock name guarding the status poll.
pub const STATUS_POLL_LOCK: &str = "ifmeter.poll.status";
/// Lock name guarding the counter poll.
pub const COUNTER_POLL_LOCK: &str = "ifmeter.poll.counters";

/// Named mutual-exclusion capability backed by whatever coordination
/// the deployment has.
#[async_trait]
pub trait PollLock: Send + Sync {
    /// Try to take `name`, waiting at most `wait`.
    async fn try_acquire(&self, name: &str, wait: Duration) -> bool;

    /// Give `name` back. Releasing a lock not held is a no-op.
    async fn release(&self, name: &str);
}

// ── In-process lock ─────────────────────────────────────────────────

/// Single-node lock: excludes overlapping cycles within this process.
#[derive(Debug, Default)]
pub struct LocalPollLock {
    held: DashSet<String>,
    released: Notify,
}

impl LocalPollLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PollLock for LocalPollLock {
    async fn try_acquire(&self, name: &str, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            // Registered before the check so a release in between is not lost.
            let released = self.released.notified();
            if self.held.insert(name.to_owned()) {
                return true;
            }
            if tokio::time::timeout_at(deadline, released).await.is_err() {
                return self.held.insert(name.to_owned());
            }
        }
    }

    async fn release(&self, name: &str) {
        if self.held.remove(name).is_some() {
            self.released.notify_waiters();
        }
    }
}

// ── Lease-file lock ─────────────────────────────────────────────────

/// How often a waiting node re-checks a held lease.
const LEASE_RETRY: Duration = Duration::from_millis(200);

/// Lease files on a directory shared by every node.
///
/// A lease is written to a private file first and published with a hard
/// link, so the lease file never exists half written. Expired leases
/// are moved aside under a per-holder name before the next link, so a
/// crashed holder blocks polling for at most `ttl`. A lease that cannot
/// be parsed counts as held until its mtime is `ttl` old. Re-acquiring
/// a lease already held by this node renews it.
#[derive(Debug, Clone)]
pub struct FileLeaseLock {
    dir: PathBuf,
    ttl: Duration,
    holder: String,
}

#[derive(Debug, PartialEq, Eq)]
struct Lease {
    holder: String,
    expires_ms: i64,
}

impl Lease {
    fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        let holder = lines.next()?.trim().to_owned();
        let expires_ms = lines.next()?.trim().parse().ok()?;
        Some(Self { holder, expires_ms })
    }

    fn render(&self) -> String {
        format!("{}\n{}\n", self.holder, self.expires_ms)
    }

    fn expired(&self) -> bool {
        self.expires_ms <= Utc::now().timestamp_millis()
    }
}

/// What a lease path held when it was looked at.
#[derive(Debug)]
enum Observed {
    Gone,
    Lease(Lease),
    Unreadable { age: Duration },
}

impl Observed {
    fn is_stale(&self, ttl: Duration) -> bool {
        match self {
            Self::Gone => false,
            Self::Lease(lease) => lease.expired(),
            Self::Unreadable { age } => *age >= ttl,
        }
    }

    fn holder(&self) -> &str {
        match self {
            Self::Lease(lease) => &lease.holder,
            Self::Gone | Self::Unreadable { .. } => "unreadable",
        }
    }
}

async fn inspect(path: &Path) -> Observed {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Observed::Gone,
        Err(_) => String::new(),
    };
    if let Some(lease) = Lease::parse(&text) {
        return Observed::Lease(lease);
    }
    let age = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => modified.elapsed().unwrap_or_default(),
        Err(e) if e.kind() == ErrorKind::NotFound => return Observed::Gone,
        Err(_) => Duration::ZERO,
    };
    Observed::Unreadable { age }
}

/// Remove a scratch or lease file; a missing file is fine.
async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "cannot remove lease file"),
    }
}

enum Attempt {
    Acquired,
    Busy,
    Failed,
}

impl FileLeaseLock {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, holder: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            holder: holder.into(),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    fn lease_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.lease"))
    }

    /// Private file of this node next to the lease.
    fn scratch_path(&self, name: &str, kind: &str) -> PathBuf {
        self.dir.join(format!("{name}.lease.{}.{kind}", self.holder))
    }

    fn fresh_lease(&self) -> Lease {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        Lease {
            holder: self.holder.clone(),
            expires_ms: Utc::now().timestamp_millis().saturating_add(ttl_ms),
        }
    }

    async fn read_lease(&self, name: &str) -> Option<Lease> {
        let text = tokio::fs::read_to_string(self.lease_path(name)).await.ok()?;
        Lease::parse(&text)
    }

    /// Write a fresh lease to this node's scratch file, synced.
    async fn stage(&self, name: &str) -> std::io::Result<PathBuf> {
        let staged = self.scratch_path(name, "tmp");
        let mut file = tokio::fs::File::create(&staged).await?;
        file.write_all(self.fresh_lease().render().as_bytes()).await?;
        file.sync_all().await?;
        Ok(staged)
    }

    async fn attempt(&self, name: &str) -> Attempt {
        let path = self.lease_path(name);
        let staged = match self.stage(name).await {
            Ok(staged) => staged,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot write lease");
                return Attempt::Failed;
            }
        };

        let outcome = match tokio::fs::hard_link(&staged, &path).await {
            Ok(()) => Attempt::Acquired,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                self.contend(name, &path, &staged).await
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot create lease");
                Attempt::Failed
            }
        };
        discard(&staged).await;
        outcome
    }

    async fn contend(&self, name: &str, path: &Path, staged: &Path) -> Attempt {
        let observed = inspect(path).await;
        match &observed {
            Observed::Gone => Attempt::Busy,
            Observed::Lease(lease) if lease.holder == self.holder && !lease.expired() => {
                // Renew our own lease with an atomic replace.
                match tokio::fs::rename(staged, path).await {
                    Ok(()) => Attempt::Acquired,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "cannot renew lease");
                        Attempt::Failed
                    }
                }
            }
            _ if !observed.is_stale(self.ttl) => {
                debug!(lock = name, holder = %observed.holder(), "lease held elsewhere");
                Attempt::Busy
            }
            _ => {
                self.take_over(name, path).await;
                Attempt::Busy
            }
        }
    }

    /// Move a stale lease aside under this node's name and check that
    /// what moved is still stale. A fresh lease published by another
    /// node in between is linked back.
    async fn take_over(&self, name: &str, path: &Path) {
        let aside = self.scratch_path(name, "stale");
        match tokio::fs::rename(path, &aside).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return,
            Err(e) => {
                warn!(lock = name, error = %e, "cannot move stale lease aside");
                return;
            }
        }

        let moved = inspect(&aside).await;
        if moved.is_stale(self.ttl) {
            info!(lock = name, previous = %moved.holder(), "taking over expired lease");
        } else {
            match tokio::fs::hard_link(&aside, path).await {
                Ok(()) => debug!(lock = name, holder = %moved.holder(), "fresh lease restored"),
                Err(e) => {
                    warn!(lock = name, holder = %moved.holder(), error = %e, "cannot restore lease moved during takeover");
                }
            }
        }
        discard(&aside).await;
    }
}

#[async_trait]
impl PollLock for FileLeaseLock {
    async fn try_acquire(&self, name: &str, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            match self.attempt(name).await {
                Attempt::Acquired => return true,
                Attempt::Failed => return false,
                Attempt::Busy => {}
            }
            let now = Instant::now();
            if now >= deadline {
                // One more immediate try picks up a lease just removed as stale.
                return matches!(self.attempt(name).await, Attempt::Acquired);
            }
            tokio::time::sleep(LEASE_RETRY.min(deadline - now)).await;
        }
    }

    async fn release(&self, name: &str) {
        match self.read_lease(name).await {
            Some(lease) if lease.holder == self.holder => {
                discard(&self.lease_path(name)).await;
            }
            _ => debug!(lock = name, "release of a lease not held"),
        }
    }
}
