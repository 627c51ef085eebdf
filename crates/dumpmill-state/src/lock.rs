//! Exclusive advisory locks per (wiki, date).
//!
//! The lock file `lock_<date>` under the wiki's private directory holds
//! `"<hostname> <pid>"`. Creation uses create-exclusive semantics, so the
//! file existing is the mutual-exclusion primitive. While held, a heartbeat
//! task rewrites the file every period to keep its mtime fresh; unlock
//! stops the heartbeat and waits for its acknowledgement before deleting
//! the file, so the heartbeat can never resurrect a deleted lock's mtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dumpmill_types::{DumpDate, WikiId};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::LockError;
use crate::store::RunStore;

/// Default heartbeat rewrite period.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);

/// Recorded owner of a lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    pub hostname: String,
    pub pid: i32,
}

/// A held (wiki, date) lock. Dropping without [`DumpLock::unlock`] leaves
/// the file behind for the staleness path to reclaim; always unlock.
pub struct DumpLock {
    path: PathBuf,
    stop: watch::Sender<bool>,
    heartbeat: JoinHandle<()>,
}

impl DumpLock {
    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the heartbeat (waiting for it to acknowledge) and remove the
    /// lock file. The ordering is required: deleting first would race a
    /// final heartbeat rewrite recreating the file.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] if the file cannot be removed.
    pub async fn unlock(self) -> Result<(), LockError> {
        let _ = self.stop.send(true);
        let _ = self.heartbeat.await;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Creates, probes, and reclaims (wiki, date) locks.
#[derive(Debug, Clone)]
pub struct LockManager {
    private_root: PathBuf,
    /// Name of the run-marker environment variable; a live pid without it
    /// in `/proc/<pid>/environ` is not one of ours. Empty disables the tag
    /// check and any live pid counts as an owner.
    marker_var: String,
    heartbeat_period: Duration,
}

impl LockManager {
    /// Manager rooted at the private dump tree.
    pub fn new(private_root: impl Into<PathBuf>, marker_var: impl Into<String>) -> Self {
        Self {
            private_root: private_root.into(),
            marker_var: marker_var.into(),
            heartbeat_period: HEARTBEAT_PERIOD,
        }
    }

    /// Override the heartbeat period (tests).
    #[must_use]
    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Path of the lock file for a (wiki, date).
    #[must_use]
    pub fn lock_path(&self, wiki: &WikiId, date: &DumpDate) -> PathBuf {
        self.private_root
            .join(wiki.as_str())
            .join(format!("lock_{date}"))
    }

    /// Acquire the (wiki, date) lock.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::AlreadyLocked`] when the lock file exists, and
    /// [`LockError::Io`] on other filesystem failures.
    pub fn lock(&self, wiki: &WikiId, date: &DumpDate) -> Result<DumpLock, LockError> {
        let path = self.lock_path(wiki, date);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = lock_content();
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => {
                use std::io::Write;
                let mut file = file;
                file.write_all(content.as_bytes())?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(LockError::AlreadyLocked { path });
            }
            Err(e) => return Err(e.into()),
        }

        let (stop, mut stopped) = watch::channel(false);
        let heartbeat_path = path.clone();
        let period = self.heartbeat_period;
        let heartbeat = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(period) => {
                        if let Err(err) = std::fs::write(&heartbeat_path, lock_content()) {
                            tracing::warn!(path = %heartbeat_path.display(), %err, "lock heartbeat write failed");
                        }
                    }
                }
            }
        });

        tracing::info!(wiki = %wiki, date = %date, path = %path.display(), "lock acquired");
        Ok(DumpLock {
            path,
            stop,
            heartbeat,
        })
    }

    /// Read the recorded owner of an existing lock file.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Malformed`] when the file does not hold
    /// `"<hostname> <pid>"`, and [`LockError::Io`] when it cannot be read.
    pub fn owner(&self, wiki: &WikiId, date: &DumpDate) -> Result<LockOwner, LockError> {
        let path = self.lock_path(wiki, date);
        let content = std::fs::read_to_string(&path)?;
        let mut fields = content.split_whitespace();
        let (Some(hostname), Some(pid_s)) = (fields.next(), fields.next()) else {
            return Err(LockError::Malformed { path, content });
        };
        let Ok(pid) = pid_s.parse::<i32>() else {
            return Err(LockError::Malformed { path, content });
        };
        Ok(LockOwner {
            hostname: hostname.to_string(),
            pid,
        })
    }

    /// Whether the lock file's age exceeds the threshold. Age alone never
    /// justifies reclaiming: a long legitimate run looks identical to a
    /// stuck one, so callers go through [`LockManager::cleanup_stale`]
    /// which also verifies the owning pid.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] when the file cannot be inspected.
    pub fn is_stale(
        &self,
        wiki: &WikiId,
        date: &DumpDate,
        stale_age: Duration,
    ) -> Result<bool, LockError> {
        let path = self.lock_path(wiki, date);
        let mtime = std::fs::metadata(&path)?.modified()?;
        let age = mtime.elapsed().unwrap_or_default();
        Ok(age > stale_age)
    }

    /// Reclaim a verified-stale lock: the file is old **and** the recorded
    /// pid on this host is not a live tagged process. Writes the `Aborted`
    /// run status for that date before removing the lock, so status
    /// displays do not show a vanished run as in progress.
    ///
    /// Returns `true` when the lock was reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] on I/O failure or a malformed lock file.
    pub async fn cleanup_stale(
        &self,
        wiki: &WikiId,
        date: &DumpDate,
        stale_age: Duration,
        store: &RunStore,
    ) -> Result<bool, LockError> {
        if !self.is_stale(wiki, date, stale_age)? {
            return Ok(false);
        }
        let owner = self.owner(wiki, date)?;
        let ours = hostname();
        if owner.hostname != ours {
            tracing::warn!(
                wiki = %wiki,
                date = %date,
                owner_host = owner.hostname,
                "stale lock owned by another host; cannot verify pid, leaving it"
            );
            return Ok(false);
        }
        if self.pid_is_ours(owner.pid) {
            return Ok(false);
        }
        tracing::warn!(
            wiki = %wiki,
            date = %date,
            pid = owner.pid,
            "reclaiming stale lock from dead process"
        );
        store.mark_aborted()?;
        std::fs::remove_file(self.lock_path(wiki, date))?;
        Ok(true)
    }

    /// Whether the pid is a live process carrying our run marker.
    fn pid_is_ours(&self, pid: i32) -> bool {
        if !pid_alive(pid) {
            return false;
        }
        if self.marker_var.is_empty() {
            return true;
        }
        pid_has_marker(pid, &self.marker_var)
    }
}

fn lock_content() -> String {
    format!("{} {}\n", hostname(), std::process::id())
}

/// This host's name, as recorded in lock files.
#[must_use]
pub fn hostname() -> String {
    if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Signal-0 liveness probe; EPERM still means alive.
fn pid_alive(pid: i32) -> bool {
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Whether `/proc/<pid>/environ` carries the run-marker variable.
fn pid_has_marker(pid: i32, marker_var: &str) -> bool {
    let Ok(environ) = std::fs::read(format!("/proc/{pid}/environ")) else {
        return false;
    };
    environ.split(|b| *b == 0).any(|kv| {
        kv.starts_with(marker_var.as_bytes()) && kv.get(marker_var.len()) == Some(&b'=')
    })
}
