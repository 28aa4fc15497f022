//! JSON file-backed event log store
//!
//! Persists the whole log as a JSON array. The file is the only source of
//! truth: every read and every write re-reads it under an advisory lock on
//! `<log>.lock`, so writers in other handles or processes are never lost.
//! Writes go to a uniquely named temp file that is then renamed over the
//! log, so a crash leaves either the old or the new file, never a torn one.

use super::{with_timeout, EventLogStore};
use crate::error::{OutboxError, Result};
use crate::types::{EventLogEntry, EventStatus};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// File-backed event log
pub struct FileEventLogStore {
    path: PathBuf,
}

impl FileEventLogStore {
    /// Open the log at `path`, starting empty if the file does not exist
    ///
    /// Fails if the file exists but cannot be parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        let count = store.entries().await?.len();

        tracing::debug!(
            path = %store.path.display(),
            count,
            "Event log opened"
        );

        Ok(store)
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry and persist (the transactional writer side)
    pub async fn append(&self, entry: EventLogEntry) -> Result<()> {
        self.blocking("append", move |path| {
            rewrite(path, |entries| {
                if entries.iter().any(|e| e.event_id == entry.event_id) {
                    return Err(OutboxError::AlreadyExists(entry.event_id.to_string()));
                }
                entries.push(entry);
                Ok(true)
            })
        })
        .await
    }

    /// Look up an entry by id
    pub async fn get(&self, event_id: Uuid) -> Result<Option<EventLogEntry>> {
        let entries = self.entries().await?;
        Ok(entries.into_iter().find(|e| e.event_id == event_id))
    }

    /// Snapshot of all entries currently on disk
    pub async fn entries(&self) -> Result<Vec<EventLogEntry>> {
        self.list_where(|_| true).await
    }

    /// Apply `change` to one entry under the exclusive lock.
    ///
    /// If `timeout` expires the caller gets a `Timeout` error, but the
    /// read-modify-write keeps running to completion on its blocking thread.
    /// It is never cut off half way, and later calls see its result.
    async fn update<F>(&self, event_id: Uuid, timeout: Duration, change: F) -> Result<()>
    where
        F: FnOnce(&mut EventLogEntry) -> bool + Send + 'static,
    {
        let write = self.blocking("write", move |path| {
            rewrite(path, |entries| {
                let entry = entries
                    .iter_mut()
                    .find(|e| e.event_id == event_id)
                    .ok_or_else(|| OutboxError::NotFound(event_id.to_string()))?;
                Ok(change(entry))
            })
        });
        with_timeout("event log write", timeout, write).await
    }

    async fn list_where<F>(&self, keep: F) -> Result<Vec<EventLogEntry>>
    where
        F: Fn(&EventLogEntry) -> bool + Send + 'static,
    {
        self.blocking("read", move |path| {
            let mut entries = read_snapshot(path)?;
            entries.retain(|e| keep(e));
            Ok(entries)
        })
        .await
    }

    /// Run file I/O on the blocking pool
    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || f(path.as_path()))
            .await
            .map_err(|e| OutboxError::Store(format!("Event log {} task failed: {}", op, e)))?
    }
}

#[async_trait]
impl EventLogStore for FileEventLogStore {
    async fn list_pending(&self) -> Result<Vec<EventLogEntry>> {
        self.list_where(|e| e.status == EventStatus::Pending).await
    }

    async fn list_failed_below_retry_limit(&self, retry_limit: u32) -> Result<Vec<EventLogEntry>> {
        self.list_where(move |e| {
            e.status == EventStatus::PublishFailed && e.attempt_count < retry_limit
        })
        .await
    }

    async fn mark_published(&self, event_id: Uuid, timeout: Duration) -> Result<()> {
        self.update(event_id, timeout, |e| {
            if e.status == EventStatus::Published {
                return false;
            }
            e.record_published();
            true
        })
        .await
    }

    async fn mark_failed(&self, event_id: Uuid, timeout: Duration) -> Result<()> {
        self.update(event_id, timeout, |e| e.record_failure()).await
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Advisory lock on `<log>.lock`, released on drop
struct LogLock {
    file: File,
}

impl LogLock {
    fn exclusive(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        FileExt::lock_exclusive(&file).map_err(|e| lock_error(path, e))?;
        Ok(Self { file })
    }

    fn shared(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        FileExt::lock_shared(&file).map_err(|e| lock_error(path, e))?;
        Ok(Self { file })
    }
}

impl Drop for LogLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn open_lock_file(path: &Path) -> Result<File> {
    let lock_path = lock_path(path);
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| {
            OutboxError::Store(format!(
                "Failed to open event log lock {}: {}",
                lock_path.display(),
                e
            ))
        })
}

fn lock_error(path: &Path, e: std::io::Error) -> OutboxError {
    OutboxError::Store(format!(
        "Failed to lock event log {}: {}",
        path.display(),
        e
    ))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn read_snapshot(path: &Path) -> Result<Vec<EventLogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let _lock = LogLock::shared(path)?;
    load(path)
}

/// Read, change and write back the log while holding the exclusive lock
///
/// `change` returns `false` to leave the file untouched.
fn rewrite<F>(path: &Path, change: F) -> Result<()>
where
    F: FnOnce(&mut Vec<EventLogEntry>) -> Result<bool>,
{
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir).map_err(|e| {
        OutboxError::Store(format!(
            "Failed to create event log directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let _lock = LogLock::exclusive(path)?;
    let mut entries = load(path)?;
    if change(&mut entries)? {
        persist(path, &entries)?;
    }
    Ok(())
}

fn load(path: &Path) -> Result<Vec<EventLogEntry>> {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(OutboxError::Store(format!(
                "Failed to read event log {}: {}",
                path.display(),
                e
            )))
        }
    };

    if json.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&json).map_err(|e| {
        OutboxError::Store(format!(
            "Failed to parse event log {}: {}",
            path.display(),
            e
        ))
    })
}

fn persist(path: &Path, entries: &[EventLogEntry]) -> Result<()> {
    let json = serde_json::to_vec_pretty(entries)?;
    let dir = parent_dir(path);

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        OutboxError::Store(format!(
            "Failed to create temp file in {}: {}",
            dir.display(),
            e
        ))
    })?;

    tmp.write_all(&json)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| {
            OutboxError::Store(format!(
                "Failed to write event log {}: {}",
                tmp.path().display(),
                e
            ))
        })?;

    tmp.persist(path).map_err(|e| {
        OutboxError::Store(format!(
            "Failed to replace event log {}: {}",
            path.display(),
            e.error
        ))
    })?;

    tracing::trace!(path = %path.display(), count = entries.len(), "Event log saved");
    Ok(())
}
