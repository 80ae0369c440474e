//! Bounded error log.
//!
//! Maintains a capacity-bounded, insertion-ordered log of handled failures in
//! a single persistent slot (a JSON array). The oldest entry is evicted when a
//! new one arrives at capacity. Storage problems never reach the caller: a
//! failed write is logged and dropped, an unreadable slot reads as empty.

use crate::errors::{Classification, ErrorKind, Failure, Severity};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default maximum number of entries to retain.
pub const DEFAULT_CAPACITY: usize = 50;

/// Name of the persistent slot.
pub const STORAGE_KEY: &str = "errorLogs";

/// Free-form structured context attached to a handled failure.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Where and by what a failure was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Location the failure happened at.
    pub url: String,
    /// Identifier of the observing program.
    pub agent: String,
}

impl HostInfo {
    pub fn new(url: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            agent: agent.into(),
        }
    }

    /// Describe the current process.
    pub fn detect() -> Self {
        let url = std::env::current_exe()
            .map(|path| format!("file://{}", path.display()))
            .unwrap_or_else(|_| format!("process://{}", std::process::id()));
        Self { url, agent: default_agent() }
    }
}

impl Default for HostInfo {
    fn default() -> Self {
        Self::detect()
    }
}

pub(crate) fn default_agent() -> String {
    format!(
        "faultline/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Structured record of one handled failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 timestamp.
    pub timestamp: String,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default)]
    pub context: Context,
    pub url: String,
    pub agent: String,
}

impl LogEntry {
    /// Build the entry for a classified failure.
    pub fn new(
        failure: &Failure,
        classification: Classification,
        context: Context,
        host: &HostInfo,
    ) -> Self {
        let message = failure
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| failure.to_string());
        Self {
            timestamp: Utc::now().to_rfc3339(),
            kind: classification.kind,
            severity: classification.severity,
            message,
            stack: failure.stack.clone(),
            context,
            url: host.url.clone(),
            agent: host.agent.clone(),
        }
    }
}

/// Errors from a log backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("log storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("log storage quota exceeded ({needed} bytes needed, {quota} allowed)")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("log serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Single-slot persistent storage for the serialized log.
pub trait LogBackend: Send + Sync {
    /// Raw slot contents, `None` when the slot was never written.
    fn read(&self) -> Result<Option<String>, StoreError>;
    /// Replace the slot contents.
    fn write(&self, contents: &str) -> Result<(), StoreError>;
    /// Remove the slot.
    fn remove(&self) -> Result<(), StoreError>;
}

impl<B: LogBackend + ?Sized> LogBackend for Arc<B> {
    fn read(&self) -> Result<Option<String>, StoreError> {
        (**self).read()
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        (**self).write(contents)
    }

    fn remove(&self) -> Result<(), StoreError> {
        (**self).remove()
    }
}

/// In-memory slot, optionally with a byte quota.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<String>>,
    quota: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes larger than `bytes`.
    #[must_use]
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Seed the slot with raw contents (which need not be valid JSON).
    #[must_use]
    pub fn with_contents(self, contents: impl Into<String>) -> Self {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(contents.into());
        self
    }
}

impl LogBackend for MemoryBackend {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        if let Some(quota) = self.quota
            && contents.len() > quota
        {
            return Err(StoreError::QuotaExceeded {
                needed: contents.len(),
                quota,
            });
        }
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(contents.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<(), StoreError> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}

/// File-backed slot. Writes go through a temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Slot file inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(format!("{STORAGE_KEY}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogBackend for FileBackend {
    fn read(&self) -> Result<Option<String>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, contents)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn remove(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Capacity-bounded error log over a [`LogBackend`].
///
/// Entries live in memory, loaded once from the backend when the store is
/// created. Every change persists a full snapshot. Inside a tokio runtime the
/// write runs on the blocking pool, so callers on the runtime never wait on
/// storage.
pub struct LogStore {
    backend: Arc<dyn LogBackend>,
    capacity: usize,
    ring: Mutex<Ring>,
    /// Generation of the last snapshot that reached the backend.
    written: Arc<Mutex<u64>>,
}

struct Ring {
    entries: VecDeque<LogEntry>,
    generation: u64,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl LogStore {
    /// Create a store over the given backend with the default capacity.
    pub fn new(backend: impl LogBackend + 'static) -> Self {
        let entries = load(&backend).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read error log, treating as empty");
            VecDeque::new()
        });
        Self {
            backend: Arc::new(backend),
            capacity: DEFAULT_CAPACITY,
            ring: Mutex::new(Ring {
                entries,
                generation: 0,
            }),
            written: Arc::new(Mutex::new(0)),
        }
    }

    /// In-memory store, for tests and ephemeral processes.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// File-backed store at `path`.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self::new(FileBackend::new(path))
    }

    /// Set the capacity (minimum 1). Loaded entries beyond it are dropped,
    /// oldest first.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        self.capacity = capacity;
        let ring = self.ring.get_mut().unwrap_or_else(|e| e.into_inner());
        while ring.entries.len() > capacity {
            ring.entries.pop_front();
        }
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, evicting the oldest entries beyond capacity.
    ///
    /// Returns the persistence task when called inside a tokio runtime.
    /// Storage failures are logged and otherwise ignored.
    pub fn append(&self, entry: LogEntry) -> Option<JoinHandle<()>> {
        let (snapshot, generation) = {
            let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
            while ring.entries.len() >= self.capacity {
                ring.entries.pop_front();
            }
            ring.entries.push_back(entry);
            ring.generation += 1;
            debug!(len = ring.entries.len(), capacity = self.capacity, "Error log entry stored");
            (ring.entries.clone(), ring.generation)
        };
        self.persist(Some(snapshot), generation)
    }

    /// All entries, oldest first.
    pub fn list(&self) -> Vec<LogEntry> {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.entries.iter().cloned().collect()
    }

    /// Most recent `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    pub fn clear(&self) -> Option<JoinHandle<()>> {
        let generation = {
            let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
            ring.entries.clear();
            ring.generation += 1;
            ring.generation
        };
        self.persist(None, generation)
    }

    /// Write `snapshot` (or remove the slot for `None`) unless a newer
    /// generation already landed.
    fn persist(
        &self,
        snapshot: Option<VecDeque<LogEntry>>,
        generation: u64,
    ) -> Option<JoinHandle<()>> {
        let backend = Arc::clone(&self.backend);
        let written = Arc::clone(&self.written);
        let write = move || {
            let mut last = written.lock().unwrap_or_else(|e| e.into_inner());
            if *last >= generation {
                return;
            }
            match write_snapshot(backend.as_ref(), snapshot.as_ref()) {
                Ok(()) => *last = generation,
                Err(e) => warn!(error = %e, "Failed to persist error log"),
            }
        };

        // A panicking thread may never get back to the runtime.
        if std::thread::panicking() {
            write();
            return None;
        }
        match Handle::try_current() {
            Ok(handle) => Some(handle.spawn_blocking(write)),
            Err(_) => {
                write();
                None
            }
        }
    }
}

fn write_snapshot(
    backend: &dyn LogBackend,
    snapshot: Option<&VecDeque<LogEntry>>,
) -> Result<(), StoreError> {
    match snapshot {
        Some(entries) => backend.write(&serde_json::to_string(entries)?),
        None => backend.remove(),
    }
}

/// Stored contents. A corrupted slot is discarded with a warning so that the
/// next append starts a fresh log.
fn load(backend: &dyn LogBackend) -> Result<VecDeque<LogEntry>, StoreError> {
    let Some(raw) = backend.read()? else {
        return Ok(VecDeque::new());
    };
    if raw.trim().is_empty() {
        return Ok(VecDeque::new());
    }
    match serde_json::from_str::<VecDeque<LogEntry>>(&raw) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            warn!(error = %e, "Discarding corrupted error log contents");
            Ok(VecDeque::new())
        }
    }
}
