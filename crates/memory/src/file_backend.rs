//! File-based stores: one JSON document per store.
//!
//! Session memory lives in `session_memory.json` as an object keyed by
//! session id; the experience log lives in `experience.json` as an array,
//! oldest first. Documents are loaded on construction and rewritten in full
//! on every mutation, under the store's write lock. A mutation is applied to
//! a copy and only swapped in once the copy is on disk.
//!
//! Storage location: `~/.agentloop/memory/`

use async_trait::async_trait;
use chrono::{Duration, Utc};
use agentloop_core::error::MemoryError;
use agentloop_core::memory::{
    DEFAULT_EXPERIENCE_CAP, ExperienceEntry, ExperienceStore, MemoryEntry, MemoryStore,
    purge_map, push_capped,
};
use agentloop_core::message::SessionId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// File name of the session memory document.
pub const MEMORY_FILE: &str = "session_memory.json";

/// File name of the experience document.
pub const EXPERIENCE_FILE: &str = "experience.json";

/// Read a JSON document. `None` if the file is missing or blank.
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, MemoryError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(MemoryError::Storage(format!(
                "Failed to read {}: {e}",
                path.display()
            )));
        }
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| MemoryError::Corrupted {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Load a JSON document, starting empty if it is missing or unreadable.
fn load_document<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_document(path) {
        Ok(doc) => doc.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Starting from an empty memory document");
            T::default()
        }
    }
}

/// Persist `next`, then make it the live document.
fn commit<T: Serialize>(path: &Path, live: &mut T, next: T) -> Result<(), MemoryError> {
    write_document(path, &next)?;
    *live = next;
    Ok(())
}

/// Write the whole document, creating the parent directory if needed.
fn write_document<T: Serialize>(path: &Path, doc: &T) -> Result<(), MemoryError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            MemoryError::Storage(format!("Failed to create memory directory: {e}"))
        })?;
    }
    let content = serde_json::to_string_pretty(doc)
        .map_err(|e| MemoryError::Storage(format!("Failed to serialize memory document: {e}")))?;
    std::fs::write(path, content)
        .map_err(|e| MemoryError::Storage(format!("Failed to write {}: {e}", path.display())))
}

/// File-backed session memory.
pub struct FileMemoryStore {
    path: PathBuf,
    entries: Arc<RwLock<BTreeMap<SessionId, MemoryEntry>>>,
}

impl FileMemoryStore {
    /// Open the document at `path`, starting empty if it does not exist.
    pub fn new(path: PathBuf) -> Self {
        let entries: BTreeMap<SessionId, MemoryEntry> = load_document(&path);
        debug!(path = %path.display(), count = entries.len(), "Session memory loaded");
        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Open `session_memory.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(MEMORY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Purge under the held guard; persist only if something went.
    fn purge_and_flush(
        &self,
        entries: &mut BTreeMap<SessionId, MemoryEntry>,
    ) -> Result<usize, MemoryError> {
        let mut next = entries.clone();
        let purged = purge_map(&mut next, Utc::now());
        if purged > 0 {
            debug!(purged, "Purged expired session memories");
            commit(&self.path, entries, next)?;
        }
        Ok(purged)
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn all(&self) -> Result<Vec<MemoryEntry>, MemoryError> {
        let mut entries = self.entries.write().await;
        self.purge_and_flush(&mut entries)?;
        Ok(entries.values().cloned().collect())
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<MemoryEntry>, MemoryError> {
        let mut entries = self.entries.write().await;
        self.purge_and_flush(&mut entries)?;
        Ok(entries.get(session_id).cloned())
    }

    async fn upsert(&self, entry: MemoryEntry) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        purge_map(&mut next, Utc::now());
        next.insert(entry.session_id.clone(), entry);
        commit(&self.path, &mut *entries, next)
    }

    async fn touch(&self, session_id: &SessionId, ttl: Duration) -> Result<bool, MemoryError> {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        let mut next = entries.clone();
        let purged = purge_map(&mut next, now);
        let touched = match next.get_mut(session_id) {
            Some(entry) => {
                entry.refresh(now, ttl);
                true
            }
            None => false,
        };
        if touched || purged > 0 {
            commit(&self.path, &mut *entries, next)?;
        }
        Ok(touched)
    }

    async fn purge_expired(&self) -> Result<usize, MemoryError> {
        let mut entries = self.entries.write().await;
        self.purge_and_flush(&mut entries)
    }
}

/// File-backed experience log.
pub struct FileExperienceStore {
    path: PathBuf,
    entries: Arc<RwLock<Vec<ExperienceEntry>>>,
    cap: usize,
}

impl FileExperienceStore {
    pub fn new(path: PathBuf, cap: usize) -> Self {
        let cap = cap.max(1);
        let mut entries: Vec<ExperienceEntry> = load_document(&path);
        // A document written under a larger cap is trimmed on load.
        if entries.len() > cap {
            let excess = entries.len() - cap;
            entries.drain(..excess);
        }
        debug!(path = %path.display(), count = entries.len(), "Experience log loaded");
        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
            cap,
        }
    }

    /// Open `experience.json` inside `dir` with the default cap.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(EXPERIENCE_FILE), DEFAULT_EXPERIENCE_CAP)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExperienceStore for FileExperienceStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn all(&self) -> Result<Vec<ExperienceEntry>, MemoryError> {
        Ok(self.entries.read().await.clone())
    }

    async fn append(&self, entry: ExperienceEntry) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        push_capped(&mut next, entry, self.cap);
        commit(&self.path, &mut *entries, next)
    }

    async fn len(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }
}
