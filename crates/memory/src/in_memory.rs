//! In-memory stores: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use agentloop_core::error::MemoryError;
use agentloop_core::memory::{
    DEFAULT_EXPERIENCE_CAP, ExperienceEntry, ExperienceStore, MemoryEntry, MemoryStore,
    purge_map, push_capped,
};
use agentloop_core::message::SessionId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Session memory kept in a map behind a lock.
///
/// Each operation purges expired entries under the same write guard, so a
/// purge can never race an upsert.
pub struct InMemoryMemoryStore {
    entries: Arc<RwLock<BTreeMap<SessionId, MemoryEntry>>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn all(&self) -> Result<Vec<MemoryEntry>, MemoryError> {
        let mut entries = self.entries.write().await;
        purge_map(&mut entries, Utc::now());
        Ok(entries.values().cloned().collect())
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<MemoryEntry>, MemoryError> {
        let mut entries = self.entries.write().await;
        purge_map(&mut entries, Utc::now());
        Ok(entries.get(session_id).cloned())
    }

    async fn upsert(&self, entry: MemoryEntry) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().await;
        purge_map(&mut entries, Utc::now());
        entries.insert(entry.session_id.clone(), entry);
        Ok(())
    }

    async fn touch(&self, session_id: &SessionId, ttl: Duration) -> Result<bool, MemoryError> {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        purge_map(&mut entries, now);
        match entries.get_mut(session_id) {
            Some(entry) => {
                entry.refresh(now, ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_expired(&self) -> Result<usize, MemoryError> {
        let mut entries = self.entries.write().await;
        Ok(purge_map(&mut entries, Utc::now()))
    }
}

/// Experience log kept in a Vec, capped.
pub struct InMemoryExperienceStore {
    entries: Arc<RwLock<Vec<ExperienceEntry>>>,
    cap: usize,
}

impl InMemoryExperienceStore {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_EXPERIENCE_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            cap: cap.max(1),
        }
    }
}

impl Default for InMemoryExperienceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExperienceStore for InMemoryExperienceStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn all(&self) -> Result<Vec<ExperienceEntry>, MemoryError> {
        Ok(self.entries.read().await.clone())
    }

    async fn append(&self, entry: ExperienceEntry) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().await;
        push_capped(&mut entries, entry, self.cap);
        Ok(())
    }

    async fn len(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }
}
