//! Memory traits: short-lived session memory and the long-lived experience log.
//!
//! Session memory holds one model-written summary per session and expires a
//! fixed time after its last refresh. The experience log is an ordered,
//! size-capped list of lessons drawn from sessions that went wrong.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::MemoryError;
use crate::message::SessionId;

/// Default lifetime of a session memory entry.
pub const DEFAULT_MEMORY_TTL_SECS: i64 = 600;

/// Default number of experience entries kept.
pub const DEFAULT_EXPERIENCE_CAP: usize = 50;

/// Model-written summary of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// What the user asked for
    #[serde(default)]
    pub user_request: String,

    #[serde(default)]
    pub completed_tasks: Vec<String>,

    #[serde(default)]
    pub important_info: Vec<String>,

    #[serde(default, deserialize_with = "lenient_string_map")]
    pub user_preferences: BTreeMap<String, String>,

    #[serde(default)]
    pub pending_tasks: Vec<String>,

    /// When the summary was produced
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Default for SessionSummary {
    fn default() -> Self {
        Self {
            user_request: String::new(),
            completed_tasks: Vec::new(),
            important_info: Vec::new(),
            user_preferences: BTreeMap::new(),
            pending_tasks: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Models often answer `{"budget": 500}`; keep non-string values as their JSON text.
fn lenient_string_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect())
}

/// A session's memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub summary: SessionSummary,
}

impl MemoryEntry {
    /// A fresh entry that expires `ttl` from now.
    pub fn new(session_id: SessionId, summary: SessionSummary, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            created_at: now,
            last_updated_at: now,
            expires_at: now + ttl,
            summary,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Push the expiry out to `now + ttl`.
    pub fn refresh(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.last_updated_at = now;
        self.expires_at = now + ttl;
    }
}

/// A lesson recorded after a failed or erroring session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Kind of task that was attempted
    #[serde(default)]
    pub task_type: String,

    /// Tool order that works for this kind of task
    #[serde(default)]
    pub execution_order: Vec<String>,

    #[serde(default)]
    pub key_points: Vec<String>,

    /// Tool name to usage advice
    #[serde(default)]
    pub function_usage: BTreeMap<String, String>,
}

/// Durable keyed storage for session memory.
///
/// Every read and write purges entries whose `expires_at` has passed.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// All live entries.
    async fn all(&self) -> std::result::Result<Vec<MemoryEntry>, MemoryError>;

    /// The live entry for one session.
    async fn get(&self, session_id: &SessionId)
    -> std::result::Result<Option<MemoryEntry>, MemoryError>;

    /// Insert or replace the entry for `entry.session_id`.
    async fn upsert(&self, entry: MemoryEntry) -> std::result::Result<(), MemoryError>;

    /// Refresh the expiry of a session's entry. Returns false if there is none.
    async fn touch(
        &self,
        session_id: &SessionId,
        ttl: Duration,
    ) -> std::result::Result<bool, MemoryError>;

    /// Drop expired entries now, returning how many went.
    async fn purge_expired(&self) -> std::result::Result<usize, MemoryError>;
}

/// Durable ordered storage for the experience log.
#[async_trait]
pub trait ExperienceStore: Send + Sync {
    fn name(&self) -> &str;

    /// Every entry, oldest first.
    async fn all(&self) -> std::result::Result<Vec<ExperienceEntry>, MemoryError>;

    /// The newest `n` entries, oldest first.
    async fn recent(&self, n: usize) -> std::result::Result<Vec<ExperienceEntry>, MemoryError> {
        let all = self.all().await?;
        let skip = all.len().saturating_sub(n);
        Ok(all.into_iter().skip(skip).collect())
    }

    /// Append, evicting from the front once the cap is exceeded.
    async fn append(&self, entry: ExperienceEntry) -> std::result::Result<(), MemoryError>;

    async fn len(&self) -> std::result::Result<usize, MemoryError> {
        Ok(self.all().await?.len())
    }
}

/// Drop expired entries from a session-keyed map.
pub fn purge_map(
    entries: &mut BTreeMap<SessionId, MemoryEntry>,
    now: DateTime<Utc>,
) -> usize {
    let before = entries.len();
    entries.retain(|_, e| !e.is_expired(now));
    before - entries.len()
}

/// Append to a capped log, evicting oldest first.
pub fn push_capped(log: &mut Vec<ExperienceEntry>, entry: ExperienceEntry, cap: usize) {
    log.push(entry);
    if log.len() > cap {
        let excess = log.len() - cap;
        log.drain(..excess);
    }
}
