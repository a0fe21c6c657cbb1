//! Consolidation: turning finished transcripts into memory and experience.
//!
//! Both operations make one extra model call, so they share the process-wide
//! [`ModelLimiter`] with the session loop. They are best-effort: every failure
//! is logged and reported in the returned [`ConsolidationOutcome`], never
//! raised.

use crate::extract::find_json_object;
use agentloop_core::limiter::ModelLimiter;
use agentloop_core::memory::{
    DEFAULT_MEMORY_TTL_SECS, ExperienceEntry, ExperienceStore, MemoryEntry, MemoryStore,
    SessionSummary,
};
use agentloop_core::message::{Conversation, Message, SessionId};
use agentloop_core::provider::{Provider, ProviderRequest};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Experience entries spliced into a session by default.
pub const DEFAULT_EXPERIENCE_RECALL: usize = 5;

const SUMMARY_INSTRUCTIONS: &str = r#"Summarize the conversation below for future sessions with the same user.
Reply with only a JSON object of this shape:
{"user_request": "<what the user asked for>",
 "completed_tasks": ["<task done>", ...],
 "important_info": ["<fact worth remembering>", ...],
 "user_preferences": {"<preference>": "<value>"},
 "pending_tasks": ["<task still open>", ...]}"#;

const FAILURE_INSTRUCTIONS: &str = r#"The conversation below hit tool errors or did not finish.
Work out what went wrong and how to do this kind of task correctly next time.
Reply with only a JSON object of this shape:
{"task_type": "<short name for the kind of task>",
 "execution_order": ["<tool>", ...],
 "key_points": ["<lesson>", ...],
 "function_usage": {"<tool>": "<how to call it correctly>"}}"#;

/// Result of one best-effort consolidation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl ConsolidationOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// What a session starts with: recent summaries and recent lessons.
#[derive(Debug, Clone, Default)]
pub struct Recall {
    /// Summaries inside the recent window, newest first
    pub memories: Vec<MemoryEntry>,

    /// Newest experience entries, oldest first
    pub experiences: Vec<ExperienceEntry>,
}

/// The model's answer to the failure analysis prompt.
#[derive(Debug, Deserialize)]
struct FailureAnalysis {
    #[serde(default)]
    task_type: String,
    #[serde(default)]
    execution_order: Vec<String>,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    function_usage: BTreeMap<String, Value>,
}

/// Reads and writes session memory and the experience log.
pub struct Consolidator {
    provider: Arc<dyn Provider>,
    model: String,
    limiter: ModelLimiter,
    memory: Arc<dyn MemoryStore>,
    experience: Arc<dyn ExperienceStore>,
    ttl: Duration,
    recent_window: Duration,
    experience_recall: usize,
}

impl Consolidator {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        limiter: ModelLimiter,
        memory: Arc<dyn MemoryStore>,
        experience: Arc<dyn ExperienceStore>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            limiter,
            memory,
            experience,
            ttl: Duration::seconds(DEFAULT_MEMORY_TTL_SECS),
            recent_window: Duration::seconds(DEFAULT_MEMORY_TTL_SECS),
            experience_recall: DEFAULT_EXPERIENCE_RECALL,
        }
    }

    /// Set how long a session summary lives after its last refresh.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set how far back summaries are recalled into new sessions.
    pub fn with_recent_window(mut self, window: Duration) -> Self {
        self.recent_window = window;
        self
    }

    /// Set how many experience entries are recalled into new sessions.
    pub fn with_experience_recall(mut self, n: usize) -> Self {
        self.experience_recall = n;
        self
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    pub fn experience(&self) -> &Arc<dyn ExperienceStore> {
        &self.experience
    }

    /// Load what a new session should know and refresh its own entry.
    ///
    /// Store failures are logged and yield an empty recall.
    pub async fn recall(&self, session_id: &SessionId) -> Recall {
        let now = Utc::now();
        let mut memories = match self.memory.all().await {
            Ok(entries) => recent_summaries(entries, now, self.recent_window),
            Err(e) => {
                warn!(error = %e, "Failed to load session memory");
                Vec::new()
            }
        };
        memories.sort_by(|a, b| b.summary.timestamp.cmp(&a.summary.timestamp));

        match self.memory.touch(session_id, self.ttl).await {
            Ok(true) => debug!(session_id = %session_id, "Refreshed session memory expiry"),
            Ok(false) => {}
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to refresh session memory"),
        }

        let experiences = match self.experience.recent(self.experience_recall).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to load experience log");
                Vec::new()
            }
        };

        Recall {
            memories,
            experiences,
        }
    }

    /// Summarize a transcript into the session's memory entry.
    pub async fn summarize_session(
        &self,
        session_id: &SessionId,
        transcript: &Conversation,
    ) -> ConsolidationOutcome {
        let outcome = match self.try_summarize(session_id, transcript).await {
            Ok(()) => ConsolidationOutcome::ok(),
            Err(e) => ConsolidationOutcome::failed(e),
        };
        match &outcome.error {
            None => info!(session_id = %session_id, "Session memory consolidated"),
            Some(e) => warn!(session_id = %session_id, error = %e, "Memory consolidation failed"),
        }
        outcome
    }

    /// Draw a lesson from a transcript that went wrong and log it.
    pub async fn analyze_failure(&self, transcript: &Conversation) -> ConsolidationOutcome {
        let outcome = match self.try_analyze(transcript).await {
            Ok(()) => ConsolidationOutcome::ok(),
            Err(e) => ConsolidationOutcome::failed(e),
        };
        match &outcome.error {
            None => info!(session_id = %transcript.id, "Failure analysis recorded"),
            Some(e) => warn!(session_id = %transcript.id, error = %e, "Failure analysis failed"),
        }
        outcome
    }

    async fn try_summarize(
        &self,
        session_id: &SessionId,
        transcript: &Conversation,
    ) -> Result<(), String> {
        let object = self.ask_json(SUMMARY_INSTRUCTIONS, transcript).await?;
        let mut summary: SessionSummary = serde_json::from_value(Value::Object(object))
            .map_err(|e| format!("summary has the wrong shape: {e}"))?;
        summary.timestamp = Utc::now();

        let existing = self
            .memory
            .get(session_id)
            .await
            .map_err(|e| e.to_string())?;
        let mut entry = MemoryEntry::new(session_id.clone(), summary, self.ttl);
        if let Some(previous) = existing {
            entry.created_at = previous.created_at;
        }
        self.memory.upsert(entry).await.map_err(|e| e.to_string())
    }

    async fn try_analyze(&self, transcript: &Conversation) -> Result<(), String> {
        let object = self.ask_json(FAILURE_INSTRUCTIONS, transcript).await?;
        let analysis: FailureAnalysis = serde_json::from_value(Value::Object(object))
            .map_err(|e| format!("analysis has the wrong shape: {e}"))?;
        if analysis.task_type.trim().is_empty() {
            return Err("analysis is missing task_type".into());
        }

        let function_usage = analysis
            .function_usage
            .into_iter()
            .map(|(tool, advice)| match advice {
                Value::String(s) => (tool, s),
                other => (tool, other.to_string()),
            })
            .collect();

        self.experience
            .append(ExperienceEntry {
                created_at: Utc::now(),
                task_type: analysis.task_type,
                execution_order: analysis.execution_order,
                key_points: analysis.key_points,
                function_usage,
            })
            .await
            .map_err(|e| e.to_string())
    }

    /// One limited model call whose reply must contain a JSON object.
    async fn ask_json(
        &self,
        instructions: &str,
        transcript: &Conversation,
    ) -> Result<Map<String, Value>, String> {
        let mut request = ProviderRequest::new(
            self.model.clone(),
            vec![
                Message::system(instructions),
                Message::user(transcript.render()),
            ],
        );
        request.temperature = 0.2;

        let reply = {
            let _permit = self.limiter.acquire().await;
            self.provider
                .complete(request)
                .await
                .map_err(|e| format!("model call failed: {e}"))?
        };

        find_json_object(&reply.message.content)
            .ok_or_else(|| "model reply contained no JSON object".to_string())
    }
}

/// Entries whose summary was written inside the window ending at `now`.
fn recent_summaries(
    entries: Vec<MemoryEntry>,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<MemoryEntry> {
    entries
        .into_iter()
        .filter(|e| !e.is_expired(now) && e.summary.timestamp >= now - window)
        .collect()
}
