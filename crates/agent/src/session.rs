//! The session loop: drives the model through tool rounds to an answer.
//!
//! A session runs as a producer task that writes [`SessionEvent`]s into a
//! channel the caller drains through a [`SessionStream`]:
//!
//! 1. **Initializing**: recall memory, build the system instructions
//! 2. **Thinking**: one limited model call, streamed to completion
//! 3. **ToolCall**: if the reply requests tools, dispatch the round, feed the
//!    results back as a user message, and go to 2
//! 4. Otherwise emit the **FinalResponse**
//!
//! The turn-taking runs in its own task so that a fault, including a panic,
//! still ends the session with exactly one terminal event.

use crate::background::BackgroundTasks;
use crate::consolidation::Consolidator;
use crate::context::{DEFAULT_INSTRUCTIONS, build_system_prompt};
use crate::dispatcher::{dispatch, round_had_errors};
use crate::extract::extract;
use crate::stream_event::{SessionEvent, SessionStream};
use agentloop_config::AppConfig;
use agentloop_core::error::{Error, Result};
use agentloop_core::limiter::ModelLimiter;
use agentloop_core::message::{Conversation, Message, SessionId};
use agentloop_core::provider::{Provider, ProviderRequest, collect_stream};
use agentloop_core::tool::{ToolRegistry, ToolResult};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Model turns allowed per session unless configured otherwise.
pub const DEFAULT_MAX_ITERATIONS: u32 = 15;

/// Capacity of the event channel unless configured otherwise.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// How the turn-taking part of a session ended without a fault.
enum Ending {
    Final(String),
    MaxIterations,
    /// The caller dropped its stream; nobody is left to report to.
    Abandoned,
}

/// Runs sessions against one provider, tool registry and limiter.
///
/// Cheap to clone; every session started from it shares the same limiter,
/// stores and background task set.
#[derive(Clone)]
pub struct SessionLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    limiter: ModelLimiter,
    max_iterations: u32,
    instructions: String,
    consolidator: Option<Arc<Consolidator>>,
    background: BackgroundTasks,
    event_buffer: usize,
}

impl SessionLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        limiter: ModelLimiter,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            limiter,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            consolidator: None,
            background: BackgroundTasks::new(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Build a loop from the `[session]` section and model defaults.
    ///
    /// Memory is not attached; use [`Self::with_memory`] when it is enabled.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        limiter: ModelLimiter,
    ) -> Self {
        let mut session = Self::new(
            provider,
            config.default_model.clone(),
            config.default_temperature,
            tools,
            limiter,
        )
        .with_max_iterations(config.session.max_iterations)
        .with_max_tokens(config.default_max_tokens)
        .with_event_buffer(config.session.event_buffer);
        if let Some(prompt) = &config.system_prompt {
            session = session.with_instructions(prompt.clone());
        }
        session
    }

    /// Set the maximum number of model turns per session.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Set the max tokens per model reply.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Replace the built-in base instructions.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Enable memory recall and consolidation.
    pub fn with_memory(mut self, consolidator: Arc<Consolidator>) -> Self {
        self.consolidator = Some(consolidator);
        self
    }

    /// Track consolidation tasks in a caller-owned set.
    pub fn with_background(mut self, background: BackgroundTasks) -> Self {
        self.background = background;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    /// The set consolidation tasks are tracked in.
    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Start a session and return its event stream.
    pub fn start(&self, session_id: SessionId, user_message: impl Into<String>) -> SessionStream {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let this = self.clone();
        let message = user_message.into();
        tokio::spawn(async move { this.drive(session_id, message, tx).await });
        SessionStream::new(rx)
    }

    /// Run a session to completion and collect every event.
    pub async fn run(&self, session_id: SessionId, user_message: impl Into<String>) -> Vec<SessionEvent> {
        self.start(session_id, user_message).collect_all().await
    }

    /// Owns the terminal event: runs the turns, then reports how they ended.
    async fn drive(self, session_id: SessionId, message: String, tx: mpsc::Sender<SessionEvent>) {
        let transcript = Arc::new(Mutex::new(Conversation::with_id(session_id.clone())));

        let worker = {
            let this = self.clone();
            let transcript = transcript.clone();
            let tx = tx.clone();
            tokio::spawn(async move { this.turns(&transcript, message, &tx).await })
        };
        let outcome = match worker.await {
            Ok(outcome) => outcome,
            Err(e) => Err(Error::Internal(format!("session task failed: {e}"))),
        };

        let snapshot = transcript.lock().await.clone();
        let terminal = match outcome {
            Ok(Ending::Abandoned) => {
                debug!(session_id = %session_id, "Caller dropped the session stream");
                return;
            }
            Ok(Ending::Final(content)) => {
                info!(session_id = %session_id, "Session finished with a final response");
                self.spawn_summary(snapshot);
                SessionEvent::FinalResponse { content }
            }
            Ok(Ending::MaxIterations) => {
                warn!(
                    session_id = %session_id,
                    limit = self.max_iterations,
                    "Max iterations reached without a final response"
                );
                self.spawn_failure_analysis(snapshot.clone());
                self.spawn_summary(snapshot);
                SessionEvent::MaxIterationsReached {
                    limit: self.max_iterations,
                }
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Session failed");
                self.spawn_failure_analysis(snapshot.clone());
                self.spawn_summary(snapshot);
                SessionEvent::Error {
                    message: e.user_message(),
                }
            }
        };

        if tx.send(terminal).await.is_err() {
            debug!(session_id = %session_id, "Caller left before the terminal event");
        }
    }

    /// Everything up to, but not including, the terminal event.
    async fn turns(
        &self,
        transcript: &Mutex<Conversation>,
        message: String,
        tx: &mpsc::Sender<SessionEvent>,
    ) -> Result<Ending> {
        let session_id = transcript.lock().await.id.clone();
        if !emit(tx, SessionEvent::Initializing {
            session_id: session_id.clone(),
        })
        .await
        {
            return Ok(Ending::Abandoned);
        }

        let instructions = self.instructions_for(&session_id).await;
        {
            let mut conversation = transcript.lock().await;
            conversation.set_system(instructions);
            conversation.push(Message::user(message));
        }

        for iteration in 1..=self.max_iterations {
            if !emit(tx, SessionEvent::Thinking { iteration }).await {
                return Ok(Ending::Abandoned);
            }

            let messages = transcript.lock().await.messages.clone();
            let reply = self.call_model(messages).await?;
            let extraction = extract(&reply);

            if !extraction.had_tool_calls {
                transcript.lock().await.push(Message::assistant(reply));
                return Ok(Ending::Final(extraction.remainder));
            }

            debug!(
                session_id = %session_id,
                iteration,
                calls = extraction.calls.len(),
                "Model requested tools"
            );
            let results = dispatch(&self.tools, extraction.calls).await;
            let had_errors = round_had_errors(&results);
            let feedback = results
                .iter()
                .map(ToolResult::feedback_line)
                .collect::<Vec<_>>()
                .join("\n");

            let delivered = emit(tx, SessionEvent::ToolCall {
                iteration,
                text_part: extraction.remainder,
                results,
                had_errors,
                raw_text: reply.clone(),
            })
            .await;
            if !delivered {
                return Ok(Ending::Abandoned);
            }

            let snapshot = {
                let mut conversation = transcript.lock().await;
                conversation.push(Message::assistant(reply));
                conversation.push(Message::user(feedback));
                had_errors.then(|| conversation.clone())
            };
            if let Some(snapshot) = snapshot {
                debug!(session_id = %session_id, iteration, "Tool round had errors");
                self.spawn_failure_analysis(snapshot);
            }
        }

        Ok(Ending::MaxIterations)
    }

    /// Base instructions plus tool catalog, and recalled memory if enabled.
    async fn instructions_for(&self, session_id: &SessionId) -> String {
        match &self.consolidator {
            Some(consolidator) => {
                let recall = consolidator.recall(session_id).await;
                debug!(
                    session_id = %session_id,
                    memories = recall.memories.len(),
                    experiences = recall.experiences.len(),
                    "Recalled memory for session"
                );
                build_system_prompt(
                    &self.instructions,
                    &self.tools,
                    &recall.memories,
                    &recall.experiences,
                )
            }
            None => build_system_prompt(&self.instructions, &self.tools, &[], &[]),
        }
    }

    /// One model turn. Holds a limiter permit until the reply is complete.
    async fn call_model(&self, messages: Vec<Message>) -> Result<String> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        };

        let _permit = self.limiter.acquire().await;
        let chunks = self.provider.stream(request).await?;
        Ok(collect_stream(chunks).await?)
    }

    fn spawn_summary(&self, transcript: Conversation) {
        let Some(consolidator) = self.consolidator.clone() else {
            return;
        };
        self.background.spawn(async move {
            consolidator.summarize_session(&transcript.id, &transcript).await;
        });
    }

    fn spawn_failure_analysis(&self, transcript: Conversation) {
        let Some(consolidator) = self.consolidator.clone() else {
            return;
        };
        self.background.spawn(async move {
            consolidator.analyze_failure(&transcript).await;
        });
    }
}

/// Send an event. False once the caller has dropped its stream.
async fn emit(tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) -> bool {
    tx.send(event).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, tool_call_reply};
    use agentloop_core::error::{ProviderError, ToolError};
    use agentloop_core::memory::{ExperienceStore, MemoryEntry, MemoryStore, SessionSummary};
    use agentloop_core::provider::ProviderResponse;
    use agentloop_core::tool::{Tool, ToolParameter};
    use agentloop_memory::{InMemoryExperienceStore, InMemoryMemoryStore};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use serde_json::{Map, Value, json};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the text back"
        }
        fn parameters(&self) -> Vec<ToolParameter> {
            vec![ToolParameter::required("text", "string", "Text to echo")]
        }
        async fn invoke(&self, arguments: Map<String, Value>) -> std::result::Result<Value, ToolError> {
            Ok(arguments.get("text").cloned().unwrap_or(Value::Null))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters(&self) -> Vec<ToolParameter> {
            vec![]
        }
        async fn invoke(&self, _arguments: Map<String, Value>) -> std::result::Result<Value, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "backend unavailable".into(),
            })
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl Provider for PanickingProvider {
        fn name(&self) -> &str {
            "panicking"
        }
        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            panic!("provider bug");
        }
    }

    fn tools() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.merge(vec![Arc::new(EchoTool), Arc::new(BrokenTool)]);
        Arc::new(registry)
    }

    fn session(provider: Arc<dyn Provider>) -> SessionLoop {
        SessionLoop::new(provider, "mock-model", 0.0, tools(), ModelLimiter::new(3))
    }

    struct Memory {
        memory: Arc<InMemoryMemoryStore>,
        experience: Arc<InMemoryExperienceStore>,
        consolidator: Arc<Consolidator>,
    }

    /// Consolidation answers with one object that satisfies both prompts.
    fn memory(reply: &str) -> Memory {
        let memory = Arc::new(InMemoryMemoryStore::new());
        let experience = Arc::new(InMemoryExperienceStore::new());
        let consolidator = Arc::new(Consolidator::new(
            Arc::new(SequentialMockProvider::repeating(reply)),
            "mock-model",
            ModelLimiter::new(3),
            memory.clone(),
            experience.clone(),
        ));
        Memory {
            memory,
            experience,
            consolidator,
        }
    }

    const CONSOLIDATION_REPLY: &str =
        r#"{"user_request": "echo test", "completed_tasks": ["echoed"], "task_type": "echo", "key_points": ["check the backend first"]}"#;

    fn terminal_count(events: &[SessionEvent]) -> usize {
        events.iter().filter(|e| e.is_terminal()).count()
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(SequentialMockProvider::texts(&["  Hello! How can I help?  "]));
        let events = session(provider.clone())
            .run(SessionId::from("s1"), "Hello!")
            .await;

        assert_eq!(
            events,
            vec![
                SessionEvent::Initializing {
                    session_id: SessionId::from("s1")
                },
                SessionEvent::Thinking { iteration: 1 },
                SessionEvent::FinalResponse {
                    content: "Hello! How can I help?".into()
                },
            ]
        );

        let request = &provider.requests()[0];
        assert!(request.stream);
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[0].content.contains("### echo"));
        assert_eq!(request.messages[1].content, "Hello!");
    }

    #[tokio::test]
    async fn tool_round_feeds_results_back() {
        let call = tool_call_reply("echo", json!({"text": "pong", "extra": 1}));
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(call.clone()),
            Ok("The echo said pong.".into()),
        ]));
        let events = session(provider.clone())
            .run(SessionId::from("s1"), "Ping the echo tool")
            .await;

        assert_eq!(events.len(), 5);
        match &events[2] {
            SessionEvent::ToolCall {
                iteration,
                text_part,
                results,
                had_errors,
                raw_text,
            } => {
                assert_eq!(*iteration, 1);
                assert_eq!(text_part, "Let me check.");
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].result, json!("pong"));
                assert_eq!(results[0].parameters["extra"], 1);
                assert!(!had_errors);
                assert_eq!(raw_text, &call);
            }
            other => panic!("expected tool_call, got {other:?}"),
        }
        assert_eq!(events[3], SessionEvent::Thinking { iteration: 2 });
        assert_eq!(
            events[4],
            SessionEvent::FinalResponse {
                content: "The echo said pong.".into()
            }
        );

        let second = &provider.requests()[1];
        let n = second.messages.len();
        assert_eq!(second.messages[n - 2].content, call);
        assert_eq!(second.messages[n - 1].content, "echo execution result: pong");
    }

    #[tokio::test]
    async fn batch_round_joins_feedback_lines() {
        let batch = r#"{"tool_calls": [{"tool_name": "echo", "parameters": {"text": "a"}}, {"tool_name": "missing", "parameters": {}}]}"#;
        let provider = Arc::new(SequentialMockProvider::texts(&[batch, "done"]));
        let events = session(provider.clone()).run(SessionId::from("s1"), "go").await;

        match &events[2] {
            SessionEvent::ToolCall {
                results, had_errors, text_part, ..
            } => {
                assert_eq!(results.len(), 2);
                assert!(had_errors);
                assert_eq!(text_part, "");
            }
            other => panic!("expected tool_call, got {other:?}"),
        }
        let requests = provider.requests();
        let feedback = &requests[1].messages.last().unwrap().content;
        let lines: Vec<_> = feedback.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "echo execution result: a");
        assert!(lines[1].starts_with("missing execution result: Error"));
    }

    #[tokio::test]
    async fn iteration_bound_is_respected() {
        let provider = Arc::new(SequentialMockProvider::repeating(&tool_call_reply(
            "echo",
            json!({"text": "again"}),
        )));
        let events = session(provider.clone())
            .with_max_iterations(4)
            .run(SessionId::from("s1"), "loop forever")
            .await;

        let tool_calls = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ToolCall { .. }))
            .count();
        assert_eq!(tool_calls, 4);
        assert_eq!(events.last(), Some(&SessionEvent::MaxIterationsReached { limit: 4 }));
        assert_eq!(terminal_count(&events), 1);
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn model_failure_ends_with_safe_error() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Err(ProviderError::ApiError {
            status_code: 502,
            message: "upstream body with request id req_123".into(),
        })]));
        let events = session(provider).run(SessionId::from("s1"), "hi").await;

        assert_eq!(terminal_count(&events), 1);
        match events.last() {
            Some(SessionEvent::Error { message }) => {
                assert!(!message.contains("req_123"));
                assert!(!message.is_empty());
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_panic_still_ends_with_one_terminal_event() {
        let mut stream = session(Arc::new(PanickingProvider)).start(SessionId::from("s1"), "hi");

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        assert_eq!(terminal_count(&events), 1);
        assert_eq!(events.last().map(|e| e.event_type()), Some("error"));
    }

    #[tokio::test]
    async fn stream_closes_after_terminal_event() {
        let provider = Arc::new(SequentialMockProvider::texts(&["hi"]));
        let mut stream = session(provider).start(SessionId::from("s1"), "hello");
        let mut seen_terminal = false;
        while let Some(event) = stream.next().await {
            assert!(!seen_terminal, "event after terminal: {event:?}");
            seen_terminal = event.is_terminal();
        }
        assert!(seen_terminal);
    }

    #[tokio::test]
    async fn model_calls_wait_for_a_permit() {
        let limiter = ModelLimiter::new(1);
        let held = limiter.acquire().await;
        let provider = Arc::new(SequentialMockProvider::texts(&["answer"]));
        let loop_ = SessionLoop::new(provider.clone(), "mock-model", 0.0, tools(), limiter);
        let mut stream = loop_.start(SessionId::from("s1"), "hi");

        assert_eq!(stream.next().await.map(|e| e.event_type()), Some("initializing"));
        assert_eq!(stream.next().await.map(|e| e.event_type()), Some("thinking"));
        let blocked = tokio::time::timeout(std::time::Duration::from_millis(50), stream.next()).await;
        assert!(blocked.is_err(), "model call should wait for the held permit");
        assert_eq!(provider.call_count(), 0);

        drop(held);
        assert_eq!(stream.next().await.map(|e| e.event_type()), Some("final_response"));
    }

    #[tokio::test]
    async fn dropped_stream_skips_consolidation() {
        let mem = memory(CONSOLIDATION_REPLY);
        let limiter = ModelLimiter::new(1);
        let held = limiter.acquire().await;
        let provider = Arc::new(SequentialMockProvider::repeating(&tool_call_reply("broken", json!({}))));
        let loop_ = SessionLoop::new(provider.clone(), "mock-model", 0.0, tools(), limiter)
            .with_event_buffer(1)
            .with_memory(mem.consolidator.clone());

        let mut stream = loop_.start(SessionId::from("s1"), "use the broken tool");
        assert_eq!(stream.next().await.map(|e| e.event_type()), Some("initializing"));
        assert_eq!(stream.next().await.map(|e| e.event_type()), Some("thinking"));
        drop(stream);
        drop(held);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        loop_.background().wait_idle().await;

        assert_eq!(provider.call_count(), 1);
        assert_eq!(mem.experience.len().await.unwrap(), 0);
        assert!(mem.memory.get(&SessionId::from("s1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn final_response_consolidates_memory() {
        let mem = memory(CONSOLIDATION_REPLY);
        let provider = Arc::new(SequentialMockProvider::texts(&["All done."]));
        let loop_ = session(provider).with_memory(mem.consolidator.clone());

        let events = loop_.run(SessionId::from("s1"), "echo something").await;
        assert_eq!(events.last().map(|e| e.event_type()), Some("final_response"));
        loop_.background().wait_idle().await;

        let entry = mem.memory.get(&SessionId::from("s1")).await.unwrap().unwrap();
        assert_eq!(entry.summary.user_request, "echo test");
        assert_eq!(mem.experience.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn erroring_round_triggers_failure_analysis() {
        let mem = memory(CONSOLIDATION_REPLY);
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(tool_call_reply("broken", json!({}))),
            Ok("Sorry, the backend is down.".into()),
        ]));
        let loop_ = session(provider).with_memory(mem.consolidator.clone());

        let events = loop_.run(SessionId::from("s1"), "use the broken tool").await;
        match &events[2] {
            SessionEvent::ToolCall { had_errors, .. } => assert!(had_errors),
            other => panic!("expected tool_call, got {other:?}"),
        }
        loop_.background().wait_idle().await;

        let log = mem.experience.all().await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].task_type, "echo");
        assert!(mem.memory.get(&SessionId::from("s1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn max_iterations_triggers_both_consolidations() {
        let mem = memory(CONSOLIDATION_REPLY);
        let provider = Arc::new(SequentialMockProvider::repeating(&tool_call_reply(
            "echo",
            json!({"text": "x"}),
        )));
        let loop_ = session(provider)
            .with_max_iterations(2)
            .with_memory(mem.consolidator.clone());

        loop_.run(SessionId::from("s1"), "loop").await;
        loop_.background().wait_idle().await;

        assert_eq!(mem.experience.len().await.unwrap(), 1);
        assert!(mem.memory.get(&SessionId::from("s1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn consolidation_failure_does_not_change_the_outcome() {
        let mem = memory("no json at all");
        let provider = Arc::new(SequentialMockProvider::texts(&["Fine."]));
        let loop_ = session(provider).with_memory(mem.consolidator.clone());

        let events = loop_.run(SessionId::from("s1"), "hi").await;
        loop_.background().wait_idle().await;

        assert_eq!(
            events.last(),
            Some(&SessionEvent::FinalResponse {
                content: "Fine.".into()
            })
        );
        assert!(mem.memory.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn preamble_splices_recent_memory_and_experience() {
        let mem = memory(CONSOLIDATION_REPLY);
        let recent = MemoryEntry::new(
            SessionId::from("earlier"),
            SessionSummary {
                user_request: "quote ACME in EUR".into(),
                ..SessionSummary::default()
            },
            Duration::seconds(600),
        );
        let mut expired = MemoryEntry::new(
            SessionId::from("ancient"),
            SessionSummary {
                user_request: "long forgotten".into(),
                ..SessionSummary::default()
            },
            Duration::seconds(600),
        );
        expired.expires_at = Utc::now() - Duration::seconds(1);
        // Still live, but summarized before the recall window.
        let dusty = MemoryEntry::new(
            SessionId::from("dusty"),
            SessionSummary {
                user_request: "stale request".into(),
                timestamp: Utc::now() - Duration::minutes(20),
                ..SessionSummary::default()
            },
            Duration::seconds(600),
        );
        mem.memory.upsert(recent).await.unwrap();
        mem.memory.upsert(expired).await.unwrap();
        mem.memory.upsert(dusty).await.unwrap();
        mem.experience
            .append(agentloop_core::memory::ExperienceEntry {
                created_at: Utc::now(),
                task_type: "quote lookup".into(),
                execution_order: vec!["market_quote".into()],
                key_points: vec![],
                function_usage: Default::default(),
            })
            .await
            .unwrap();

        let provider = Arc::new(SequentialMockProvider::texts(&["ok"]));
        let loop_ = session(provider.clone()).with_memory(mem.consolidator.clone());
        loop_.run(SessionId::from("s2"), "and GLBX?").await;
        loop_.background().wait_idle().await;

        let system = &provider.requests()[0].messages[0].content;
        assert!(system.contains("## Recent Session Memory"));
        assert!(system.contains("quote ACME in EUR"));
        assert!(!system.contains("long forgotten"));
        assert!(!system.contains("stale request"));
        assert!(system.contains("## Past Experience"));
        assert!(system.contains("- task: quote lookup"));
    }

    #[tokio::test]
    async fn custom_instructions_replace_the_default() {
        let provider = Arc::new(SequentialMockProvider::texts(&["ok"]));
        session(provider.clone())
            .with_instructions("You are a terse trading assistant.")
            .run(SessionId::from("s1"), "hi")
            .await;

        let system = &provider.requests()[0].messages[0].content;
        assert!(system.starts_with("You are a terse trading assistant."));
        assert!(!system.contains(DEFAULT_INSTRUCTIONS));
    }

    #[test]
    fn from_config_applies_session_settings() {
        let mut config = AppConfig::default();
        config.session.max_iterations = 7;
        config.system_prompt = Some("Custom".into());
        let loop_ = SessionLoop::from_config(
            &config,
            Arc::new(SequentialMockProvider::texts(&[])),
            tools(),
            ModelLimiter::new(1),
        );
        assert_eq!(loop_.max_iterations(), 7);
        assert_eq!(loop_.instructions, "Custom");
        assert_eq!(loop_.max_tokens, Some(config.default_max_tokens));
    }
}
