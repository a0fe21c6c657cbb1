//! End-to-end tests for agentloop sessions.
//!
//! These run the full pipeline the `run` command wires up: built-in tools,
//! the session loop, and file-backed memory, against a scripted model.

use std::sync::{Arc, Mutex};

use agentloop_agent::{Consolidator, SessionEvent, SessionLoop};
use agentloop_config::{AppConfig, MemoryConfig};
use agentloop_core::error::ProviderError;
use agentloop_core::limiter::ModelLimiter;
use agentloop_core::message::{Message, Role, SessionId};
use agentloop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use agentloop_memory::open_stores;
use agentloop_tools::default_registry;
use serde_json::json;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted replies in sequence.
///
/// The last reply repeats once the script runs out.
struct ScriptedProvider {
    replies: Vec<String>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        let text = self
            .replies
            .get(index)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default();
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        })
    }
}

fn tool_call(tool: &str, parameters: serde_json::Value) -> String {
    format!(
        "Let me look that up.\n```json\n{}\n```",
        json!({ "tool_name": tool, "parameters": parameters })
    )
}

fn session(provider: Arc<ScriptedProvider>) -> SessionLoop {
    SessionLoop::from_config(
        &AppConfig::default(),
        provider,
        Arc::new(default_registry()),
        ModelLimiter::new(2),
    )
}

fn file_memory(dir: &std::path::Path) -> MemoryConfig {
    MemoryConfig {
        dir: Some(dir.to_path_buf()),
        ..MemoryConfig::default()
    }
}

fn consolidator(
    memory: &MemoryConfig,
    provider: Arc<ScriptedProvider>,
    limiter: ModelLimiter,
) -> Arc<Consolidator> {
    let stores = open_stores(memory);
    Arc::new(Consolidator::new(
        provider,
        "mock-model",
        limiter,
        stores.memory,
        stores.experience,
    ))
}

const SUMMARY: &str = r#"{"user_request": "quote ACME", "completed_tasks": ["fetched ACME quote"],
"important_info": [], "user_preferences": {"currency": "USD"}, "pending_tasks": []}"#;

const LESSON: &str = r#"Here is the analysis:
{"task_type": "market lookup", "execution_order": ["market_quote"],
 "key_points": ["use a plain ticker symbol"], "function_usage": {"market_quote": "symbol only"}}"#;

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn quote_round_then_answer() {
    let provider = ScriptedProvider::new(&[
        &tool_call("market_quote", json!({"symbol": "ACME"})),
        "ACME is trading near its recent range.",
    ]);
    let events = session(provider.clone())
        .run(SessionId::from("e2e-quote"), "What is ACME trading at?")
        .await;

    let kinds: Vec<&str> = events.iter().map(SessionEvent::event_type).collect();
    assert_eq!(
        kinds,
        vec!["initializing", "thinking", "tool_call", "thinking", "final_response"]
    );

    let SessionEvent::ToolCall {
        results,
        had_errors,
        text_part,
        ..
    } = &events[2]
    else {
        panic!("expected a tool_call event, got {:?}", events[2]);
    };
    assert!(!had_errors);
    assert_eq!(text_part, "Let me look that up.");
    assert_eq!(results[0].tool_name, "market_quote");
    assert_eq!(results[0].result["symbol"], "ACME");

    // The second turn sees the tool feedback as a user message.
    let second = provider.request(1);
    let feedback = second.messages.last().unwrap();
    assert_eq!(feedback.role, Role::User);
    assert!(feedback.content.starts_with("market_quote execution result: "));

    // The system prompt lists every built-in tool.
    let system = &second.messages[0];
    assert_eq!(system.role, Role::System);
    for name in ["market_quote", "market_history", "record_lookup", "record_search"] {
        assert!(system.content.contains(&format!("### {name}")), "missing {name}");
    }
}

#[tokio::test]
async fn parallel_calls_in_one_reply() {
    let reply = r#"```json
{"tool_calls": [
  {"tool_name": "record_search", "parameters": {"query": "ACME"}},
  {"tool_name": "market_history", "parameters": {"symbol": "ACME", "days": "3"}}
]}
```"#;
    let provider = ScriptedProvider::new(&[reply, "Done."]);
    let events = session(provider)
        .run(SessionId::from("e2e-parallel"), "Research ACME")
        .await;

    let SessionEvent::ToolCall { results, .. } = &events[2] else {
        panic!("expected a tool_call event");
    };
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].tool_name, "record_search");
    assert_eq!(results[1].tool_name, "market_history");
    assert_eq!(results[1].result["closes"].as_array().unwrap().len(), 3);
    assert!(matches!(
        events.last(),
        Some(SessionEvent::FinalResponse { content }) if content == "Done."
    ));
}

#[tokio::test]
async fn unknown_tool_is_reported_and_session_continues() {
    let provider = ScriptedProvider::new(&[
        &tool_call("wire_transfer", json!({"amount": 10})),
        "I can't do that.",
    ]);
    let events = session(provider)
        .run(SessionId::from("e2e-unknown"), "Send money")
        .await;

    let SessionEvent::ToolCall {
        results,
        had_errors,
        ..
    } = &events[2]
    else {
        panic!("expected a tool_call event");
    };
    assert!(had_errors);
    assert_eq!(
        results[0].result,
        json!("Error calling wire_transfer: Tool not found: wire_transfer")
    );
    assert!(events.last().unwrap().is_terminal());
}

#[tokio::test]
async fn session_stops_at_max_iterations() {
    let provider = ScriptedProvider::new(&[&tool_call("market_quote", json!({"symbol": "ACME"}))]);
    let events = session(provider.clone())
        .with_max_iterations(3)
        .run(SessionId::from("e2e-loop"), "Keep checking")
        .await;

    assert_eq!(provider.calls(), 3);
    let tool_rounds = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::ToolCall { .. }))
        .count();
    assert_eq!(tool_rounds, 3);
    assert!(matches!(
        events.last(),
        Some(SessionEvent::MaxIterationsReached { limit: 3 })
    ));
}

#[tokio::test]
async fn memory_persists_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let memory = file_memory(dir.path());
    let limiter = ModelLimiter::new(2);

    let first = ScriptedProvider::new(&[
        &tool_call("market_quote", json!({"symbol": "ACME"})),
        "ACME looks steady.",
    ]);
    let summarizer = ScriptedProvider::new(&[SUMMARY]);
    let loop_ = session(first).with_memory(consolidator(&memory, summarizer.clone(), limiter.clone()));
    let id = SessionId::from("e2e-memory");
    loop_.run(id.clone(), "Quote ACME for me").await;
    loop_.background().wait_idle().await;
    assert_eq!(summarizer.calls(), 1);

    // A fresh process: new stores over the same directory.
    let second = ScriptedProvider::new(&["Welcome back."]);
    let loop_ = session(second.clone()).with_memory(consolidator(
        &memory,
        ScriptedProvider::new(&[SUMMARY]),
        limiter,
    ));
    loop_.run(id.clone(), "Anything new?").await;
    loop_.background().wait_idle().await;

    let system = &second.request(0).messages[0].content;
    assert!(system.contains("## Recent Session Memory"));
    assert!(system.contains("request: quote ACME"));
    assert!(system.contains("preferences: currency=USD"));

    let stores = open_stores(&memory);
    let entry = stores.memory.get(&id).await.unwrap().unwrap();
    assert_eq!(entry.summary.completed_tasks, vec!["fetched ACME quote"]);
}

#[tokio::test]
async fn failed_round_records_experience() {
    let dir = tempfile::tempdir().unwrap();
    let memory = file_memory(dir.path());

    let provider = ScriptedProvider::new(&[
        &tool_call("market_quote", json!({"symbol": "not a ticker!"})),
        "Sorry, that symbol is invalid.",
    ]);
    let analyst = ScriptedProvider::new(&[LESSON]);
    let loop_ = session(provider).with_memory(consolidator(&memory, analyst, ModelLimiter::new(2)));
    let events = loop_.run(SessionId::from("e2e-lesson"), "Quote it").await;
    loop_.background().wait_idle().await;
    assert!(matches!(events[2], SessionEvent::ToolCall { had_errors: true, .. }));

    let stores = open_stores(&memory);
    let lessons = stores.experience.all().await.unwrap();
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0].task_type, "market lookup");
    assert_eq!(lessons[0].function_usage["market_quote"], "symbol only");
}

#[tokio::test]
async fn events_serialize_as_tagged_json() {
    let provider = ScriptedProvider::new(&["Plain answer."]);
    let events = session(provider)
        .run(SessionId::from("e2e-json"), "Hi")
        .await;

    let lines: Vec<serde_json::Value> = events
        .iter()
        .map(|e| serde_json::to_value(e).unwrap())
        .collect();
    assert_eq!(lines[0]["type"], "initializing");
    assert_eq!(lines[0]["session_id"], "e2e-json");
    assert_eq!(lines.last().unwrap()["type"], "final_response");
    assert_eq!(lines.last().unwrap()["content"], "Plain answer.");
}
