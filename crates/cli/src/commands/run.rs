//! `agentloop run`: one session for one message.

use agentloop_agent::{Consolidator, SessionEvent, SessionLoop};
use agentloop_config::AppConfig;
use agentloop_core::limiter::ModelLimiter;
use agentloop_core::message::SessionId;
use agentloop_core::provider::Provider;
use chrono::Duration;
use std::sync::Arc;

pub async fn run(
    message: String,
    session: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENROUTER_API_KEY=sk-or-v1-...   (recommended)");
        eprintln!("    OPENAI_API_KEY=sk-...             (for OpenAI direct)");
        eprintln!("    AGENTLOOP_API_KEY=sk-...          (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = agentloop_providers::router::build_from_config(&config);
    let provider = router.default()?;

    let limiter = ModelLimiter::new(config.limits.model_permits);
    let tools = Arc::new(agentloop_tools::default_registry());
    let mut session_loop =
        SessionLoop::from_config(&config, provider.clone(), tools, limiter.clone());
    if config.memory.enabled {
        session_loop = session_loop.with_memory(Arc::new(consolidator(&config, provider, limiter)));
    }

    let session_id = session.map(SessionId).unwrap_or_default();
    tracing::debug!(session = %session_id, model = %config.default_model, "Starting session");

    let mut stream = session_loop.start(session_id, message);
    let mut failure = None;
    while let Some(event) = stream.next().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            print_event(&event);
        }
        if let SessionEvent::Error { message } = &event {
            failure = Some(message.clone());
        }
    }

    // Consolidation outlives the session; wait so nothing is lost on exit.
    session_loop.background().wait_idle().await;

    match failure {
        Some(message) => Err(message.into()),
        None => Ok(()),
    }
}

/// The consolidator configured by `[memory]`.
fn consolidator(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    limiter: ModelLimiter,
) -> Consolidator {
    let stores = agentloop_memory::open_stores(&config.memory);
    Consolidator::new(
        provider,
        config.default_model.clone(),
        limiter,
        stores.memory,
        stores.experience,
    )
    .with_ttl(seconds(config.memory.ttl_secs))
    .with_recent_window(seconds(config.memory.recent_window_secs))
    .with_experience_recall(config.memory.experience_recall)
}

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Initializing { session_id } => {
            eprintln!("  session {session_id}");
        }
        SessionEvent::Thinking { iteration } => {
            eprintln!("  [{iteration}] thinking...");
        }
        SessionEvent::ToolCall {
            iteration,
            text_part,
            results,
            ..
        } => {
            if !text_part.is_empty() {
                eprintln!("  [{iteration}] {text_part}");
            }
            for result in results {
                let params = serde_json::Value::Object(result.parameters.clone());
                eprintln!(
                    "  [{iteration}] {}({params}) -> {}",
                    result.tool_name,
                    truncate(&result.result_text(), 160)
                );
            }
        }
        SessionEvent::FinalResponse { content } => {
            println!("{content}");
        }
        SessionEvent::MaxIterationsReached { limit } => {
            eprintln!("  Stopped after {limit} turns without a final answer.");
        }
        SessionEvent::Error { message } => {
            eprintln!("  Session failed: {message}");
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
