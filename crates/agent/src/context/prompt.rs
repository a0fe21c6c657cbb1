//! Prompt text for sessions: base instructions, tool catalog and digests.

use agentloop_core::memory::{ExperienceEntry, MemoryEntry};
use agentloop_core::tool::ToolRegistry;
use std::fmt::Write;

/// Built-in base instructions, used unless config supplies its own.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a careful assistant that can call tools to \
get facts before answering. Only call tools that are listed below. When you have what you \
need, answer the user in plain text without any JSON.";

const CALL_FORMAT: &str = r#"To call a tool, reply with a JSON object in a ```json fenced block:

```json
{"tool_name": "<name>", "parameters": {"<arg>": <value>}}
```

To call several tools at once:

```json
{"tool_calls": [{"tool_name": "<name>", "parameters": {...}}, {"tool_name": "<name>", "parameters": {...}}]}
```

Each tool result comes back to you as "<tool_name> execution result: <result>"."#;

/// Assemble the full system instructions for a session.
pub fn build_system_prompt(
    base: &str,
    tools: &ToolRegistry,
    memories: &[MemoryEntry],
    experiences: &[ExperienceEntry],
) -> String {
    let mut prompt = base.trim().to_string();
    for section in [
        tool_catalog(tools),
        memory_digest(memories),
        experience_digest(experiences),
    ] {
        if !section.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&section);
        }
    }
    prompt
}

/// Every registered tool with its parameters, plus the reply format.
pub fn tool_catalog(tools: &ToolRegistry) -> String {
    if tools.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Available Tools\n");
    for def in tools.definitions() {
        let _ = writeln!(out, "\n### {}\n{}", def.name, def.description);
        let _ = writeln!(out, "Parameters: {}", def.parameters);
    }
    out.push('\n');
    out.push_str(CALL_FORMAT);
    out
}

/// Recent session summaries, newest first. Entries are expected pre-sorted.
pub fn memory_digest(memories: &[MemoryEntry]) -> String {
    if memories.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Recent Session Memory\n");
    for entry in memories {
        let s = &entry.summary;
        let mut parts = vec![format!("request: {}", s.user_request)];
        if !s.completed_tasks.is_empty() {
            parts.push(format!("done: {}", s.completed_tasks.join(", ")));
        }
        if !s.important_info.is_empty() {
            parts.push(format!("info: {}", s.important_info.join(", ")));
        }
        if !s.user_preferences.is_empty() {
            let prefs: Vec<String> = s
                .user_preferences
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            parts.push(format!("preferences: {}", prefs.join(", ")));
        }
        if !s.pending_tasks.is_empty() {
            parts.push(format!("pending: {}", s.pending_tasks.join(", ")));
        }
        let _ = writeln!(
            out,
            "- [{}] {}",
            s.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            parts.join("; ")
        );
    }
    out.trim_end().to_string()
}

/// Lessons from earlier sessions that went wrong.
pub fn experience_digest(experiences: &[ExperienceEntry]) -> String {
    if experiences.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Past Experience\n");
    for e in experiences {
        let _ = writeln!(out, "- task: {}", e.task_type);
        if !e.execution_order.is_empty() {
            let _ = writeln!(out, "  order: {}", e.execution_order.join(" -> "));
        }
        if !e.key_points.is_empty() {
            let _ = writeln!(out, "  key points: {}", e.key_points.join("; "));
        }
        if !e.function_usage.is_empty() {
            let usage: Vec<String> = e
                .function_usage
                .iter()
                .map(|(tool, advice)| format!("{tool}: {advice}"))
                .collect();
            let _ = writeln!(out, "  usage: {}", usage.join("; "));
        }
    }
    out.trim_end().to_string()
}
