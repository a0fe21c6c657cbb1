//! Tool dispatcher: runs one round of tool calls concurrently.
//!
//! Every descriptor in a round gets its own task, so a slow tool never holds
//! up its siblings and a panicking tool only takes down its own task. Results
//! come back in the same order as the descriptors.

use agentloop_core::error::ToolError;
use agentloop_core::tool::{ToolCallDescriptor, ToolRegistry, ToolResult, filter_arguments};
use futures::future::join_all;
use serde_json::Value;
use std::any::Any;
use tracing::{debug, warn};

/// Substrings that mark a tool result as an error, matched case-insensitively.
const ERROR_MARKERS: [&str; 3] = ["error", "failed", "exception"];

/// Run every descriptor of a round and collect one result per descriptor.
pub async fn dispatch(registry: &ToolRegistry, round: Vec<ToolCallDescriptor>) -> Vec<ToolResult> {
    debug!(calls = round.len(), "Dispatching tool round");

    let calls = round.into_iter().map(|call| {
        let tool = registry.get(&call.tool_name);
        async move {
            let result = match tool {
                Some(tool) => {
                    let arguments = filter_arguments(tool.as_ref(), &call.parameters);
                    let handle = tokio::spawn(async move { tool.invoke(arguments).await });
                    match handle.await {
                        Ok(Ok(value)) => value,
                        Ok(Err(e)) => failure(&call.tool_name, &e),
                        Err(join_error) => {
                            let reason = if join_error.is_panic() {
                                panic_message(join_error.into_panic())
                            } else {
                                "task cancelled".to_string()
                            };
                            failure(&call.tool_name, &ToolError::Panicked(reason))
                        }
                    }
                }
                None => {
                    warn!(tool = %call.tool_name, "Model requested an unknown tool");
                    failure(&call.tool_name, &ToolError::NotFound(call.tool_name.clone()))
                }
            };
            ToolResult {
                tool_name: call.tool_name,
                parameters: call.parameters,
                result,
            }
        }
    });

    join_all(calls).await
}

/// Whether any result of a round reads like an error.
pub fn round_had_errors(results: &[ToolResult]) -> bool {
    results.iter().any(|r| {
        let text = r.result_text().to_lowercase();
        ERROR_MARKERS.iter().any(|marker| text.contains(marker))
    })
}

fn failure(tool_name: &str, error: &ToolError) -> Value {
    warn!(tool = %tool_name, error = %error, "Tool call failed");
    Value::String(format!("Error calling {tool_name}: {error}"))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
