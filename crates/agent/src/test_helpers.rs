//! Shared test helpers for session and consolidation tests.

use agentloop_core::error::ProviderError;
use agentloop_core::message::Message;
use agentloop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::Mutex;

/// A mock provider that replies with a script of texts.
///
/// Each call returns the next reply in the script. Once the script runs out
/// every call fails, unless the provider was built with [`Self::repeating`].
pub struct SequentialMockProvider {
    replies: Vec<Result<String, ProviderError>>,
    repeat_last: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies,
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Scripted text replies.
    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    /// Returns the same reply forever.
    pub fn repeating(reply: &str) -> Self {
        Self {
            repeat_last: true,
            ..Self::texts(&[reply])
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };

        let reply = match self.replies.get(index) {
            Some(reply) => reply.clone(),
            None if self.repeat_last && !self.replies.is_empty() => {
                self.replies[self.replies.len() - 1].clone()
            }
            None => Err(ProviderError::ApiError {
                status_code: 500,
                message: format!("no scripted reply for call #{index}"),
            }),
        }?;

        Ok(make_text_response(&reply))
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// A tool-call reply for one tool, in a fenced block.
pub fn tool_call_reply(tool: &str, parameters: serde_json::Value) -> String {
    format!(
        "Let me check.\n```json\n{}\n```",
        serde_json::json!({ "tool_name": tool, "parameters": parameters })
    )
}
