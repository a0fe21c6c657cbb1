//! Session events: the only output channel of a session.
//!
//! A session emits `initializing`, then alternating `thinking` / `tool_call`
//! events, and ends with exactly one terminal event:
//! - `final_response`: the model answered without calling tools
//! - `max_iterations_reached`: the iteration bound was hit
//! - `error`: a model call failed or the session task faulted

use agentloop_core::message::SessionId;
use agentloop_core::tool::ToolResult;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Events emitted by a session, in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session is loading memory and building its instructions.
    Initializing { session_id: SessionId },

    /// A model call for this iteration is about to be made.
    Thinking { iteration: u32 },

    /// The model requested tools and the round has run.
    ToolCall {
        iteration: u32,
        /// Reply text outside the tool-call payload
        text_part: String,
        results: Vec<ToolResult>,
        had_errors: bool,
        /// The model reply exactly as received
        raw_text: String,
    },

    /// The model answered without requesting tools.
    FinalResponse { content: String },

    /// The session ran out of iterations.
    MaxIterationsReached { limit: u32 },

    /// The session failed. The message is safe to show to a user.
    Error { message: String },
}

impl SessionEvent {
    /// Wire name of this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Initializing { .. } => "initializing",
            Self::Thinking { .. } => "thinking",
            Self::ToolCall { .. } => "tool_call",
            Self::FinalResponse { .. } => "final_response",
            Self::MaxIterationsReached { .. } => "max_iterations_reached",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FinalResponse { .. } | Self::MaxIterationsReached { .. } | Self::Error { .. }
        )
    }
}

/// The receiving end of a running session.
pub struct SessionStream {
    rx: mpsc::Receiver<SessionEvent>,
}

impl SessionStream {
    pub(crate) fn new(rx: mpsc::Receiver<SessionEvent>) -> Self {
        Self { rx }
    }

    /// The next event, or `None` once the session has ended.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Drain every event up to and including the terminal one.
    pub async fn collect_all(mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    /// Adapt into a `futures::Stream`.
    pub fn into_stream(self) -> ReceiverStream<SessionEvent> {
        ReceiverStream::new(self.rx)
    }
}
