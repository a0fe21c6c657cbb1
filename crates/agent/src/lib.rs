//! The session engine: the heart of agentloop.
//!
//! A session follows a **Think → Call tools → Feed back** cycle:
//!
//! 1. **Recall** recent session memory and past experience
//! 2. **Send** the transcript to the model and wait for the full reply
//! 3. **Extract** tool calls from the reply text
//! 4. **If tool calls**: dispatch the round concurrently, feed the results
//!    back as a user message, loop back to step 2
//! 5. **If plain text**: emit it as the final response
//!
//! The loop ends at the first plain-text reply or when the iteration limit
//! is reached. Finished sessions are consolidated into memory in the
//! background; rounds with tool errors and failed sessions also feed the
//! experience log.

pub mod background;
pub mod consolidation;
pub mod context;
pub mod dispatcher;
pub mod extract;
pub mod session;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use background::BackgroundTasks;
pub use consolidation::{ConsolidationOutcome, Consolidator, Recall};
pub use dispatcher::{dispatch, round_had_errors};
pub use extract::{Extraction, extract, find_json_object};
pub use session::SessionLoop;
pub use stream_event::{SessionEvent, SessionStream};
