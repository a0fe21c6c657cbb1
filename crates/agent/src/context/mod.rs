//! System instruction assembly.
//!
//! The instructions a session starts with are built from up to four layers,
//! in this order:
//!
//! | Layer | Source | Present when |
//! |-------|--------|--------------|
//! | 1. Base instructions | Config override or built-in text | Always |
//! | 2. Tool catalog | Tool registry | At least one tool registered |
//! | 3. Recent session memory | Memory store | Memory enabled and entries in the window |
//! | 4. Past experience | Experience store | Memory enabled and entries exist |

pub mod prompt;

pub use prompt::{
    DEFAULT_INSTRUCTIONS, build_system_prompt, experience_digest, memory_digest, tool_catalog,
};
