//! # agentloop Core
//!
//! Domain types, traits, and error definitions for the agentloop
//! tool-calling engine. This crate has **zero framework dependencies**: it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model backend, tools, durable stores) is
//! defined as a trait here. Implementations live in their respective crates.
//! This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod limiter;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use limiter::ModelLimiter;
pub use memory::{ExperienceEntry, ExperienceStore, MemoryEntry, MemoryStore, SessionSummary};
pub use message::{Conversation, Message, Role, SessionId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use tool::{Tool, ToolCallDescriptor, ToolDefinition, ToolParameter, ToolRegistry, ToolResult, ToolSet};
