//! Built-in tool sets for agentloop.
//!
//! Each module contributes a [`ToolSet`]; [`default_registry`] merges them
//! into the registry a session dispatches against.

pub mod market;
pub mod store;

use agentloop_core::tool::{ToolRegistry, ToolSet};

pub use store::{Record, RecordStore};

/// Every built-in tool set, in registration order.
pub fn builtin_sets(records: RecordStore) -> Vec<(&'static str, ToolSet)> {
    vec![("market", market::tool_set()), ("store", store::tool_set(records))]
}

/// Create a registry with all built-in tools over a sample record store.
pub fn default_registry() -> ToolRegistry {
    registry_with(RecordStore::with_samples())
}

/// Create a registry with all built-in tools over the given record store.
pub fn registry_with(records: RecordStore) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for (set_name, set) in builtin_sets(records) {
        tracing::debug!(set = set_name, tools = set.len(), "Registering tool set");
        registry.merge(set);
    }
    registry
}
