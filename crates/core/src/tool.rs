//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! query a record store, fetch market data, and so on. Each tool declares its
//! parameters up front; the dispatcher uses that declaration to drop any
//! argument the model invented.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ToolError;

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDescriptor {
    /// Name of the tool to execute
    pub tool_name: String,

    /// Arguments exactly as the model wrote them
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ToolCallDescriptor {
    pub fn new(tool_name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// The outcome of one descriptor in a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The tool that was requested
    pub tool_name: String,

    /// Parameters as requested, before filtering
    pub parameters: Map<String, Value>,

    /// Tool output, or an error string when the call failed
    pub result: Value,
}

impl ToolResult {
    /// Textual form of the result: strings verbatim, anything else as JSON.
    pub fn result_text(&self) -> String {
        match &self.result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// The line fed back to the model for this result.
    pub fn feedback_line(&self) -> String {
        format!("{} execution result: {}", self.tool_name, self.result_text())
    }
}

/// A declared tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Argument name
    pub name: String,

    /// JSON Schema type ("string", "integer", "number", "boolean", "object", "array")
    #[serde(rename = "type")]
    pub kind: String,

    /// Shown to the model
    pub description: String,

    /// Whether the model must supply it
    #[serde(default)]
    pub required: bool,
}

impl ToolParameter {
    pub fn required(name: &str, kind: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: &str, kind: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// A tool definition rendered into the system instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: Value,
}

/// The core Tool trait.
///
/// Tools may block on network or storage I/O; the dispatcher runs every call
/// of a round on its own task.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "market_quote").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// The parameters this tool accepts.
    fn parameters(&self) -> Vec<ToolParameter>;

    /// Run the tool. `arguments` only ever contains declared parameter names.
    async fn invoke(&self, arguments: Map<String, Value>) -> std::result::Result<Value, ToolError>;

    /// JSON Schema derived from [`Tool::parameters`].
    fn parameters_schema(&self) -> Value {
        let params = self.parameters();
        let properties: Map<String, Value> = params
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({ "type": p.kind, "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Convert this tool into a ToolDefinition for the system instructions.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Keep only the arguments a tool declares.
pub fn filter_arguments(tool: &dyn Tool, requested: &Map<String, Value>) -> Map<String, Value> {
    let declared = tool.parameters();
    let filtered: Map<String, Value> = requested
        .iter()
        .filter(|(key, _)| declared.iter().any(|p| &p.name == *key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if filtered.len() < requested.len() {
        debug!(
            tool = tool.name(),
            dropped = requested.len() - filtered.len(),
            "Dropped undeclared tool arguments"
        );
    }
    filtered
}

/// A named group of tools contributed by one module.
pub type ToolSet = Vec<Arc<dyn Tool>>;

/// A registry of available tools.
///
/// Built once at startup by merging tool sets, then shared read-only.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. A later registration replaces an earlier one of the
    /// same name and is logged.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Tool registered twice, later registration overrides");
        }
    }

    /// Register every tool in a set.
    pub fn merge(&mut self, set: ToolSet) {
        for tool in set {
            self.register(tool);
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get all tool definitions (for the system instructions).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
