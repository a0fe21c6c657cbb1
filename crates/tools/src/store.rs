//! Record store tools: lookup and search over a shared in-process store.
//!
//! Both tools in the set hold the same [`RecordStore`], so records inserted
//! through one handle are visible to every tool built from it.

use async_trait::async_trait;
use agentloop_core::error::ToolError;
use agentloop_core::tool::{Tool, ToolParameter, ToolSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default number of search hits returned.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// One stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.category.to_lowercase().contains(needle)
            || self.notes.to_lowercase().contains(needle)
    }
}

/// Records keyed by id.
#[derive(Clone, Default)]
pub struct RecordStore {
    records: Arc<RwLock<BTreeMap<u64, Record>>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with a handful of sample records.
    pub fn with_samples() -> Self {
        let samples = [
            (1, "ACME Corp", "company", "Industrial supplier, ticker ACME"),
            (2, "Globex", "company", "Energy and utilities, ticker GLBX"),
            (3, "Initech", "company", "Enterprise software, ticker INIT"),
            (4, "Q3 revenue report", "document", "Quarterly revenue for ACME Corp"),
            (5, "Risk policy", "document", "Position limits and stop-loss rules"),
        ];
        let records = samples
            .into_iter()
            .map(|(id, name, category, notes)| {
                (
                    id,
                    Record {
                        id,
                        name: name.into(),
                        category: category.into(),
                        notes: notes.into(),
                        fields: BTreeMap::new(),
                    },
                )
            })
            .collect();
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    pub async fn insert(&self, record: Record) {
        self.records.write().await.insert(record.id, record);
    }

    pub async fn get(&self, id: u64) -> Option<Record> {
        self.records.read().await.get(&id).cloned()
    }

    /// Case-insensitive substring search over name, category and notes.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<Record> {
        let needle = query.trim().to_lowercase();
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.matches(&needle))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

/// The store tool set, sharing one record store.
pub fn tool_set(store: RecordStore) -> ToolSet {
    vec![
        Arc::new(RecordLookupTool::new(store.clone())),
        Arc::new(RecordSearchTool::new(store)),
    ]
}

pub struct RecordLookupTool {
    store: RecordStore,
}

impl RecordLookupTool {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for RecordLookupTool {
    fn name(&self) -> &str {
        "record_lookup"
    }

    fn description(&self) -> &str {
        "Fetch a single record from the record store by its numeric id."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required("id", "integer", "The record id")]
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let id = match arguments.get("id") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| ToolError::InvalidArguments("'id' must be a non-negative integer".into()))?;

        let record = self
            .store
            .get(id)
            .await
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("no record with id {id}"),
            })?;

        serde_json::to_value(record).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })
    }
}

pub struct RecordSearchTool {
    store: RecordStore,
}

impl RecordSearchTool {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for RecordSearchTool {
    fn name(&self) -> &str {
        "record_search"
    }

    fn description(&self) -> &str {
        "Search the record store by keyword. Matches record names, categories, and notes."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("query", "string", "Keyword to search for"),
            ToolParameter::optional("limit", "integer", "Maximum number of results (default 5)"),
        ]
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let limit = arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, 50);

        let hits = self.store.search(query, limit).await;
        Ok(serde_json::json!({
            "query": query,
            "count": hits.len(),
            "records": hits,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn lookup_finds_sample_record() {
        let tool = RecordLookupTool::new(RecordStore::with_samples());
        let out = tool.invoke(args(json!({"id": 1}))).await.unwrap();
        assert_eq!(out["name"], "ACME Corp");
    }

    #[tokio::test]
    async fn lookup_accepts_string_id() {
        let tool = RecordLookupTool::new(RecordStore::with_samples());
        let out = tool.invoke(args(json!({"id": "2"}))).await.unwrap();
        assert_eq!(out["name"], "Globex");
    }

    #[tokio::test]
    async fn lookup_missing_record_fails() {
        let tool = RecordLookupTool::new(RecordStore::with_samples());
        let err = tool.invoke(args(json!({"id": 999}))).await.unwrap_err();
        assert!(err.to_string().contains("no record with id 999"));
    }

    #[tokio::test]
    async fn lookup_rejects_non_integer_id() {
        let tool = RecordLookupTool::new(RecordStore::with_samples());
        let err = tool.invoke(args(json!({"id": "abc"}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let tool = RecordSearchTool::new(RecordStore::with_samples());
        let out = tool.invoke(args(json!({"query": "acme"}))).await.unwrap();
        assert_eq!(out["count"], 2);
    }

    #[tokio::test]
    async fn search_respects_limit() {
        let tool = RecordSearchTool::new(RecordStore::with_samples());
        let out = tool
            .invoke(args(json!({"query": "company", "limit": 2})))
            .await
            .unwrap();
        assert_eq!(out["records"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn search_requires_query() {
        let tool = RecordSearchTool::new(RecordStore::with_samples());
        assert!(tool.invoke(args(json!({"query": "  "}))).await.is_err());
        assert!(tool.invoke(Map::new()).await.is_err());
    }

    #[tokio::test]
    async fn tools_share_one_store() {
        let store = RecordStore::new();
        let set = tool_set(store.clone());
        store
            .insert(Record {
                id: 42,
                name: "Umbrella".into(),
                category: "company".into(),
                notes: String::new(),
                fields: BTreeMap::new(),
            })
            .await;

        let lookup = set.iter().find(|t| t.name() == "record_lookup").unwrap();
        let out = lookup.invoke(args(json!({"id": 42}))).await.unwrap();
        assert_eq!(out["name"], "Umbrella");
        assert_eq!(store.len().await, 1);
    }
}
