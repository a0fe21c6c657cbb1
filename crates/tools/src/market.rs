//! Market data tools: deterministic quotes and price history.
//!
//! These stand in for a market data feed. Prices are derived from a hash of
//! the symbol so the same symbol always yields the same numbers, which keeps
//! sessions reproducible without network access.

use async_trait::async_trait;
use agentloop_core::error::ToolError;
use agentloop_core::tool::{Tool, ToolParameter, ToolSet};
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Longest history a single call may request.
pub const MAX_HISTORY_DAYS: u64 = 90;

/// The market tool set.
pub fn tool_set() -> ToolSet {
    vec![Arc::new(MarketQuoteTool), Arc::new(MarketHistoryTool)]
}

pub struct MarketQuoteTool;

#[async_trait]
impl Tool for MarketQuoteTool {
    fn name(&self) -> &str {
        "market_quote"
    }

    fn description(&self) -> &str {
        "Get the latest quote for a ticker symbol. Returns price, change, change percent, and volume."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required(
            "symbol",
            "string",
            "Ticker symbol, e.g. ACME",
        )]
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let symbol = symbol_argument(&arguments)?;
        let quote = generate_quote(&symbol);
        serde_json::to_value(&quote).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })
    }
}

pub struct MarketHistoryTool;

#[async_trait]
impl Tool for MarketHistoryTool {
    fn name(&self) -> &str {
        "market_history"
    }

    fn description(&self) -> &str {
        "Get daily closing prices for a ticker symbol over the last N days, oldest first."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("symbol", "string", "Ticker symbol, e.g. ACME"),
            ToolParameter::optional(
                "days",
                "integer",
                "Number of trading days to return (default 5, max 90)",
            ),
        ]
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let symbol = symbol_argument(&arguments)?;
        let days = match arguments.get("days") {
            None | Some(Value::Null) => 5,
            Some(v) => integer_like(v).ok_or_else(|| {
                ToolError::InvalidArguments("'days' must be a positive integer".into())
            })?,
        };
        if days == 0 || days > MAX_HISTORY_DAYS {
            return Err(ToolError::InvalidArguments(format!(
                "'days' must be between 1 and {MAX_HISTORY_DAYS}"
            )));
        }

        let history = generate_history(&symbol, days);
        serde_json::to_value(&history).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })
    }
}

/// Models often quote numbers; accept `5` and `"5"` alike.
fn integer_like(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn symbol_argument(arguments: &Map<String, Value>) -> Result<String, ToolError> {
    let symbol = arguments
        .get("symbol")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_uppercase())
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'symbol' argument".into()))?;
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
        return Err(ToolError::InvalidArguments(format!(
            "Unknown symbol format: {symbol:?}"
        )));
    }
    Ok(symbol)
}

#[derive(Debug, Serialize)]
struct Quote {
    symbol: String,
    price: f64,
    change: f64,
    change_percent: f64,
    volume: u64,
    currency: &'static str,
}

#[derive(Debug, Serialize)]
struct DailyClose {
    date: String,
    close: f64,
}

#[derive(Debug, Serialize)]
struct History {
    symbol: String,
    closes: Vec<DailyClose>,
}

fn symbol_hash(symbol: &str) -> u32 {
    symbol
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Base price between 10 and 510.
fn base_price(hash: u32) -> f64 {
    10.0 + (hash % 50_000) as f64 / 100.0
}

/// Day-over-day move in the range -3%..+3%.
fn daily_move(hash: u32, day: u64) -> f64 {
    let mixed = hash.wrapping_add((day as u32).wrapping_mul(2_654_435_761));
    ((mixed % 601) as f64 - 300.0) / 10_000.0
}

fn generate_quote(symbol: &str) -> Quote {
    let hash = symbol_hash(symbol);
    let price = base_price(hash);
    let previous = price / (1.0 + daily_move(hash, 0));
    let change = price - previous;

    Quote {
        symbol: symbol.to_string(),
        price: round2(price),
        change: round2(change),
        change_percent: round2(change / previous * 100.0),
        volume: 100_000 + (hash as u64 % 9_900_000),
        currency: "USD",
    }
}

fn generate_history(symbol: &str, days: u64) -> History {
    let hash = symbol_hash(symbol);
    let today = Utc::now().date_naive();

    // Walk backwards from today's price, then reverse to oldest first.
    let mut price = base_price(hash);
    let mut closes = Vec::with_capacity(days as usize);
    for offset in 0..days {
        closes.push(DailyClose {
            date: (today - Duration::days(offset as i64)).to_string(),
            close: round2(price),
        });
        price /= 1.0 + daily_move(hash, offset);
    }
    closes.reverse();

    History {
        symbol: symbol.to_string(),
        closes,
    }
}
