//! Extraction engine: turns one raw model reply into prose plus tool calls.
//!
//! Three strategies look for JSON object candidates in the same text:
//!
//! 1. **Fenced blocks** (```` ```json ... ``` ````), parsed directly and then
//!    through [`repair`] if that fails.
//! 2. **Balanced braces** anywhere in the text, parsed directly only. Prose
//!    with braces in it is never repaired into data.
//! 3. **The whole trimmed text**, parsed directly and then through [`repair`].
//!
//! The candidate with the longest compact serialization wins; among equal
//! lengths the first one found wins, so a fenced block beats the same object
//! found again by the brace scan. The winner's original span is cut out of
//! the text to form the remainder.

use agentloop_core::tool::ToolCallDescriptor;
use regex_lite::Regex;
use serde_json::{Map, Value};
use std::ops::Range;
use std::sync::LazyLock;
use tracing::debug;

/// Deepest object nesting the brace scan follows before giving up on a span.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Bytes the brace scan may walk per byte of input before it stops looking.
const SCAN_BUDGET_PER_BYTE: usize = 16;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[\w-]*(.*?)```").unwrap());

static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// The result of running extraction over one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// The reply with the tool-call payload cut out, trimmed.
    pub remainder: String,

    /// Requested tool calls, in the order the model wrote them.
    pub calls: Vec<ToolCallDescriptor>,

    /// True iff `calls` is non-empty.
    pub had_tool_calls: bool,
}

impl Extraction {
    fn plain(raw_text: &str) -> Self {
        Self {
            remainder: raw_text.trim().to_string(),
            calls: Vec::new(),
            had_tool_calls: false,
        }
    }
}

/// A successfully parsed JSON object and where it came from.
#[derive(Debug, Clone)]
struct Candidate {
    object: Map<String, Value>,
    span: Range<usize>,
    weight: usize,
}

impl Candidate {
    fn parse(text: &str, span: Range<usize>, allow_repair: bool) -> Option<Self> {
        let object = parse_object(text).or_else(|| {
            if allow_repair {
                parse_object(&repair(text))
            } else {
                None
            }
        })?;
        let weight = Value::Object(object.clone()).to_string().len();
        Some(Self {
            object,
            span,
            weight,
        })
    }
}

/// Split a raw model reply into remainder text and tool-call descriptors.
pub fn extract(raw_text: &str) -> Extraction {
    let Some(winner) = best_candidate(raw_text) else {
        return Extraction::plain(raw_text);
    };

    let calls = normalize(&winner.object);
    if calls.is_empty() {
        // A JSON object that is not a tool-call payload stays in the text.
        debug!("Reply contained JSON that is not a tool call, keeping it as text");
        return Extraction::plain(raw_text);
    }

    let mut remainder = String::with_capacity(raw_text.len());
    remainder.push_str(&raw_text[..winner.span.start]);
    remainder.push_str(&raw_text[winner.span.end..]);

    Extraction {
        remainder: remainder.trim().to_string(),
        had_tool_calls: true,
        calls,
    }
}

/// The most informative JSON object in `raw_text`, if any.
///
/// Used wherever a model is asked to answer in JSON but may wrap the answer
/// in prose or a fenced block.
pub fn find_json_object(raw_text: &str) -> Option<Map<String, Value>> {
    best_candidate(raw_text).map(|c| c.object)
}

fn best_candidate(raw_text: &str) -> Option<Candidate> {
    if raw_text.trim().is_empty() {
        return None;
    }

    let mut candidates = fenced_candidates(raw_text);
    candidates.extend(balanced_candidates(raw_text));
    candidates.extend(whole_text_candidate(raw_text));

    // Strictly-greater keeps the earliest candidate on ties.
    candidates.into_iter().fold(None, |best, c| match best {
        Some(b) if b.weight >= c.weight => Some(b),
        _ => Some(c),
    })
}

fn fenced_candidates(raw_text: &str) -> Vec<Candidate> {
    FENCED_BLOCK
        .captures_iter(raw_text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1)?.as_str().trim();
            Candidate::parse(inner, whole.range(), true)
        })
        .collect()
}

fn whole_text_candidate(raw_text: &str) -> Option<Candidate> {
    let trimmed = raw_text.trim();
    let start = raw_text.len() - raw_text.trim_start().len();
    Candidate::parse(trimmed, start..start + trimmed.len(), true)
}

fn balanced_candidates(raw_text: &str) -> Vec<Candidate> {
    let bytes = raw_text.as_bytes();
    let mut found = Vec::new();
    let mut pos = 0;
    let mut budget = bytes.len().saturating_mul(SCAN_BUDGET_PER_BYTE);

    while let Some(offset) = bytes[pos..].iter().position(|&b| b == b'{') {
        let start = pos + offset;
        match balanced_end(bytes, start) {
            Ok(end) => {
                if let Some(c) = Candidate::parse(&raw_text[start..end], start..end, false) {
                    found.push(c);
                }
                // Spans never overlap.
                pos = end;
            }
            Err(stopped) => {
                // An unterminated quote makes every later start rescan the tail.
                budget = budget.saturating_sub(stopped - start);
                if budget == 0 {
                    debug!(scanned_from = start, "Brace scan budget exhausted");
                    break;
                }
                pos = start + 1;
            }
        }
    }
    found
}

/// End (exclusive) of the object opening at `start`, honoring string literals.
///
/// On failure, returns where the scan stopped.
fn balanced_end(bytes: &[u8], start: usize) -> Result<usize, usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    return Err(i);
                }
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i + 1);
                }
            }
            _ => {}
        }
    }
    Err(bytes.len())
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Best-effort fixes for the usual ways models break JSON.
///
/// Wraps the text in braces if they are missing, turns single quotes into
/// double quotes and drops trailing commas before `}` or `]`.
pub fn repair(text: &str) -> String {
    let mut fixed = text.trim().to_string();
    if !fixed.starts_with('{') {
        fixed.insert(0, '{');
    }
    if !fixed.ends_with('}') {
        fixed.push('}');
    }
    let fixed = fixed.replace('\'', "\"");
    TRAILING_COMMA.replace_all(&fixed, "$1").into_owned()
}

/// Turn a payload object into descriptors.
///
/// `{"tool_calls": [...]}` is a batch; `{"tool_name": ..., "parameters": ...}`
/// is a single call. Anything else yields no calls.
fn normalize(payload: &Map<String, Value>) -> Vec<ToolCallDescriptor> {
    if let Some(Value::Array(entries)) = payload.get("tool_calls") {
        return entries
            .iter()
            .filter_map(|entry| {
                let descriptor = entry.as_object().and_then(descriptor_from);
                if descriptor.is_none() {
                    debug!(entry = %entry, "Skipping malformed tool_calls entry");
                }
                descriptor
            })
            .collect();
    }
    descriptor_from(payload).into_iter().collect()
}

fn descriptor_from(object: &Map<String, Value>) -> Option<ToolCallDescriptor> {
    let name = object.get("tool_name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let parameters = match object.get("parameters") {
        Some(Value::Object(params)) => params.clone(),
        _ => Map::new(),
    };
    Some(ToolCallDescriptor::new(name, parameters))
}
