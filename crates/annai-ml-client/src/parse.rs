//! Parsing of generated MCQ payloads.
//!
//! Language models wrap their JSON in fences or chatter, so the text is
//! tried as-is first, then as the outermost `{...}` block.

use serde_json::Value;
use tracing::warn;

use annai_models::McqDraft;

use crate::error::{MlError, MlResult};

/// Parse raw model or service output into well-formed drafts.
pub fn parse_mcq_text(raw: &str) -> MlResult<Vec<McqDraft>> {
    let text = strip_code_fences(raw);

    let value = serde_json::from_str::<Value>(text)
        .ok()
        .or_else(|| extract_json_block(text).and_then(|block| serde_json::from_str(block).ok()))
        .ok_or_else(|| MlError::invalid_response("no JSON found in generation output"))?;

    parse_mcq_value(value)
}

/// Accepts `{"mcqs": [...]}` or a bare array.
///
/// Items that are not MCQ-shaped are dropped; a payload with no usable item
/// is an error.
pub fn parse_mcq_value(value: Value) -> MlResult<Vec<McqDraft>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if let Some(err) = map.get("error") {
                return Err(MlError::invalid_response(format!(
                    "generation service reported an error: {}",
                    err
                )));
            }
            match map.remove("mcqs") {
                Some(Value::Array(items)) => items,
                _ => return Err(MlError::invalid_response("payload has no mcqs array")),
            }
        }
        other => {
            return Err(MlError::invalid_response(format!(
                "unexpected payload type: {}",
                json_type(&other)
            )))
        }
    };

    let total = items.len();
    let drafts: Vec<McqDraft> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<McqDraft>(item).ok())
        .filter(McqDraft::is_well_formed)
        .collect();

    if drafts.len() < total {
        warn!(
            kept = drafts.len(),
            dropped = total - drafts.len(),
            "Dropped malformed MCQ items"
        );
    }

    if drafts.is_empty() {
        return Err(MlError::invalid_response("no well-formed MCQ in payload"));
    }
    Ok(drafts)
}

fn strip_code_fences(raw: &str) -> &str {
    let text = raw.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Outermost `{ ... }` span, if any.
fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
