//! Per-family request/response shaping.
//!
//! The two dialects share nothing on the wire, so each lives in its own
//! module; what they share is the input: one [`ChatPlan`] assembled by the
//! gateway. Model-listing responses are shape-sniffed here because proxies
//! freely mix the Gemini and OpenAI listing formats.

pub mod gemini;
pub mod openai;

use crate::config::GenerationOptions;
use crate::resolver::strip_model_prefix;
use crate::types::{Message, ModelEntry, ModelListing, ToolDeclaration};
use serde_json::Value;

/// Everything a wire module needs to build one chat request body.
///
/// `system_instruction` already includes the embedded-JSON tool prompt when
/// that mode is active, and `tools` is empty in that case — the gateway
/// decides, the wire modules just serialize.
#[derive(Debug, Clone, Copy)]
pub struct ChatPlan<'a> {
    pub model: &'a str,
    pub history: &'a [Message],
    pub user_message: &'a str,
    pub system_instruction: &'a str,
    pub tools: &'a [ToolDeclaration],
    pub force_tool_call: bool,
    pub options: &'a GenerationOptions,
}

/// Parse a model-listing response of any of the shapes seen in the wild:
/// Gemini's `{models:[{name:"models/x", displayName}]}`, OpenAI's
/// `{data:[{id}]}`, a bare `[{id}]` array, or `{models:[{id}]}`.
pub fn parse_model_listing(raw: &Value) -> ModelListing {
    let rows: &[Value] = if let Some(arr) = raw.as_array() {
        arr
    } else if let Some(arr) = raw.get("data").and_then(|v| v.as_array()) {
        arr
    } else if let Some(arr) = raw.get("models").and_then(|v| v.as_array()) {
        arr
    } else {
        &[]
    };

    let models = rows
        .iter()
        .filter_map(|row| {
            let id = row
                .get("id")
                .or_else(|| row.get("name"))
                .and_then(|v| v.as_str())?;
            Some(ModelEntry {
                id: strip_model_prefix(id).to_string(),
                display_name: row
                    .get("displayName")
                    .and_then(|v| v.as_str())
                    .map(String::from),
            })
        })
        .collect();

    ModelListing { models }
}
