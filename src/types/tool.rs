//! Tool declarations, extracted tool calls, and terminal result values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One invocable function, described JSON-Schema style. Supplied per request
/// by the caller and never mutated by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: Value,
}

/// A structured tool invocation produced by the extractor.
///
/// Callers never hand-construct these; they come out of
/// [`crate::extract`] in both native and embedded modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// Argument map. Nested objects pass through opaquely; no schema
    /// coercion happens beyond JSON parsing.
    pub args: Map<String, Value>,
    /// Provider-assigned id, when the wire format carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<String>,
}

/// Terminal value of one chat call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// Chain-of-thought text some dialects expose; informational only,
    /// never sent back upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// One model the provider advertises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Terminal value of one list-models call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelListing {
    pub models: Vec<ModelEntry>,
}
