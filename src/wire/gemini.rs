//! Gemini generateContent dialect. Key differences from the OpenAI shape:
//! - `contents` instead of `messages`, with `parts` instead of `content`.
//! - Roles are `user` and `model` (not `assistant`); the system prompt is a
//!   top-level `system_instruction`.
//! - Tools travel as `tools[{functionDeclarations}]`, forcing is
//!   `toolConfig.functionCallingConfig.mode: "ANY"`.
//! - Sampling lives under `generationConfig` (`maxOutputTokens`).
//! - Response tool calls are `functionCall` parts; reasoning parts carry a
//!   `thought` flag and are excluded from the prose.

use serde_json::{json, Value};

use crate::types::MessageRole;

use super::ChatPlan;

/// Build one generateContent request body.
pub fn build_chat_body(plan: &ChatPlan<'_>) -> Value {
    let mut contents: Vec<Value> = Vec::new();
    for m in plan.history {
        if m.hidden {
            continue;
        }
        let role = match m.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "model",
            // System turns have no slot in `contents`; the system prompt
            // travels in `system_instruction`.
            MessageRole::System => continue,
        };
        contents.push(json!({ "role": role, "parts": [{ "text": m.text }] }));
    }
    contents.push(json!({ "role": "user", "parts": [{ "text": plan.user_message }] }));

    let mut body = json!({ "contents": contents });

    if !plan.system_instruction.is_empty() {
        body["system_instruction"] = json!({ "parts": [{ "text": plan.system_instruction }] });
    }

    if !plan.tools.is_empty() {
        let declarations: Vec<Value> = plan
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
        if plan.force_tool_call {
            body["toolConfig"] = json!({ "functionCallingConfig": { "mode": "ANY" } });
        }
    }

    if !plan.options.use_model_defaults {
        body["generationConfig"] = json!({
            "temperature": plan.options.temperature,
            "maxOutputTokens": plan.options.max_tokens,
        });
    }

    body
}

/// Concatenate the prose parts of the first candidate, excluding `thought`
/// parts and `functionCall` parts.
pub fn extract_text(raw: &Value) -> String {
    let parts = match raw
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
    {
        Some(parts) => parts,
        None => return String::new(),
    };

    let mut out = String::new();
    for part in parts {
        if part.get("functionCall").is_some() {
            continue;
        }
        if part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false) {
            continue;
        }
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(text);
        }
    }
    out
}

/// The `functionCall` objects of the first candidate, in response order.
pub fn raw_function_calls(raw: &Value) -> Vec<Value> {
    raw.pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("functionCall").cloned())
                .collect()
        })
        .unwrap_or_default()
}
