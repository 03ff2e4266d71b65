//! OpenAI chat-completions dialect — also the lingua franca of DeepSeek,
//! SiliconFlow, and most reverse proxies.

use serde_json::{json, Value};

use crate::resolver::strip_model_prefix;
use crate::types::MessageRole;

use super::ChatPlan;

/// Build one chat/completions request body. Streaming is always off; the
/// bridge consumes whole responses.
pub fn build_chat_body(plan: &ChatPlan<'_>) -> Value {
    let mut messages: Vec<Value> = Vec::new();
    if !plan.system_instruction.is_empty() {
        messages.push(json!({ "role": "system", "content": plan.system_instruction }));
    }
    for m in plan.history {
        if m.hidden {
            continue;
        }
        let role = match m.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        messages.push(json!({ "role": role, "content": m.text }));
    }
    messages.push(json!({ "role": "user", "content": plan.user_message }));

    let mut body = json!({
        "model": strip_model_prefix(plan.model),
        "messages": messages,
        "stream": false,
    });

    if !plan.tools.is_empty() {
        let tools: Vec<Value> = plan
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = json!(tools);
        body["tool_choice"] = if plan.force_tool_call {
            json!("required")
        } else {
            json!("auto")
        };
    }

    if !plan.options.use_model_defaults {
        body["temperature"] = json!(plan.options.temperature);
        body["max_tokens"] = json!(plan.options.max_tokens);
        if let Some(ctx) = plan.options.context_length {
            body["context_length"] = json!(ctx);
        }
    }

    body
}

/// The assistant's prose, if any.
pub fn extract_text(raw: &Value) -> String {
    raw.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Chain-of-thought text some dialects expose alongside the answer.
pub fn extract_reasoning(raw: &Value) -> Option<String> {
    raw.pointer("/choices/0/message/reasoning_content")
        .or_else(|| raw.pointer("/choices/0/message/reasoning"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

/// The structured `tool_calls` entries, in response order.
pub fn raw_tool_calls(raw: &Value) -> Vec<Value> {
    raw.pointer("/choices/0/message/tool_calls")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationOptions;
    use crate::types::{Message, ToolDeclaration};
    use serde_json::json;

    fn tool() -> ToolDeclaration {
        ToolDeclaration {
            name: "update_storyboard".into(),
            description: "Persist a chapter".into(),
            parameters: json!({"type": "object"}),
        }
    }

    #[test]
    fn message_order_is_system_history_user() {
        let history = vec![Message::user("earlier"), Message::assistant("reply")];
        let opts = GenerationOptions::default();
        let body = build_chat_body(&ChatPlan {
            model: "deepseek-chat",
            history: &history,
            user_message: "now",
            system_instruction: "sys",
            tools: &[],
            force_tool_call: false,
            options: &opts,
        });
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn forcing_sets_tool_choice_required() {
        let tools = vec![tool()];
        let opts = GenerationOptions::default();
        let body = build_chat_body(&ChatPlan {
            model: "deepseek-chat",
            history: &[],
            user_message: "go",
            system_instruction: "",
            tools: &tools,
            force_tool_call: true,
            options: &opts,
        });
        assert_eq!(body["tool_choice"], "required");
        assert_eq!(body["tools"][0]["function"]["name"], "update_storyboard");
    }

    #[test]
    fn no_tools_means_no_tool_choice() {
        let opts = GenerationOptions::default();
        let body = build_chat_body(&ChatPlan {
            model: "deepseek-chat",
            history: &[],
            user_message: "go",
            system_instruction: "",
            tools: &[],
            force_tool_call: true,
            options: &opts,
        });
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn models_prefix_is_stripped_from_model_field() {
        let opts = GenerationOptions::default();
        let body = build_chat_body(&ChatPlan {
            model: "models/gemini-2.0-flash",
            history: &[],
            user_message: "go",
            system_instruction: "",
            tools: &[],
            force_tool_call: false,
            options: &opts,
        });
        assert_eq!(body["model"], "gemini-2.0-flash");
    }

    #[test]
    fn response_accessors() {
        let raw = json!({"choices": [{"message": {
            "content": "Hello",
            "reasoning_content": "thinking...",
            "tool_calls": [{"id": "call_1", "function": {"name": "f", "arguments": "{}"}}]
        }}]});
        assert_eq!(extract_text(&raw), "Hello");
        assert_eq!(extract_reasoning(&raw).as_deref(), Some("thinking..."));
        assert_eq!(raw_tool_calls(&raw).len(), 1);
    }
}
