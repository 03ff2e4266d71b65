//! Tool-call extraction: turns raw model output into validated
//! [`ToolCall`] records, in either of two modes.
//!
//! Native mode reads the structured fields the provider already returned.
//! Embedded mode scans the reply's free text for the fenced-JSON convention
//! the model was prompted with. Both end in the same tagged outcome so the
//! gateway can tell "no attempt" from "failed attempt" without string
//! matching.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::types::{ToolCall, ToolDeclaration};

/// Result of one extraction pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// One or more well-formed tool calls (possibly an explicit empty list).
    Found(Vec<ToolCall>),
    /// Nothing resembling a tool-call payload was present.
    NotPresent,
    /// A payload was located but failed to parse or had the wrong shape.
    Malformed { snippet: String, reason: String },
}

/// Embedded-mode extraction result: the outcome plus the reply text with the
/// consumed block removed (unchanged when nothing was consumed).
#[derive(Debug, Clone)]
pub struct EmbeddedExtraction {
    pub outcome: ExtractionOutcome,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Native mode
// ---------------------------------------------------------------------------

/// Extract from Gemini `functionCall` objects (`{name, args}`).
///
/// Unknown tool names are dropped with a warning, never a hard error — one
/// hallucinated name must not sink an otherwise valid response. This is the
/// documented policy, not an accident.
pub fn from_gemini_calls(calls: &[Value], declared: &[ToolDeclaration]) -> ExtractionOutcome {
    if calls.is_empty() {
        return ExtractionOutcome::NotPresent;
    }
    let mut out = Vec::new();
    for call in calls {
        let name = match call.get("name").and_then(|n| n.as_str()) {
            Some(n) if !n.is_empty() => n,
            _ => {
                warn!("dropping function call without a name");
                continue;
            }
        };
        if !is_declared(name, declared) {
            warn_unknown(name, declared);
            continue;
        }
        let args = call
            .get("args")
            .and_then(|a| a.as_object())
            .cloned()
            .unwrap_or_default();
        out.push(ToolCall {
            name: name.to_string(),
            args,
            raw_id: None,
        });
    }
    if out.is_empty() {
        ExtractionOutcome::NotPresent
    } else {
        ExtractionOutcome::Found(out)
    }
}

/// Extract from OpenAI `tool_calls` entries
/// (`{id, function: {name, arguments}}`).
///
/// `arguments` arrives as a JSON *string* and is decoded here — it is never
/// passed through verbatim. Models occasionally wrap the string in Markdown
/// fences; those are stripped before parsing.
pub fn from_openai_calls(calls: &[Value], declared: &[ToolDeclaration]) -> ExtractionOutcome {
    if calls.is_empty() {
        return ExtractionOutcome::NotPresent;
    }
    let mut out = Vec::new();
    let mut parse_failures = 0usize;
    let mut last_bad = String::new();
    for call in calls {
        let name = match call.pointer("/function/name").and_then(|n| n.as_str()) {
            Some(n) if !n.is_empty() => n,
            _ => {
                warn!("dropping tool call without a function name");
                continue;
            }
        };
        if !is_declared(name, declared) {
            warn_unknown(name, declared);
            continue;
        }
        let args = match call.pointer("/function/arguments") {
            Some(Value::Object(map)) => Some(map.clone()),
            Some(Value::String(s)) => decode_args_string(s),
            _ => Some(Map::new()),
        };
        match args {
            Some(args) => out.push(ToolCall {
                name: name.to_string(),
                args,
                raw_id: call.get("id").and_then(|i| i.as_str()).map(String::from),
            }),
            None => {
                parse_failures += 1;
                last_bad = call
                    .pointer("/function/arguments")
                    .and_then(|a| a.as_str())
                    .unwrap_or_default()
                    .to_string();
                warn!(tool = name, "tool call arguments failed to parse");
            }
        }
    }
    if out.is_empty() {
        if parse_failures > 0 {
            return ExtractionOutcome::Malformed {
                snippet: snippet_of(&last_bad),
                reason: "tool call arguments were not valid JSON".into(),
            };
        }
        return ExtractionOutcome::NotPresent;
    }
    ExtractionOutcome::Found(out)
}

fn is_declared(name: &str, declared: &[ToolDeclaration]) -> bool {
    declared.iter().any(|t| t.name == name)
}

fn warn_unknown(name: &str, declared: &[ToolDeclaration]) {
    let known: Vec<&str> = declared.iter().map(|t| t.name.as_str()).collect();
    warn!(tool = name, declared = ?known, "dropping tool call with undeclared name");
}

/// Decode an `arguments` string: strip accidental Markdown fences, then
/// parse tolerantly. `None` means unrecoverable.
fn decode_args_string(s: &str) -> Option<Map<String, Value>> {
    let cleaned = strip_wrapping_fences(s.trim());
    match tolerant_parse(cleaned) {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Embedded-JSON mode
// ---------------------------------------------------------------------------

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)```json\s*\r?\n?(.*?)\r?\n?\s*```").expect("static regex"));
static PLAIN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```\s*\r?\n?(.*?)\r?\n?\s*```").expect("static regex"));
static TOOL_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)<tool_call[^>]*>(.*?)</tool_call>").expect("static regex"));
static BARE_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)\{\s*"tool_calls"\s*:\s*\[.*?\]\s*\}"#).expect("static regex"));

/// Scan free text for the embedded tool-call convention.
///
/// Location strategy, in order: the **last** fenced block tagged `json`;
/// failing that, the last untagged fence whose content opens with `{`; then
/// a `<tool_call>` tag pair; finally a bare `{"tool_calls": ...}` object in
/// the prose. When multiple tagged blocks exist only the last is used —
/// earlier blocks are treated as prose.
pub fn from_text(text: &str) -> EmbeddedExtraction {
    let located = locate_payload(text);
    let (span, payload) = match located {
        Some(x) => x,
        None => {
            debug!("no embedded tool-call payload located");
            return EmbeddedExtraction {
                outcome: ExtractionOutcome::NotPresent,
                text: text.to_string(),
            };
        }
    };

    let parsed = match tolerant_parse(&payload) {
        Some(v) => v,
        None => {
            return EmbeddedExtraction {
                outcome: ExtractionOutcome::Malformed {
                    snippet: snippet_of(&payload),
                    reason: "located block is not valid JSON".into(),
                },
                text: text.to_string(),
            }
        }
    };

    let calls = match parsed.get("tool_calls").and_then(|c| c.as_array()) {
        Some(calls) => calls,
        None => {
            return EmbeddedExtraction {
                outcome: ExtractionOutcome::Malformed {
                    snippet: snippet_of(&payload),
                    reason: "JSON parsed but lacks a tool_calls array".into(),
                },
                text: text.to_string(),
            }
        }
    };

    let mut out = Vec::new();
    for call in calls {
        let name = match call.get("name").and_then(|n| n.as_str()) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => {
                warn!("embedded tool call entry without a name, skipping");
                continue;
            }
        };
        let args = match call.get("args") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(s)) => match decode_args_string(s) {
                Some(map) => map,
                None => {
                    warn!(tool = %name, "embedded args string failed to parse, skipping");
                    continue;
                }
            },
            _ => Map::new(),
        };
        out.push(ToolCall {
            name,
            args,
            raw_id: None,
        });
    }

    // Strip the consumed block out of the prose.
    let mut remainder = String::with_capacity(text.len());
    remainder.push_str(&text[..span.0]);
    remainder.push_str(&text[span.1..]);
    let remainder = remainder.trim().to_string();

    EmbeddedExtraction {
        outcome: ExtractionOutcome::Found(out),
        text: remainder,
    }
}

/// Find the payload and its byte span in the surrounding text.
fn locate_payload(text: &str) -> Option<((usize, usize), String)> {
    fn spans(c: regex::Captures<'_>) -> Option<((usize, usize), String)> {
        let whole = c.get(0)?;
        let inner = c.get(1)?;
        Some((
            (whole.start(), whole.end()),
            inner.as_str().trim().to_string(),
        ))
    }

    if let Some(located) = JSON_FENCE.captures_iter(text).last().and_then(spans) {
        return Some(located);
    }

    if let Some(located) = PLAIN_FENCE
        .captures_iter(text)
        .filter(|c| {
            c.get(1)
                .map(|g| g.as_str().trim_start().starts_with('{'))
                .unwrap_or(false)
        })
        .last()
        .and_then(spans)
    {
        return Some(located);
    }

    if let Some(located) = TOOL_TAG.captures_iter(text).last().and_then(spans) {
        return Some(located);
    }

    if let Some(m) = BARE_OBJECT.find_iter(text).last() {
        return Some(((m.start(), m.end()), m.as_str().to_string()));
    }

    None
}

// ---------------------------------------------------------------------------
// Tolerant JSON parsing
// ---------------------------------------------------------------------------

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("static regex"));

/// Parse JSON the way models write it: strict first, then with trailing
/// commas removed and missing closing braces appended.
pub fn tolerant_parse(s: &str) -> Option<Value> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str(s) {
        return Some(v);
    }

    let mut fixed = TRAILING_COMMA.replace_all(s, "$1").into_owned();

    // Balance unterminated objects. The count is naive (braces inside string
    // values skew it), which matches how truncated model output looks in
    // practice: the tail is lost, not the quoting.
    let opens = fixed.bytes().filter(|b| *b == b'{').count();
    let closes = fixed.bytes().filter(|b| *b == b'}').count();
    if opens > closes {
        fixed.extend(std::iter::repeat('}').take(opens - closes));
    }

    serde_json::from_str(&fixed).ok()
}

/// Strip one layer of wrapping Markdown fences off a string, if present.
fn strip_wrapping_fences(s: &str) -> &str {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").or_else(|| rest.strip_prefix("JSON")).unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn snippet_of(s: &str) -> String {
    const MAX: usize = 200;
    let trimmed = s.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut end = MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}

// ---------------------------------------------------------------------------
// Prompt injection for embedded mode
// ---------------------------------------------------------------------------

/// The instruction block appended to the system prompt when the embedded
/// convention is active. It pins the exact output shape the scanner expects.
pub fn embedded_tool_prompt(tools: &[ToolDeclaration]) -> String {
    if tools.is_empty() {
        return String::new();
    }

    let mut p = String::new();
    p.push_str("\n\n## Tool call format\n\n");
    p.push_str(
        "When you need to invoke a tool, end your reply with exactly one fenced JSON block:\n\n",
    );
    p.push_str("```json\n{\"tool_calls\": [{\"name\": \"<tool>\", \"args\": { ... }}]}\n```\n\n");
    p.push_str("Rules:\n");
    p.push_str("- The block must be the last thing in your reply.\n");
    p.push_str("- `tool_calls` is an array; each entry has a `name` and an `args` object.\n");
    p.push_str(
        "- Content that belongs in a tool argument goes inside `args`, never outside the block.\n",
    );
    p.push_str(
        "- Escape special characters in JSON strings: newlines as \\n, quotes as \\\", backslashes as \\\\.\n",
    );
    p.push_str("- Writing \"calling the tool now\" in prose does nothing; only the JSON block acts.\n");
    p.push_str("\n### Available tools\n");
    for t in tools {
        p.push_str(&format!("\n**{}** — {}\n", t.name, t.description));
        if let Ok(schema) = serde_json::to_string_pretty(&t.parameters) {
            p.push_str("```json\n");
            p.push_str(&schema);
            p.push_str("\n```\n");
        }
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declared() -> Vec<ToolDeclaration> {
        vec![ToolDeclaration {
            name: "update_storyboard".into(),
            description: "Persist a chapter".into(),
            parameters: json!({"type": "object"}),
        }]
    }

    fn found(outcome: ExtractionOutcome) -> Vec<ToolCall> {
        match outcome {
            ExtractionOutcome::Found(calls) => calls,
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn last_json_fence_wins() {
        let text = concat!(
            "First attempt:\n```json\n{\"tool_calls\": [{\"name\": \"old\", \"args\": {}}]}\n```\n",
            "Corrected:\n```json\n{\"tool_calls\": [{\"name\": \"update_storyboard\", \"args\": {\"chapter\": 2}}]}\n```\n",
        );
        let res = from_text(text);
        let calls = found(res.outcome);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "update_storyboard");
        assert_eq!(calls[0].args["chapter"], 2);
        assert!(res.text.contains("First attempt"));
        assert!(!res.text.contains("chapter"));
    }

    #[test]
    fn prose_around_the_fence_is_tolerated_and_stripped() {
        let text = "Here is chapter one.\n```json\n{\"tool_calls\": [{\"name\": \"f\", \"args\": {\"x\": 1}}]}\n```\nHope you like it.";
        let res = from_text(text);
        assert_eq!(found(res.outcome).len(), 1);
        assert_eq!(res.text, "Here is chapter one.\n\nHope you like it.");
    }

    #[test]
    fn trailing_commas_and_missing_braces_are_repaired() {
        let text = "```json\n{\"tool_calls\": [{\"name\": \"f\", \"args\": {\"x\": 1,}}]\n```";
        let res = from_text(text);
        let calls = found(res.outcome);
        assert_eq!(calls[0].args["x"], 1);
    }

    #[test]
    fn args_given_as_a_string_are_decoded() {
        let text = r#"```json
{"tool_calls": [{"name": "f", "args": "{\"x\": 1}"}]}
```"#;
        let calls = found(from_text(text).outcome);
        assert_eq!(calls[0].args["x"], 1);
    }

    #[test]
    fn plain_fence_fallback() {
        let text = "```\n{\"tool_calls\": [{\"name\": \"f\", \"args\": {}}]}\n```";
        assert_eq!(found(from_text(text).outcome).len(), 1);
    }

    #[test]
    fn tool_tag_fallback() {
        let text = "<tool_call>\n{\"tool_calls\": [{\"name\": \"f\", \"args\": {}}]}\n</tool_call>";
        assert_eq!(found(from_text(text).outcome).len(), 1);
    }

    #[test]
    fn bare_object_fallback() {
        let text = "Saving now. {\"tool_calls\": [{\"name\": \"f\", \"args\": {\"x\": 1}}]} Done.";
        let calls = found(from_text(text).outcome);
        assert_eq!(calls[0].args["x"], 1);
    }

    #[test]
    fn no_payload_is_not_present() {
        let res = from_text("Just prose, no tools involved.");
        assert_eq!(res.outcome, ExtractionOutcome::NotPresent);
        assert_eq!(res.text, "Just prose, no tools involved.");
    }

    #[test]
    fn unparseable_fence_is_malformed() {
        let res = from_text("```json\n{\"tool_calls\": [{\"name\" \"broken\"\n```");
        assert!(matches!(
            res.outcome,
            ExtractionOutcome::Malformed { .. }
        ));
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let res = from_text("```json\n{\"data\": [1, 2, 3]}\n```");
        match res.outcome {
            ExtractionOutcome::Malformed { reason, .. } => {
                assert!(reason.contains("tool_calls"));
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn gemini_unknown_names_are_dropped() {
        let calls = vec![
            json!({"name": "update_storyboard", "args": {"chapter": 1}}),
            json!({"name": "made_up_tool", "args": {}}),
        ];
        let out = found(from_gemini_calls(&calls, &declared()));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "update_storyboard");
    }

    #[test]
    fn gemini_all_unknown_is_not_present() {
        let calls = vec![json!({"name": "made_up_tool", "args": {}})];
        assert_eq!(
            from_gemini_calls(&calls, &declared()),
            ExtractionOutcome::NotPresent
        );
    }

    #[test]
    fn openai_arguments_string_is_decoded_not_passed_through() {
        let calls = vec![json!({
            "id": "call_7",
            "function": {"name": "update_storyboard", "arguments": "{\"chapter\": 3}"}
        })];
        let out = found(from_openai_calls(&calls, &declared()));
        assert_eq!(out[0].args["chapter"], 3);
        assert_eq!(out[0].raw_id.as_deref(), Some("call_7"));
    }

    #[test]
    fn openai_fenced_arguments_are_cleaned() {
        let calls = vec![json!({
            "function": {"name": "update_storyboard", "arguments": "```json\n{\"chapter\": 4}\n```"}
        })];
        let out = found(from_openai_calls(&calls, &declared()));
        assert_eq!(out[0].args["chapter"], 4);
    }

    #[test]
    fn openai_unrecoverable_arguments_are_malformed() {
        let calls = vec![json!({
            "function": {"name": "update_storyboard", "arguments": "not json at all ["}
        })];
        assert!(matches!(
            from_openai_calls(&calls, &declared()),
            ExtractionOutcome::Malformed { .. }
        ));
    }

    #[test]
    fn native_and_embedded_extractions_agree() {
        // The same logical invocation must come out identical either way.
        let embedded = found(
            from_text("```json\n{\"tool_calls\": [{\"name\": \"update_storyboard\", \"args\": {\"x\": 1}}]}\n```")
                .outcome,
        );
        let native = found(from_gemini_calls(
            &[json!({"name": "update_storyboard", "args": {"x": 1}})],
            &declared(),
        ));
        assert_eq!(embedded, native);
    }

    #[test]
    fn prompt_lists_every_tool_and_the_shape() {
        let p = embedded_tool_prompt(&declared());
        assert!(p.contains("update_storyboard"));
        assert!(p.contains("\"tool_calls\""));
        assert!(embedded_tool_prompt(&[]).is_empty());
    }
}
