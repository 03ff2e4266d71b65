//! The caller-facing surface: one [`ChatGateway`] holding a shared
//! dispatcher, with `chat` and `list_models` taking a per-call config.
//!
//! The gateway owns the tool-mode decision: in embedded-JSON mode the wire
//! sees no tool declarations at all — the declarations become a prompt
//! section and the reply text is scanned on the way back out.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{GenerationOptions, ProviderConfig, ToolCallMode};
use crate::dispatch::{CandidateReport, Dispatcher, PlannedBodies};
use crate::extract::{self, ExtractionOutcome};
use crate::resolver::{BodyKind, Operation};
use crate::types::{ChatResult, Message, ModelListing, ToolCall, ToolDeclaration};
use crate::wire::{self, gemini, openai, ChatPlan};
use crate::{Error, Result};

/// One chat exchange, fully specified. The config rides along so callers
/// can hold one gateway and talk to many saved profiles.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub config: ProviderConfig,
    pub history: Vec<Message>,
    pub user_message: String,
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
    /// Require at least one valid tool call in the response.
    pub force_tool_call: bool,
    pub options: GenerationOptions,
}

pub struct ChatGateway {
    dispatcher: Dispatcher,
}

impl ChatGateway {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dispatcher: Dispatcher::new()?,
        })
    }

    /// List the models the configured endpoint offers.
    pub async fn list_models(
        &self,
        cfg: &ProviderConfig,
        cancel: &CancellationToken,
    ) -> Result<ModelListing> {
        let (raw, report) = self
            .dispatcher
            .dispatch(Operation::ListModels, cfg, &PlannedBodies::default(), cancel)
            .await?;
        debug!(url = %report.url, "model listing received");
        Ok(wire::parse_model_listing(&raw))
    }

    /// Run one chat exchange end to end.
    pub async fn chat(&self, req: &ChatRequest, cancel: &CancellationToken) -> Result<ChatResult> {
        let cfg = &req.config;
        let mode = cfg.tool_mode();
        let embedded = mode == ToolCallMode::EmbeddedJson && !req.tools.is_empty();

        // Embedded mode moves the declarations into the system prompt and
        // sends an empty tools array; the forcing flag is enforced locally
        // on the way back out instead of via tool_choice.
        let system_instruction = if embedded {
            format!(
                "{}{}",
                req.system_instruction,
                extract::embedded_tool_prompt(&req.tools)
            )
        } else {
            req.system_instruction.clone()
        };
        let wire_tools: &[ToolDeclaration] = if embedded { &[] } else { &req.tools };

        let plan = ChatPlan {
            model: &cfg.model,
            history: &req.history,
            user_message: &req.user_message,
            system_instruction: &system_instruction,
            tools: wire_tools,
            force_tool_call: !embedded && req.force_tool_call,
            options: &req.options,
        };
        // Candidate lists can span both dialects, so both bodies are planned
        // up front and the dispatcher picks per candidate.
        let bodies = PlannedBodies {
            gemini: Some(gemini::build_chat_body(&plan)),
            openai: Some(openai::build_chat_body(&plan)),
        };

        debug!(
            model = %cfg.model,
            ?mode,
            forced = req.force_tool_call,
            tools = req.tools.len(),
            "dispatching chat"
        );
        let (raw, report) = self
            .dispatcher
            .dispatch(Operation::Chat, cfg, &bodies, cancel)
            .await?;

        self.interpret(req, embedded, &raw, &report)
    }

    /// Turn the winning candidate's raw response into a [`ChatResult`],
    /// enforcing the forcing contract.
    fn interpret(
        &self,
        req: &ChatRequest,
        embedded: bool,
        raw: &serde_json::Value,
        report: &CandidateReport,
    ) -> Result<ChatResult> {
        let (mut text, reasoning, native_calls) = match report.body {
            BodyKind::GeminiGenerate => (
                gemini::extract_text(raw),
                None,
                gemini::raw_function_calls(raw),
            ),
            _ => (
                openai::extract_text(raw),
                openai::extract_reasoning(raw),
                openai::raw_tool_calls(raw),
            ),
        };

        let outcome = if embedded {
            let extraction = extract::from_text(&text);
            if matches!(extraction.outcome, ExtractionOutcome::Found(_)) {
                text = extraction.text;
            }
            extraction.outcome
        } else if req.tools.is_empty() {
            ExtractionOutcome::NotPresent
        } else {
            match report.body {
                BodyKind::GeminiGenerate => extract::from_gemini_calls(&native_calls, &req.tools),
                _ => extract::from_openai_calls(&native_calls, &req.tools),
            }
        };

        // Forcing binds even with no declared tools; the caller asked for a
        // tool call and an empty result is a reportable failure.
        let tool_calls = apply_outcome(outcome, req.force_tool_call)?;
        if let Some(port) = report.via_proxy_port {
            debug!(port, "response arrived via local proxy");
        }

        Ok(ChatResult {
            text,
            tool_calls,
            reasoning,
        })
    }
}

/// The forcing contract: when a tool call is required, "didn't try" and
/// "tried and garbled it" surface as distinct errors; unforced, both decay
/// to a plain text reply with a warning for the garbled case.
fn apply_outcome(outcome: ExtractionOutcome, forced: bool) -> Result<Vec<ToolCall>> {
    match outcome {
        ExtractionOutcome::Found(calls) => {
            if forced && calls.is_empty() {
                return Err(Error::ToolCallRequiredButAbsent);
            }
            Ok(calls)
        }
        ExtractionOutcome::NotPresent => {
            if forced {
                return Err(Error::ToolCallRequiredButAbsent);
            }
            Ok(Vec::new())
        }
        ExtractionOutcome::Malformed { snippet, reason } => {
            if forced {
                return Err(Error::MalformedToolCallPayload { snippet, reason });
            }
            warn!(%reason, "ignoring malformed tool-call payload in unforced reply");
            Ok(Vec::new())
        }
    }
}
