//! Per-call provider configuration.
//!
//! A [`ProviderConfig`] is a fully-resolved value constructed by the caller
//! for one saved connection profile and passed into every call. The bridge
//! never reads ambient state (environment, persisted settings) mid-call;
//! whatever is in the config at dispatch time is what gets used.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which wire family the upstream speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Gemini generateContent API, called natively.
    GeminiNative,
    /// Anything speaking the OpenAI chat-completions dialect (OpenAI,
    /// DeepSeek, SiliconFlow, reverse proxies, self-hosted gateways).
    OpenAiCompatible,
}

/// How structured tool invocations travel between model and caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallMode {
    /// Provider-native structured function calling.
    FunctionCalling,
    /// Text convention: the model is instructed to end its reply with a
    /// fenced JSON block that the extractor locates and parses.
    EmbeddedJson,
}

impl ToolCallMode {
    /// Default mode when the profile does not pin one: Gemini called
    /// directly gets native function calling, everything routed through a
    /// proxy or an OpenAI-compatible dialect gets the embedded convention,
    /// which survives proxies that strip `tools` from the body.
    pub fn default_for(kind: ProviderKind, use_proxy: bool) -> Self {
        match kind {
            ProviderKind::GeminiNative if !use_proxy => ToolCallMode::FunctionCalling,
            _ => ToolCallMode::EmbeddedJson,
        }
    }
}

/// One saved connection profile, immutable for the lifetime of a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    /// Model identifier as the caller knows it. A `models/` prefix (as
    /// returned by Gemini listings) is tolerated and stripped on use.
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default)]
    pub proxy_url: String,
    /// Key for the proxy itself, independent of the direct key.
    #[serde(default)]
    pub proxy_key: String,
    /// Pinned tool-call mode; `None` means use the per-provider default.
    #[serde(default)]
    pub tool_call_mode: Option<ToolCallMode>,
}

impl ProviderConfig {
    /// Check invariants that must hold before any request is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.use_proxy && self.proxy_url.trim().is_empty() {
            return Err(Error::configuration(
                "use_proxy is set but proxy_url is empty",
            ));
        }
        Ok(())
    }

    /// The base URL requests actually go to: proxy URL when proxying is
    /// enabled, else the direct URL, else a well-known vendor default.
    pub fn effective_base_url(&self) -> String {
        let raw = if self.use_proxy {
            self.proxy_url.trim()
        } else {
            self.base_url.trim()
        };
        if !raw.is_empty() {
            return raw.trim_end_matches('/').to_string();
        }
        default_base_url(self.provider, &self.model).to_string()
    }

    /// The key requests authenticate with: the proxy-specific key when
    /// proxying and one is set, otherwise the direct key.
    pub fn effective_api_key(&self) -> Result<String> {
        let key = if self.use_proxy && !self.proxy_key.trim().is_empty() {
            self.proxy_key.trim()
        } else {
            self.api_key.trim()
        };
        if key.is_empty() {
            return Err(Error::MissingCredential);
        }
        Ok(key.to_string())
    }

    /// Effective tool-call mode for this profile.
    pub fn tool_mode(&self) -> ToolCallMode {
        self.tool_call_mode
            .unwrap_or_else(|| ToolCallMode::default_for(self.provider, self.use_proxy))
    }
}

/// Well-known vendor base URL when the profile left `base_url` blank. The
/// model id is the only hint available at that point.
fn default_base_url(kind: ProviderKind, model_hint: &str) -> &'static str {
    match kind {
        ProviderKind::GeminiNative => "https://generativelanguage.googleapis.com",
        ProviderKind::OpenAiCompatible => {
            let hint = model_hint.to_ascii_lowercase();
            if hint.contains("deepseek") {
                "https://api.deepseek.com"
            } else if hint.contains("qwen") || hint.contains("glm") {
                "https://api.siliconflow.cn"
            } else {
                "https://api.openai.com"
            }
        }
    }
}

/// Generation knobs forwarded per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    /// Advisory context window; forwarded only to dialects that accept it.
    #[serde(default)]
    pub context_length: Option<u32>,
    /// When set, no sampling parameters are sent and the model's own
    /// defaults apply. Tools are still sent; they are functional, not tuning.
    #[serde(default)]
    pub use_model_defaults: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 8192,
            context_length: None,
            use_model_defaults: false,
        }
    }
}
