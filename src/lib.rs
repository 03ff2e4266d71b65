//! # llm-bridge
//!
//! A provider-adapter boundary layer for chat-based LLM backends. One
//! gateway, two wire dialects (Gemini `generateContent` and OpenAI
//! `chat/completions`), and a uniform result type, so application code never
//! branches on which vendor is behind a saved connection profile.
//!
//! ## What it handles
//!
//! - **Endpoint resolution**: messy user-pasted base URLs are normalized and
//!   expanded into an ordered candidate list, probed until one answers.
//! - **Reachability fallback**: when every direct candidate fails at the
//!   connection level, the request is retried through a chain of local proxy
//!   ports.
//! - **Tool calls, two ways**: provider-native function calling, or an
//!   embedded-JSON text convention for backends (and proxies) that mangle
//!   structured tools. Both converge on the same [`ToolCall`] type.
//! - **Cancellation**: every operation races a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use llm_bridge::{
//!     ChatGateway, ChatRequest, GenerationOptions, ProviderConfig, ProviderKind,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> llm_bridge::Result<()> {
//!     let gateway = ChatGateway::new()?;
//!     let request = ChatRequest {
//!         config: ProviderConfig {
//!             provider: ProviderKind::OpenAiCompatible,
//!             model: "deepseek-chat".into(),
//!             base_url: "https://api.deepseek.com".into(),
//!             api_key: "sk-...".into(),
//!             use_proxy: false,
//!             proxy_url: String::new(),
//!             proxy_key: String::new(),
//!             tool_call_mode: None,
//!         },
//!         history: Vec::new(),
//!         user_message: "Outline chapter one.".into(),
//!         system_instruction: "You are a novelist.".into(),
//!         tools: Vec::new(),
//!         force_tool_call: false,
//!         options: GenerationOptions::default(),
//!     };
//!     let result = gateway.chat(&request, &CancellationToken::new()).await?;
//!     println!("{}", result.text);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod resolver;
pub mod transport;
pub mod types;
pub mod wire;

pub use config::{GenerationOptions, ProviderConfig, ProviderKind, ToolCallMode};
pub use error::Error;
pub use gateway::{ChatGateway, ChatRequest};
pub use types::{
    ChatResult, Message, MessageRole, ModelEntry, ModelListing, ToolCall, ToolDeclaration,
};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
