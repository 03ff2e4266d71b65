//! Core type definitions shared across the bridge.

pub mod message;
pub mod tool;

pub use message::{Message, MessageRole};
pub use tool::{ChatResult, ModelEntry, ModelListing, ToolCall, ToolDeclaration};
