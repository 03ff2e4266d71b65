//! Conversation turns as the caller supplies them.

use serde::{Deserialize, Serialize};

/// One turn of conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub text: String,
    /// UI-only turns (notices, local annotations) are kept in history by the
    /// caller but must never be sent upstream; request building skips them.
    #[serde(default)]
    pub hidden: bool,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            text: text.into(),
            hidden: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
            hidden: false,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            text: text.into(),
            hidden: false,
        }
    }

    /// Mark this turn as UI-only.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}
