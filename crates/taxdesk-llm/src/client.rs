//! LLM client capability
//!
//! Concrete clients live with the request-handling layer; this crate only
//! fixes the shape every client exposes.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::provider::LlmProvider;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// End user
    User,
    /// Model reply
    Assistant,
}

/// One prior turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it
    pub role: ChatRole,
    /// What was said
    pub content: String,
}

impl ChatMessage {
    /// User turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt, history included
    pub prompt_tokens: u32,
    /// Tokens in the answer
    pub completion_tokens: u32,
    /// Sum of both
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Usage with the total computed.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A model answer plus suggested follow-ups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedResponse {
    /// Answer text
    pub answer: String,
    /// Suggested next questions for the user
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
    /// Token accounting
    #[serde(default)]
    pub token_usage: TokenUsage,
    /// Provider-specific details (model name, finish reason, ...)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A client for one LLM provider.
#[async_trait]
pub trait LlmClient: Send + Sync + std::fmt::Debug {
    /// Provider this client talks to
    fn provider(&self) -> LlmProvider;

    /// Answer `message` given the prior `history`
    async fn generate_response(
        &self,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<GeneratedResponse>;
}
