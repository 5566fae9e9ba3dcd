//! Supported LLM providers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// LLM vendors the backend can route a conversation to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI chat models (default)
    #[default]
    OpenAi,
    /// Anthropic Claude models
    Anthropic,
    /// Google Gemini models
    Google,
}

/// Error type for parsing provider names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseProviderError(pub String);

impl fmt::Display for ParseProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown LLM provider: {}", self.0)
    }
}

impl std::error::Error for ParseProviderError {}

impl LlmProvider {
    /// Every provider, in display order.
    pub const ALL: [LlmProvider; 3] = [Self::OpenAi, Self::Anthropic, Self::Google];

    /// Lowercase name used in configuration and requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "google" => Ok(Self::Google),
            _ => Err(ParseProviderError(s.to_string())),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
