//! LLM error types

use thiserror::Error;

use crate::provider::LlmProvider;

/// LLM selection and generation errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LlmError {
    /// Requested provider is unknown or has no credentials configured.
    #[error("Unsupported LLM provider: {requested}. Available providers: [{}]", join(.available))]
    UnsupportedProvider {
        /// Name as requested
        requested: String,
        /// Providers that are configured
        available: Vec<LlmProvider>,
    },

    /// Settings could not be loaded.
    #[error("Failed to load LLM settings: {0}")]
    Config(#[from] config::ConfigError),

    /// Settings loaded but are unusable.
    #[error("Invalid LLM settings: {0}")]
    InvalidSettings(String),

    /// The provider call failed.
    #[error("LLM provider {provider} failed: {message}")]
    Generation {
        /// Provider that failed
        provider: LlmProvider,
        /// Provider-reported failure
        message: String,
    },
}

fn join(providers: &[LlmProvider]) -> String {
    providers
        .iter()
        .map(LlmProvider::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;
