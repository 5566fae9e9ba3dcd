//! Provider registry resolved once from settings
//!
//! A provider is available when it has an API key. Its client is built from
//! that key when the registry is built and never changes afterwards; requests
//! name a provider (or fall back to the default) and get the shared client.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, info};

use crate::client::LlmClient;
use crate::error::{LlmError, Result};
use crate::provider::LlmProvider;
use crate::settings::LlmSettings;

/// Configured LLM providers and their clients.
#[derive(Debug)]
pub struct ProviderRegistry {
    default_provider: LlmProvider,
    openai: Option<Arc<dyn LlmClient>>,
    anthropic: Option<Arc<dyn LlmClient>>,
    google: Option<Arc<dyn LlmClient>>,
}

impl ProviderRegistry {
    /// Build one client per provider that has an API key.
    ///
    /// `connect` is called once for each such provider, in declaration order,
    /// and receives that provider's key.
    ///
    /// # Errors
    ///
    /// Any error returned by `connect`, or [`LlmError::InvalidSettings`] if it
    /// returns a client for a different provider.
    pub fn from_settings<F>(settings: LlmSettings, mut connect: F) -> Result<Self>
    where
        F: FnMut(LlmProvider, SecretString) -> Result<Arc<dyn LlmClient>>,
    {
        let LlmSettings {
            default_provider,
            openai_api_key,
            anthropic_api_key,
            google_api_key,
        } = settings;

        let mut slot = |provider: LlmProvider, key: Option<SecretString>| {
            key.map(|key| {
                let client = connect(provider, key)?;
                if client.provider() != provider {
                    return Err(LlmError::InvalidSettings(format!(
                        "client for {provider} reports provider {}",
                        client.provider()
                    )));
                }
                Ok(client)
            })
            .transpose()
        };

        let registry = Self {
            default_provider,
            openai: slot(LlmProvider::OpenAi, openai_api_key)?,
            anthropic: slot(LlmProvider::Anthropic, anthropic_api_key)?,
            google: slot(LlmProvider::Google, google_api_key)?,
        };
        info!(
            default = %registry.default_provider,
            available = ?registry.available(),
            "LLM providers resolved"
        );
        Ok(registry)
    }

    /// Provider used when a request names none.
    pub fn default_provider(&self) -> LlmProvider {
        self.default_provider
    }

    /// Providers with credentials, in declaration order.
    pub fn available(&self) -> Vec<LlmProvider> {
        LlmProvider::ALL
            .into_iter()
            .filter(|provider| self.is_available(*provider))
            .collect()
    }

    /// Whether `provider` has credentials.
    pub fn is_available(&self, provider: LlmProvider) -> bool {
        self.slot(provider).is_some()
    }

    /// Pick the provider for a request.
    ///
    /// `None` or a blank name selects the default provider.
    ///
    /// # Errors
    ///
    /// [`LlmError::UnsupportedProvider`] if the name is unknown or the
    /// provider has no credentials.
    pub fn resolve(&self, requested: Option<&str>) -> Result<LlmProvider> {
        let requested = requested.map(str::trim).filter(|name| !name.is_empty());

        let provider = match requested {
            None => self.default_provider,
            Some(name) => name.parse().map_err(|_| self.unsupported(name))?,
        };

        if !self.is_available(provider) {
            return Err(self.unsupported(requested.unwrap_or(provider.as_str())));
        }

        debug!(provider = %provider, "LLM provider selected");
        Ok(provider)
    }

    /// Client for a request's provider, resolved as in [`resolve`](Self::resolve).
    ///
    /// # Errors
    ///
    /// [`LlmError::UnsupportedProvider`] as for `resolve`.
    pub fn client(&self, requested: Option<&str>) -> Result<Arc<dyn LlmClient>> {
        let provider = self.resolve(requested)?;
        self.slot(provider)
            .cloned()
            .ok_or_else(|| self.unsupported(provider.as_str()))
    }

    fn slot(&self, provider: LlmProvider) -> Option<&Arc<dyn LlmClient>> {
        match provider {
            LlmProvider::OpenAi => self.openai.as_ref(),
            LlmProvider::Anthropic => self.anthropic.as_ref(),
            LlmProvider::Google => self.google.as_ref(),
        }
    }

    fn unsupported(&self, requested: &str) -> LlmError {
        LlmError::UnsupportedProvider {
            requested: requested.to_string(),
            available: self.available(),
        }
    }
}
