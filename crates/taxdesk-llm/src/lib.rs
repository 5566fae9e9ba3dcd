//! # Taxdesk LLM - provider selection
//!
//! The set of LLM vendors is closed ([`LlmProvider`]). Which of them are
//! usable is decided once, from [`LlmSettings`], by [`ProviderRegistry`],
//! which also builds each usable provider's [`LlmClient`] at that point.
//! Requests then name a provider (or take the default) and get back its
//! shared client.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use secrecy::SecretString;
//! use taxdesk_llm::{
//!     ChatMessage, GeneratedResponse, LlmClient, LlmProvider, LlmSettings, ProviderRegistry,
//! };
//!
//! #[derive(Debug)]
//! struct Offline(LlmProvider);
//!
//! #[async_trait]
//! impl LlmClient for Offline {
//!     fn provider(&self) -> LlmProvider {
//!         self.0
//!     }
//!
//!     async fn generate_response(
//!         &self,
//!         _message: &str,
//!         _history: &[ChatMessage],
//!     ) -> taxdesk_llm::Result<GeneratedResponse> {
//!         Ok(GeneratedResponse::default())
//!     }
//! }
//!
//! let settings = LlmSettings {
//!     openai_api_key: Some(SecretString::from("sk-...".to_string())),
//!     ..LlmSettings::default()
//! };
//! let registry = ProviderRegistry::from_settings(settings, |provider, _key| {
//!     Ok(Arc::new(Offline(provider)) as Arc<dyn LlmClient>)
//! })
//! .unwrap();
//!
//! assert_eq!(registry.resolve(None).unwrap(), LlmProvider::OpenAi);
//! assert!(registry.client(Some("anthropic")).is_err());
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod error;
pub mod provider;
pub mod registry;
pub mod settings;

pub use client::{ChatMessage, ChatRole, GeneratedResponse, LlmClient, TokenUsage};
pub use error::{LlmError, Result};
pub use provider::{LlmProvider, ParseProviderError};
pub use registry::ProviderRegistry;
pub use settings::LlmSettings;
