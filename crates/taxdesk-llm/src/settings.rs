//! LLM settings
//!
//! Loaded like the auth configuration: an optional TOML/YAML/JSON file with
//! `TAXDESK_`-prefixed environment variables on top, e.g.
//! `TAXDESK_DEFAULT_PROVIDER=anthropic` or `TAXDESK_OPENAI_API_KEY=sk-...`.

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{LlmError, Result};
use crate::provider::LlmProvider;

/// Environment variable prefix for settings.
pub const ENV_PREFIX: &str = "TAXDESK";

/// Provider selection and credentials.
#[derive(Debug, Default)]
pub struct LlmSettings {
    /// Provider used when a request does not name one.
    pub default_provider: LlmProvider,
    /// OpenAI API key
    pub openai_api_key: Option<SecretString>,
    /// Anthropic API key
    pub anthropic_api_key: Option<SecretString>,
    /// Google API key
    pub google_api_key: Option<SecretString>,
}

/// Wire shape of the settings; keys are wrapped once deserialized.
#[derive(Deserialize)]
struct RawSettings {
    #[serde(default)]
    default_provider: Option<String>,
    #[serde(default)]
    openai_api_key: Option<String>,
    #[serde(default)]
    anthropic_api_key: Option<String>,
    #[serde(default)]
    google_api_key: Option<String>,
}

impl LlmSettings {
    /// Load settings from a file, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, has an unsupported extension,
    /// or names an unknown default provider.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(Some(path.as_ref()), env_source())
    }

    /// Load settings from `TAXDESK_`-prefixed environment variables only.
    ///
    /// # Errors
    ///
    /// Returns an error if the default provider is unknown.
    pub fn from_env() -> Result<Self> {
        Self::load(None, env_source())
    }

    fn load(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(LlmError::InvalidSettings(format!(
                    "settings file not found: {}",
                    path.display()
                )));
            }
            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml") | Some("yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => {
                    return Err(LlmError::InvalidSettings(
                        "unsupported settings file format, use .toml, .yaml, .yml, or .json"
                            .to_string(),
                    ));
                }
            };
            builder = builder.add_source(File::from(path).format(format));
        }

        let raw: RawSettings = builder.add_source(env).build()?.try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self> {
        let default_provider = match raw.default_provider.as_deref() {
            None | Some("") => LlmProvider::default(),
            Some(name) => name
                .parse()
                .map_err(|e| LlmError::InvalidSettings(format!("default_provider: {e}")))?,
        };

        Ok(Self {
            default_provider,
            openai_api_key: secret(raw.openai_api_key),
            anthropic_api_key: secret(raw.anthropic_api_key),
            google_api_key: secret(raw.google_api_key),
        })
    }

    /// Configured key for `provider`, if any.
    pub fn api_key(&self, provider: LlmProvider) -> Option<&SecretString> {
        match provider {
            LlmProvider::OpenAi => self.openai_api_key.as_ref(),
            LlmProvider::Anthropic => self.anthropic_api_key.as_ref(),
            LlmProvider::Google => self.google_api_key.as_ref(),
        }
    }
}

/// Blank keys count as unset.
fn secret(value: Option<String>) -> Option<SecretString> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}
