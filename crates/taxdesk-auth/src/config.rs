//! Authentication configuration
//!
//! [`AuthConfig`] carries everything the verification core needs: where the
//! provider lives, which issuer and audiences to accept, and how long fetched
//! key sets stay fresh. It can be built in code, or loaded from a
//! TOML/YAML/JSON file with `TAXDESK_`-prefixed environment variables layered
//! on top (environment wins).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Environment variable prefix used by [`AuthConfig::from_file`] and [`AuthConfig::from_env`].
pub const ENV_PREFIX: &str = "TAXDESK";

/// Upper bound accepted for `expiry_leeway_secs`.
pub const MAX_EXPIRY_LEEWAY_SECS: u64 = 300;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// Configuration loaded but semantically invalid
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Verification core configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Identity provider base URL, e.g. `https://abcd.supabase.co`.
    pub provider_url: String,

    /// Key set endpoint override. Defaults to `{provider_url}/auth/v1/jwks`.
    #[serde(default)]
    pub jwks_url: Option<String>,

    /// Expected `iss` claim override. Defaults to `{provider_url}/auth/v1`.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Accepted `aud` values. A token must carry at least one of them.
    #[serde(default = "default_allowed_audiences")]
    pub allowed_audiences: Vec<String>,

    /// How long a fetched key set is served without re-fetching.
    #[serde(default = "default_jwks_cache_ttl")]
    pub jwks_cache_ttl_secs: u64,

    /// Timeout for a single key set fetch.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Minimum spacing between forced refreshes triggered by unknown `kid`s.
    #[serde(default = "default_min_refresh_interval")]
    pub min_refresh_interval_secs: u64,

    /// Re-fetch the key set once when a token names an unknown `kid`.
    #[serde(default = "default_true")]
    pub refresh_on_unknown_kid: bool,

    /// Serve the last fetched key set when a refresh fails.
    #[serde(default)]
    pub serve_stale_on_error: bool,

    /// Grace period applied to `exp`. Zero unless set explicitly.
    #[serde(default)]
    pub expiry_leeway_secs: u64,
}

fn default_allowed_audiences() -> Vec<String> {
    vec!["authenticated".to_string(), "anon".to_string()]
}

fn default_jwks_cache_ttl() -> u64 {
    3600 // 1 hour
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_min_refresh_interval() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider_url: String::new(),
            jwks_url: None,
            issuer: None,
            allowed_audiences: default_allowed_audiences(),
            jwks_cache_ttl_secs: default_jwks_cache_ttl(),
            fetch_timeout_secs: default_fetch_timeout(),
            min_refresh_interval_secs: default_min_refresh_interval(),
            refresh_on_unknown_kid: true,
            serve_stale_on_error: false,
            expiry_leeway_secs: 0,
        }
    }
}

impl AuthConfig {
    /// Configuration for a provider with every other setting at its default.
    pub fn new(provider_url: impl Into<String>) -> Self {
        Self {
            provider_url: provider_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// Environment variables with the `TAXDESK_` prefix override file
    /// settings, e.g. `TAXDESK_JWKS_CACHE_TTL_SECS=600`. List values such as
    /// `TAXDESK_ALLOWED_AUDIENCES` are comma separated.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(Some(path.as_ref()), env_source())
    }

    /// Load configuration from `TAXDESK_`-prefixed environment variables only.
    ///
    /// # Errors
    ///
    /// Returns an error if required settings are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None, env_source())
    }

    fn load(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }

            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml") | Some("yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(ConfigError::UnsupportedFormat),
            };

            builder = builder.add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ));
        }

        let config: Self = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_url.is_empty() {
            return Err(ConfigError::Invalid("provider_url is required".to_string()));
        }

        for (name, value) in [
            ("provider_url", Some(self.provider_url.as_str())),
            ("jwks_url", self.jwks_url.as_deref()),
        ] {
            if let Some(value) = value {
                let parsed = url::Url::parse(value)
                    .map_err(|e| ConfigError::Invalid(format!("{name} is not a valid URL: {e}")))?;
                if !matches!(parsed.scheme(), "https" | "http") {
                    return Err(ConfigError::Invalid(format!(
                        "{name} must be an HTTP(S) URL"
                    )));
                }
            }
        }

        if self.allowed_audiences.iter().all(|aud| aud.is_empty()) {
            return Err(ConfigError::Invalid(
                "allowed_audiences must name at least one audience".to_string(),
            ));
        }

        if self.jwks_cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "jwks_cache_ttl_secs must be greater than zero".to_string(),
            ));
        }

        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.expiry_leeway_secs > MAX_EXPIRY_LEEWAY_SECS {
            return Err(ConfigError::Invalid(format!(
                "expiry_leeway_secs must not exceed {MAX_EXPIRY_LEEWAY_SECS}"
            )));
        }

        Ok(())
    }

    fn base_url(&self) -> &str {
        self.provider_url.trim_end_matches('/')
    }

    /// Key set endpoint URL.
    pub fn jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("{}/auth/v1/jwks", self.base_url()))
    }

    /// Expected `iss` claim.
    pub fn issuer(&self) -> String {
        self.issuer
            .clone()
            .unwrap_or_else(|| format!("{}/auth/v1", self.base_url()))
    }

    /// Key set time-to-live.
    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_secs)
    }

    /// Fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Minimum spacing between forced refreshes.
    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_secs)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("allowed_audiences")
}
