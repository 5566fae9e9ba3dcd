//! Command-line interface for taxdesk-verify

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use taxdesk_auth::{AuthConfig, AuthError, Authenticator, KeySetCache};
use taxdesk_llm::{
    ChatMessage, GeneratedResponse, LlmClient, LlmError, LlmProvider, LlmSettings,
    ProviderRegistry,
};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

/// taxdesk-verify - check bearer tokens against the identity provider
#[derive(Parser, Debug)]
#[command(
    name = "taxdesk-verify",
    version,
    about = "Verify Taxdesk bearer tokens against the provider key set",
    author
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML, YAML or JSON); TAXDESK_* variables override it
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Identity provider base URL, overriding the configuration
    #[arg(long, value_name = "URL", env = "TAXDESK_PROVIDER_URL", global = true)]
    pub provider_url: Option<String>,

    /// Enable verbose logging (-v, -vv, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify a token and print the caller identity
    Verify {
        /// Token, or `-` to read it from stdin (default)
        #[arg(value_name = "TOKEN")]
        token: Option<String>,

        /// Treat the input as a full `Authorization` header value
        #[arg(long)]
        header: bool,

        /// Reject guest sessions
        #[arg(long)]
        require_authenticated: bool,
    },

    /// Fetch the provider key set and list its keys
    Keys,

    /// Show which LLM providers are configured
    Providers {
        /// Provider a request would ask for (default provider if omitted)
        #[arg(long, value_name = "NAME")]
        select: Option<String>,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Human,
    /// JSON object
    Json,
}

#[derive(Debug, Serialize)]
struct VerifyReport<'a> {
    subject: &'a str,
    is_anonymous: bool,
    role: &'a str,
    email: Option<&'a str>,
    expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct KeyReport<'a> {
    kid: &'a str,
    kty: &'static str,
    alg: Option<String>,
    usable: bool,
}

impl Cli {
    /// Execute the CLI command
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or the command fails.
    pub async fn execute(self) -> Result<()> {
        self.init_tracing();

        match &self.command {
            Command::Verify {
                token,
                header,
                require_authenticated,
            } => {
                let input = read_input(token.as_deref())?;
                self.verify(&input, *header, *require_authenticated).await
            }
            Command::Keys => self.keys().await,
            Command::Providers { select } => self.providers(select.as_deref()),
        }
    }

    /// Initialize tracing; `RUST_LOG` wins over `-v`
    fn init_tracing(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    fn auth_config(&self) -> Result<AuthConfig> {
        let mut config = match (&self.config, &self.provider_url) {
            (Some(path), _) => AuthConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            (None, Some(url)) => AuthConfig::new(url.clone()),
            (None, None) => AuthConfig::from_env()
                .context("no --config or --provider-url given and TAXDESK_* environment is incomplete")?,
        };
        if let Some(url) = &self.provider_url {
            config.provider_url = url.clone();
        }
        config.validate()?;
        Ok(config)
    }

    async fn verify(&self, input: &str, header: bool, require_authenticated: bool) -> Result<()> {
        let config = self.auth_config()?;
        let auth = Authenticator::from_config(&config)?;

        let token = if header {
            taxdesk_auth::bearer_token(input).ok_or(AuthError::MissingCredentials)
        } else {
            Ok(input)
        };
        let claims = match token {
            Ok(token) => auth.verify(token).await,
            Err(err) => Err(err),
        }
        .map_err(report_auth_error)?;

        let caller = taxdesk_auth::extract(&claims);
        if require_authenticated {
            caller.require_authenticated().map_err(report_auth_error)?;
        }
        info!(anonymous = caller.is_anonymous, "Token accepted");

        let report = VerifyReport {
            subject: &caller.subject,
            is_anonymous: caller.is_anonymous,
            role: claims.role(),
            email: claims.email(),
            expires_at: claims.expires_at().map(|t| t.to_rfc3339()),
        };
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Human => {
                let kind = if report.is_anonymous { "guest" } else { "user" };
                println!("{kind} {}", report.subject);
                println!("  role:    {}", report.role);
                if let Some(email) = report.email {
                    println!("  email:   {email}");
                }
                if let Some(expires_at) = &report.expires_at {
                    println!("  expires: {expires_at}");
                }
            }
        }
        Ok(())
    }

    async fn keys(&self) -> Result<()> {
        let config = self.auth_config()?;
        let cache = KeySetCache::new(&config)?;
        let keys = cache.get_current_keyset().await?;

        let reports: Vec<_> = keys
            .iter()
            .map(|key| KeyReport {
                kid: key.kid(),
                kty: key.key_type(),
                alg: key.declared_algorithm().map(|alg| alg.to_string()),
                usable: key.decoding_key().is_ok(),
            })
            .collect();

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
            OutputFormat::Human => {
                println!("{} key(s) from {}", reports.len(), cache.endpoint());
                for key in &reports {
                    let usable = if key.usable { "" } else { " (unusable)" };
                    println!(
                        "  {} {} {}{usable}",
                        key.kid,
                        key.kty,
                        key.alg.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Ok(())
    }

    fn providers(&self, select: Option<&str>) -> Result<()> {
        let settings = match &self.config {
            Some(path) => LlmSettings::from_file(path)?,
            None => LlmSettings::from_env()?,
        };
        let registry = ProviderRegistry::from_settings(settings, |provider, _key| {
            Ok(Arc::new(Offline(provider)) as Arc<dyn LlmClient>)
        })?;
        let selected = registry.resolve(select)?;

        match self.format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({
                    "default": registry.default_provider(),
                    "available": registry.available(),
                    "selected": selected,
                })
            ),
            OutputFormat::Human => {
                let available: Vec<_> = registry.available().iter().map(|p| p.as_str()).collect();
                println!("default:   {}", registry.default_provider());
                println!("available: {}", available.join(", "));
                println!("selected:  {selected}");
            }
        }
        Ok(())
    }
}

/// Stands in for a provider client; this tool never sends prompts.
#[derive(Debug)]
struct Offline(LlmProvider);

#[async_trait]
impl LlmClient for Offline {
    fn provider(&self) -> LlmProvider {
        self.0
    }

    async fn generate_response(
        &self,
        _message: &str,
        _history: &[ChatMessage],
    ) -> taxdesk_llm::Result<GeneratedResponse> {
        Err(LlmError::Generation {
            provider: self.0,
            message: "taxdesk-verify does not call LLM providers".to_string(),
        })
    }
}

/// Print the HTTP mapping of an auth failure before handing it up.
fn report_auth_error(err: AuthError) -> anyhow::Error {
    eprintln!("HTTP {}", err.status_code());
    if let Some(challenge) = err.www_authenticate() {
        eprintln!("WWW-Authenticate: {challenge}");
    }
    err.into()
}

fn read_input(arg: Option<&str>) -> Result<String> {
    let input = match arg {
        Some(value) if value != "-" => value.to_string(),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading token from stdin")?;
            buf
        }
    };
    let input = input.trim().to_string();
    if input.is_empty() {
        bail!("no token given");
    }
    Ok(input)
}
