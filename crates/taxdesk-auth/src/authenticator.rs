//! Request-facing facade over the key set cache, verifier and identity mapping

use std::sync::Arc;

use tracing::info;

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::identity::{CallerIdentity, extract};
use crate::jwt::{ClaimSet, KeySetCache, TokenVerifier};

/// Turns bearer credentials into caller identities.
///
/// Cheap to clone; clones share one key set cache.
///
/// # Example
///
/// ```rust,no_run
/// # use taxdesk_auth::{AuthConfig, Authenticator};
/// # tokio_test::block_on(async {
/// let auth = Authenticator::from_config(&AuthConfig::new("https://abcd.supabase.co"))?;
/// auth.warm_up().await?;
///
/// let caller = auth.authenticate_header(Some("Bearer eyJhbGciOi...")).await?;
/// let user_id = caller.require_authenticated()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Authenticator {
    verifier: TokenVerifier,
}

impl Authenticator {
    /// Build the cache and verifier for a provider.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the configuration does not validate, the key
    /// set endpoint is not acceptable or the HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let keys = Arc::new(KeySetCache::new(config)?);
        let verifier = TokenVerifier::new(keys.clone(), config)?;
        info!(
            jwks_url = %keys.endpoint(),
            issuer = %config.issuer(),
            "Authenticator configured"
        );
        Ok(Self { verifier })
    }

    /// Wrap an existing verifier.
    pub fn from_verifier(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    /// Underlying verifier.
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Fetch the provider key set ahead of the first request.
    pub async fn warm_up(&self) -> Result<()> {
        self.verifier.key_cache().warm_up().await
    }

    /// Verify a raw token and return its claims.
    pub async fn verify(&self, token: &str) -> Result<ClaimSet> {
        self.verifier.verify(token).await
    }

    /// Verify a raw token and return the caller identity.
    pub async fn authenticate(&self, token: &str) -> Result<CallerIdentity> {
        let claims = self.verifier.verify(token).await?;
        Ok(extract(&claims))
    }

    /// Authenticate from an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingCredentials`] when the header is absent or is not
    /// a `Bearer` credential, otherwise as [`authenticate`](Self::authenticate).
    pub async fn authenticate_header(&self, authorization: Option<&str>) -> Result<CallerIdentity> {
        let token = authorization
            .and_then(bearer_token)
            .ok_or(AuthError::MissingCredentials)?;
        self.authenticate(token).await
    }
}

/// Token from an `Authorization: Bearer <token>` value. The scheme is case-insensitive.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
