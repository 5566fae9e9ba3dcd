//! Bearer token verification
//!
//! [`TokenVerifier::verify`] runs each token through a fixed sequence:
//!
//! 1. **Parse header**: three non-empty segments, readable header with a `kid`
//! 2. **Resolve key**: look up `kid` in the cached key set, with at most one
//!    forced refresh on a miss
//! 3. **Verify signature**: with the algorithm of the key record, never the
//!    algorithm the token claims
//! 4. **Validate claims**: `sub`, `role`, `exp`, `iss`, `aud`, and only then expiry
//!
//! The first failing step decides the [`AuthError`] returned.

use std::sync::Arc;
use std::time::Instant;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Header, Validation, decode, decode_header};
use tracing::{debug, error, info, warn};

use super::jwks::{KeyRecord, KeySetCache};
use super::{ClaimSet, UnvalidatedClaims};
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::metrics;

/// Verifies provider-issued bearer tokens.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use taxdesk_auth::{AuthConfig, jwt::{KeySetCache, TokenVerifier}};
/// # tokio_test::block_on(async {
/// let config = AuthConfig::new("https://abcd.supabase.co");
/// let keys = Arc::new(KeySetCache::new(&config)?);
/// let verifier = TokenVerifier::new(keys, &config)?;
///
/// let claims = verifier.verify("eyJhbGciOiJSUzI1NiIs...").await?;
/// println!("subject: {}", claims.subject());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    issuer: String,
    allowed_audiences: Vec<String>,
    refresh_on_unknown_kid: bool,
    expiry_leeway_secs: i64,
}

impl TokenVerifier {
    /// Create a verifier drawing keys from `keys`.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if `config` does not validate, e.g. an expiry
    /// leeway above [`MAX_EXPIRY_LEEWAY_SECS`](crate::config::MAX_EXPIRY_LEEWAY_SECS).
    pub fn new(keys: Arc<KeySetCache>, config: &AuthConfig) -> Result<Self> {
        config.validate()?;
        let expiry_leeway_secs = i64::try_from(config.expiry_leeway_secs)
            .map_err(|_| AuthError::Internal("expiry leeway out of range".to_string()))?;

        Ok(Self {
            keys,
            issuer: config.issuer(),
            allowed_audiences: config
                .allowed_audiences
                .iter()
                .filter(|aud| !aud.is_empty())
                .cloned()
                .collect(),
            refresh_on_unknown_kid: config.refresh_on_unknown_kid,
            expiry_leeway_secs,
        })
    }

    /// Key set cache backing this verifier.
    pub fn key_cache(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Expected issuer.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify a raw compact token and return its claims.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] - not a compact JWS, or header without `kid`
    /// - [`AuthError::UnknownSigningKey`] - `kid` not in the (refreshed) key set
    /// - [`AuthError::InvalidSignature`] - bad signature or algorithm mismatch
    /// - [`AuthError::InvalidClaims`] - missing claim, wrong issuer or audience
    /// - [`AuthError::TokenExpired`] - otherwise valid but past `exp`
    /// - [`AuthError::KeyServiceUnavailable`] - key set could not be fetched
    /// - [`AuthError::Internal`] - key material unusable for verification
    pub async fn verify(&self, token: &str) -> Result<ClaimSet> {
        let started = Instant::now();
        let result = self.run(token).await;

        let outcome = match &result {
            Ok(claims) => {
                debug!(
                    subject = %claims.subject(),
                    role = %claims.role(),
                    "Token verified"
                );
                "success"
            }
            Err(err) if err.is_client_error() => {
                warn!(reason = err.kind(), error = %err, "Token rejected");
                err.kind()
            }
            Err(err) => {
                error!(reason = err.kind(), error = %err, "Token verification failed");
                err.kind()
            }
        };
        metrics::record_verification(outcome, started.elapsed().as_secs_f64());

        result
    }

    async fn run(&self, token: &str) -> Result<ClaimSet> {
        let (header, kid) = parse_header(token)?;
        let record = self.resolve_key(&kid).await?;
        let raw = verify_signature(token, &header, &record)?;
        self.validate_claims(raw, Utc::now().timestamp())
    }

    async fn resolve_key(&self, kid: &str) -> Result<KeyRecord> {
        let entry = self.keys.current().await?;
        if let Some(record) = entry.keys().find(kid) {
            return Ok(record.clone());
        }

        if !self.refresh_on_unknown_kid {
            return Err(AuthError::UnknownSigningKey {
                kid: kid.to_string(),
            });
        }

        info!(
            key_id = kid,
            generation = entry.generation(),
            "Key ID not in cached key set, forcing refresh"
        );
        let refreshed = self.keys.refresh_after_miss(&entry).await?;
        refreshed
            .keys()
            .find(kid)
            .cloned()
            .ok_or_else(|| AuthError::UnknownSigningKey {
                kid: kid.to_string(),
            })
    }

    fn validate_claims(&self, mut raw: UnvalidatedClaims, now: i64) -> Result<ClaimSet> {
        let subject = take_non_empty(&mut raw.sub, "sub")?;
        let role = take_non_empty(&mut raw.role, "role")?;
        let expires_at = raw
            .exp
            .ok_or_else(|| AuthError::InvalidClaims("missing exp".to_string()))?;

        let issuer = match raw.iss.take() {
            Some(iss) if iss == self.issuer => iss,
            Some(iss) => {
                return Err(AuthError::InvalidClaims(format!(
                    "unexpected issuer {iss}"
                )));
            }
            None => return Err(AuthError::InvalidClaims("missing iss".to_string())),
        };

        let audience = std::mem::take(&mut raw.aud);
        if !audience.intersects(&self.allowed_audiences) {
            return Err(AuthError::InvalidClaims(
                "audience not allowed".to_string(),
            ));
        }

        if now > expires_at.saturating_add(self.expiry_leeway_secs) {
            return Err(AuthError::TokenExpired);
        }

        Ok(ClaimSet::new(
            subject, role, issuer, audience, expires_at, raw,
        ))
    }
}

fn take_non_empty(value: &mut Option<String>, name: &str) -> Result<String> {
    value
        .take()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::InvalidClaims(format!("missing {name}")))
}

/// Structural check plus header decode. Returns the header and its `kid`.
fn parse_header(token: &str) -> Result<(Header, String)> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(AuthError::MalformedToken(
            "expected three non-empty segments".to_string(),
        ));
    }
    for (name, segment) in [("payload", segments[1]), ("signature", segments[2])] {
        URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|_| AuthError::MalformedToken(format!("{name} is not base64url")))?;
    }

    let header = decode_header(token).map_err(|e| {
        debug!(error = %e, "Failed to decode JWT header");
        AuthError::MalformedToken(format!("unreadable header: {e}"))
    })?;

    let kid = header
        .kid
        .clone()
        .filter(|kid| !kid.is_empty())
        .ok_or_else(|| AuthError::MalformedToken("header has no kid".to_string()))?;

    Ok((header, kid))
}

fn verify_signature(token: &str, header: &Header, record: &KeyRecord) -> Result<UnvalidatedClaims> {
    let (key, algorithm) = record.decoding_key()?;

    if header.alg != algorithm {
        warn!(
            key_id = record.kid(),
            token_alg = ?header.alg,
            key_alg = ?algorithm,
            "Token algorithm does not match signing key"
        );
        return Err(AuthError::InvalidSignature);
    }

    // Signature only; claims are checked by validate_claims
    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    decode::<UnvalidatedClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(map_decode_error)
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::InvalidSignature,
        // decode only deserializes the payload once the signature checks out
        ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            AuthError::InvalidClaims(format!("payload does not match expected claims: {err}"))
        }
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::MalformedToken(err.to_string()),
        ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidEddsaKey
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidKeyFormat => {
            AuthError::Internal(format!("unusable verification key: {err}"))
        }
        _ => {
            debug!(error = %err, "Unexpected JWT decode failure");
            AuthError::Internal(format!("token verification failed: {err}"))
        }
    }
}
