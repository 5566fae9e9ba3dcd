//! JWT infrastructure: key set caching, token verification and claim types
//!
//! # Architecture
//!
//! ```text
//! raw token ──► TokenVerifier ──► ClaimSet ──► identity::extract ──► CallerIdentity
//!                     │
//!                     ▼
//!               KeySetCache ──► provider JWKS endpoint
//! ```
//!
//! - `jwks` - key set fetching and single-flight caching
//! - `validator` - header parsing, key resolution, signature and claim checks

pub mod jwks;
pub mod validator;

pub use jwks::{KeyRecord, KeySet, KeySetCache};
pub use validator::TokenVerifier;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audience can be a single string or an array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// No `aud` claim
    #[default]
    None,
    /// `"aud": "authenticated"`
    Single(String),
    /// `"aud": ["authenticated", "other"]`
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `aud` names the given audience.
    pub fn contains(&self, aud: &str) -> bool {
        match self {
            Audience::None => false,
            Audience::Single(s) => s == aud,
            Audience::Multiple(v) => v.iter().any(|a| a == aud),
        }
    }

    /// Whether any of `allowed` appears in `aud`.
    pub fn intersects(&self, allowed: &[String]) -> bool {
        allowed.iter().any(|aud| self.contains(aud))
    }

    fn into_vec(self) -> Vec<String> {
        match self {
            Audience::None => Vec::new(),
            Audience::Single(s) => vec![s],
            Audience::Multiple(v) => v,
        }
    }
}

/// Token payload as signed by the provider, before claim validation.
///
/// Every field is optional here so that a missing claim is reported as
/// [`AuthError::InvalidClaims`](crate::AuthError::InvalidClaims) by the
/// verifier rather than as a decoding failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct UnvalidatedClaims {
    pub sub: Option<String>,
    pub role: Option<String>,
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Audience,
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Verified token claims.
///
/// Only [`TokenVerifier`] constructs values of this type, and only after the
/// token's signature has been checked against a provider key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimSet {
    subject: String,
    role: String,
    issuer: String,
    audience: Vec<String>,
    expires_at: i64,
    issued_at: Option<i64>,
    email: Option<String>,
    extra: HashMap<String, serde_json::Value>,
}

impl ClaimSet {
    pub(crate) fn new(
        subject: String,
        role: String,
        issuer: String,
        audience: Audience,
        expires_at: i64,
        raw: UnvalidatedClaims,
    ) -> Self {
        Self {
            subject,
            role,
            issuer,
            audience: audience.into_vec(),
            expires_at,
            issued_at: raw.iat,
            email: raw.email,
            extra: raw.extra,
        }
    }

    /// Subject (`sub`), the provider's user id.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Provider role (`role`), e.g. `authenticated` or `anon`.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Issuer (`iss`).
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Audiences (`aud`).
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    /// Expiry (`exp`) in seconds since the Unix epoch.
    pub fn expires_at_secs(&self) -> i64 {
        self.expires_at
    }

    /// Expiry as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    /// Issued-at (`iat`) in seconds since the Unix epoch.
    pub fn issued_at_secs(&self) -> Option<i64> {
        self.issued_at
    }

    /// Email address, when the provider includes one.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Any other claim, e.g. `app_metadata` or `session_id`.
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

#[cfg(test)]
pub(crate) fn test_claim_set(subject: &str, role: &str) -> ClaimSet {
    ClaimSet::new(
        subject.to_string(),
        role.to_string(),
        "https://abcd.supabase.co/auth/v1".to_string(),
        Audience::Single(role.to_string()),
        Utc::now().timestamp() + 600,
        UnvalidatedClaims::default(),
    )
}
