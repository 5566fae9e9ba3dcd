//! Authentication error types
//!
//! Every verification failure lands in exactly one [`AuthError`] variant.
//! Client-attributable failures map to `401`/`403`, a key service outage maps
//! to `503` and anything else that went wrong on our side maps to `500`.

use http::StatusCode;
use thiserror::Error;

use crate::challenge::{BearerChallenge, BearerError};
use crate::config::ConfigError;

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No bearer credential was supplied with the request.
    #[error("Not authenticated")]
    MissingCredentials,

    /// Token is not a structurally valid compact JWS or its header is unreadable.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// No key in the current (possibly refreshed) key set matches the token's `kid`.
    #[error("Unknown signing key: {kid}")]
    UnknownSigningKey {
        /// Key ID named by the token header.
        kid: String,
    },

    /// Signature does not verify under the resolved key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Required claim missing, issuer mismatch or audience mismatch.
    #[error("Invalid claims in token: {0}")]
    InvalidClaims(String),

    /// Token is otherwise valid but its `exp` has passed.
    #[error("Token has expired")]
    TokenExpired,

    /// Caller holds a guest session on a path that needs a signed-in user.
    #[error("Requires authenticated user")]
    AnonymousNotPermitted,

    /// Key set endpoint unreachable, timed out, non-2xx or malformed.
    #[error("Key service unavailable: {0}")]
    KeyServiceUnavailable(String),

    /// Failure on our side (unsupported key material, client construction).
    #[error("Internal authentication error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status a request handler should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials
            | AuthError::MalformedToken(_)
            | AuthError::UnknownSigningKey { .. }
            | AuthError::InvalidSignature
            | AuthError::InvalidClaims(_)
            | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::AnonymousNotPermitted => StatusCode::FORBIDDEN,
            AuthError::KeyServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure is attributable to the caller's credential.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Short stable label, used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::UnknownSigningKey { .. } => "unknown_signing_key",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::InvalidClaims(_) => "invalid_claims",
            AuthError::TokenExpired => "token_expired",
            AuthError::AnonymousNotPermitted => "anonymous_not_permitted",
            AuthError::KeyServiceUnavailable(_) => "key_service_unavailable",
            AuthError::Internal(_) => "internal",
        }
    }

    /// `WWW-Authenticate` value for `401` responses (RFC 6750).
    ///
    /// Returns `None` for errors that are not answered with `401`.
    pub fn www_authenticate(&self) -> Option<String> {
        let challenge = match self {
            // RFC 6750 §3.1: no error code when the request had no credential
            AuthError::MissingCredentials => BearerChallenge::new(),
            AuthError::TokenExpired => BearerChallenge::new()
                .error(BearerError::InvalidToken)
                .description("Token has expired"),
            AuthError::MalformedToken(_)
            | AuthError::UnknownSigningKey { .. }
            | AuthError::InvalidSignature
            | AuthError::InvalidClaims(_) => BearerChallenge::new()
                .error(BearerError::InvalidToken)
                .description("Could not validate credentials"),
            _ => return None,
        };
        Some(challenge.to_header_value())
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
