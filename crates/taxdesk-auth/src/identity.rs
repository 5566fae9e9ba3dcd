//! Caller identity derived from verified claims

use serde::Serialize;

use crate::error::{AuthError, Result};
use crate::jwt::ClaimSet;

/// Role the provider assigns to guest sessions.
pub const ANONYMOUS_ROLE: &str = "anon";

/// Role the provider assigns to signed-in users.
pub const AUTHENTICATED_ROLE: &str = "authenticated";

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallerIdentity {
    /// Provider user id (`sub`).
    pub subject: String,
    /// Guest session rather than a signed-in user.
    pub is_anonymous: bool,
}

impl CallerIdentity {
    /// Subject of a signed-in caller.
    ///
    /// # Errors
    ///
    /// [`AuthError::AnonymousNotPermitted`] for guest sessions.
    pub fn require_authenticated(&self) -> Result<&str> {
        if self.is_anonymous {
            return Err(AuthError::AnonymousNotPermitted);
        }
        Ok(&self.subject)
    }
}

/// Map verified claims to the caller identity.
pub fn extract(claims: &ClaimSet) -> CallerIdentity {
    CallerIdentity {
        subject: claims.subject().to_string(),
        is_anonymous: claims.role() == ANONYMOUS_ROLE,
    }
}
