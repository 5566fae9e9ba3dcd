//! `WWW-Authenticate` challenges for rejected bearer tokens (RFC 6750 §3)
//!
//! ```text
//! WWW-Authenticate: Bearer error="invalid_token", error_description="Token has expired"
//! ```

use std::fmt;

/// Error codes per RFC 6750 Section 3.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerError {
    /// The access token is expired, malformed, or invalid for other reasons.
    InvalidToken,
}

impl BearerError {
    /// Get the error code string per RFC 6750
    pub fn as_str(&self) -> &'static str {
        match self {
            BearerError::InvalidToken => "invalid_token",
        }
    }
}

impl fmt::Display for BearerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bearer challenge sent alongside a `401` response.
#[derive(Debug, Clone, Default)]
pub struct BearerChallenge {
    error: Option<BearerError>,
    error_description: Option<String>,
}

impl BearerChallenge {
    /// Bare `Bearer` challenge with no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the error code.
    pub fn error(mut self, error: BearerError) -> Self {
        self.error = Some(error);
        self
    }

    /// Set the human-readable error description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    /// Convert to a `WWW-Authenticate` header value.
    pub fn to_header_value(&self) -> String {
        let mut params = Vec::new();

        if let Some(error) = self.error {
            params.push(format!("error=\"{}\"", error.as_str()));
        }
        if let Some(ref desc) = self.error_description {
            params.push(format!(
                "error_description=\"{}\"",
                escape_param_value(desc)
            ));
        }

        if params.is_empty() {
            "Bearer".to_string()
        } else {
            format!("Bearer {}", params.join(", "))
        }
    }
}

/// Backslash-escape quotes and backslashes inside a quoted-string.
fn escape_param_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
