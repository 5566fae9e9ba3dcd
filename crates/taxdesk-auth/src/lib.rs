//! # Taxdesk Auth - Bearer token verification
//!
//! Verifies access tokens issued by a Supabase-style identity provider
//! against the provider's published key set, and turns them into a caller
//! identity for authorization decisions.
//!
//! ## Architecture
//!
//! - [`jwt::KeySetCache`] - fetches and caches the provider JWKS with a TTL and
//!   single-flight refresh
//! - [`jwt::TokenVerifier`] - key selection, signature verification, claim validation
//! - [`identity::extract`] - verified claims to [`CallerIdentity`]
//! - [`Authenticator`] - facade composing the three, plus `Authorization` header parsing
//! - [`AuthConfig`] - configuration, loadable from file and `TAXDESK_` environment variables
//! - [`AuthError`] - failure taxonomy with HTTP status and `WWW-Authenticate` mapping
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taxdesk_auth::{AuthConfig, AuthError, Authenticator};
//!
//! # tokio_test::block_on(async {
//! let config = AuthConfig::new("https://abcd.supabase.co");
//! let auth = Authenticator::from_config(&config)?;
//!
//! match auth.authenticate_header(Some("Bearer eyJhbGciOi...")).await {
//!     Ok(caller) if caller.is_anonymous => println!("guest {}", caller.subject),
//!     Ok(caller) => println!("user {}", caller.subject),
//!     Err(err) => {
//!         let status = err.status_code();
//!         let challenge = err.www_authenticate();
//!         println!("{status}: {err} ({challenge:?})");
//!     }
//! }
//! # Ok::<(), AuthError>(())
//! # });
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics` - verification and key set fetch metrics via the `metrics` crate

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod authenticator;
pub mod challenge;
pub mod config;
pub mod error;
pub mod identity;
pub mod jwt;
pub mod metrics;

pub use authenticator::{Authenticator, bearer_token};
pub use challenge::{BearerChallenge, BearerError};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, Result};
pub use identity::{ANONYMOUS_ROLE, AUTHENTICATED_ROLE, CallerIdentity, extract};
pub use jwt::{Audience, ClaimSet, KeyRecord, KeySet, KeySetCache, TokenVerifier};
pub use metrics::init_auth_metrics;
