//! Verification metrics
//!
//! Enable with the `metrics` feature flag. Requires a `metrics` recorder
//! to be installed (e.g., via `metrics-exporter-prometheus`).
//!
//! ## Metrics Provided
//!
//! - `taxdesk_auth_verifications_total` - Counter for token verifications (labels: outcome)
//! - `taxdesk_auth_verification_duration_seconds` - Histogram for verification duration
//! - `taxdesk_auth_keyset_fetches_total` - Counter for key set fetches (labels: status)
//!
//! The `outcome` label is `success` or an [`AuthError::kind`](crate::AuthError::kind)
//! label such as `token_expired`.

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Initialize metric descriptions. Call once at startup.
///
/// Idempotent: only the first call registers the descriptions.
#[cfg(feature = "metrics")]
pub fn init_auth_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "taxdesk_auth_verifications_total",
            "Total bearer token verifications by outcome"
        );
        describe_histogram!(
            "taxdesk_auth_verification_duration_seconds",
            "Token verification duration in seconds, key set fetches included"
        );
        describe_counter!(
            "taxdesk_auth_keyset_fetches_total",
            "Total outbound key set fetches by status"
        );
    });
}

/// Record a finished verification.
///
/// # Arguments
///
/// * `outcome` - `success` or the error kind
/// * `duration_seconds` - Wall time spent in the verifier
#[cfg(feature = "metrics")]
pub(crate) fn record_verification(outcome: &'static str, duration_seconds: f64) {
    counter!("taxdesk_auth_verifications_total", "outcome" => outcome).increment(1);
    histogram!("taxdesk_auth_verification_duration_seconds").record(duration_seconds);
}

/// Record a key set fetch.
///
/// # Arguments
///
/// * `status` - `success`, `http_error`, `network_error` or `malformed`
#[cfg(feature = "metrics")]
pub(crate) fn record_keyset_fetch(status: &'static str) {
    counter!("taxdesk_auth_keyset_fetches_total", "status" => status).increment(1);
}

// No-op versions when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_auth_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_verification(_outcome: &'static str, _duration_seconds: f64) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_keyset_fetch(_status: &'static str) {}
