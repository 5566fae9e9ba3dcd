//! Provider key set fetching and caching
//!
//! [`KeySetCache`] owns the provider's public signing keys:
//!
//! - **TTL-based caching**: a fetched set is served without network access
//!   until `fetched_at + ttl`
//! - **Single-flight refresh**: concurrent misses share one outbound fetch and
//!   its outcome, failures included
//! - **Forced refresh on unknown `kid`**: rate limited by a minimum interval
//! - **Stale fallback**: optional, off by default
//!
//! # Security Considerations
//!
//! - Only `https://` endpoints are accepted, plus `http://` to loopback hosts
//! - Readers only ever see a complete key set; refresh swaps the whole entry
//! - Encryption keys and unknown key types are never used for verification

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::metrics;

const RSA_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// One public key from the provider's JWKS document, with a required `kid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    kid: String,
    jwk: Jwk,
}

impl KeyRecord {
    /// Wrap a JWK, rejecting one without a `kid`.
    ///
    /// # Errors
    ///
    /// [`AuthError::KeyServiceUnavailable`] if the JWK has no (or an empty) `kid`.
    pub fn from_jwk(jwk: Jwk) -> Result<Self> {
        let kid = jwk
            .common
            .key_id
            .clone()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| {
                AuthError::KeyServiceUnavailable("malformed key set: key without kid".to_string())
            })?;
        Ok(Self { kid, jwk })
    }

    /// Key ID.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The underlying JWK.
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// Key type as published (`RSA`, `EC`, `OKP`, `oct`).
    pub fn key_type(&self) -> &'static str {
        match &self.jwk.algorithm {
            AlgorithmParameters::RSA(_) => "RSA",
            AlgorithmParameters::EllipticCurve(_) => "EC",
            AlgorithmParameters::OctetKeyPair(_) => "OKP",
            AlgorithmParameters::OctetKey(_) => "oct",
        }
    }

    /// The `alg` member, if published.
    pub fn declared_algorithm(&self) -> Option<KeyAlgorithm> {
        self.jwk.common.key_algorithm
    }

    /// Algorithm this key verifies with.
    ///
    /// Taken from `alg` when present, otherwise implied by the key type and
    /// curve. Fails with [`AuthError::Internal`] for encryption keys,
    /// symmetric keys, unsupported curves, and an `alg` from another key family.
    pub fn algorithm(&self) -> Result<Algorithm> {
        if self.jwk.common.public_key_use == Some(PublicKeyUse::Encryption) {
            return Err(unusable(self, "encryption key cannot verify signatures"));
        }

        let (implied, family): (Algorithm, &[Algorithm]) = match &self.jwk.algorithm {
            AlgorithmParameters::RSA(_) => (Algorithm::RS256, RSA_ALGORITHMS),
            AlgorithmParameters::EllipticCurve(params) => match &params.curve {
                EllipticCurve::P256 => (Algorithm::ES256, &[Algorithm::ES256]),
                EllipticCurve::P384 => (Algorithm::ES384, &[Algorithm::ES384]),
                other => {
                    return Err(unusable(self, &format!("unsupported EC curve {other:?}")));
                }
            },
            AlgorithmParameters::OctetKeyPair(params) => match &params.curve {
                EllipticCurve::Ed25519 => (Algorithm::EdDSA, &[Algorithm::EdDSA]),
                other => {
                    return Err(unusable(self, &format!("unsupported OKP curve {other:?}")));
                }
            },
            AlgorithmParameters::OctetKey(_) => {
                return Err(unusable(self, "symmetric keys are not accepted"));
            }
        };

        let Some(declared) = self.declared_algorithm() else {
            return Ok(implied);
        };
        let algorithm = Algorithm::from_str(&declared.to_string())
            .map_err(|_| unusable(self, &format!("unsupported algorithm {declared}")))?;
        if !family.contains(&algorithm) {
            return Err(unusable(
                self,
                &format!("algorithm {declared} does not match key type {}", self.key_type()),
            ));
        }
        Ok(algorithm)
    }

    /// Build the verification key and its algorithm.
    ///
    /// Key parameters are size-checked here so that bad key material is an
    /// [`AuthError::Internal`] rather than a failed signature later.
    pub fn decoding_key(&self) -> Result<(DecodingKey, Algorithm)> {
        let algorithm = self.algorithm()?;

        match &self.jwk.algorithm {
            AlgorithmParameters::RSA(params) => {
                self.component("n", &params.n, None)?;
                self.component("e", &params.e, None)?;
            }
            AlgorithmParameters::EllipticCurve(params) => {
                let size = if algorithm == Algorithm::ES384 { 48 } else { 32 };
                self.component("x", &params.x, Some(size))?;
                self.component("y", &params.y, Some(size))?;
            }
            AlgorithmParameters::OctetKeyPair(params) => {
                self.component("x", &params.x, Some(32))?;
            }
            AlgorithmParameters::OctetKey(_) => {}
        }

        let key = DecodingKey::from_jwk(&self.jwk)
            .map_err(|e| unusable(self, &format!("invalid key parameters: {e}")))?;
        Ok((key, algorithm))
    }

    fn component(&self, name: &str, value: &str, size: Option<usize>) -> Result<()> {
        let bytes = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|_| unusable(self, &format!("'{name}' is not base64url")))?;
        if bytes.is_empty() {
            return Err(unusable(self, &format!("{} key missing '{name}'", self.key_type())));
        }
        match size {
            Some(size) if bytes.len() != size => Err(unusable(
                self,
                &format!("'{name}' is {} bytes, expected {size}", bytes.len()),
            )),
            _ => Ok(()),
        }
    }
}

fn unusable(record: &KeyRecord, reason: &str) -> AuthError {
    AuthError::Internal(format!("key {}: {reason}", record.kid))
}

/// Provider key set with unique key IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<KeyRecord>,
}

impl KeySet {
    /// Build a key set, rejecting keys without a `kid` and duplicate `kid`s.
    pub fn from_records(keys: Vec<Jwk>) -> Result<Self> {
        let mut records: Vec<KeyRecord> = Vec::with_capacity(keys.len());
        for jwk in keys {
            let record = KeyRecord::from_jwk(jwk)?;
            if records.iter().any(|other| other.kid == record.kid) {
                return Err(AuthError::KeyServiceUnavailable(format!(
                    "malformed key set: duplicate kid {}",
                    record.kid
                )));
            }
            records.push(record);
        }
        Ok(Self { keys: records })
    }

    /// Parse a JWKS document (`{"keys": [...]}`).
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let document: JwkSet = serde_json::from_slice(body)
            .map_err(|e| AuthError::KeyServiceUnavailable(format!("malformed key set: {e}")))?;
        Self::from_records(document.keys)
    }

    /// Look up a key by ID.
    pub fn find(&self, kid: &str) -> Option<&KeyRecord> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in document order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyRecord> {
        self.keys.iter()
    }
}

/// A fetched key set plus its freshness metadata.
#[derive(Debug)]
pub struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: Instant,
    ttl: Duration,
    generation: u64,
}

impl CachedKeySet {
    /// The cached keys.
    pub fn keys(&self) -> &Arc<KeySet> {
        &self.keys
    }

    /// Incremented on every successful fetch, starting at 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Age of this entry.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Whether the entry is still within its TTL.
    pub fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }
}

/// Key set cache with single-flight refresh.
///
/// Create one per provider at startup and share it via `Arc`.
///
/// # Example
///
/// ```rust,no_run
/// # use taxdesk_auth::{AuthConfig, jwt::KeySetCache};
/// # tokio_test::block_on(async {
/// let cache = KeySetCache::new(&AuthConfig::new("https://abcd.supabase.co"))?;
///
/// let keys = cache.get_current_keyset().await?;
/// if let Some(key) = keys.find("k1") {
///     println!("{} key", key.key_type());
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
pub struct KeySetCache {
    endpoint: Url,
    http_client: reqwest::Client,
    cache: RwLock<Option<Arc<CachedKeySet>>>,
    /// Held for the duration of a fetch; holds the failure of the last one.
    refresh_gate: Mutex<Option<AuthError>>,
    completed_fetches: AtomicU64,
    ttl: Duration,
    min_refresh_interval: Duration,
    serve_stale_on_error: bool,
    fetch_count: AtomicU64,
}

impl std::fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetCache")
            .field("endpoint", &self.endpoint.as_str())
            .field("ttl", &self.ttl)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .field("serve_stale_on_error", &self.serve_stale_on_error)
            .field("fetch_count", &self.fetch_count())
            .finish()
    }
}

impl KeySetCache {
    /// Create a cache for the configured key set endpoint.
    ///
    /// No request is made until the first lookup or [`warm_up`](Self::warm_up).
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the configuration does not validate, the
    /// endpoint is not an acceptable URL or the HTTP client cannot be built.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = check_endpoint(&config.jwks_url())?;

        let http_client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .map_err(|e| AuthError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint,
            http_client,
            cache: RwLock::new(None),
            refresh_gate: Mutex::new(None),
            completed_fetches: AtomicU64::new(0),
            ttl: config.jwks_cache_ttl(),
            min_refresh_interval: config.min_refresh_interval(),
            serve_stale_on_error: config.serve_stale_on_error,
            fetch_count: AtomicU64::new(0),
        })
    }

    /// Key set endpoint.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Number of outbound fetches attempted so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Current keys, fetching them first if the cache is empty or expired.
    ///
    /// # Errors
    ///
    /// [`AuthError::KeyServiceUnavailable`] if a fetch was needed and failed
    /// and no usable cached copy exists.
    pub async fn get_current_keyset(&self) -> Result<Arc<KeySet>> {
        Ok(self.current().await?.keys.clone())
    }

    /// Current cache entry, fetching first if needed.
    ///
    /// Same as [`get_current_keyset`](Self::get_current_keyset) but exposes
    /// the generation, which [`refresh_after_miss`](Self::refresh_after_miss)
    /// takes.
    pub async fn current(&self) -> Result<Arc<CachedKeySet>> {
        let observed = self.completed_fetches.load(Ordering::Acquire);
        if let Some(entry) = self.fresh_entry().await {
            debug!(jwks_url = %self.endpoint, generation = entry.generation, "Using cached key set");
            return Ok(entry);
        }

        let mut last_failure = self.refresh_gate.lock().await;

        // Another task may have refreshed while we waited for the gate
        if let Some(entry) = self.fresh_entry().await {
            debug!(jwks_url = %self.endpoint, generation = entry.generation, "Key set refreshed by concurrent caller");
            return Ok(entry);
        }

        let previous = self.cache.read().await.clone();
        let shared = self.shared_failure(observed, &last_failure);
        let result = match shared {
            Some(err) => Err(err),
            None => self.fetch_locked(&mut last_failure).await,
        };
        match result {
            Ok(keys) => Ok(self.install(keys, previous.as_deref()).await),
            Err(err) => match previous {
                Some(stale) if self.serve_stale_on_error => {
                    warn!(
                        jwks_url = %self.endpoint,
                        error = %err,
                        age_secs = stale.age().as_secs(),
                        "Key set refresh failed, serving stale key set"
                    );
                    Ok(stale)
                }
                _ => Err(err),
            },
        }
    }

    /// Force a refresh after a token named a `kid` missing from `seen`.
    ///
    /// Joins the same single-flight gate as regular refreshes. No fetch is
    /// made when another caller has already replaced `seen`, or when the
    /// current set was fetched less than the minimum refresh interval ago;
    /// the current entry is returned instead. If the forced fetch fails while
    /// the current entry is still within its TTL, that entry is returned.
    pub async fn refresh_after_miss(&self, seen: &CachedKeySet) -> Result<Arc<CachedKeySet>> {
        let observed = self.completed_fetches.load(Ordering::Acquire);
        let mut last_failure = self.refresh_gate.lock().await;

        let current = self.cache.read().await.clone();
        if let Some(entry) = &current {
            if entry.generation != seen.generation {
                debug!(
                    jwks_url = %self.endpoint,
                    generation = entry.generation,
                    "Key set already replaced by concurrent caller"
                );
                return Ok(entry.clone());
            }
            if entry.age() < self.min_refresh_interval {
                warn!(
                    jwks_url = %self.endpoint,
                    since_last_ms = entry.age().as_millis() as u64,
                    "Key set refresh rate limited, using cache"
                );
                return Ok(entry.clone());
            }
        }

        let shared = self.shared_failure(observed, &last_failure);
        let result = match shared {
            Some(err) => Err(err),
            None => self.fetch_locked(&mut last_failure).await,
        };
        match result {
            Ok(keys) => Ok(self.install(keys, current.as_deref()).await),
            Err(err) => match current {
                Some(entry) if entry.is_fresh() || self.serve_stale_on_error => {
                    warn!(jwks_url = %self.endpoint, error = %err, "Forced key set refresh failed, keeping current key set");
                    Ok(entry)
                }
                _ => Err(err),
            },
        }
    }

    /// Fetch the key set ahead of the first request.
    ///
    /// # Errors
    ///
    /// [`AuthError::KeyServiceUnavailable`] if the fetch fails.
    pub async fn warm_up(&self) -> Result<()> {
        let keys = self.get_current_keyset().await?;
        info!(jwks_url = %self.endpoint, keys = keys.len(), "Key set cache warmed up");
        Ok(())
    }

    async fn fresh_entry(&self) -> Option<Arc<CachedKeySet>> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|entry| entry.is_fresh())
            .cloned()
    }

    /// The failure of a fetch that completed after `observed` was read, i.e.
    /// one this caller queued behind. Caller holds the refresh gate.
    fn shared_failure(&self, observed: u64, last_failure: &Option<AuthError>) -> Option<AuthError> {
        if self.completed_fetches.load(Ordering::Acquire) == observed {
            return None;
        }
        let err = last_failure.clone()?;
        debug!(jwks_url = %self.endpoint, error = %err, "Sharing failed key set fetch with waiting caller");
        Some(err)
    }

    /// Fetch and record the outcome for callers queued on the gate.
    async fn fetch_locked(&self, last_failure: &mut Option<AuthError>) -> Result<KeySet> {
        let result = self.fetch().await;
        *last_failure = result.as_ref().err().cloned();
        self.completed_fetches.fetch_add(1, Ordering::Release);
        result
    }

    /// Replace the cache entry. Caller holds the refresh gate.
    async fn install(&self, keys: KeySet, previous: Option<&CachedKeySet>) -> Arc<CachedKeySet> {
        let entry = Arc::new(CachedKeySet {
            keys: Arc::new(keys),
            fetched_at: Instant::now(),
            ttl: self.ttl,
            generation: previous.map_or(1, |p| p.generation + 1),
        });
        *self.cache.write().await = Some(entry.clone());
        entry
    }

    async fn fetch(&self) -> Result<KeySet> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        info!(jwks_url = %self.endpoint, "Fetching key set from endpoint");

        let response = self
            .http_client
            .get(self.endpoint.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() { "timed out" } else { "request failed" };
                error!(jwks_url = %self.endpoint, error = %e, "Key set fetch {reason}");
                metrics::record_keyset_fetch("network_error");
                AuthError::KeyServiceUnavailable(format!("key set fetch {reason}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(jwks_url = %self.endpoint, status = %status, "Key set endpoint returned error status");
            metrics::record_keyset_fetch("http_error");
            return Err(AuthError::KeyServiceUnavailable(format!(
                "key set endpoint returned HTTP {status}"
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            error!(jwks_url = %self.endpoint, error = %e, "Failed to read key set response");
            metrics::record_keyset_fetch("network_error");
            AuthError::KeyServiceUnavailable(format!("failed to read key set response: {e}"))
        })?;

        let keys = KeySet::from_json(&body).inspect_err(|e| {
            error!(jwks_url = %self.endpoint, error = %e, "Key set response rejected");
            metrics::record_keyset_fetch("malformed");
        })?;

        metrics::record_keyset_fetch("success");
        info!(jwks_url = %self.endpoint, keys = keys.len(), "Fetched key set");
        Ok(keys)
    }
}

/// Accept `https://`, or `http://` to a loopback host.
fn check_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| AuthError::Internal(format!("invalid key set URL {raw}: {e}")))?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]")) => Ok(url),
        _ => Err(AuthError::Internal(format!(
            "key set endpoint must use HTTPS (HTTP only allowed for localhost): {raw}"
        ))),
    }
}
