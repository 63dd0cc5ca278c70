use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Failure to produce a signing key
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeySourceError {
    #[error("no signing key with kid '{0}'")]
    UnknownKey(String),
    #[error("failed to fetch signing keys: {0}")]
    Fetch(String),
}

/// Source of the issuer's public signing keys, looked up by key id
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn get_key(&self, kid: &str) -> Result<DecodingKey, KeySourceError>;
}

fn key_from_set(jwks: &JwkSet, kid: &str) -> Result<Option<DecodingKey>, KeySourceError> {
    match jwks.find(kid) {
        Some(jwk) => DecodingKey::from_jwk(jwk)
            .map(Some)
            .map_err(|e| KeySourceError::Fetch(format!("unusable JWK '{kid}': {e}"))),
        None => Ok(None),
    }
}

/// Key set URL published by an issuer: `<issuer>/.well-known/jwks.json`
pub fn jwks_url_for_issuer(issuer: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/.well-known/jwks.json",
        issuer.trim_end_matches('/')
    ))
}

const JWKS_CACHE_KEY: &str = "jwks";

/// Remote JSON Web Key Set with caching
///
/// - the whole key set is cached for `ttl`;
/// - concurrent cache misses share one fetch (moka coalesces them);
/// - a `kid` missing from the cached set forces one refetch, at most once per
///   `min_refresh_interval`, so keys rotated in by the issuer are picked up
///   without letting arbitrary key ids trigger a fetch per request.
pub struct JwksKeySource {
    jwks_url: Url,
    http_client: reqwest::Client,
    cache: Cache<String, Arc<JwkSet>>,
    min_refresh_interval: Duration,
    last_forced_refresh: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for JwksKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksKeySource")
            .field("jwks_url", &self.jwks_url.as_str())
            .finish()
    }
}

impl JwksKeySource {
    pub fn new(
        jwks_url: Url,
        ttl: Duration,
        min_refresh_interval: Duration,
        http_timeout: Duration,
    ) -> anyhow::Result<Self> {
        // No redirects: the key set must come from the configured origin
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(http_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e:?}"))?;

        Ok(Self {
            jwks_url,
            http_client,
            cache: Cache::builder().time_to_live(ttl).build(),
            min_refresh_interval,
            last_forced_refresh: Mutex::new(None),
        })
    }

    async fn fetch(http_client: reqwest::Client, url: Url) -> Result<Arc<JwkSet>, KeySourceError> {
        debug!("fetching JWKS from {url}");
        let response = http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| KeySourceError::Fetch(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeySourceError::Fetch(format!("GET {url}: HTTP {status}")));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| KeySourceError::Fetch(format!("invalid JWKS from {url}: {e}")))?;
        info!("loaded {} signing key(s) from {url}", jwks.keys.len());
        Ok(Arc::new(jwks))
    }

    async fn key_set(&self) -> Result<Arc<JwkSet>, KeySourceError> {
        let http_client = self.http_client.clone();
        let url = self.jwks_url.clone();
        self.cache
            .try_get_with(JWKS_CACHE_KEY.to_string(), Self::fetch(http_client, url))
            .await
            .map_err(|e| (*e).clone())
    }

    /// Claim the right to force a refetch, if the last one is old enough.
    fn may_force_refresh(&self) -> bool {
        let Ok(mut last) = self.last_forced_refresh.lock() else {
            return false;
        };
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.min_refresh_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

#[async_trait]
impl KeySource for JwksKeySource {
    async fn get_key(&self, kid: &str) -> Result<DecodingKey, KeySourceError> {
        let jwks = self.key_set().await?;
        if let Some(key) = key_from_set(&jwks, kid)? {
            return Ok(key);
        }

        if !self.may_force_refresh() {
            return Err(KeySourceError::UnknownKey(kid.to_string()));
        }

        warn!("kid '{kid}' not in cached JWKS, refreshing");
        self.cache.invalidate(JWKS_CACHE_KEY).await;
        let jwks = self.key_set().await?;
        key_from_set(&jwks, kid)?.ok_or_else(|| KeySourceError::UnknownKey(kid.to_string()))
    }
}

/// Fixed set of keys, indexed by key id
#[derive(Default, Clone)]
pub struct StaticKeySource {
    keys: HashMap<String, DecodingKey>,
}

impl StaticKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, kid: impl Into<String>, key: DecodingKey) -> Self {
        self.keys.insert(kid.into(), key);
        self
    }

    pub fn from_jwks(jwks: &JwkSet) -> Result<Self, KeySourceError> {
        let mut source = Self::new();
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            let key = DecodingKey::from_jwk(jwk)
                .map_err(|e| KeySourceError::Fetch(format!("unusable JWK '{kid}': {e}")))?;
            source.keys.insert(kid, key);
        }
        Ok(source)
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn get_key(&self, kid: &str) -> Result<DecodingKey, KeySourceError> {
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| KeySourceError::UnknownKey(kid.to_string()))
    }
}
