use crate::groups::PrivilegedGroups;
use crate::key_source::{JwksKeySource, KeySource, KeySourceError, jwks_url_for_issuer};
use crate::types::{AuthContext, Claims};
use anyhow::{Result, anyhow};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use moka::future::Cache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_JWKS_REFRESH_INTERVAL_SECS: u64 = 3600;
const DEFAULT_MIN_REFRESH_INTERVAL_SECS: u64 = 30;
const DEFAULT_TOKEN_CACHE_SIZE: u64 = 1000;
const DEFAULT_TOKEN_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Token verifier configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Issuer URL, must match the `iss` claim exactly
    pub issuer: String,
    /// Expected audience (app client id), must match the `aud` claim exactly
    pub audience: String,
    /// Groups allowed to mutate data (default: owners, editors)
    pub privileged_groups: PrivilegedGroups,
    /// JWKS cache lifetime in seconds (default: 3600 = 1 hour)
    pub jwks_refresh_interval_secs: u64,
    /// Minimum delay between refetches forced by an unknown kid (default: 30)
    pub min_refresh_interval_secs: u64,
    /// Verified token cache size (default: 1000)
    pub token_cache_size: u64,
    /// Verified token cache TTL in seconds (default: 300 = 5 min)
    pub token_cache_ttl_secs: u64,
    /// Timeout of the key set fetch in seconds (default: 10)
    pub http_timeout_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            audience: String::new(),
            privileged_groups: PrivilegedGroups::default(),
            jwks_refresh_interval_secs: DEFAULT_JWKS_REFRESH_INTERVAL_SECS,
            min_refresh_interval_secs: DEFAULT_MIN_REFRESH_INTERVAL_SECS,
            token_cache_size: DEFAULT_TOKEN_CACHE_SIZE,
            token_cache_ttl_secs: DEFAULT_TOKEN_CACHE_TTL_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl VerifierConfig {
    /// Load verifier configuration from the `HEARTH_AUTH_CONFIG` environment variable
    pub fn from_env() -> Result<Self> {
        let json = std::env::var("HEARTH_AUTH_CONFIG")
            .map_err(|_| anyhow!("HEARTH_AUTH_CONFIG environment variable not set"))?;
        let config: VerifierConfig = serde_json::from_str(&json)
            .map_err(|e| anyhow!("Failed to parse HEARTH_AUTH_CONFIG: {e:?}"))?;
        Ok(config)
    }

    /// Configuration for a Cognito user pool and one of its app clients
    pub fn for_cognito(region: &str, user_pool_id: &str, app_client_id: &str) -> Self {
        Self {
            issuer: format!("https://cognito-idp.{region}.amazonaws.com/{user_pool_id}"),
            audience: app_client_id.to_string(),
            ..Self::default()
        }
    }
}

/// Why a presented token was rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidTokenCause {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token header has no key id")]
    MissingKeyId,
    #[error("unsupported signing algorithm")]
    UnsupportedAlgorithm,
    #[error("unknown signing key '{0}'")]
    UnknownKey(String),
    #[error("signing keys unavailable: {0}")]
    KeySet(String),
    #[error("signature mismatch")]
    Signature,
    #[error("token expired")]
    Expired,
    #[error("issuer mismatch")]
    IssuerMismatch,
    #[error("audience mismatch")]
    AudienceMismatch,
    #[error("{0}")]
    Other(String),
}

impl From<KeySourceError> for InvalidTokenCause {
    fn from(e: KeySourceError) -> Self {
        match e {
            KeySourceError::UnknownKey(kid) => InvalidTokenCause::UnknownKey(kid),
            KeySourceError::Fetch(msg) => InvalidTokenCause::KeySet(msg),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for InvalidTokenCause {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => InvalidTokenCause::Signature,
            ErrorKind::ExpiredSignature => InvalidTokenCause::Expired,
            ErrorKind::InvalidIssuer => InvalidTokenCause::IssuerMismatch,
            ErrorKind::InvalidAudience => InvalidTokenCause::AudienceMismatch,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                InvalidTokenCause::UnsupportedAlgorithm
            }
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::MissingRequiredClaim(_) => InvalidTokenCause::Malformed(e.to_string()),
            _ => InvalidTokenCause::Other(e.to_string()),
        }
    }
}

/// Rejection of a request by the server-side gate
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("missing bearer token")]
    NoBearer,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] InvalidTokenCause),
    #[error("not a member of a privileged group")]
    NotPrivileged,
}

impl VerifyError {
    /// Short machine-readable reason, safe to return to the caller
    pub fn reason(&self) -> &'static str {
        match self {
            VerifyError::NoBearer => "no_bearer",
            VerifyError::InvalidToken(_) => "invalid_token",
            VerifyError::NotPrivileged => "not_privileged",
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(authorization_header: Option<&str>) -> Result<&str, VerifyError> {
    authorization_header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(VerifyError::NoBearer)
}

/// Verifies identity tokens issued by one issuer for one audience
///
/// Stateless apart from two caches: the key source's key set and the
/// verified-token cache. Both are safe for concurrent use.
pub struct TokenVerifier {
    issuer: String,
    audience: String,
    privileged_groups: PrivilegedGroups,
    key_source: Arc<dyn KeySource>,
    /// Cache for verified tokens
    token_cache: Cache<String, Arc<Claims>>,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("privileged_groups", &self.privileged_groups)
            .finish()
    }
}

impl TokenVerifier {
    /// Create a verifier fetching keys from `<issuer>/.well-known/jwks.json`
    pub fn new(config: VerifierConfig) -> Result<Self> {
        if config.issuer.is_empty() || config.audience.is_empty() {
            return Err(anyhow!("issuer and audience must be configured"));
        }
        let jwks_url = jwks_url_for_issuer(&config.issuer)
            .map_err(|e| anyhow!("Invalid issuer URL '{}': {e:?}", config.issuer))?;
        let key_source = JwksKeySource::new(
            jwks_url,
            Duration::from_secs(config.jwks_refresh_interval_secs),
            Duration::from_secs(config.min_refresh_interval_secs),
            Duration::from_secs(config.http_timeout_secs),
        )?;
        Ok(Self::with_key_source(config, Arc::new(key_source)))
    }

    /// Create a verifier on top of an explicit key source
    pub fn with_key_source(config: VerifierConfig, key_source: Arc<dyn KeySource>) -> Self {
        let token_cache = Cache::builder()
            .max_capacity(config.token_cache_size)
            .time_to_live(Duration::from_secs(config.token_cache_ttl_secs))
            .build();

        Self {
            issuer: config.issuer,
            audience: config.audience,
            privileged_groups: config.privileged_groups,
            key_source,
            token_cache,
        }
    }

    pub fn privileged_groups(&self) -> &PrivilegedGroups {
        &self.privileged_groups
    }

    /// Verify the bearer token of an `Authorization` header value.
    pub async fn verify(&self, authorization_header: Option<&str>) -> Result<Claims, VerifyError> {
        let token = bearer_token(authorization_header)?;
        self.verify_token(token).await
    }

    /// Verify a raw token: signature against the issuer key named by `kid`,
    /// exact issuer and audience, expiry.
    pub async fn verify_token(&self, token: &str) -> Result<Claims, VerifyError> {
        if let Some(cached) = self.token_cache.get(token).await {
            if !cached.is_expired(Utc::now()) {
                return Ok((*cached).clone());
            }
            self.token_cache.invalidate(token).await;
        }

        let claims = self.verify_uncached(token).await?;

        self.token_cache
            .insert(token.to_string(), Arc::new(claims.clone()))
            .await;

        Ok(claims)
    }

    async fn verify_uncached(&self, token: &str) -> Result<Claims, InvalidTokenCause> {
        // Header is unsigned: only used to pick the key, never trusted beyond that
        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(InvalidTokenCause::UnsupportedAlgorithm);
        }
        let kid = header.kid.ok_or(InvalidTokenCause::MissingKeyId)?;

        let decoding_key = self.key_source.get_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let token_data = decode::<Claims>(token, &decoding_key, &validation)?;
        debug!("verified token for subject {}", token_data.claims.sub);
        Ok(token_data.claims)
    }

    /// Verify the header's token and require privileged group membership.
    ///
    /// This is the authoritative check guarding every mutation.
    pub async fn authorize(
        &self,
        authorization_header: Option<&str>,
    ) -> Result<AuthContext, VerifyError> {
        let claims = self.verify(authorization_header).await?;
        let groups = claims.privileged_groups(&self.privileged_groups);
        if groups.is_empty() {
            return Err(VerifyError::NotPrivileged);
        }

        Ok(AuthContext {
            expires_at: claims.expires_at(),
            subject: claims.sub,
            email: claims.email,
            issuer: claims.iss,
            groups,
        })
    }
}
