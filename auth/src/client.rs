//! Authorization Code + PKCE flow for a public client
//!
//! `LoggedOut → AwaitingRedirect → LoggedIn`, back to `LoggedOut` on a failed
//! exchange or an explicit logout. There is no refresh: once the identity
//! token expires the user goes through the whole cycle again.
//!
//! Starting a second login before the first redirect comes back overwrites
//! the stored verifier. That silently invalidates the earlier attempt, which
//! is the intended behavior: only the most recent attempt can complete.

use crate::groups::PrivilegedGroups;
use crate::pkce::{CHALLENGE_METHOD, PkceVerifier};
use crate::session::{AuthSession, SessionState, SessionStorage, SessionStore, TokenSet};
use anyhow::{Context, Result, anyhow};
use http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Message shown to the user when a login attempt fails
pub const LOGIN_FAILED_ALERT: &str = "Login failed. Please try again.";

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "email".to_string()]
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

/// Public client registration with the hosted authorization server
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the hosted login domain (e.g. `https://auth.example.com`)
    pub domain: String,
    /// App client id (public client, no secret)
    pub client_id: String,
    /// Redirect URI, must exactly match an allowed callback URL
    pub redirect_uri: String,
    /// Where the authorization server sends the user after logout
    pub logout_uri: String,
    /// Requested scopes (default: openid, email)
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Group names considered privileged for the UI hint
    #[serde(default)]
    pub privileged_groups: PrivilegedGroups,
    /// Timeout of the token exchange in seconds (default: 10)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl ClientConfig {
    /// Load configuration from the `HEARTH_CLIENT_CONFIG` environment variable
    pub fn from_env() -> Result<Self> {
        let json = std::env::var("HEARTH_CLIENT_CONFIG")
            .map_err(|_| anyhow!("HEARTH_CLIENT_CONFIG environment variable not set"))?;
        let config: ClientConfig = serde_json::from_str(&json)
            .map_err(|e| anyhow!("Failed to parse HEARTH_CLIENT_CONFIG: {e:?}"))?;
        Ok(config)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{path}", self.domain.trim_end_matches('/')))
            .with_context(|| format!("invalid login domain '{}'", self.domain))
    }

    pub fn authorize_endpoint(&self) -> Result<Url> {
        self.endpoint("/oauth2/authorize")
    }

    pub fn token_endpoint(&self) -> Result<Url> {
        self.endpoint("/oauth2/token")
    }

    pub fn logout_endpoint(&self) -> Result<Url> {
        self.endpoint("/logout")
    }
}

/// The browser, or whatever plays its part
pub trait UserAgent: Send + Sync {
    /// Leave the current page for `url`.
    fn navigate(&self, url: &Url);
    /// Rewrite the visible URL without navigating (history replace).
    fn replace_location(&self, url: &Url);
    /// Show a message to the user.
    fn alert(&self, message: &str);
}

/// Client-side login failures; each one ends the current attempt
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no PKCE verifier stored for this session")]
    MissingVerifier,
    #[error("token exchange failed ({status:?}): {body}")]
    TokenExchangeFailed {
        status: Option<StatusCode>,
        body: String,
    },
    #[error("authorization denied: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },
    #[error("invalid identity token: {0}")]
    InvalidIdToken(#[source] anyhow::Error),
    #[error("session storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

/// Drives the Authorization Code + PKCE flow for one browsing session
pub struct PkceClient {
    config: ClientConfig,
    store: SessionStore,
    user_agent: Arc<dyn UserAgent>,
    http_client: reqwest::Client,
}

impl PkceClient {
    pub fn new(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
        user_agent: Arc<dyn UserAgent>,
    ) -> Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {e:?}"))?;

        Ok(Self {
            config,
            store: SessionStore::new(storage),
            user_agent,
            http_client,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Current session, `None` when logged out or expired
    pub fn session(&self) -> Option<AuthSession> {
        self.store.current()
    }

    pub fn state(&self) -> SessionState {
        self.store.state()
    }

    /// UI hint only; see [`AuthSession::is_privileged_hint`].
    pub fn is_privileged_hint(&self) -> bool {
        self.session()
            .map(|s| s.is_privileged_hint(&self.config.privileged_groups))
            .unwrap_or(false)
    }

    /// Generate a verifier, remember it, and build the authorization URL.
    ///
    /// No network call happens here.
    pub fn build_login_url(&self) -> Result<Url> {
        let verifier = PkceVerifier::generate();
        self.store.stash_verifier(&verifier)?;

        let mut url = self.config.authorize_endpoint()?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("code_challenge_method", CHALLENGE_METHOD)
            .append_pair("code_challenge", &verifier.challenge());
        Ok(url)
    }

    /// Send the user agent to the authorization server.
    pub fn start_login(&self) -> Result<()> {
        let url = self.build_login_url()?;
        info!("starting login at {}", url.origin().ascii_serialization());
        self.user_agent.navigate(&url);
        Ok(())
    }

    /// Complete a login if `current_url` carries an authorization response.
    ///
    /// Returns `Ok(None)` without touching any state when there is neither a
    /// `code` nor an `error` parameter. Otherwise the stored verifier is
    /// consumed whatever the outcome, and the response parameters are
    /// stripped from the visible URL. A failed attempt also drops any token
    /// set left from an earlier login, so the state ends up `LoggedOut`.
    pub async fn handle_redirect(
        &self,
        current_url: &Url,
    ) -> Result<Option<AuthSession>, ClientError> {
        let mut code = None;
        let mut error = None;
        let mut error_description = None;
        for (key, value) in current_url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => error_description = Some(value.into_owned()),
                _ => {}
            }
        }

        let outcome = match (code, error) {
            (None, None) => return Ok(None),
            (Some(code), _) => self.complete_login(&code).await,
            (None, Some(error)) => {
                self.store.discard_verifier().map_err(ClientError::Storage)?;
                Err(ClientError::AuthorizationDenied {
                    error,
                    description: error_description,
                })
            }
        };

        self.user_agent
            .replace_location(&strip_authorization_response(current_url));

        match outcome {
            Ok(session) => {
                info!("logged in as {}", session.claims.sub);
                Ok(Some(session))
            }
            Err(e) => {
                warn!("login failed: {e}");
                if let Err(clear_err) = self.store.clear() {
                    warn!("failed to clear previous session: {clear_err:?}");
                }
                self.user_agent.alert(LOGIN_FAILED_ALERT);
                Err(e)
            }
        }
    }

    async fn complete_login(&self, code: &str) -> Result<AuthSession, ClientError> {
        let verifier = self
            .store
            .take_verifier()
            .map_err(ClientError::Storage)?
            .ok_or(ClientError::MissingVerifier)?;

        let tokens = self.exchange_code(code, &verifier).await?;
        // Validate the payload shape before anything is persisted
        AuthSession::from_tokens(tokens.clone()).map_err(ClientError::InvalidIdToken)?;
        self.store.save(tokens).map_err(ClientError::Storage)
    }

    /// POST the code and verifier to the token endpoint.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &PkceVerifier,
    ) -> Result<TokenSet, ClientError> {
        let token_endpoint = self
            .config
            .token_endpoint()
            .map_err(|e| ClientError::TokenExchangeFailed {
                status: None,
                body: e.to_string(),
            })?;

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", verifier.secret()),
        ];

        let response = self
            .http_client
            .post(token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| ClientError::TokenExchangeFailed {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::TokenExchangeFailed {
                status: Some(status),
                body,
            });
        }

        response
            .json::<TokenSet>()
            .await
            .map_err(|e| ClientError::TokenExchangeFailed {
                status: Some(status),
                body: format!("unexpected token response: {e}"),
            })
    }

    /// Sign-out URL of the hosted login domain
    pub fn logout_url(&self) -> Result<Url> {
        let mut url = self.config.logout_endpoint()?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("logout_uri", &self.config.logout_uri);
        Ok(url)
    }

    /// Clear local state, then navigate to the sign-out endpoint.
    pub fn logout(&self) -> Result<()> {
        self.store.clear()?;
        self.store.discard_verifier()?;
        let url = self.logout_url()?;
        info!("logged out");
        self.user_agent.navigate(&url);
        Ok(())
    }
}

/// The same URL without the authorization response parameters
pub fn strip_authorization_response(url: &Url) -> Url {
    const RESPONSE_PARAMS: [&str; 4] = ["code", "state", "error", "error_description"];

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !RESPONSE_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut stripped = url.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}
