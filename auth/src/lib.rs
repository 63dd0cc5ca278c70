//! Authentication and authorization for Hearth
//!
//! Two halves live in this crate:
//!
//! - **Client**: the OAuth 2.0 Authorization Code flow with PKCE for a public
//!   client ([`client::PkceClient`]), with session-scoped storage for the
//!   verifier and the resulting tokens ([`session::SessionStore`]).
//! - **Server**: verification of RS256 identity tokens against the issuer's
//!   key set ([`verifier::TokenVerifier`]) and the group-membership check
//!   gating mutations, available as axum middleware
//!   ([`axum::require_privileged`]).
//!
//! # Example: verifying a request
//!
//! ```rust,no_run
//! use hearth_auth::verifier::{TokenVerifier, VerifierConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = VerifierConfig::for_cognito("us-east-2", "us-east-2_AbCdEf", "app-client-id");
//! let verifier = TokenVerifier::new(config)?;
//!
//! let auth_ctx = verifier.authorize(Some("Bearer id_token_here")).await?;
//! println!("Authorized: {} {:?}", auth_ctx.subject, auth_ctx.groups);
//! # Ok(())
//! # }
//! ```
//!
//! # Example: starting a login
//!
//! ```rust,no_run
//! use hearth_auth::client::{ClientConfig, PkceClient, UserAgent};
//! use hearth_auth::session::MemorySessionStorage;
//! use std::sync::Arc;
//!
//! struct Printer;
//! impl UserAgent for Printer {
//!     fn navigate(&self, url: &url::Url) { println!("open {url}"); }
//!     fn replace_location(&self, _url: &url::Url) {}
//!     fn alert(&self, message: &str) { eprintln!("{message}"); }
//! }
//!
//! # fn example() -> anyhow::Result<()> {
//! let client = PkceClient::new(
//!     ClientConfig::from_env()?,
//!     Arc::new(MemorySessionStorage::new()),
//!     Arc::new(Printer),
//! )?;
//! client.start_login()?;
//! # Ok(())
//! # }
//! ```

/// Claims, verified caller identity
pub mod types;

/// Group-membership check shared by client and server
pub mod groups;

/// PKCE verifier and S256 challenge
pub mod pkce;

/// Client-side login state
pub mod session;

/// Authorization Code + PKCE login flow
pub mod client;

/// Issuer signing keys
pub mod key_source;

/// Server-side token verification
pub mod verifier;

/// Axum middleware for HTTP authorization
pub mod axum;

/// RSA key pairs and token builders for tests
pub mod test_utils;
