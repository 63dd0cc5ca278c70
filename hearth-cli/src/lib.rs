//! hearth-cli : terminal client for the listings API
//!
//! Logs in through the system browser with the Authorization Code + PKCE
//! flow, keeps the session in a file, and sends the identity token as the
//! bearer credential of every write.

/// HTTP client of the listings API
pub mod api_client;

/// System browser as the login user agent
pub mod browser;

/// Loopback listener receiving the authorization redirect
pub mod loopback;
