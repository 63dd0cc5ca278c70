//! listings-srv : public property listings API
//!
//! Anyone can read listings. Creating, updating and deleting listings, and
//! requesting photo upload URLs, require a bearer identity token whose
//! group claim names a privileged group; see [`hearth_auth::axum`].

/// Command line and environment configuration
pub mod config;

/// API error type and its HTTP rendering
pub mod error;

/// Listing model, filters and ordering
pub mod listing;

/// Request logging middleware
pub mod observability;

/// Router and handlers
pub mod routes;

/// Listing persistence
pub mod store;

/// Presigned photo upload URLs
pub mod uploads;
