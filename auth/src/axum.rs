//! Axum middleware gating mutations on verified group membership
//!
//! The middleware:
//! 1. Extracts the Bearer token from the Authorization header
//! 2. Verifies it with the configured [`TokenVerifier`]
//! 3. Requires membership in a privileged group
//! 4. Injects the resulting [`crate::types::AuthContext`] into request extensions
//! 5. Returns 401 Unauthorized with a short reason otherwise

use crate::verifier::{TokenVerifier, VerifyError};
use axum::{
    Json,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::header::AUTHORIZATION;
use std::sync::Arc;
use tracing::{info, warn};

/// Axum middleware requiring a valid token from a privileged caller
///
/// # Example
///
/// ```rust,ignore
/// use axum::{Router, middleware, routing::post};
/// use hearth_auth::axum::require_privileged;
/// use std::sync::Arc;
///
/// let verifier = Arc::new(TokenVerifier::new(config)?);
/// let app = Router::new()
///     .route("/properties", post(create_listing))
///     .route_layer(middleware::from_fn(move |req, next| {
///         require_privileged(verifier.clone(), req, next)
///     }));
/// ```
pub async fn require_privileged(
    verifier: Arc<TokenVerifier>,
    mut req: Request,
    next: Next,
) -> Result<Response, VerifyError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let auth_ctx = verifier.authorize(auth_header).await.map_err(|e| {
        warn!(
            "authorization denied: method={} uri={} cause={e}",
            req.method(),
            req.uri().path()
        );
        e
    })?;

    info!(
        "authorized: subject={} groups={:?} method={} uri={}",
        auth_ctx.subject,
        auth_ctx.groups,
        req.method(),
        req.uri().path()
    );

    req.extensions_mut().insert(auth_ctx);

    Ok(next.run(req).await)
}

impl IntoResponse for VerifyError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": self.reason() })),
        )
            .into_response()
    }
}
