use crate::error::{ApiError, ApiResult};
use crate::listing::{Listing, ListingPatch, ListingQuery, NewListing, select};
use crate::observability::observability_middleware;
use crate::store::ListingStore;
use crate::uploads::{UploadIssuer, UploadRequest, UploadTicket, is_accepted_content_type};
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hearth_auth::axum::require_privileged;
use hearth_auth::types::AuthContext;
use hearth_auth::verifier::TokenVerifier;
use http::{HeaderValue, Method, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ListingStore>,
    pub uploads: Option<Arc<UploadIssuer>>,
}

/// The API: public reads, mutations behind the privileged-group gate
pub fn router(state: AppState, verifier: Arc<TokenVerifier>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/properties", get(list_listings));

    let protected_routes = Router::new()
        .route("/properties", post(create_listing))
        .route(
            "/properties/{id}",
            put(update_listing).delete(delete_listing),
        )
        .route("/uploads", post(create_upload))
        .route_layer(middleware::from_fn(move |req, next| {
            require_privileged(verifier.clone(), req, next)
        }));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn(observability_middleware))
        .with_state(state)
}

/// Browser access from the one configured site origin
pub fn cors_layer(origin: HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

#[derive(Debug, Serialize)]
struct HealthCheck {
    status: String,
    timestamp: DateTime<Utc>,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthCheck {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
    })
}

/// An empty body reads as `{}`; anything else must be a JSON object of the expected shape
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidJson(e.to_string()))
}

async fn list_listings(
    State(state): State<AppState>,
    query: Result<Query<ListingQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Listing>>> {
    let Query(query) = query.map_err(|e| ApiError::InvalidQuery(e.body_text()))?;
    let listings = state.store.scan().await?;
    Ok(Json(select(listings, &query)))
}

async fn create_listing(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Listing>)> {
    let new: NewListing = parse_body(&body)?;
    let listing = Listing::create(new, Utc::now());
    state.store.put(&listing).await?;
    info!("listing {} created by {}", listing.id, auth.subject);
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn update_listing(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Listing>> {
    let patch: ListingPatch = parse_body(&body)?;
    let mut listing = state.store.get(&id).await?.ok_or(ApiError::NotFound)?;
    listing.apply(patch, Utc::now());
    state.store.put(&listing).await?;
    info!("listing {id} updated by {}", auth.subject);
    Ok(Json(listing))
}

async fn delete_listing(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete(&id).await?;
    info!("listing {id} deleted by {}", auth.subject);
    Ok(StatusCode::NO_CONTENT)
}

async fn create_upload(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> ApiResult<Json<UploadTicket>> {
    let uploads = state.uploads.as_ref().ok_or(ApiError::UploadsDisabled)?;
    let request: UploadRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidJson(e.to_string()))?;
    if !is_accepted_content_type(&request.content_type) {
        return Err(ApiError::InvalidContentType(request.content_type));
    }
    let ticket = uploads.issue(&request).await?;
    info!("upload {} issued to {}", ticket.object_key, auth.subject);
    Ok(Json(ticket))
}
