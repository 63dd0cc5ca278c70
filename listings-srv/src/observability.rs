use axum::response::Response;
use axum::{extract::Request, middleware::Next};
use std::time::Instant;
use tracing::info;

/// Logs every request and its response status with the elapsed time
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let uri = parts.uri.clone();
    let method = parts.method.clone();
    info!("request method={method} uri={uri}");
    let begin = Instant::now();
    let response = next.run(Request::from_parts(parts, body)).await;
    let elapsed = begin.elapsed();
    info!(
        "response status={} method={method} uri={uri} elapsed_ms={}",
        response.status(),
        elapsed.as_millis()
    );
    response
}
