use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{StatusCode, header::AUTHORIZATION},
};
use hearth_auth::{
    axum::require_privileged,
    test_utils::*,
    types::AuthContext,
    verifier::{TokenVerifier, VerifierConfig},
};
use std::sync::Arc;
use tower::ServiceExt;

const ISSUER: &str = "https://issuer.example.com";
const AUDIENCE: &str = "test-client-id";

fn app(keypair: &TestKeyPair) -> Router {
    let config = VerifierConfig {
        issuer: ISSUER.to_string(),
        audience: AUDIENCE.to_string(),
        ..VerifierConfig::default()
    };
    let verifier = Arc::new(TokenVerifier::with_key_source(
        config,
        Arc::new(keypair.key_source()),
    ));

    Router::new()
        .route(
            "/test",
            axum::routing::post(|req: Request| async move {
                let auth_ctx = req.extensions().get::<AuthContext>().expect("auth context");
                auth_ctx.subject.clone()
            }),
        )
        .layer(axum::middleware::from_fn(move |req, next| {
            require_privileged(verifier.clone(), req, next)
        }))
}

async fn call(app: Router, authorization: Option<String>) -> (StatusCode, String) {
    let mut builder = Request::builder().method("POST").uri("/test");
    if let Some(value) = authorization {
        builder = builder.header(AUTHORIZATION, value);
    }
    let request = builder.body(Body::empty()).expect("build request");

    let response = app.oneshot(request).await.expect("call service");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, String::from_utf8_lossy(&body).into_owned())
}

#[tokio::test]
async fn test_privileged_token() {
    let keypair = TestKeyPair::generate();
    let token = create_grouped_token(&keypair, ISSUER, AUDIENCE, "owner-1", &["owners"]);

    let (status, body) = call(app(&keypair), Some(format!("Bearer {token}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "owner-1");
}

#[tokio::test]
async fn test_missing_authorization_header() {
    let keypair = TestKeyPair::generate();
    let (status, body) = call(app(&keypair), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"no_bearer"}"#);
}

#[tokio::test]
async fn test_invalid_authorization_format() {
    let keypair = TestKeyPair::generate();
    let token = create_grouped_token(&keypair, ISSUER, AUDIENCE, "owner-1", &["owners"]);
    let (status, body) = call(app(&keypair), Some(format!("Basic {token}"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"no_bearer"}"#);
}

#[tokio::test]
async fn test_invalid_token_does_not_echo_claims() {
    let keypair = TestKeyPair::generate();
    let token = create_wrong_audience_token(&keypair, ISSUER, AUDIENCE, "owner-1");
    let (status, body) = call(app(&keypair), Some(format!("Bearer {token}"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"invalid_token"}"#);
    assert!(!body.contains("owner-1"));
}

#[tokio::test]
async fn test_unprivileged_token() {
    let keypair = TestKeyPair::generate();
    let token = create_grouped_token(&keypair, ISSUER, AUDIENCE, "reader", &["readonly"]);
    let (status, body) = call(app(&keypair), Some(format!("Bearer {token}"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"not_privileged"}"#);
}
