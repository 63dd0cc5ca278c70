use chrono::{Duration, Utc};
use hearth_auth::client::{ClientConfig, ClientError, LOGIN_FAILED_ALERT, PkceClient, UserAgent};
use hearth_auth::groups::PrivilegedGroups;
use hearth_auth::pkce::challenge;
use hearth_auth::session::{
    MemorySessionStorage, PKCE_VERIFIER_KEY, SessionState, SessionStorage, TOKENS_KEY,
};
use hearth_auth::test_utils::unsigned_token;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REDIRECT_URI: &str = "http://localhost:3000/admin.html";

/// Stored tokens and verifier as seen at the moment of a navigation
type StorageSnapshot = (Option<String>, Option<String>);

struct RecordingAgent {
    storage: Arc<MemorySessionStorage>,
    navigated: Mutex<Vec<Url>>,
    storage_at_navigate: Mutex<Vec<StorageSnapshot>>,
    replaced: Mutex<Vec<Url>>,
    alerts: Mutex<Vec<String>>,
}

impl RecordingAgent {
    fn new(storage: Arc<MemorySessionStorage>) -> Self {
        Self {
            storage,
            navigated: Mutex::default(),
            storage_at_navigate: Mutex::default(),
            replaced: Mutex::default(),
            alerts: Mutex::default(),
        }
    }
}

impl UserAgent for RecordingAgent {
    fn navigate(&self, url: &Url) {
        self.storage_at_navigate.lock().expect("lock").push((
            self.storage.get_item(TOKENS_KEY),
            self.storage.get_item(PKCE_VERIFIER_KEY),
        ));
        self.navigated.lock().expect("lock").push(url.clone());
    }

    fn replace_location(&self, url: &Url) {
        self.replaced.lock().expect("lock").push(url.clone());
    }

    fn alert(&self, message: &str) {
        self.alerts.lock().expect("lock").push(message.to_string());
    }
}

struct Fixture {
    client: PkceClient,
    storage: Arc<MemorySessionStorage>,
    agent: Arc<RecordingAgent>,
}

fn fixture(domain: &str) -> Fixture {
    fixture_with_timeout(domain, 5)
}

fn fixture_with_timeout(domain: &str, http_timeout_secs: u64) -> Fixture {
    let config = ClientConfig {
        domain: domain.to_string(),
        client_id: "test-client".to_string(),
        redirect_uri: REDIRECT_URI.to_string(),
        logout_uri: "http://localhost:3000/".to_string(),
        scopes: vec!["openid".to_string(), "email".to_string()],
        privileged_groups: PrivilegedGroups::default(),
        http_timeout_secs,
    };
    let storage = Arc::new(MemorySessionStorage::new());
    let agent = Arc::new(RecordingAgent::new(storage.clone()));
    let client = PkceClient::new(config, storage.clone(), agent.clone()).expect("create client");
    Fixture {
        client,
        storage,
        agent,
    }
}

fn query(url: &Url) -> HashMap<String, String> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn id_token(groups: serde_json::Value) -> String {
    unsigned_token(&json!({
        "sub": "user123",
        "iss": "https://issuer.example.com",
        "aud": "test-client",
        "email": "agent@example.com",
        "exp": (Utc::now() + Duration::hours(1)).timestamp(),
        "cognito:groups": groups,
    }))
}

#[test]
fn test_client_config_parsing() {
    let json = r#"{
        "domain": "https://auth.example.com",
        "client_id": "abc",
        "redirect_uri": "http://localhost:3000/admin.html",
        "logout_uri": "http://localhost:3000/"
    }"#;
    let config: ClientConfig = serde_json::from_str(json).expect("Failed to parse config");
    assert_eq!(config.scopes, vec!["openid", "email"]); // default
    assert_eq!(config.http_timeout_secs, 10); // default
    assert_eq!(config.privileged_groups, PrivilegedGroups::default());
}

#[test]
fn test_build_login_url() {
    let f = fixture("https://auth.example.com/");
    let url = f.client.build_login_url().expect("login url");

    assert_eq!(url.origin().ascii_serialization(), "https://auth.example.com");
    assert_eq!(url.path(), "/oauth2/authorize");
    let params = query(&url);
    assert_eq!(params["client_id"], "test-client");
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["redirect_uri"], REDIRECT_URI);
    assert_eq!(params["scope"], "openid email");
    assert_eq!(params["code_challenge_method"], "S256");

    let stored = f
        .storage
        .get_item(PKCE_VERIFIER_KEY)
        .expect("verifier stored");
    assert_eq!(params["code_challenge"], challenge(&stored));
    assert_eq!(f.client.state(), SessionState::AwaitingRedirect);
}

#[test]
fn test_successive_login_urls_use_distinct_verifiers() {
    let f = fixture("https://auth.example.com");
    let first = query(&f.client.build_login_url().expect("login url"));
    let first_verifier = f.storage.get_item(PKCE_VERIFIER_KEY).expect("stored");
    let second = query(&f.client.build_login_url().expect("login url"));
    let second_verifier = f.storage.get_item(PKCE_VERIFIER_KEY).expect("stored");

    assert_ne!(first_verifier, second_verifier);
    assert_ne!(first["code_challenge"], second["code_challenge"]);
}

#[test]
fn test_start_login_navigates() {
    let f = fixture("https://auth.example.com");
    f.client.start_login().expect("start login");
    let navigated = f.agent.navigated.lock().expect("lock");
    assert_eq!(navigated.len(), 1);
    assert_eq!(navigated[0].path(), "/oauth2/authorize");
}

#[tokio::test]
async fn test_redirect_without_code_is_noop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let f = fixture(&server.uri());
    f.client.build_login_url().expect("login url");
    let verifier = f.storage.get_item(PKCE_VERIFIER_KEY);

    let url = Url::parse("http://localhost:3000/admin.html?tab=listings").expect("url");
    let result = f.client.handle_redirect(&url).await.expect("no-op");
    assert!(result.is_none());
    assert_eq!(f.storage.get_item(PKCE_VERIFIER_KEY), verifier);
    assert!(f.client.session().is_none());
    assert!(f.agent.replaced.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn test_redirect_without_verifier_fails_without_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let f = fixture(&server.uri());
    let url = Url::parse("http://localhost:3000/admin.html?code=abc").expect("url");
    let result = f.client.handle_redirect(&url).await;

    assert!(matches!(result, Err(ClientError::MissingVerifier)));
    assert_eq!(
        f.agent.alerts.lock().expect("lock").as_slice(),
        [LOGIN_FAILED_ALERT.to_string()]
    );
    assert_eq!(f.client.state(), SessionState::LoggedOut);
}

#[tokio::test]
async fn test_successful_exchange() {
    let server = MockServer::start().await;
    let f = fixture(&server.uri());
    let login_url = f.client.build_login_url().expect("login url");
    assert!(query(&login_url).contains_key("code_challenge"));
    let verifier = f.storage.get_item(PKCE_VERIFIER_KEY).expect("stored");

    let token = id_token(json!(["owners"]));
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains(format!("code_verifier={verifier}")))
        .and(body_string_contains("client_id=test-client"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": token,
            "access_token": "access",
            "refresh_token": "refresh",
            "expires_in": 3600,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = Url::parse("http://localhost:3000/admin.html?code=the-code&state=s").expect("url");
    let session = f
        .client
        .handle_redirect(&url)
        .await
        .expect("exchange")
        .expect("session");

    assert_eq!(session.claims.sub, "user123");
    assert_eq!(session.bearer(), token);
    assert!(f.storage.get_item(PKCE_VERIFIER_KEY).is_none());
    assert_eq!(f.client.session(), Some(session));
    assert!(f.client.is_privileged_hint());
    assert_eq!(
        f.agent.replaced.lock().expect("lock").as_slice(),
        [Url::parse(REDIRECT_URI).expect("url")]
    );
    assert!(f.agent.alerts.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn test_failed_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let f = fixture(&server.uri());
    f.client.build_login_url().expect("login url");

    let url = Url::parse("http://localhost:3000/admin.html?code=stale").expect("url");
    let result = f.client.handle_redirect(&url).await;

    match result {
        Err(ClientError::TokenExchangeFailed { status, body }) => {
            assert_eq!(status.map(|s| s.as_u16()), Some(400));
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(f.client.session().is_none());
    assert!(f.storage.get_item(PKCE_VERIFIER_KEY).is_none());
    assert_eq!(f.client.state(), SessionState::LoggedOut);
    assert_eq!(f.agent.alerts.lock().expect("lock").len(), 1);
    assert_eq!(
        f.agent.replaced.lock().expect("lock").as_slice(),
        [Url::parse(REDIRECT_URI).expect("url")]
    );
}

#[tokio::test]
async fn test_authorization_error_redirect() {
    let f = fixture("https://auth.example.com");
    f.client.build_login_url().expect("login url");

    let url = Url::parse(
        "http://localhost:3000/admin.html?error=access_denied&error_description=nope",
    )
    .expect("url");
    let result = f.client.handle_redirect(&url).await;

    assert!(matches!(
        result,
        Err(ClientError::AuthorizationDenied { ref error, .. }) if error == "access_denied"
    ));
    assert_eq!(f.client.state(), SessionState::LoggedOut);
}

#[tokio::test]
async fn test_logout_clears_before_navigating() {
    let server = MockServer::start().await;
    let f = fixture(&server.uri());
    f.client.build_login_url().expect("login url");
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": id_token(json!("readonly")),
            "access_token": "access",
        })))
        .mount(&server)
        .await;
    let url = Url::parse("http://localhost:3000/admin.html?code=c").expect("url");
    f.client
        .handle_redirect(&url)
        .await
        .expect("exchange")
        .expect("session");
    assert!(!f.client.is_privileged_hint());

    // a login attempt left pending is dropped too
    f.client.build_login_url().expect("login url");
    f.client.logout().expect("logout");
    assert_eq!(f.client.state(), SessionState::LoggedOut);
    assert_eq!(
        f.agent.storage_at_navigate.lock().expect("lock").last(),
        Some(&(None, None)),
        "storage must be empty by the time the user agent leaves"
    );

    let navigated = f.agent.navigated.lock().expect("lock");
    let logout = navigated.last().expect("navigated to logout");
    assert_eq!(logout.path(), "/logout");
    let params = query(logout);
    assert_eq!(params["client_id"], "test-client");
    assert_eq!(params["logout_uri"], "http://localhost:3000/");
}

fn token_response(groups: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id_token": id_token(groups),
        "access_token": "access",
    }))
}

#[tokio::test]
async fn test_failed_relogin_drops_previous_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("code=first"))
        .respond_with(token_response(json!(["owners"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("code=second"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let f = fixture(&server.uri());
    f.client.build_login_url().expect("login url");
    let first = Url::parse("http://localhost:3000/admin.html?code=first").expect("url");
    f.client
        .handle_redirect(&first)
        .await
        .expect("exchange")
        .expect("session");
    assert!(matches!(f.client.state(), SessionState::LoggedIn(_)));

    f.client.build_login_url().expect("login url");
    let second = Url::parse("http://localhost:3000/admin.html?code=second").expect("url");
    let result = f.client.handle_redirect(&second).await;

    assert!(matches!(
        result,
        Err(ClientError::TokenExchangeFailed { .. })
    ));
    assert_eq!(f.client.state(), SessionState::LoggedOut);
    assert!(f.storage.get_item(TOKENS_KEY).is_none());
}

#[tokio::test]
async fn test_token_endpoint_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(token_response(json!(["owners"])).set_delay(std::time::Duration::from_secs(3)))
        .mount(&server)
        .await;

    let f = fixture_with_timeout(&server.uri(), 1);
    f.client.build_login_url().expect("login url");
    let url = Url::parse("http://localhost:3000/admin.html?code=slow").expect("url");
    let result = f.client.handle_redirect(&url).await;

    assert!(matches!(
        result,
        Err(ClientError::TokenExchangeFailed { status: None, .. })
    ));
    assert_eq!(f.client.state(), SessionState::LoggedOut);
    assert_eq!(f.agent.alerts.lock().expect("lock").len(), 1);
}

#[tokio::test]
async fn test_unreachable_token_endpoint() {
    // Bind then drop a listener so the port is known to be closed
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("local addr")
    };
    let f = fixture(&format!("http://{addr}"));
    f.client.build_login_url().expect("login url");
    let url = Url::parse("http://localhost:3000/admin.html?code=c").expect("url");
    let result = f.client.handle_redirect(&url).await;

    assert!(matches!(
        result,
        Err(ClientError::TokenExchangeFailed { status: None, .. })
    ));
    assert!(f.storage.get_item(PKCE_VERIFIER_KEY).is_none());
    assert_eq!(f.client.state(), SessionState::LoggedOut);
}
