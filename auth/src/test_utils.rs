use crate::key_source::StaticKeySource;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Test identity token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Group-membership claim, any JSON shape
    #[serde(
        rename = "cognito:groups",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub groups: Option<Value>,
    /// Expiration time (seconds since Unix epoch)
    pub exp: i64,
    /// Issued at (seconds since Unix epoch)
    pub iat: i64,
}

impl TestClaims {
    /// Claims valid for one hour
    pub fn new(issuer: &str, audience: &str, subject: &str) -> Self {
        let now = Utc::now();
        Self {
            sub: subject.to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            email: None,
            groups: None,
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = Some(json!(groups));
        self
    }

    /// Group claim with an arbitrary value, e.g. a comma-delimited string
    pub fn with_groups_value(mut self, groups: Value) -> Self {
        self.groups = Some(groups);
        self
    }
}

/// Test key pair for signing/verifying tokens
pub struct TestKeyPair {
    pub kid: String,
    pub encoding_key: EncodingKey,
    pub decoding_key: DecodingKey,
    pub public_key_pem: String,
    modulus: String,
    exponent: String,
}

impl TestKeyPair {
    /// Generate a new RSA key pair for testing
    pub fn generate() -> Self {
        Self::generate_with_kid("test-key-1")
    }

    pub fn generate_with_kid(kid: &str) -> Self {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate RSA private key");
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .expect("failed to encode private key as PEM");
        let public_pem = public_key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .expect("failed to encode public key as PEM");

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .expect("failed to create encoding key");
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .expect("failed to create decoding key");

        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        Self {
            kid: kid.to_string(),
            encoding_key,
            decoding_key,
            public_key_pem: public_pem.to_string(),
            modulus: b64.encode(public_key.n().to_bytes_be()),
            exponent: b64.encode(public_key.e().to_bytes_be()),
        }
    }

    /// Public key as a JSON Web Key Set, as served at `/.well-known/jwks.json`
    pub fn jwks_json(&self) -> Value {
        json!({
            "keys": [{
                "kty": "RSA",
                "kid": self.kid,
                "use": "sig",
                "alg": "RS256",
                "n": self.modulus,
                "e": self.exponent,
            }]
        })
    }

    pub fn jwks(&self) -> JwkSet {
        serde_json::from_value(self.jwks_json()).expect("failed to build JWKS")
    }

    /// In-memory key source loaded from this key's JWKS document
    pub fn key_source(&self) -> StaticKeySource {
        StaticKeySource::from_jwks(&self.jwks()).expect("failed to load test JWKS")
    }

    /// Sign claims with RS256, naming this key in the header
    pub fn create_token(&self, claims: &TestClaims) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding_key).expect("failed to encode token")
    }

    /// Verify a token and extract claims
    pub fn verify_token(&self, token: &str) -> Result<TestClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.validate_aud = false; // Don't validate audience in test helper

        let token_data = decode::<TestClaims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

/// Create a valid test token with default claims
pub fn create_valid_token(
    keypair: &TestKeyPair,
    issuer: &str,
    audience: &str,
    subject: &str,
    email: Option<&str>,
) -> String {
    let mut claims = TestClaims::new(issuer, audience, subject);
    claims.email = email.map(String::from);
    keypair.create_token(&claims)
}

/// Create a valid test token carrying the given groups
pub fn create_grouped_token(
    keypair: &TestKeyPair,
    issuer: &str,
    audience: &str,
    subject: &str,
    groups: &[&str],
) -> String {
    let claims = TestClaims::new(issuer, audience, subject)
        .with_email(&format!("{subject}@example.com"))
        .with_groups(groups);
    keypair.create_token(&claims)
}

/// Create an expired test token
pub fn create_expired_token(
    keypair: &TestKeyPair,
    issuer: &str,
    audience: &str,
    subject: &str,
) -> String {
    let now = Utc::now();
    let mut claims = TestClaims::new(issuer, audience, subject).with_groups(&["owners"]);
    claims.exp = (now - Duration::hours(1)).timestamp(); // Expired 1 hour ago
    claims.iat = (now - Duration::hours(2)).timestamp();
    keypair.create_token(&claims)
}

/// Create a test token with wrong issuer
pub fn create_wrong_issuer_token(
    keypair: &TestKeyPair,
    issuer: &str,
    audience: &str,
    subject: &str,
) -> String {
    let claims =
        TestClaims::new(&format!("wrong-{issuer}"), audience, subject).with_groups(&["owners"]);
    keypair.create_token(&claims)
}

/// Create a test token with wrong audience
pub fn create_wrong_audience_token(
    keypair: &TestKeyPair,
    issuer: &str,
    audience: &str,
    subject: &str,
) -> String {
    let claims =
        TestClaims::new(issuer, &format!("wrong-{audience}"), subject).with_groups(&["owners"]);
    keypair.create_token(&claims)
}

/// Unsigned-looking token with the given payload, for client-side decoding tests
pub fn unsigned_token(payload: &Value) -> String {
    let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = b64.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = b64.encode(payload.to_string());
    format!("{header}.{body}.signature")
}
