use crate::uploads::DEFAULT_UPLOAD_EXPIRY_SECS;
use anyhow::{Context, Result};
use clap::Parser;
use hearth_auth::verifier::VerifierConfig;
use http::HeaderValue;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Server port
    #[arg(short, long, default_value = "3001", env = "HEARTH_PORT")]
    pub port: u16,

    /// Origin allowed to call the API from a browser
    #[arg(long, default_value = "http://localhost:3000", env = "HEARTH_CORS_ORIGIN")]
    pub cors_origin: String,

    /// Object store URL holding one JSON document per listing
    #[arg(long, default_value = "memory:///listings", env = "HEARTH_LISTINGS_URI")]
    pub listings_uri: String,

    /// S3 bucket receiving photo uploads; uploads are disabled when unset
    #[arg(long, env = "HEARTH_UPLOAD_BUCKET")]
    pub upload_bucket: Option<String>,

    /// Lifetime of presigned upload URLs in seconds
    #[arg(long, default_value_t = DEFAULT_UPLOAD_EXPIRY_SECS, env = "HEARTH_UPLOAD_EXPIRY_SECS")]
    pub upload_expiry_secs: u64,

    /// AWS region of the user pool and the upload bucket
    #[arg(long, default_value = "us-east-2", env = "HEARTH_REGION")]
    pub region: String,

    /// Cognito user pool id
    #[arg(long, env = "HEARTH_USER_POOL_ID")]
    pub user_pool_id: Option<String>,

    /// App client id, expected as the token audience
    #[arg(long, env = "HEARTH_APP_CLIENT_ID")]
    pub app_client_id: Option<String>,
}

impl Args {
    /// Verifier settings: `HEARTH_AUTH_CONFIG` when set, otherwise derived
    /// from the user pool arguments
    pub fn verifier_config(&self) -> Result<VerifierConfig> {
        if std::env::var("HEARTH_AUTH_CONFIG").is_ok() {
            return VerifierConfig::from_env();
        }
        let user_pool_id = self
            .user_pool_id
            .as_deref()
            .context("HEARTH_USER_POOL_ID or HEARTH_AUTH_CONFIG must be set")?;
        let app_client_id = self
            .app_client_id
            .as_deref()
            .context("HEARTH_APP_CLIENT_ID or HEARTH_AUTH_CONFIG must be set")?;
        Ok(VerifierConfig::for_cognito(
            &self.region,
            user_pool_id,
            app_client_id,
        ))
    }

    pub fn cors_origin_header(&self) -> Result<HeaderValue> {
        self.cors_origin
            .parse::<HeaderValue>()
            .context("Invalid HEARTH_CORS_ORIGIN format")
    }
}
