use anyhow::{Context, Result};
use clap::Parser;
use hearth_auth::verifier::TokenVerifier;
use listings_srv::config::Args;
use listings_srv::routes::{AppState, cors_layer, router};
use listings_srv::store::BlobListingStore;
use listings_srv::uploads::UploadIssuer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let verifier_config = args.verifier_config()?;
    info!(
        "verifying tokens from issuer={} audience={}",
        verifier_config.issuer, verifier_config.audience
    );
    let verifier = Arc::new(TokenVerifier::new(verifier_config)?);

    let store = BlobListingStore::connect(&args.listings_uri)?;
    info!("listings stored at {}", args.listings_uri);

    let uploads = match &args.upload_bucket {
        Some(bucket) => {
            let issuer = UploadIssuer::for_s3(
                bucket,
                &args.region,
                Duration::from_secs(args.upload_expiry_secs),
            )?;
            info!("photo uploads to bucket {bucket}");
            Some(Arc::new(issuer))
        }
        None => {
            warn!("HEARTH_UPLOAD_BUCKET not set, photo uploads disabled");
            None
        }
    };

    let state = AppState {
        store: Arc::new(store),
        uploads,
    };
    let app = router(state, verifier).layer(cors_layer(args.cors_origin_header()?));

    let addr = format!("0.0.0.0:{}", args.port);
    info!("listings server starting on {addr}");
    info!("CORS origin configured for: {}", args.cors_origin);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
