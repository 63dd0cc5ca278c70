//! Presigned photo uploads
//!
//! The browser never receives storage credentials: it asks the API for a
//! short-lived signed `PUT` URL and uploads the photo bytes straight to the
//! bucket. The returned object key is then stored in the listing's `photos`.

use anyhow::{Context, Result};
use http::Method;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::signer::Signer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_UPLOAD_EXPIRY_SECS: u64 = 900;
const UPLOAD_PREFIX: &str = "uploads";
const MAX_FILENAME_LEN: usize = 100;

/// Body of `POST /uploads`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
}

/// Response of `POST /uploads`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub upload_url: String,
    pub object_key: String,
    pub expires_in: u64,
}

/// Issues presigned `PUT` URLs under `uploads/`
pub struct UploadIssuer {
    signer: Arc<dyn Signer>,
    expires_in: Duration,
}

impl std::fmt::Debug for UploadIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadIssuer")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl UploadIssuer {
    pub fn new(signer: Arc<dyn Signer>, expires_in: Duration) -> Self {
        Self { signer, expires_in }
    }

    /// Sign against an S3 bucket, credentials taken from the environment
    pub fn for_s3(bucket: &str, region: &str, expires_in: Duration) -> Result<Self> {
        let s3 = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region)
            .build()
            .with_context(|| format!("configuring upload bucket '{bucket}'"))?;
        Ok(Self::new(Arc::new(s3), expires_in))
    }

    pub async fn issue(&self, request: &UploadRequest) -> Result<UploadTicket> {
        let object_key = format!(
            "{UPLOAD_PREFIX}/{}-{}",
            Uuid::new_v4(),
            sanitize_filename(&request.filename)
        );
        let url = self
            .signer
            .signed_url(Method::PUT, &Path::from(object_key.as_str()), self.expires_in)
            .await
            .with_context(|| format!("signing upload url for {object_key}"))?;
        Ok(UploadTicket {
            upload_url: url.to_string(),
            object_key,
            expires_in: self.expires_in.as_secs(),
        })
    }
}

/// Photos only
pub fn is_accepted_content_type(content_type: &str) -> bool {
    content_type
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}

/// Keep `[A-Za-z0-9._-]`, replace anything else with `_`, bound the length.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("front porch.jpg"), "front_porch.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\photos\\kitchen.png"), "kitchen.png");
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename(&"a".repeat(300)).len(), MAX_FILENAME_LEN);
    }

    #[test]
    fn test_content_types() {
        assert!(is_accepted_content_type("image/jpeg"));
        assert!(!is_accepted_content_type("image/"));
        assert!(!is_accepted_content_type("text/html"));
    }
}
