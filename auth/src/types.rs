use crate::groups::{PrivilegedGroups, extract_privileged_groups};
use anyhow::{Result, anyhow};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Claims carried by an identity token.
///
/// The registered claims the verifier relies on are typed; everything else
/// (audience, `cognito:groups`, token_use, ...) is kept verbatim in `extra` so
/// that the group check can inspect it without assuming a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - stable identifier of the user
    pub sub: String,
    /// Issuer - identity provider that signed the token
    pub iss: String,
    /// Expiration time (seconds since Unix epoch)
    pub exp: i64,
    /// Email address of the user (optional, provider-specific)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Remaining claims, untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }

    /// Privileged groups named in the group-membership claim.
    pub fn privileged_groups(&self, privileged: &PrivilegedGroups) -> BTreeSet<String> {
        extract_privileged_groups(&self.extra, privileged)
    }
}

/// Decode the payload of a JWT without checking its signature.
///
/// The result is NOT trustworthy: anyone can mint a payload. It is only fit
/// for display and for UI hints on the client. Authorization decisions must
/// go through [`crate::verifier::TokenVerifier`].
pub fn decode_unverified_claims(token: &str) -> Result<Claims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(anyhow!("Invalid JWT format"));
    }

    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('=').as_bytes())
        .map_err(|e| anyhow!("Failed to decode JWT payload: {e:?}"))?;

    serde_json::from_slice(&payload_bytes).map_err(|e| anyhow!("Failed to parse JWT claims: {e:?}"))
}

/// Identity of a caller that passed the server-side privileged check
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Unique subject identifier
    pub subject: String,
    /// Email address (if available)
    pub email: Option<String>,
    /// Issuer of the verified token
    pub issuer: String,
    /// Token expiration time
    pub expires_at: Option<DateTime<Utc>>,
    /// Privileged groups the caller belongs to (never empty for an authorized caller)
    pub groups: BTreeSet<String>,
}
