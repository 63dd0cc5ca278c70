//! Session-scoped storage for the PKCE verifier and the token set
//!
//! [`SessionStore`] is the single owner of login state on the client. It is
//! created around a [`SessionStorage`] (the user agent's per-tab storage) and
//! injected wherever the UI or API layer needs the current session, instead
//! of being reached through ambient globals.

use crate::groups::PrivilegedGroups;
use crate::pkce::PkceVerifier;
use crate::types::{Claims, decode_unverified_claims};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Storage key of the pending PKCE verifier
pub const PKCE_VERIFIER_KEY: &str = "pkce_verifier";
/// Storage key of the serialized token set
pub const TOKENS_KEY: &str = "hearth_tokens_v1";

/// Key/value storage scoped to one browsing session
pub trait SessionStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-process session storage
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().ok()?.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items
            .lock()
            .map_err(|_| anyhow::anyhow!("session storage lock poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items
            .lock()
            .map_err(|_| anyhow::anyhow!("session storage lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

/// Session storage persisted as a JSON object in a file
///
/// Used by terminal clients, where the session has to outlive one process.
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing session file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => {
                Err(e).with_context(|| format!("reading session file {}", self.path.display()))
            }
        }
    }

    /// Replace the file atomically. The file holds bearer tokens, so on unix
    /// it is only readable by its owner.
    fn write_all(&self, items: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_vec_pretty(items)?;
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&tmp_path)
            .with_context(|| format!("creating session file {}", tmp_path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // mode() only applies when the file is created
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("restricting session file {}", tmp_path.display()))?;
        }
        file.write_all(&json)
            .and_then(|()| file.sync_all())
            .with_context(|| format!("writing session file {}", tmp_path.display()))?;
        drop(file);
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("replacing session file {}", self.path.display()))
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("session file lock poisoned"))?;
        let mut items = match self.read_all() {
            Ok(items) => items,
            Err(e) => {
                warn!("overwriting unreadable session file: {e:?}");
                HashMap::new()
            }
        };
        f(&mut items);
        self.write_all(&items)
    }
}

impl SessionStorage for FileSessionStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().ok()?;
        match self.read_all() {
            Ok(mut items) => items.remove(key),
            Err(e) => {
                warn!("ignoring unreadable session file: {e:?}");
                None
            }
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.update(|items| {
            items.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.update(|items| {
            items.remove(key);
        })
    }
}

/// Tokens returned by the authorization-code exchange
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub id_token: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("id_token", &"(not printed)")
            .field("access_token", &"(not printed)")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "(not printed)"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// A logged-in browsing session
///
/// `claims` come from decoding the identity token WITHOUT verifying its
/// signature. They are fine for showing who is signed in and for deciding
/// which buttons to render. They must never be used to authorize anything:
/// the API re-verifies the token on every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub tokens: TokenSet,
    pub claims: Claims,
}

impl AuthSession {
    pub fn from_tokens(tokens: TokenSet) -> Result<Self> {
        let claims = decode_unverified_claims(&tokens.id_token)?;
        Ok(Self { tokens, claims })
    }

    /// Credential to send as `Authorization: Bearer <token>`.
    ///
    /// This is the identity token: its audience is the client id, which is
    /// what the API verifies.
    pub fn bearer(&self) -> &str {
        &self.tokens.id_token
    }

    pub fn email(&self) -> Option<&str> {
        self.claims.email.as_deref()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.claims.is_expired(now)
    }

    /// Non-authoritative "is privileged" hint, for UI visibility only.
    pub fn is_privileged_hint(&self, privileged: &PrivilegedGroups) -> bool {
        !self.claims.privileged_groups(privileged).is_empty()
    }

    /// `email – group1, group2`, as shown in the page header
    pub fn display_label(&self) -> String {
        let email = self.email().unwrap_or("(signed in)");
        let groups: Vec<&str> = match self.claims.extra.get(crate::groups::GROUPS_CLAIM) {
            Some(serde_json::Value::Array(values)) => {
                values.iter().filter_map(|v| v.as_str()).collect()
            }
            Some(serde_json::Value::String(joined)) => {
                joined.split(',').map(str::trim).filter(|g| !g.is_empty()).collect()
            }
            _ => Vec::new(),
        };
        if groups.is_empty() {
            email.to_string()
        } else {
            format!("{email} – {}", groups.join(", "))
        }
    }
}

/// Login state as seen by the UI
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    LoggedOut,
    /// A verifier is stored and the user agent is away at the authorization server
    AwaitingRedirect,
    LoggedIn(AuthSession),
}

/// Owner of the client-side login state
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    /// Store the verifier of a new login attempt, replacing any previous one.
    pub fn stash_verifier(&self, verifier: &PkceVerifier) -> Result<()> {
        self.storage.set_item(PKCE_VERIFIER_KEY, verifier.secret())
    }

    pub fn has_verifier(&self) -> bool {
        self.storage.get_item(PKCE_VERIFIER_KEY).is_some()
    }

    /// Read and delete the pending verifier. A verifier is single use.
    pub fn take_verifier(&self) -> Result<Option<PkceVerifier>> {
        let verifier = self.storage.get_item(PKCE_VERIFIER_KEY);
        if verifier.is_some() {
            self.storage.remove_item(PKCE_VERIFIER_KEY)?;
        }
        Ok(verifier.map(PkceVerifier::from_stored))
    }

    pub fn discard_verifier(&self) -> Result<()> {
        self.storage.remove_item(PKCE_VERIFIER_KEY)
    }

    /// Persist a token set and return the session it opens.
    pub fn save(&self, tokens: TokenSet) -> Result<AuthSession> {
        let session = AuthSession::from_tokens(tokens)?;
        let json = serde_json::to_string(&session.tokens)?;
        self.storage.set_item(TOKENS_KEY, &json)?;
        Ok(session)
    }

    /// Current session, if any.
    ///
    /// There is no refresh: a session whose identity token has expired, or
    /// whose stored tokens cannot be decoded, is cleared and `None` returned.
    pub fn current(&self) -> Option<AuthSession> {
        let json = self.storage.get_item(TOKENS_KEY)?;
        let session = serde_json::from_str::<TokenSet>(&json)
            .map_err(anyhow::Error::from)
            .and_then(AuthSession::from_tokens);
        match session {
            Ok(session) if !session.is_expired(Utc::now()) => Some(session),
            Ok(_) => {
                debug!("stored session expired, clearing it");
                self.clear_quietly();
                None
            }
            Err(e) => {
                warn!("discarding unreadable stored session: {e:?}");
                self.clear_quietly();
                None
            }
        }
    }

    /// Forget the token set.
    pub fn clear(&self) -> Result<()> {
        self.storage.remove_item(TOKENS_KEY)
    }

    fn clear_quietly(&self) {
        if let Err(e) = self.clear() {
            warn!("failed to clear stored session: {e:?}");
        }
    }

    pub fn state(&self) -> SessionState {
        if let Some(session) = self.current() {
            SessionState::LoggedIn(session)
        } else if self.has_verifier() {
            SessionState::AwaitingRedirect
        } else {
            SessionState::LoggedOut
        }
    }
}
