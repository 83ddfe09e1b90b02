//! Credential storage for the signed-in session
//!
//! Holds exactly one credential pair: the short-lived access token and the
//! refresh token that renews it. Durable stores persist the pair to a JSON
//! file with two named slots (`access_token`, `refresh_token`); a missing
//! file or a missing slot both mean "no active session".
//!
//! All writes use atomic temp-file + rename to prevent corruption on crash. A
//! tokio Mutex serializes writes so a renewal and a sign-out cannot interleave
//! their file updates.

use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// The access/refresh token pair for one session.
///
/// Both tokens are opaque; nothing here inspects their contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    /// Bearer token attached to API requests
    pub access: Secret<String>,
    /// Token exchanged for a fresh pair when `access` expires
    pub renewal: Secret<String>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, renewal: impl Into<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            renewal: Secret::new(renewal.into()),
        }
    }
}

/// On-disk layout: two independent slots.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSlots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl StoredSlots {
    fn into_pair(self) -> Option<CredentialPair> {
        match (self.access_token, self.refresh_token) {
            (Some(access), Some(renewal)) => Some(CredentialPair::new(access, renewal)),
            (None, None) => None,
            _ => {
                warn!("credential file has only one slot filled, treating as signed out");
                None
            }
        }
    }
}

/// Session credential store with optional file persistence.
///
/// Reads clone the in-memory pair under a brief lock. Writes update memory
/// first, then persist; a persistence failure is returned but the in-memory
/// state already reflects the write.
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: Mutex<Option<CredentialPair>>,
}

impl CredentialStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(None),
        }
    }

    /// Load the session from the given file path.
    ///
    /// A missing file is a cold start with no session; the file is created on
    /// the first `set`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let pair = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let slots: StoredSlots = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            let pair = slots.into_pair();
            info!(path = %path.display(), signed_in = pair.is_some(), "loaded credentials");
            pair
        } else {
            info!(path = %path.display(), "credential file not found, starting signed out");
            None
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(pair),
        })
    }

    /// Clone of the current pair, if a session is active.
    pub async fn get(&self) -> Option<CredentialPair> {
        self.state.lock().await.clone()
    }

    /// Replace the stored pair and persist it.
    pub async fn set(&self, pair: CredentialPair) -> Result<()> {
        let mut state = self.state.lock().await;
        let slots = StoredSlots {
            access_token: Some(pair.access.expose().clone()),
            refresh_token: Some(pair.renewal.expose().clone()),
        };
        *state = Some(pair);
        debug!("stored credential pair");
        match &self.path {
            Some(path) => write_atomic(path, &slots).await,
            None => Ok(()),
        }
    }

    /// Forget the session and remove the persisted slots.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = None;
        debug!("cleared credential pair");
        match &self.path {
            Some(path) => remove_file(path).await,
            None => Ok(()),
        }
    }

    /// Clear the session only if its access token is still `access`.
    ///
    /// Returns whether the store was cleared. A pair written by a later
    /// sign-in or renewal is left untouched.
    pub async fn clear_if_access(&self, access: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let matches = state
            .as_ref()
            .is_some_and(|pair| pair.access.as_str() == access);
        if !matches {
            return Ok(false);
        }
        *state = None;
        debug!("cleared credential pair after rejected access token");
        if let Some(path) = &self.path {
            remove_file(path).await?;
        }
        Ok(true)
    }

    /// Whether no session is stored.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_none()
    }

    /// Backing file, if the store is durable.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Write the slots to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over the
/// target. Permissions are 0600 (owner read/write only) since the file holds
/// live tokens.
async fn write_atomic(path: &Path, slots: &StoredSlots) -> Result<()> {
    let json = serde_json::to_string_pretty(slots)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

async fn remove_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed credential file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(format!("removing credential file: {e}"))),
    }
}
