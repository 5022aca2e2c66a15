//! Session context and the small amount of state persisted between runs.
//!
//! A [`Session`] is created when a token becomes available (sign-in or a
//! restored [`Credentials`] file) and handed to every component at
//! construction. It is invalidated exactly once, on sign-out or on the
//! first `401`-class response; after that every authenticated call fails
//! with [`SyncError::NotSignedIn`].

use crate::error::{Result, SyncError};
use crate::notices::{NoticeManager, SyncNotice};
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CREDENTIALS_FILE: &str = "session.json";
const PREFERENCES_FILE: &str = "notification_prefs.json";

/// Bearer token and the user it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub token: String,
    pub user_id: UserId,
}

/// Local notification preferences. Not part of sync correctness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPreferences {
    pub push_enabled: bool,
    pub likes: bool,
    pub follows: bool,
    pub comments: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            push_enabled: true,
            likes: true,
            follows: true,
            comments: true,
        }
    }
}

/// File-backed persistence for credentials and preferences.
#[derive(Clone, Debug)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn load_credentials(&self) -> Result<Option<Credentials>> {
        self.read_json(CREDENTIALS_FILE)
    }

    pub fn save_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.write_json(CREDENTIALS_FILE, credentials)
    }

    /// Remove the stored token. Missing file is not an error.
    pub fn clear_credentials(&self) -> Result<()> {
        match fs::remove_file(self.dir.join(CREDENTIALS_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Stored preferences, or defaults when none were saved.
    pub fn load_preferences(&self) -> Result<NotificationPreferences> {
        Ok(self.read_json(PREFERENCES_FILE)?.unwrap_or_default())
    }

    pub fn save_preferences(&self, preferences: &NotificationPreferences) -> Result<()> {
        self.write_json(PREFERENCES_FILE, preferences)
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir.join(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a temp file and rename so a crash never leaves a torn file.
    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{}.tmp", name));
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

struct SessionInner {
    credentials: Credentials,
    valid: AtomicBool,
    store: Option<SessionStore>,
}

/// Explicit session context. Cheap to clone; clones share validity.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.inner.credentials.user_id)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl Session {
    /// An in-memory session (nothing persisted).
    pub fn new(token: impl Into<String>, user_id: UserId) -> Self {
        Self::from_credentials(
            Credentials {
                token: token.into(),
                user_id,
            },
            None,
        )
    }

    /// A session whose token is persisted in `store` and removed on expiry.
    pub fn persisted(credentials: Credentials, store: SessionStore) -> Result<Self> {
        store.save_credentials(&credentials)?;
        Ok(Self::from_credentials(credentials, Some(store)))
    }

    /// Restore a session saved by a previous run, if any.
    pub fn restore(store: SessionStore) -> Result<Option<Self>> {
        Ok(store
            .load_credentials()?
            .map(|credentials| Self::from_credentials(credentials, Some(store))))
    }

    fn from_credentials(credentials: Credentials, store: Option<SessionStore>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                credentials,
                valid: AtomicBool::new(true),
                store,
            }),
        }
    }

    /// The bearer token, while the session is valid.
    pub fn token(&self) -> Result<&str> {
        if self.is_valid() {
            Ok(&self.inner.credentials.token)
        } else {
            Err(SyncError::NotSignedIn)
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.inner.credentials.user_id
    }

    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::SeqCst)
    }

    /// Invalidate the session and delete the stored token.
    ///
    /// Returns true only for the call that performed the invalidation.
    pub fn expire(&self) -> bool {
        if !self.inner.valid.swap(false, Ordering::SeqCst) {
            return false;
        }
        tracing::info!(user = %self.inner.credentials.user_id, "session invalidated");
        if let Some(store) = &self.inner.store {
            if let Err(e) = store.clear_credentials() {
                tracing::warn!(error = %e, "failed to clear stored credentials");
            }
        }
        true
    }

    pub fn store(&self) -> Option<&SessionStore> {
        self.inner.store.as_ref()
    }
}

/// Uniform handling of auth failures for every component.
#[derive(Clone)]
pub struct AuthGate {
    session: Session,
    notices: NoticeManager,
}

impl AuthGate {
    pub fn new(session: Session, notices: NoticeManager) -> Self {
        Self { session, notices }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns true if `error` means the operation must stop because the
    /// session is gone. The first such error expires the session and
    /// publishes [`SyncNotice::SessionExpired`].
    pub fn intercept(&self, error: &SyncError) -> bool {
        match error {
            SyncError::Auth => {
                if self.session.expire() {
                    self.notices.publish(SyncNotice::SessionExpired);
                }
                true
            }
            SyncError::NotSignedIn => true,
            _ => false,
        }
    }
}
