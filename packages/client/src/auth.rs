//! # Authentication session
//!
//! [`AuthSession`] holds the signed-in user and persists the login through a
//! [`SessionStorage`] so a restart resumes the session. The login is stored
//! under the fixed key `user`; on desktop this is `session.json` in the
//! platform data directory ([`FileSessionStorage`]).
//!
//! Credentials are validated locally before any store call: logins need at
//! least [`MIN_LOGIN_LEN`] characters and passwords at least
//! [`MIN_PASSWORD_LEN`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use store::{NoteStore, StoreError, User};
use thiserror::Error;

use crate::lock;
use crate::ClientError;

pub const MIN_LOGIN_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Failure of the durable session storage.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file is corrupt: {0}")]
    Format(#[from] serde_json::Error),
}

/// Durable storage of the signed-in login.
pub trait SessionStorage: Send + Sync {
    fn load(&self) -> Result<Option<String>, SessionError>;
    fn save(&self, login: &str) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

#[derive(Serialize, Deserialize)]
struct SessionFile {
    user: String,
}

/// JSON file holding `{"user": "<login>"}`.
#[derive(Clone, Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/notes/session.json`, or `None` if the platform has no data
    /// directory.
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|dir| Self::new(dir.join("notes").join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileSessionStorage {
    fn load(&self) -> Result<Option<String>, SessionError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let file: SessionFile = serde_json::from_str(&text)?;
                Ok(Some(file.user))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, login: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string(&SessionFile {
            user: login.to_string(),
        })?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Session storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    login: Mutex<Option<String>>,
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self) -> Result<Option<String>, SessionError> {
        Ok(lock(&self.login).clone())
    }

    fn save(&self, login: &str) -> Result<(), SessionError> {
        *lock(&self.login) = Some(login.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        lock(&self.login).take();
        Ok(())
    }
}

fn validate_credentials(login: &str, password: &str) -> Result<(), ClientError> {
    if login.trim().chars().count() < MIN_LOGIN_LEN {
        return Err(ClientError::InvalidInput(format!(
            "login must be at least {MIN_LOGIN_LEN} characters"
        )));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// The signed-in user, shared by everything that needs to know who is
/// working.
pub struct AuthSession<S> {
    store: Arc<S>,
    storage: Box<dyn SessionStorage>,
    user: Mutex<Option<User>>,
}

impl<S: NoteStore> AuthSession<S> {
    pub fn new(store: Arc<S>, storage: impl SessionStorage + 'static) -> Self {
        Self {
            store,
            storage: Box::new(storage),
            user: Mutex::new(None),
        }
    }

    /// Restore the session saved by a previous run. A stored login that no
    /// longer exists is cleared.
    pub async fn init(&self) -> Result<Option<User>, ClientError> {
        let Some(login) = self.storage.load()? else {
            return Ok(None);
        };
        match self.store.get_user_by_login(&login).await? {
            Some(user) => {
                tracing::info!(login = %user.login, "restored session");
                *lock(&self.user) = Some(user.clone());
                Ok(Some(user))
            }
            None => {
                tracing::warn!(%login, "stored session refers to an unknown login");
                self.storage.clear()?;
                Ok(None)
            }
        }
    }

    pub async fn sign_in(&self, login: &str, password: &str) -> Result<User, ClientError> {
        validate_credentials(login, password)?;
        let user = self
            .store
            .authenticate(login.trim(), password)
            .await?
            .ok_or(StoreError::Unauthorized)?;
        self.establish(user)
    }

    /// Create an account and sign it in.
    pub async fn register(&self, login: &str, password: &str) -> Result<User, ClientError> {
        validate_credentials(login, password)?;
        let login = login.trim();
        if self.store.get_user_by_login(login).await?.is_some() {
            return Err(StoreError::Conflict(login.to_string()).into());
        }
        let id = self.store.create_user(login, password).await?;
        let user = self
            .store
            .get_user(&id)
            .await?
            .ok_or_else(|| StoreError::user_not_found(&id))?;
        tracing::info!(%login, "registered user");
        self.establish(user)
    }

    pub fn sign_out(&self) -> Result<(), ClientError> {
        if let Some(user) = lock(&self.user).take() {
            tracing::info!(login = %user.login, "signed out");
        }
        self.storage.clear()?;
        Ok(())
    }

    pub fn current(&self) -> Option<User> {
        lock(&self.user).clone()
    }

    pub fn current_login(&self) -> Option<String> {
        lock(&self.user).as_ref().map(|u| u.login.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        lock(&self.user).is_some()
    }

    fn establish(&self, user: User) -> Result<User, ClientError> {
        self.storage.save(&user.login)?;
        *lock(&self.user) = Some(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::MemoryStore;

    fn session(store: &Arc<MemoryStore>) -> AuthSession<MemoryStore> {
        AuthSession::new(store.clone(), MemorySessionStorage::default())
    }

    #[tokio::test]
    async fn test_register_then_sign_in() {
        let store = Arc::new(MemoryStore::new());
        let auth = session(&store);

        let user = auth.register("alice", "secret1").await.unwrap();
        assert_eq!(user.login, "alice");
        assert_eq!(auth.current_login().as_deref(), Some("alice"));

        auth.sign_out().unwrap();
        assert!(!auth.is_signed_in());

        let again = auth.sign_in("alice", "secret1").await.unwrap();
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn test_register_taken_login() {
        let store = Arc::new(MemoryStore::new());
        let auth = session(&store);
        auth.register("alice", "secret1").await.unwrap();

        let err = auth.register("alice", "secret2").await.unwrap_err();
        assert_eq!(err.user_message(), "login is already taken");
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let store = Arc::new(MemoryStore::new());
        let auth = session(&store);
        auth.register("alice", "secret1").await.unwrap();
        auth.sign_out().unwrap();

        let err = auth.sign_in("alice", "wrong-password").await.unwrap_err();
        assert!(matches!(err, ClientError::Store(StoreError::Unauthorized)));
        let err = auth.sign_in("nobody", "secret1").await.unwrap_err();
        assert_eq!(err.user_message(), "invalid login or password");
        assert!(!auth.is_signed_in());
    }

    #[tokio::test]
    async fn test_short_credentials_rejected() {
        let store = Arc::new(MemoryStore::new());
        let auth = session(&store);
        assert!(matches!(
            auth.register("al", "secret1").await,
            Err(ClientError::InvalidInput(_))
        ));
        assert!(matches!(
            auth.sign_in("alice", "12345").await,
            Err(ClientError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_file_session_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes").join("session.json");
        let store = Arc::new(MemoryStore::new());

        let first = AuthSession::new(store.clone(), FileSessionStorage::new(&path));
        first.register("alice", "secret1").await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, r#"{"user":"alice"}"#);

        let second = AuthSession::new(store.clone(), FileSessionStorage::new(&path));
        let restored = second.init().await.unwrap().unwrap();
        assert_eq!(restored.login, "alice");

        second.sign_out().unwrap();
        assert!(!path.exists());
        let third = AuthSession::new(store, FileSessionStorage::new(&path));
        assert!(third.init().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_session_is_cleared() {
        let storage = MemorySessionStorage::default();
        storage.save("ghost").unwrap();
        let auth = AuthSession::new(Arc::new(MemoryStore::new()), storage);

        assert!(auth.init().await.unwrap().is_none());
        assert!(!auth.is_signed_in());
    }
}
