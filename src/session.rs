//! The authenticated session used when talking to the InvGuard API.
//!
//! The session is an explicit value handed to whatever issues requests. It
//! is loaded once at startup from a small JSON file and cleared, file
//! included, as soon as the API answers 401.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// `admin` or `viewer`
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: Option<String>,
    pub user: Option<User>,
}

/// Shared, clearable session context.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<RwLock<Credentials>>,
    file: Option<PathBuf>,
}

impl Session {
    /// An in-memory session, never persisted.
    pub fn new(credentials: Credentials) -> Self {
        Self { inner: Arc::new(RwLock::new(credentials)), file: None }
    }

    /// Loads the session stored at `path`. A missing file yields an anonymous session.
    pub fn load(path: &Path) -> Result<Self> {
        let credentials = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str::<Credentials>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Credentials::default(),
            Err(e) => return Err(e.into()),
        };
        if let Some(user) = &credentials.user {
            info!(user=%user.username, role=%user.role, "session loaded");
        }
        Ok(Self { inner: Arc::new(RwLock::new(credentials)), file: Some(path.to_owned()) })
    }

    /// Stores new credentials, writing them through to the session file if there is one.
    pub fn store(&self, credentials: Credentials) -> Result<()> {
        if let Some(path) = &self.file {
            std::fs::write(path, serde_json::to_vec_pretty(&credentials)?)?;
        }
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = credentials;
        Ok(())
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Forgets the credentials and removes the session file. Called from the
    /// fetch path when the API rejects the token.
    pub async fn clear(&self) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = Credentials::default();
        if let Some(path) = &self.file {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error=%e, path=%path.display(), "could not remove session file");
                }
            }
        }
        info!("session cleared");
    }
}
