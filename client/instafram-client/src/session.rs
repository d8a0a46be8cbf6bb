//! Session tokens and the signed-in user
//!
//! The transport reads the session synchronously on every request to build
//! auth headers, so the live copy sits behind a std `RwLock`. Persistence is
//! delegated to a [`TokenStore`].

use async_trait::async_trait;
use instafram_common::{ApiError, Tokens};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Persisted session state
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    pub tokens: Option<Tokens>,
    pub user_id: Option<String>,
}

/// Where session data survives between runs
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<SessionData>, ApiError>;
    async fn save(&self, data: &SessionData) -> Result<(), ApiError>;
    async fn clear(&self) -> Result<(), ApiError>;
}

/// Keeps the session for the lifetime of the process only
#[derive(Default)]
pub struct MemoryTokenStore {
    data: tokio::sync::RwLock<Option<SessionData>>,
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<SessionData>, ApiError> {
        Ok(self.data.read().await.clone())
    }

    async fn save(&self, data: &SessionData) -> Result<(), ApiError> {
        *self.data.write().await = Some(data.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ApiError> {
        *self.data.write().await = None;
        Ok(())
    }
}

/// JSON file on disk
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn io_error(e: std::io::Error) -> ApiError {
    ApiError::Storage(format!("session store: {}", e))
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<SessionData>, ApiError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn save(&self, data: &SessionData) -> Result<(), ApiError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let bytes = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&self.path, bytes).await.map_err(io_error)
    }

    async fn clear(&self) -> Result<(), ApiError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

/// Live session shared by the transport and the mutation layer
pub struct Session {
    current: RwLock<SessionData>,
    store: Arc<dyn TokenStore>,
}

impl Session {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            current: RwLock::new(SessionData::default()),
            store,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTokenStore::default()))
    }

    /// Pull persisted state into memory
    pub async fn restore(&self) -> Result<bool, ApiError> {
        match self.store.load().await? {
            Some(data) => {
                debug!(user_id = ?data.user_id, "Session restored");
                *self.write() = data;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Record a successful sign-in
    pub async fn sign_in(&self, user_id: &str, tokens: Tokens) -> Result<(), ApiError> {
        let data = SessionData {
            tokens: Some(tokens),
            user_id: Some(user_id.to_string()),
        };
        *self.write() = data.clone();
        self.store.save(&data).await?;
        info!(user_id = %user_id, "Signed in");
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<(), ApiError> {
        *self.write() = SessionData::default();
        self.store.clear().await?;
        info!("Signed out");
        Ok(())
    }

    pub fn snapshot(&self) -> SessionData {
        self.read().clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.read().user_id.clone()
    }

    /// Current user ID or `Unauthenticated`
    pub fn require_user(&self) -> Result<String, ApiError> {
        self.user_id().ok_or(ApiError::Unauthenticated)
    }

    pub fn is_signed_in(&self) -> bool {
        self.read().tokens.is_some()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionData> {
        // Session data is plain values, a poisoned lock still holds a usable copy
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionData> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::in_memory()
    }
}
