//! In-process variable backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SessionSnapshot, StoreError, VariableBackend};
use crate::session::SessionKey;

/// Keeps sessions in a map guarded by an async lock.
///
/// Concurrent merges into one session are read-modify-write with no
/// transaction spanning them, so the last writer wins per variable.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sessions: RwLock<HashMap<String, SessionSnapshot>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is held.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl VariableBackend for MemoryBackend {
    async fn load(&self, key: &SessionKey) -> Result<Option<SessionSnapshot>, StoreError> {
        Ok(self.sessions.read().await.get(key.as_str()).cloned())
    }

    async fn save(&self, key: &SessionKey, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(key.as_str().to_string(), snapshot.clone());
        Ok(())
    }

    async fn remove(&self, key: &SessionKey) -> Result<(), StoreError> {
        self.sessions.write().await.remove(key.as_str());
        Ok(())
    }
}
