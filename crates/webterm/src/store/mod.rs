//! Session-scoped variable store.
//!
//! Each HTTP-style call is stateless, so REPL continuity lives here: after an
//! assignment the evaluator merges every bound variable into the caller's
//! session, and the next call replays them before running new code.
//!
//! [`VariableStore`] is the facade the evaluator uses. It never returns an
//! error. A failing backend is logged at `warn` and reads as an empty session,
//! which loses continuity but keeps the terminal usable. Expiry is enforced
//! lazily when a session is read; there is no background sweep.
//!
//! Backends implement [`VariableBackend`]:
//!
//! - [`MemoryBackend`]: process-local map.
//! - [`FileBackend`]: one JSON document per session, so state survives
//!   across separate CLI invocations.
//! - [`UnavailableBackend`]: always fails; stands in for a broken store.

mod file;
mod memory;
mod record;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use record::{SessionSnapshot, VariableRecord};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{StoreConfig, TerminalConfig};
use crate::script::Value;
use crate::session::{Clock, SessionKey};

/// Errors raised by a [`VariableBackend`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing storage could not be read or written.
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A session document could not be encoded or decoded.
    #[error("session serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The backend is not available at all.
    #[error("variable store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for session snapshots.
#[async_trait]
pub trait VariableBackend: Send + Sync + fmt::Debug {
    /// Load the snapshot stored under `key`, if any.
    async fn load(&self, key: &SessionKey) -> Result<Option<SessionSnapshot>, StoreError>;

    /// Store `snapshot` under `key`, replacing what was there.
    async fn save(&self, key: &SessionKey, snapshot: &SessionSnapshot) -> Result<(), StoreError>;

    /// Forget `key`. Removing a missing session succeeds.
    async fn remove(&self, key: &SessionKey) -> Result<(), StoreError>;
}

/// Backend that fails every operation.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    /// Create a backend that reports `reason` on every call.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl VariableBackend for UnavailableBackend {
    async fn load(&self, _key: &SessionKey) -> Result<Option<SessionSnapshot>, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    async fn save(&self, _key: &SessionKey, _snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    async fn remove(&self, _key: &SessionKey) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }
}

/// TTL-aware facade over a [`VariableBackend`].
#[derive(Debug, Clone)]
pub struct VariableStore {
    backend: Arc<dyn VariableBackend>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl VariableStore {
    /// Create a store over `backend`.
    pub fn new(backend: Arc<dyn VariableBackend>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            backend,
            clock,
            ttl,
        }
    }

    /// Create a store over a fresh [`MemoryBackend`].
    pub fn memory(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), clock, ttl)
    }

    /// Create the store described by `config`.
    pub fn from_config(config: &TerminalConfig, clock: Arc<dyn Clock>) -> Self {
        let backend: Arc<dyn VariableBackend> = match &config.store {
            StoreConfig::Memory => Arc::new(MemoryBackend::new()),
            StoreConfig::File { dir } => Arc::new(FileBackend::new(dir)),
        };
        Self::new(backend, clock, config.variable_ttl)
    }

    /// How long a session lives after its last write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Records stored for `key`, in first-assignment order.
    ///
    /// Expired, missing and unreadable sessions all read as empty.
    pub async fn get(&self, key: &SessionKey) -> Vec<VariableRecord> {
        self.live_snapshot(key)
            .await
            .map(|snapshot| snapshot.records)
            .unwrap_or_default()
    }

    /// Merge `bindings` into the session, replacing records by name.
    ///
    /// Records not named in `bindings` are kept. The session expiry is
    /// pushed out to now plus the TTL.
    pub async fn merge(&self, key: &SessionKey, bindings: impl IntoIterator<Item = (String, Value)>) {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);

        let mut snapshot = self
            .live_snapshot(key)
            .await
            .unwrap_or_else(|| SessionSnapshot::new(expires_at));
        snapshot.expires_at = expires_at;

        for (name, value) in bindings {
            match VariableRecord::from_value(&name, &value) {
                Ok(record) => snapshot.upsert(record),
                Err(e) => warn!(session = %key, %name, error = %e, "skipping unserializable variable"),
            }
        }

        if let Err(e) = self.backend.save(key, &snapshot).await {
            warn!(session = %key, error = %e, "variable store unavailable, merge dropped");
        } else {
            debug!(session = %key, records = snapshot.records.len(), "merged session variables");
        }
    }

    /// Forget every variable in the session.
    pub async fn clear(&self, key: &SessionKey) {
        if let Err(e) = self.backend.remove(key).await {
            warn!(session = %key, error = %e, "variable store unavailable, clear dropped");
        }
    }

    async fn live_snapshot(&self, key: &SessionKey) -> Option<SessionSnapshot> {
        let snapshot = match self.backend.load(key).await {
            Ok(snapshot) => snapshot?,
            Err(e) => {
                warn!(session = %key, error = %e, "variable store unavailable, using empty session");
                return None;
            }
        };
        if snapshot.is_expired(self.clock.now()) {
            debug!(session = %key, "session expired");
            return None;
        }
        Some(snapshot)
    }
}
