//! Session keys and clocks.
//!
//! A session is never created explicitly. Its key is a pure function of the
//! caller identity and a coarse time bucket, so repeated calls from the same
//! caller inside one window land in the same session.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity used when the caller address is unknown.
pub const LOCAL_IDENTITY: &str = "127.0.0.1";

const KEY_PREFIX: &str = "tinker_session_";

/// Key identifying one session's variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    /// Derive the key for `identity` at `now`, bucketed into `window`.
    ///
    /// A zero window is treated as one second.
    pub fn derive(identity: &str, now: DateTime<Utc>, window: Duration) -> Self {
        let window = window.as_secs().max(1) as i64;
        let bucket = now.timestamp().div_euclid(window) * window;

        let mut hasher = Sha256::new();
        hasher.update(identity.as_bytes());
        hasher.update(b"|");
        hasher.update(bucket.to_string().as_bytes());
        Self(format!("{}{:x}", KEY_PREFIX, hasher.finalize()))
    }

    /// Derive a key, falling back to [`LOCAL_IDENTITY`] for a missing or
    /// blank identity.
    pub fn for_caller(identity: Option<&str>, now: DateTime<Utc>, window: Duration) -> Self {
        let identity = identity
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(LOCAL_IDENTITY);
        Self::derive(identity, now, window)
    }

    /// Wrap an existing key string.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock stopped at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = now.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Jump to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
