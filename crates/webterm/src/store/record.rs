//! Stored variable records and session snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::script::Value;

/// One persisted variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    /// Variable name without the leading `$`.
    pub name: String,
    /// Type name as reported by `gettype()`.
    pub type_tag: String,
    /// Short display string used when listing variables.
    pub display: String,
    /// Serialized value, rebuilt into a binding on the next call.
    pub payload: serde_json::Value,
}

impl VariableRecord {
    /// Build a record from a live value.
    pub fn from_value(name: impl Into<String>, value: &Value) -> Result<Self, serde_json::Error> {
        Ok(Self {
            name: name.into(),
            type_tag: value.type_name().to_string(),
            display: value.display(),
            payload: serde_json::to_value(value)?,
        })
    }

    /// Rebuild the stored value, if the payload is still readable.
    pub fn value(&self) -> Option<Value> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Everything stored for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// When the session stops being readable.
    pub expires_at: DateTime<Utc>,
    /// Records in first-assignment order.
    pub records: Vec<VariableRecord>,
}

impl SessionSnapshot {
    /// An empty snapshot expiring at `expires_at`.
    pub fn new(expires_at: DateTime<Utc>) -> Self {
        Self {
            expires_at,
            records: Vec::new(),
        }
    }

    /// Whether the snapshot has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Replace the record with the same name, or append a new one.
    pub fn upsert(&mut self, record: VariableRecord) {
        match self.records.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }
}
