//! Deferred trigger requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A trigger request parked until capacity frees up.
///
/// `payload` is the fully built execution request, kept opaque so it can be
/// replayed verbatim. `position` defines FIFO order and is never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub app_name: String,
    #[serde(default)]
    pub connection_id: Option<String>,
    pub payload: Value,
    pub position: i64,
    #[serde(default = "Utc::now")]
    pub queued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(
        app_name: impl Into<String>,
        connection_id: Option<String>,
        payload: Value,
        position: i64,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            connection_id,
            payload,
            position,
            queued_at: Utc::now(),
        }
    }
}
