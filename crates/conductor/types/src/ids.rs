//! Workflow identifiers
//!
//! Real identifiers are opaque strings handed out by the execution API.
//! When a trigger fails before the API assigns one, a local identifier is
//! synthesised in the `fail_` namespace so the attempt can still be recorded.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const FAILURE_PREFIX: &str = "fail_";

/// Identifier of one workflow lineage
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Synthesise a failure sentinel: `fail_<base36 millis>_<4 hex>`.
    ///
    /// The random suffix keeps two failures in the same millisecond apart.
    pub fn failure_sentinel() -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}_{}", FAILURE_PREFIX, to_base36(millis), &suffix[..4]))
    }

    /// Was this id synthesised locally for a failed trigger?
    pub fn is_failure_sentinel(&self) -> bool {
        self.0.starts_with(FAILURE_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for WorkflowId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_sentinel_namespace() {
        let id = WorkflowId::failure_sentinel();
        assert!(id.is_failure_sentinel());
        assert!(id.as_str().starts_with("fail_"));
        assert!(!WorkflowId::new("wf_123").is_failure_sentinel());
    }

    #[test]
    fn test_failure_sentinels_are_distinct() {
        let a = WorkflowId::failure_sentinel();
        let b = WorkflowId::failure_sentinel();
        assert_ne!(a, b);
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = WorkflowId::new("wf-1");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("wf-1"));
    }
}
