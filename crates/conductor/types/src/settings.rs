//! Singleton configuration entries

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Concurrency cap used when no valid `max_concurrent` entry exists
pub const DEFAULT_MAX_CONCURRENT: i64 = 8;

/// Configuration keys that may be changed at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    MaxConcurrent,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 1] = [ConfigKey::MaxConcurrent];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::MaxConcurrent => "max_concurrent",
        }
    }

    /// Validate a raw value for this key, returning its canonical JSON form.
    pub fn normalize_value(&self, value: &Value) -> Option<Value> {
        match self {
            ConfigKey::MaxConcurrent => positive_integer(value).map(Value::from),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a key outside the allow-list is requested
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown config key: {0}")]
pub struct UnknownConfigKey(pub String);

impl FromStr for ConfigKey {
    type Err = UnknownConfigKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownConfigKey(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: Value,
}

impl ConfigEntry {
    pub fn new(key: ConfigKey, value: impl Into<Value>) -> Self {
        Self {
            key: key.as_str().to_string(),
            value: value.into(),
        }
    }

    /// Interpret the value as a concurrency cap
    pub fn as_max_concurrent(&self) -> Option<i64> {
        positive_integer(&self.value)
    }
}

/// Accepts JSON integers and numeric strings greater than zero.
pub fn positive_integer(value: &Value) -> Option<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.filter(|n| *n > 0)
}
