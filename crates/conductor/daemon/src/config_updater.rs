//! Runtime configuration changes

use crate::admission::AdmissionController;
use crate::error::{DispatchError, DispatchResult};
use crate::storage::Records;
use conductor_types::{ConfigEntry, ConfigKey};
use serde_json::Value;

/// Validates and applies updates to the allow-listed config keys
#[derive(Clone)]
pub struct ConfigUpdater {
    records: Records,
    admission: AdmissionController,
}

impl ConfigUpdater {
    pub fn new(records: Records, admission: AdmissionController) -> Self {
        Self { records, admission }
    }

    /// Overwrite an existing config entry.
    ///
    /// Rows are never created here; updating a missing row only logs a warning.
    pub async fn set_config(&self, key: &str, value: &Value) -> DispatchResult<ConfigEntry> {
        let key: ConfigKey = key.parse()?;
        let value = key.normalize_value(value).ok_or_else(|| {
            DispatchError::Validation(format!("Invalid value for {}: expected a positive integer", key))
        })?;

        let changed = self.records.update_config(key, value.clone()).await?;
        if changed == 0 {
            tracing::warn!(key = %key, "Config entry does not exist, nothing updated");
        } else {
            tracing::info!(key = %key, value = %value, "Config updated");
        }

        Ok(ConfigEntry::new(key, value))
    }

    /// Effective concurrency cap
    pub async fn get_config(&self) -> i64 {
        self.admission.max_concurrent().await
    }
}
