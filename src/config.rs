use std::fs;
use std::path::Path;
use serde::Deserialize;
use crate::errors::{Result, UploadError};

/// Coordinator configuration.
///
/// Constructed explicitly and passed by handle; there is no process-global
/// instance.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Maximum single-file size in bytes. Zero or negative means unlimited.
    pub max_file_upload_size: i64,
    /// Transfers allowed in flight at once. The default of 1 serializes
    /// every file across all folders.
    pub max_concurrent: usize,
    /// Buffered capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_file_upload_size: -1,
            max_concurrent: 1,
            event_capacity: 256,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .map_err(|err| UploadError::Config(format!("can't read config file: {}", err)))?;
        toml::from_str(&config_str)
            .map_err(|err| UploadError::Config(format!("can't parse config file: {}", err)))
    }

    /// Effective ceiling, or `None` when admission is unlimited.
    pub fn upload_size_limit(&self) -> Option<u64> {
        if self.max_file_upload_size > 0 {
            Some(self.max_file_upload_size as u64)
        } else {
            None
        }
    }
}
