//! Bridge configuration loaded from TOML.
//!
//! Only host-facing behavior is configurable. Stream timeout and queue depth are
//! fixed by the accelerator runtime and live in [`crate::stream`] as constants.

use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::ConfigFileError;

/// How caller-supplied input names that match no declared stream are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputPolicy {
    /// Ignore unknown names
    #[default]
    Lenient,
    /// Reject the call with [`crate::InferError::UnknownInput`]
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Requests that may wait behind the one currently executing
    pub queue_capacity: usize,
    /// Reject with [`crate::InferError::Busy`] instead of waiting when the queue is full
    pub reject_when_busy: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4,
            reject_when_busy: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub input_policy: InputPolicy,
    pub worker: WorkerConfig,
    /// `tracing_subscriber::EnvFilter` directive used by [`crate::telemetry::init_tracing`]
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            input_policy: InputPolicy::default(),
            worker: WorkerConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigFileError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse the TOML file at `path`
    pub fn from_path(path: &Path) -> Result<Self, ConfigFileError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}
