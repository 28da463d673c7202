//! Error types for every stage of the device → network group → pipeline → infer chain.
//!
//! Each stage has its own enum so callers can match on exactly what failed. At the
//! host boundary everything collapses into [`BoundaryError`], which keeps both a
//! machine-readable [`ErrorKind`] and the human-readable message.

use std::path::PathBuf;
use serde::Serialize;
use thiserror::Error;
use crate::backend::Status;
use crate::stream::Direction;

/// Failure kinds distinguishable by host-side callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Path,
    DeviceOpen,
    ArtifactLoad,
    ConfigParams,
    DeviceConfig,
    ArtifactShape,
    PipelineBuild,
    Query,
    MissingInput,
    UnknownInput,
    SizeMismatch,
    DeviceFailure,
    InputType,
    InvalidHandle,
    Busy,
    WorkerGone,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Failed to create virtual device: {0}")]
    Open(Status),
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DeviceOpen
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Failed to load HEF file {}: {status}", .path.display())]
    ArtifactLoad { path: PathBuf, status: Status },

    #[error("Failed to create configure params: {0}")]
    ConfigParams(Status),

    #[error("Failed to configure network groups: {0}")]
    DeviceConfig(Status),

    #[error("Invalid number of network groups: {count}")]
    ArtifactShape { count: usize },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Device(e) => e.kind(),
            ConfigError::ArtifactLoad { .. } => ErrorKind::ArtifactLoad,
            ConfigError::ConfigParams(_) => ErrorKind::ConfigParams,
            ConfigError::DeviceConfig(_) => ErrorKind::DeviceConfig,
            ConfigError::ArtifactShape { .. } => ErrorKind::ArtifactShape,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Failed to query {} stream info: {status}", .direction.as_str())]
    Status { direction: Direction, status: Status },

    #[error("Stream {name} has no resolved element format")]
    UnresolvedFormat { name: String },

    #[error("Frame size of stream {name} overflows")]
    FrameSizeOverflow { name: String },
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Query
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Failed to create input vstream params: {0}")]
    InputParams(Status),

    #[error("Failed to create output vstream params: {0}")]
    OutputParams(Status),

    #[error("Failed to create inference pipeline: {0}")]
    Create(Status),

    #[error("Failed to resolve pipeline streams: {0}")]
    Streams(#[from] QueryError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PipelineBuild
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferError {
    #[error("Missing input data for vstream: {0}")]
    MissingInput(String),

    #[error("Unknown input vstream: {0}")]
    UnknownInput(String),

    #[error("Invalid input data size for vstream {name}. Expected: {expected}, Got: {got}")]
    SizeMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Inference failed with status: {0}")]
    DeviceFailure(Status),

    #[error("Inference queue is full")]
    Busy,

    #[error("Inference worker is no longer running")]
    WorkerGone,
}

impl InferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InferError::MissingInput(_) => ErrorKind::MissingInput,
            InferError::UnknownInput(_) => ErrorKind::UnknownInput,
            InferError::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            InferError::DeviceFailure(_) => ErrorKind::DeviceFailure,
            InferError::Busy => ErrorKind::Busy,
            InferError::WorkerGone => ErrorKind::WorkerGone,
        }
    }

    /// A device failure caused by the fixed per-call timeout expiring
    pub fn is_timeout(&self) -> bool {
        matches!(self, InferError::DeviceFailure(status) if status.is_timeout())
    }
}

/// Errors raised while decoding host values at the boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid HEF file path")]
    Path,

    #[error("{0}")]
    InputType(String),

    #[error("Invalid {expected} resource")]
    InvalidHandle { expected: &'static str },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Path => ErrorKind::Path,
            RegistryError::InputType(_) => ErrorKind::InputType,
            RegistryError::InvalidHandle { .. } => ErrorKind::InvalidHandle,
        }
    }
}

/// Errors loading a [`crate::config::BridgeConfig`]
#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The single error shape that crosses the host boundary
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct BoundaryError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BoundaryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The `("error", message)` tagged form expected by hosts without structured errors
    pub fn to_tagged(&self) -> (&'static str, &str) {
        ("error", self.message.as_str())
    }
}

macro_rules! impl_boundary_from {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for BoundaryError {
                fn from(err: $err) -> Self {
                    BoundaryError::new(err.kind(), err.to_string())
                }
            }
        )*
    }
}

impl_boundary_from!(
    DeviceError,
    ConfigError,
    QueryError,
    PipelineError,
    InferError,
    RegistryError,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_mismatch_message_reports_both_sizes() {
        let err = InferError::SizeMismatch {
            name: "in0".to_string(),
            expected: 300,
            got: 299,
        };
        assert_eq!(
            err.to_string(),
            "Invalid input data size for vstream in0. Expected: 300, Got: 299"
        );
        assert_eq!(err.kind(), ErrorKind::SizeMismatch);
    }

    #[test]
    fn test_device_error_is_transparent_through_config() {
        let err = ConfigError::from(DeviceError::Open(Status::OUT_OF_PHYSICAL_DEVICES));
        assert_eq!(err.kind(), ErrorKind::DeviceOpen);
        assert_eq!(
            err.to_string(),
            "Failed to create virtual device: 74 (OUT_OF_PHYSICAL_DEVICES)"
        );
    }

    #[test]
    fn test_artifact_load_names_path() {
        let err = ConfigError::ArtifactLoad {
            path: PathBuf::from("/models/missing.hef"),
            status: Status::OPEN_FILE_FAILURE,
        };
        assert!(err.to_string().contains("/models/missing.hef"));
    }

    #[test]
    fn test_timeout_detection() {
        assert!(InferError::DeviceFailure(Status::TIMEOUT).is_timeout());
        assert!(!InferError::DeviceFailure(Status::INTERNAL_FAILURE).is_timeout());
        assert!(!InferError::Busy.is_timeout());
    }

    #[test]
    fn test_boundary_error_keeps_kind_and_message() {
        let boundary: BoundaryError = InferError::MissingInput("in0".to_string()).into();
        assert_eq!(boundary.kind, ErrorKind::MissingInput);
        assert_eq!(boundary.to_tagged(), ("error", "Missing input data for vstream: in0"));
    }
}
