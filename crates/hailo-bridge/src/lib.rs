//! # Hailo Bridge
//!
//! A resource-owning bridge that lets a managed host process drive an inference
//! accelerator: load a compiled model artifact, configure it into one schedulable
//! network group, bind its input/output streams, and run synchronous single-frame
//! inference over named byte buffers.
//!
//! ## Overview
//!
//! The library is built around a chain of objects with overlapping lifetimes:
//!
//! ```text
//! DeviceHandle ← NetworkGroupHandle ← InferencePipeline ← infer(...)
//! ```
//!
//! Each object holds a strong reference to the one it was built from, so releasing
//! a lower-level handle never invalidates anything built on top of it.
//!
//! Key components include:
//!
//! - An accelerator abstraction ([`backend::Accelerator`]) the SDK is reached through
//! - Stream metadata and exact frame-size arithmetic ([`stream`])
//! - A validating inference executor that either fully succeeds or reports one error
//! - A dedicated worker thread for hosts that must not block ([`InferenceWorker`])
//! - An opaque handle registry for host runtimes ([`HandleRegistry`])
//!
//! ## Assumptions
//!
//! - Every artifact configures into exactly one network group
//! - Every inference call processes exactly one frame
//! - Stream timeout and queue depth are fixed by the accelerator runtime
//!
//! ## Features
//!
//! - **sim** - Enables the deterministic simulated accelerator (default)
//!
//! ## Example
//!
//! ```rust
//! # #[cfg(feature = "sim")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::collections::HashMap;
//! use std::path::Path;
//! use std::sync::Arc;
//! use hailo_bridge::{DeviceHandle, InferencePipeline, NetworkGroupHandle};
//! use hailo_bridge::backend::sim::{SimAccelerator, SimArtifact};
//! use hailo_bridge::stream::{FormatType, StreamInfo};
//!
//! let accelerator = Arc::new(
//!     SimAccelerator::builder()
//!         .artifact("model.hef", SimArtifact::single(
//!             vec![StreamInfo::new("in0", vec![10, 10, 3], FormatType::Uint8)],
//!             vec![StreamInfo::new("out0", vec![4], FormatType::Uint8)],
//!         ))
//!         .build(),
//! );
//!
//! let device = DeviceHandle::open(accelerator)?;
//! let network_group = NetworkGroupHandle::configure(&device, Path::new("model.hef"))?;
//! let pipeline = InferencePipeline::build(&network_group)?;
//!
//! let mut inputs = HashMap::new();
//! inputs.insert("in0".to_string(), vec![0u8; 300]);
//! let outputs = pipeline.infer(&inputs)?;
//! assert_eq!(outputs["out0"].len(), 4);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "sim"))]
//! # fn main() {}
//! ```

mod device;
mod infer;
mod network_group;
mod pipeline;

pub mod backend;
pub mod config;
pub mod error;
pub mod registry;
pub mod stream;
pub mod telemetry;
pub mod worker;

pub use config::{BridgeConfig, InputPolicy, WorkerConfig};
pub use device::DeviceHandle;
pub use error::{
    BoundaryError, ConfigError, ConfigFileError, DeviceError, ErrorKind, InferError,
    PipelineError, QueryError, RegistryError,
};
pub use infer::{InferRequest, InferResponse};
pub use network_group::NetworkGroupHandle;
pub use pipeline::InferencePipeline;
pub use registry::{HandleId, HandleRegistry, HostValue};
pub use stream::StreamDescriptor;
pub use worker::{AsyncInfer, InferenceWorker, PendingInference};
