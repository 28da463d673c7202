//! # Accelerator Backend
//!
//! This module defines the narrow contract through which the bridge talks to an
//! accelerator runtime. Everything above it (device, network group, pipeline,
//! executor) is written against [`Accelerator`] and never sees the SDK directly.
//!
//! ## Feature Flags
//!
//! - `sim`: Enables the deterministic simulated accelerator (on by default)
//!
//! ## Usage
//!
//! Hosts driving real hardware implement [`Accelerator`] over their SDK bindings
//! and hand an `Arc` of it to [`crate::DeviceHandle::open`]. Tests and host-side
//! development use [`sim::SimAccelerator`].

mod core_trait;
mod status;

#[cfg_attr(docsrs, doc(cfg(feature = "sim")))]
#[cfg(feature = "sim")]
/// Simulated accelerator backend.
///
/// This module is only available when the `sim` feature flag is enabled.
/// Artifacts are JSON manifests describing network groups and their streams,
/// and inference output is a pure function of the bound input bytes.
pub mod sim;

// Re-export the core traits for convenient imports
pub use core_trait::*;
pub use status::Status;
