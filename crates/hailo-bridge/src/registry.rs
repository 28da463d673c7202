//! # Host Handle Registry
//!
//! The boundary between the bridge and a host runtime. Hosts never see Rust
//! objects: they get an opaque [`HandleId`] per live device, network group or
//! pipeline, pass it back in later calls, and release it when done. Arguments
//! arrive as loosely typed [`HostValue`]s and every failure leaves as a
//! [`BoundaryError`].
//!
//! Releasing a handle only drops the registry's own reference. A network group
//! keeps its device alive and a pipeline keeps its network group alive, exactly as
//! they do outside the registry.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;
use crate::backend::Accelerator;
use crate::config::BridgeConfig;
use crate::device::DeviceHandle;
use crate::error::{BoundaryError, ErrorKind, RegistryError};
use crate::infer::{execute_with, InferResponse};
use crate::network_group::NetworkGroupHandle;
use crate::pipeline::InferencePipeline;
use crate::stream::StreamDescriptor;
use crate::worker::InferenceWorker;

/// Opaque identifier for a live resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(Uuid);

impl HandleId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#Reference<{}>", self.0)
    }
}

/// A value handed over by the host runtime
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Binary(Vec<u8>),
    Text(String),
    Integer(i64),
    List(Vec<HostValue>),
    Map(Vec<(HostValue, HostValue)>),
}

impl HostValue {
    /// Text content of a text value or a UTF-8 binary
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Text(text) => Some(text),
            HostValue::Binary(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HostValue::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<&str> for HostValue {
    fn from(text: &str) -> Self {
        HostValue::Text(text.to_string())
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(bytes: Vec<u8>) -> Self {
        HostValue::Binary(bytes)
    }
}

/// Anything the registry can hand out a handle for
pub(crate) enum Resource<A: Accelerator> {
    Device(DeviceHandle<A>),
    NetworkGroup(NetworkGroupHandle<A>),
    Pipeline(Arc<InferencePipeline<A>>),
}

impl<A: Accelerator> Resource<A> {
    fn kind_name(&self) -> &'static str {
        match self {
            Resource::Device(_) => "device",
            Resource::NetworkGroup(_) => "network group",
            Resource::Pipeline(_) => "pipeline",
        }
    }
}

impl<A: Accelerator> Clone for Resource<A> {
    fn clone(&self) -> Self {
        match self {
            Resource::Device(device) => Resource::Device(device.clone()),
            Resource::NetworkGroup(ng) => Resource::NetworkGroup(ng.clone()),
            Resource::Pipeline(pipeline) => Resource::Pipeline(pipeline.clone()),
        }
    }
}

type BoundaryResult<T> = Result<T, BoundaryError>;

/// Issues and resolves opaque handles for one accelerator backend.
pub struct HandleRegistry<A: Accelerator> {
    accelerator: Arc<A>,
    config: BridgeConfig,
    resources: RwLock<HashMap<HandleId, Resource<A>>>,
}

impl<A: Accelerator> HandleRegistry<A> {
    /// A registry with the default [`BridgeConfig`]
    pub fn new(accelerator: Arc<A>) -> Self {
        Self::with_config(accelerator, BridgeConfig::default())
    }

    pub fn with_config(accelerator: Arc<A>, config: BridgeConfig) -> Self {
        Self {
            accelerator,
            config,
            resources: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Open a device and hand out a handle for it
    pub fn open_device(&self) -> BoundaryResult<HandleId> {
        let device = DeviceHandle::open(self.accelerator.clone())?;
        Ok(self.insert(Resource::Device(device)))
    }

    /// Open a device and configure it from `path` in one call
    pub fn load_network_group(&self, path: &HostValue) -> BoundaryResult<HandleId> {
        let path = decode_path(path)?;
        let ng = NetworkGroupHandle::load(self.accelerator.clone(), &path)?;
        Ok(self.insert(Resource::NetworkGroup(ng)))
    }

    /// Configure an already open device from `path`.
    ///
    /// Several network groups may be configured from one device handle; each keeps
    /// the device alive on its own.
    pub fn configure(&self, device: HandleId, path: &HostValue) -> BoundaryResult<HandleId> {
        let device = match self.get(device, "device")? {
            Resource::Device(device) => device,
            _ => return Err(RegistryError::InvalidHandle { expected: "device" }.into()),
        };
        let path = decode_path(path)?;
        let ng = NetworkGroupHandle::configure(&device, &path)?;
        Ok(self.insert(Resource::NetworkGroup(ng)))
    }

    /// Bind a pipeline for a network group handle, applying the configured input policy
    pub fn create_pipeline(&self, network_group: HandleId) -> BoundaryResult<HandleId> {
        let ng = self.network_group(network_group)?;
        let pipeline = InferencePipeline::build(&ng)?.with_input_policy(self.config.input_policy);
        Ok(self.insert(Resource::Pipeline(Arc::new(pipeline))))
    }

    /// Input streams of a network group or pipeline
    pub fn input_streams(&self, handle: HandleId) -> BoundaryResult<Vec<StreamDescriptor>> {
        match self.get(handle, "network group or pipeline")? {
            Resource::NetworkGroup(ng) => Ok(ng.input_stream_descriptors()?),
            Resource::Pipeline(pipeline) => Ok(pipeline.input_stream_descriptors()?),
            Resource::Device(_) => Err(RegistryError::InvalidHandle {
                expected: "network group or pipeline",
            }
            .into()),
        }
    }

    /// Output streams of a network group or pipeline
    pub fn output_streams(&self, handle: HandleId) -> BoundaryResult<Vec<StreamDescriptor>> {
        match self.get(handle, "network group or pipeline")? {
            Resource::NetworkGroup(ng) => Ok(ng.output_stream_descriptors()?),
            Resource::Pipeline(pipeline) => Ok(pipeline.output_stream_descriptors()?),
            Resource::Device(_) => Err(RegistryError::InvalidHandle {
                expected: "network group or pipeline",
            }
            .into()),
        }
    }

    /// Run one frame of inference; `inputs` must be a map of stream name to binary.
    ///
    /// Blocks the calling thread for the duration of the device round-trip.
    pub fn infer(&self, pipeline: HandleId, inputs: &HostValue) -> BoundaryResult<InferResponse> {
        let pipeline = self.pipeline(pipeline)?;
        let entries = decode_inputs(inputs)?;
        execute_with(
            &pipeline,
            |name| match entries.get(name).copied() {
                None => Ok(None),
                Some(value) => value.as_bytes().map(Some).ok_or_else(|| {
                    BoundaryError::from(RegistryError::InputType(format!(
                        "Input data for vstream {name} must be a binary"
                    )))
                }),
            },
            entries.keys().copied(),
        )
    }

    /// Start a dedicated worker thread for `pipeline` using the configured queue settings
    pub fn spawn_worker(&self, pipeline: HandleId) -> BoundaryResult<InferenceWorker<A>> {
        let pipeline = self.pipeline(pipeline)?;
        InferenceWorker::spawn(pipeline, &self.config.worker).map_err(|e| {
            BoundaryError::new(ErrorKind::WorkerGone, format!("Failed to start inference worker: {e}"))
        })
    }

    /// Drop the registry's reference to `handle`. Returns whether it was live.
    pub fn release(&self, handle: HandleId) -> bool {
        let removed = self
            .resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        if let Some(resource) = &removed {
            debug!(%handle, kind = resource.kind_name(), "released handle");
        }
        removed.is_some()
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.resources.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: HandleId) -> bool {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&handle)
    }

    fn insert(&self, resource: Resource<A>) -> HandleId {
        let handle = HandleId::new();
        debug!(%handle, kind = resource.kind_name(), "issued handle");
        self.resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, resource);
        handle
    }

    // Clones the resource out so no lock is held across device calls.
    fn get(&self, handle: HandleId, expected: &'static str) -> BoundaryResult<Resource<A>> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
            .ok_or_else(|| RegistryError::InvalidHandle { expected }.into())
    }

    fn network_group(&self, handle: HandleId) -> BoundaryResult<NetworkGroupHandle<A>> {
        match self.get(handle, "network group")? {
            Resource::NetworkGroup(ng) => Ok(ng),
            _ => Err(RegistryError::InvalidHandle { expected: "network group" }.into()),
        }
    }

    fn pipeline(&self, handle: HandleId) -> BoundaryResult<Arc<InferencePipeline<A>>> {
        match self.get(handle, "pipeline")? {
            Resource::Pipeline(pipeline) => Ok(pipeline),
            _ => Err(RegistryError::InvalidHandle { expected: "pipeline" }.into()),
        }
    }
}

impl<A: Accelerator> fmt::Debug for HandleRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("accelerator", &self.accelerator)
            .field("handles", &self.len())
            .finish()
    }
}

fn decode_path(value: &HostValue) -> Result<PathBuf, RegistryError> {
    match value.as_str() {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Err(RegistryError::Path),
    }
}

/// Decode a host map into name/value pairs.
///
/// Values are left as they are. Whether a value is a usable frame is decided per
/// declared stream, in declared order, when the call is validated.
fn decode_inputs(value: &HostValue) -> Result<HashMap<&str, &HostValue>, RegistryError> {
    let not_a_map = || RegistryError::InputType("Input data must be a map".to_string());
    let HostValue::Map(entries) = value else {
        return Err(not_a_map());
    };
    entries
        .iter()
        .map(|(key, data)| key.as_str().map(|name| (name, data)).ok_or_else(not_a_map))
        .collect()
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::backend::Status;
    use crate::backend::sim::{SimAccelerator, SimArtifact, SimStage};
    use crate::config::InputPolicy;
    use crate::stream::{FormatType, StreamInfo};

    fn registry() -> (Arc<SimAccelerator>, HandleRegistry<SimAccelerator>) {
        let accelerator = Arc::new(
            SimAccelerator::builder()
                .artifact("net.hef", SimArtifact::single(
                    vec![StreamInfo::new("in0", vec![300], FormatType::Uint8)],
                    vec![StreamInfo::new("out0", vec![4], FormatType::Uint8)],
                ))
                .artifact("pair.hef", SimArtifact::single(
                    vec![
                        StreamInfo::new("in0", vec![4], FormatType::Uint8),
                        StreamInfo::new("in1", vec![4], FormatType::Uint8),
                    ],
                    vec![StreamInfo::new("out0", vec![2], FormatType::Uint8)],
                ))
                .build(),
        );
        (accelerator.clone(), HandleRegistry::new(accelerator))
    }

    fn inputs(entries: Vec<(HostValue, HostValue)>) -> HostValue {
        HostValue::Map(entries)
    }

    #[test]
    fn test_full_chain() {
        let (_, registry) = registry();
        let ng = registry.load_network_group(&"net.hef".into()).unwrap();
        let pipeline = registry.create_pipeline(ng).unwrap();

        let outputs = registry
            .infer(pipeline, &inputs(vec![("in0".into(), vec![0u8; 300].into())]))
            .unwrap();
        assert_eq!(outputs["out0"].len(), 4);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_binary_path_is_accepted() {
        let (_, registry) = registry();
        let path = HostValue::Binary(b"net.hef".to_vec());
        assert!(registry.load_network_group(&path).is_ok());
    }

    #[test]
    fn test_non_text_path_is_path_error() {
        let (_, registry) = registry();
        for path in [HostValue::Integer(3), HostValue::Binary(vec![0xff, 0xfe]), "".into()] {
            let err = registry.load_network_group(&path).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Path);
            assert_eq!(err.message, "Invalid HEF file path");
        }
    }

    #[test]
    fn test_configure_from_shared_device() {
        let (accelerator, registry) = registry();
        let device = registry.open_device().unwrap();
        let a = registry.configure(device, &"net.hef".into()).unwrap();
        let b = registry.configure(device, &"net.hef".into()).unwrap();

        assert_ne!(a, b);
        assert_eq!(accelerator.live_sessions(), 1);
    }

    #[test]
    fn test_stream_listing_from_either_handle() {
        let (_, registry) = registry();
        let ng = registry.load_network_group(&"net.hef".into()).unwrap();
        let pipeline = registry.create_pipeline(ng).unwrap();

        assert_eq!(registry.input_streams(ng).unwrap(), registry.input_streams(pipeline).unwrap());
        assert_eq!(registry.output_streams(ng).unwrap(), registry.output_streams(pipeline).unwrap());

        let device = registry.open_device().unwrap();
        assert_eq!(registry.input_streams(device).unwrap_err().kind, ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_wrong_handle_kind() {
        let (_, registry) = registry();
        let ng = registry.load_network_group(&"net.hef".into()).unwrap();

        let err = registry.infer(ng, &inputs(vec![])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidHandle);
        assert_eq!(err.message, "Invalid pipeline resource");

        let err = registry.configure(ng, &"net.hef".into()).unwrap_err();
        assert_eq!(err.message, "Invalid device resource");
    }

    #[test]
    fn test_input_must_be_a_map() {
        let (_, registry) = registry();
        let ng = registry.load_network_group(&"net.hef".into()).unwrap();
        let pipeline = registry.create_pipeline(ng).unwrap();

        let err = registry.infer(pipeline, &HostValue::List(vec![])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InputType);
        assert_eq!(err.message, "Input data must be a map");
    }

    #[test]
    fn test_declared_input_must_be_binary() {
        let (_, registry) = registry();
        let ng = registry.load_network_group(&"net.hef".into()).unwrap();
        let pipeline = registry.create_pipeline(ng).unwrap();

        let err = registry
            .infer(pipeline, &inputs(vec![("in0".into(), HostValue::Integer(1))]))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InputType);
        assert_eq!(err.message, "Input data for vstream in0 must be a binary");
    }

    #[test]
    fn test_non_string_key_is_not_a_map() {
        let (_, registry) = registry();
        let ng = registry.load_network_group(&"net.hef".into()).unwrap();
        let pipeline = registry.create_pipeline(ng).unwrap();

        let err = registry
            .infer(pipeline, &inputs(vec![(HostValue::Integer(0), vec![0u8; 300].into())]))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InputType);
        assert_eq!(err.message, "Input data must be a map");
    }

    #[test]
    fn test_first_declared_stream_decides_the_error() {
        let (accelerator, registry) = registry();
        let ng = registry.load_network_group(&"pair.hef".into()).unwrap();
        let pipeline = registry.create_pipeline(ng).unwrap();

        let err = registry
            .infer(pipeline, &inputs(vec![("in1".into(), HostValue::Integer(1))]))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingInput);
        assert_eq!(err.message, "Missing input data for vstream: in0");

        let err = registry
            .infer(
                pipeline,
                &inputs(vec![
                    ("in0".into(), vec![0u8; 3].into()),
                    ("in1".into(), HostValue::Integer(1)),
                ]),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SizeMismatch);
        assert_eq!(err.message, "Invalid input data size for vstream in0. Expected: 4, Got: 3");

        let err = registry
            .infer(
                pipeline,
                &inputs(vec![
                    ("in0".into(), vec![0u8; 4].into()),
                    ("in1".into(), HostValue::Integer(1)),
                ]),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InputType);
        assert_eq!(err.message, "Input data for vstream in1 must be a binary");
        assert_eq!(accelerator.infer_calls(), 0);
    }

    #[test]
    fn test_undeclared_non_binary_is_ignored_when_lenient() {
        let (_, registry) = registry();
        let ng = registry.load_network_group(&"net.hef".into()).unwrap();
        let pipeline = registry.create_pipeline(ng).unwrap();

        let result = registry.infer(
            pipeline,
            &inputs(vec![
                ("in0".into(), vec![0u8; 300].into()),
                ("extra".into(), HostValue::Integer(1)),
            ]),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_strict_policy_from_config() {
        let (accelerator, _) = registry();
        let config = BridgeConfig {
            input_policy: InputPolicy::Strict,
            ..BridgeConfig::default()
        };
        let registry = HandleRegistry::with_config(accelerator, config);
        let ng = registry.load_network_group(&"net.hef".into()).unwrap();
        let pipeline = registry.create_pipeline(ng).unwrap();

        let err = registry
            .infer(
                pipeline,
                &inputs(vec![
                    ("in0".into(), vec![0u8; 300].into()),
                    ("extra".into(), HostValue::Integer(1)),
                ]),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownInput);
    }

    #[test]
    fn test_size_mismatch_crosses_boundary() {
        let (_, registry) = registry();
        let ng = registry.load_network_group(&"net.hef".into()).unwrap();
        let pipeline = registry.create_pipeline(ng).unwrap();

        let err = registry
            .infer(pipeline, &inputs(vec![("in0".into(), vec![0u8; 299].into())]))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SizeMismatch);
        assert_eq!(
            err.to_tagged(),
            ("error", "Invalid input data size for vstream in0. Expected: 300, Got: 299")
        );
    }

    #[test]
    fn test_release_keeps_dependents_alive() {
        let (accelerator, registry) = registry();
        let device = registry.open_device().unwrap();
        let ng = registry.configure(device, &"net.hef".into()).unwrap();
        let pipeline = registry.create_pipeline(ng).unwrap();

        assert!(registry.release(device));
        assert!(registry.release(ng));
        assert!(!registry.release(ng));
        assert_eq!(accelerator.live_sessions(), 1);

        let outputs = registry
            .infer(pipeline, &inputs(vec![("in0".into(), vec![0u8; 300].into())]))
            .unwrap();
        assert_eq!(outputs.len(), 1);

        assert!(registry.release(pipeline));
        assert!(registry.is_empty());
        assert_eq!(accelerator.live_sessions(), 0);
    }

    #[test]
    fn test_failed_pipeline_build_keeps_network_group() {
        let (accelerator, registry) = registry();
        let ng = registry.load_network_group(&"net.hef".into()).unwrap();
        accelerator.inject_fault(SimStage::CreatePipeline, Status::INTERNAL_FAILURE);

        let err = registry.create_pipeline(ng).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PipelineBuild);
        assert!(registry.contains(ng));

        accelerator.clear_fault(SimStage::CreatePipeline);
        assert!(registry.create_pipeline(ng).is_ok());
    }

    #[test]
    fn test_device_open_failure() {
        let (accelerator, registry) = registry();
        accelerator.inject_fault(SimStage::OpenSession, Status::OUT_OF_PHYSICAL_DEVICES);

        assert_eq!(registry.open_device().unwrap_err().kind, ErrorKind::DeviceOpen);
        assert_eq!(
            registry.load_network_group(&"net.hef".into()).unwrap_err().kind,
            ErrorKind::DeviceOpen
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_spawned_worker_runs_requests() {
        use crate::worker::AsyncInfer;

        let (_, registry) = registry();
        let ng = registry.load_network_group(&"net.hef".into()).unwrap();
        let pipeline = registry.create_pipeline(ng).unwrap();
        let worker = registry.spawn_worker(pipeline).unwrap();

        let mut request = crate::infer::InferRequest::new();
        request.insert("in0".to_string(), vec![0u8; 300]);
        assert_eq!(worker.run(request).await.unwrap()["out0"].len(), 4);
    }
}
