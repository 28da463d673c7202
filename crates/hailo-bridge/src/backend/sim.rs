use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::trace;
use crate::stream::{Direction, FormatType, StreamInfo, StreamParams};
use super::{Accelerator, InputView, NamedStreamParams, OutputView, Status};

/// One network group described by a simulated artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimNetworkGroupSpec {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<StreamInfo>,
    #[serde(default)]
    pub outputs: Vec<StreamInfo>,
}

impl SimNetworkGroupSpec {
    pub fn new(name: impl Into<String>, inputs: Vec<StreamInfo>, outputs: Vec<StreamInfo>) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
        }
    }

    fn streams(&self, direction: Direction) -> &[StreamInfo] {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }
}

/// A simulated compiled artifact.
///
/// On disk this is a JSON manifest:
///
/// ```json
/// {
///   "network_groups": [{
///     "name": "classifier",
///     "inputs":  [{ "name": "in0",  "shape": [10, 10, 3], "format": "uint8" }],
///     "outputs": [{ "name": "out0", "shape": [4],         "format": "uint8" }]
///   }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimArtifact {
    #[serde(default)]
    pub network_groups: Vec<SimNetworkGroupSpec>,
}

impl SimArtifact {
    /// An artifact with exactly one network group
    pub fn single(inputs: Vec<StreamInfo>, outputs: Vec<StreamInfo>) -> Self {
        Self::default().with_network_group(SimNetworkGroupSpec::new("network_group_0", inputs, outputs))
    }

    pub fn with_network_group(mut self, spec: SimNetworkGroupSpec) -> Self {
        self.network_groups.push(spec);
        self
    }

    /// Parse a JSON manifest
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    // A stream with no concrete format or no dimensions cannot come out of a compiler.
    fn is_well_formed(&self) -> bool {
        self.network_groups.iter().all(|group| {
            group
                .inputs
                .iter()
                .chain(group.outputs.iter())
                .all(|info| info.format != FormatType::Auto && !info.shape.is_empty())
        })
    }
}

/// Points in the simulated runtime where a failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimStage {
    OpenSession,
    LoadArtifact,
    ConfigureParams,
    Configure,
    StreamInfos,
    InputStreamParams,
    OutputStreamParams,
    CreatePipeline,
    Infer,
}

/// Builder for [`SimAccelerator`]
#[derive(Debug, Default)]
pub struct SimAcceleratorBuilder {
    artifacts: HashMap<PathBuf, SimArtifact>,
    max_sessions: Option<usize>,
    latency: Duration,
}

impl SimAcceleratorBuilder {
    /// Serve `artifact` for `path` without touching the filesystem
    pub fn artifact(mut self, path: impl Into<PathBuf>, artifact: SimArtifact) -> Self {
        self.artifacts.insert(path.into(), artifact);
        self
    }

    /// Fail `open_session` once this many sessions are live
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = Some(max);
        self
    }

    /// Simulated device time per inference call
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn build(self) -> SimAccelerator {
        SimAccelerator {
            artifacts: self.artifacts,
            max_sessions: self.max_sessions,
            latency: self.latency,
            faults: Mutex::new(HashMap::new()),
            live_sessions: Arc::new(AtomicUsize::new(0)),
            infer_calls: AtomicUsize::new(0),
        }
    }
}

/// A deterministic stand-in for a physical accelerator.
///
/// Output frames are derived from the input frames with a keyed FNV-1a hash, so
/// identical inputs always produce identical outputs.
#[derive(Debug)]
pub struct SimAccelerator {
    artifacts: HashMap<PathBuf, SimArtifact>,
    max_sessions: Option<usize>,
    latency: Duration,
    faults: Mutex<HashMap<SimStage, Status>>,
    live_sessions: Arc<AtomicUsize>,
    infer_calls: AtomicUsize,
}

impl Default for SimAccelerator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SimAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SimAcceleratorBuilder {
        SimAcceleratorBuilder::default()
    }

    /// Make every subsequent call at `stage` fail with `status`
    pub fn inject_fault(&self, stage: SimStage, status: Status) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(stage, status);
    }

    /// Undo [`SimAccelerator::inject_fault`] for `stage`
    pub fn clear_fault(&self, stage: SimStage) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&stage);
    }

    /// Sessions opened and not yet dropped
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    /// Calls that reached the inference primitive
    pub fn infer_calls(&self) -> usize {
        self.infer_calls.load(Ordering::SeqCst)
    }

    fn check(&self, stage: SimStage) -> Result<(), Status> {
        match self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&stage)
        {
            Some(status) => Err(*status),
            None => Ok(()),
        }
    }
}

/// An open simulated session
#[derive(Debug)]
pub struct SimSession {
    live: Arc<AtomicUsize>,
}

impl Drop for SimSession {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct SimConfigureParams {
    groups: usize,
}

#[derive(Debug)]
pub struct SimNetworkGroup {
    spec: SimNetworkGroupSpec,
}

#[derive(Debug)]
pub struct SimPipeline {
    inputs: Vec<StreamInfo>,
    outputs: Vec<StreamInfo>,
    timeout: Duration,
}

impl Accelerator for SimAccelerator {
    type Session = SimSession;
    type Artifact = SimArtifact;
    type ConfigureParams = SimConfigureParams;
    type NetworkGroup = SimNetworkGroup;
    type Pipeline = SimPipeline;

    fn open_session(&self) -> Result<Self::Session, Status> {
        self.check(SimStage::OpenSession)?;
        let max = self.max_sessions.unwrap_or(usize::MAX);
        self.live_sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < max).then_some(live + 1)
            })
            .map_err(|_| Status::OUT_OF_PHYSICAL_DEVICES)?;
        Ok(SimSession {
            live: self.live_sessions.clone(),
        })
    }

    fn load_artifact(&self, path: &Path) -> Result<Self::Artifact, Status> {
        self.check(SimStage::LoadArtifact)?;
        let artifact = match self.artifacts.get(path) {
            Some(artifact) => artifact.clone(),
            None => {
                let json = fs::read_to_string(path).map_err(|_| Status::OPEN_FILE_FAILURE)?;
                SimArtifact::from_json(&json).map_err(|_| Status::INVALID_HEF)?
            }
        };
        if !artifact.is_well_formed() {
            return Err(Status::INVALID_HEF);
        }
        Ok(artifact)
    }

    fn create_configure_params(
        &self,
        _session: &Self::Session,
        artifact: &Self::Artifact,
    ) -> Result<Self::ConfigureParams, Status> {
        self.check(SimStage::ConfigureParams)?;
        Ok(SimConfigureParams {
            groups: artifact.network_groups.len(),
        })
    }

    fn configure(
        &self,
        _session: &Self::Session,
        artifact: &Self::Artifact,
        params: Self::ConfigureParams,
    ) -> Result<Vec<Self::NetworkGroup>, Status> {
        self.check(SimStage::Configure)?;
        if params.groups != artifact.network_groups.len() {
            return Err(Status::INVALID_ARGUMENT);
        }
        Ok(artifact
            .network_groups
            .iter()
            .cloned()
            .map(|spec| SimNetworkGroup { spec })
            .collect())
    }

    fn stream_infos(
        &self,
        network_group: &Self::NetworkGroup,
        direction: Direction,
    ) -> Result<Vec<StreamInfo>, Status> {
        self.check(SimStage::StreamInfos)?;
        Ok(network_group.spec.streams(direction).to_vec())
    }

    fn make_stream_params(
        &self,
        network_group: &Self::NetworkGroup,
        direction: Direction,
        defaults: StreamParams,
    ) -> Result<NamedStreamParams, Status> {
        match direction {
            Direction::Input => self.check(SimStage::InputStreamParams)?,
            Direction::Output => self.check(SimStage::OutputStreamParams)?,
        }
        Ok(network_group
            .spec
            .streams(direction)
            .iter()
            .map(|info| {
                let params = StreamParams {
                    format: defaults.format.resolve(info.format),
                    ..defaults
                };
                (info.name.clone(), params)
            })
            .collect())
    }

    fn create_pipeline(
        &self,
        network_group: &Self::NetworkGroup,
        inputs: &NamedStreamParams,
        outputs: &NamedStreamParams,
    ) -> Result<Self::Pipeline, Status> {
        self.check(SimStage::CreatePipeline)?;
        let bind = |declared: &[StreamInfo], params: &NamedStreamParams| -> Result<Vec<StreamInfo>, Status> {
            if declared.len() != params.len() {
                return Err(Status::INVALID_ARGUMENT);
            }
            declared
                .iter()
                .map(|info| {
                    let (_, p) = params
                        .iter()
                        .find(|(name, _)| *name == info.name)
                        .ok_or(Status::INVALID_ARGUMENT)?;
                    if p.format != info.format {
                        // Host-side format conversion is not simulated
                        return Err(Status::INVALID_OPERATION);
                    }
                    Ok(StreamInfo::new(info.name.clone(), info.shape.clone(), p.format))
                })
                .collect()
        };

        let timeout = inputs
            .iter()
            .chain(outputs.iter())
            .map(|(_, p)| p.timeout)
            .min()
            .unwrap_or_default();

        Ok(SimPipeline {
            inputs: bind(&network_group.spec.inputs, inputs)?,
            outputs: bind(&network_group.spec.outputs, outputs)?,
            timeout,
        })
    }

    fn pipeline_stream_infos(&self, pipeline: &Self::Pipeline, direction: Direction) -> Vec<StreamInfo> {
        match direction {
            Direction::Input => pipeline.inputs.clone(),
            Direction::Output => pipeline.outputs.clone(),
        }
    }

    fn infer(
        &self,
        pipeline: &mut Self::Pipeline,
        inputs: &[InputView<'_>],
        outputs: &mut [OutputView<'_>],
        frames: usize,
    ) -> Status {
        self.infer_calls.fetch_add(1, Ordering::SeqCst);
        if let Err(status) = self.check(SimStage::Infer) {
            return status;
        }
        if frames != 1 || inputs.len() != pipeline.inputs.len() || outputs.len() != pipeline.outputs.len() {
            return Status::INVALID_ARGUMENT;
        }

        let mut digest = FNV_OFFSET;
        for info in &pipeline.inputs {
            let Some(view) = inputs.iter().find(|view| view.name == info.name) else {
                return Status::INVALID_ARGUMENT;
            };
            if info.frame_size().ok() != Some(view.data.len()) {
                return Status::INVALID_ARGUMENT;
            }
            digest = fnv1a(digest, info.name.as_bytes());
            digest = fnv1a(digest, view.data);
        }

        if self.latency > pipeline.timeout {
            std::thread::sleep(pipeline.timeout);
            return Status::TIMEOUT;
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        for view in outputs.iter_mut() {
            fill_frame(fnv1a(digest, view.name.as_bytes()), view.data);
        }
        trace!(outputs = outputs.len(), "simulated frame complete");
        Status::SUCCESS
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

// splitmix64 stream seeded from the digest
fn fill_frame(seed: u64, out: &mut [u8]) {
    let mut state = seed;
    for chunk in out.chunks_mut(8) {
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
        chunk.copy_from_slice(&z.to_le_bytes()[..chunk.len()]);
    }
}
