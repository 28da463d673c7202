use std::fmt::Debug;
use std::path::Path;
use crate::stream::{Direction, StreamInfo, StreamParams};
use super::Status;

/// Stream parameters keyed by stream name, in declared stream order.
pub type NamedStreamParams = Vec<(String, StreamParams)>;

/// A borrowed, read-only view over one caller-supplied input frame.
#[derive(Debug, Clone, Copy)]
pub struct InputView<'a> {
    /// Name of the stream this buffer is bound to
    pub name: &'a str,
    /// Exactly one frame of input bytes
    pub data: &'a [u8],
}

/// A borrowed, writable view over one freshly allocated output frame.
#[derive(Debug)]
pub struct OutputView<'a> {
    /// Name of the stream this buffer is bound to
    pub name: &'a str,
    /// Exactly one frame worth of output bytes, zeroed before the call
    pub data: &'a mut [u8],
}

/// The contract every accelerator runtime must fulfil to be driven by the bridge.
///
/// The associated types mirror the objects the accelerator SDK hands out: an open
/// session (virtual device), a loaded artifact, the configuration parameters derived
/// from it, the configured network groups, and a bound inference pipeline.
///
/// Every fallible operation reports the runtime's raw [`Status`]; the bridge decides
/// which stage failed and how to surface it.
pub trait Accelerator: Debug + Send + Sync + 'static {
    /// An open accelerator session
    type Session: Send + Sync + 'static;
    /// A compiled model artifact loaded from disk
    type Artifact;
    /// Device configuration parameters derived from an artifact
    type ConfigureParams;
    /// One configured, schedulable network group
    type NetworkGroup: Send + Sync + 'static;
    /// A bound set of input/output streams
    type Pipeline: Send + 'static;

    /// Open exactly one accelerator session. No retries.
    fn open_session(&self) -> Result<Self::Session, Status>;

    /// Load a compiled artifact from `path`
    fn load_artifact(&self, path: &Path) -> Result<Self::Artifact, Status>;

    /// Derive the configuration parameters for `session` from a loaded artifact
    fn create_configure_params(
        &self,
        session: &Self::Session,
        artifact: &Self::Artifact,
    ) -> Result<Self::ConfigureParams, Status>;

    /// Configure the session, returning every network group the artifact produced
    fn configure(
        &self,
        session: &Self::Session,
        artifact: &Self::Artifact,
        params: Self::ConfigureParams,
    ) -> Result<Vec<Self::NetworkGroup>, Status>;

    /// Stream metadata declared by the network group, in declared order
    fn stream_infos(
        &self,
        network_group: &Self::NetworkGroup,
        direction: Direction,
    ) -> Result<Vec<StreamInfo>, Status>;

    /// Build per-stream parameters for every stream of `direction`, starting from `defaults`
    fn make_stream_params(
        &self,
        network_group: &Self::NetworkGroup,
        direction: Direction,
        defaults: StreamParams,
    ) -> Result<NamedStreamParams, Status>;

    /// Bind the input and output streams into a pipeline ready for inference
    fn create_pipeline(
        &self,
        network_group: &Self::NetworkGroup,
        inputs: &NamedStreamParams,
        outputs: &NamedStreamParams,
    ) -> Result<Self::Pipeline, Status>;

    /// Stream metadata as bound in the pipeline, in declared order
    fn pipeline_stream_infos(
        &self,
        pipeline: &Self::Pipeline,
        direction: Direction,
    ) -> Vec<StreamInfo>;

    /// Run `frames` frames of synchronous inference, blocking the calling thread.
    ///
    /// Output views are written in place. Anything other than [`Status::SUCCESS`]
    /// means the contents of `outputs` are unspecified.
    fn infer(
        &self,
        pipeline: &mut Self::Pipeline,
        inputs: &[InputView<'_>],
        outputs: &mut [OutputView<'_>],
        frames: usize,
    ) -> Status;
}
