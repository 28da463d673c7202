use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use crate::backend::Accelerator;
use crate::config::InputPolicy;
use crate::error::{InferError, PipelineError, QueryError};
use crate::infer::{execute, InferResponse};
use crate::network_group::NetworkGroupHandle;
use crate::stream::{Direction, StreamDescriptor, StreamParams, StreamTable};

/// A bound set of input/output streams ready to run inference.
///
/// Holds a strong reference to the [`NetworkGroupHandle`] it was built from. The
/// accelerator pipeline sits behind a mutex, so at most one inference call is ever
/// in flight on a given pipeline.
pub struct InferencePipeline<A: Accelerator> {
    // Dropped first, before the network group it was bound against.
    pipeline: Mutex<A::Pipeline>,
    inputs: StreamTable,
    outputs: StreamTable,
    input_policy: InputPolicy,
    network_group: NetworkGroupHandle<A>,
}

impl<A: Accelerator> InferencePipeline<A> {
    /// Bind the network group's streams with default parameters.
    ///
    /// A failed build leaves `network_group` untouched and reusable.
    ///
    /// # Parameters
    ///
    /// * `network_group` - The network group whose streams are bound. The pipeline
    ///   holds a clone of it.
    ///
    /// # Returns
    ///
    /// A pipeline with its stream tables resolved, or a [`PipelineError`] for the
    /// step that failed.
    pub fn build(network_group: &NetworkGroupHandle<A>) -> Result<Self, PipelineError> {
        let accelerator = network_group.accelerator();
        let raw = network_group.raw();

        let input_params = accelerator
            .make_stream_params(raw, Direction::Input, StreamParams::default())
            .map_err(|status| {
                warn!(%status, "failed to create input stream params");
                PipelineError::InputParams(status)
            })?;
        let output_params = accelerator
            .make_stream_params(raw, Direction::Output, StreamParams::default())
            .map_err(|status| {
                warn!(%status, "failed to create output stream params");
                PipelineError::OutputParams(status)
            })?;

        let pipeline = accelerator
            .create_pipeline(raw, &input_params, &output_params)
            .map_err(|status| {
                warn!(%status, "failed to create inference pipeline");
                PipelineError::Create(status)
            })?;

        // Names resolve to descriptors once here, not on every call
        let inputs = StreamTable::from_infos(&accelerator.pipeline_stream_infos(&pipeline, Direction::Input))?;
        let outputs = StreamTable::from_infos(&accelerator.pipeline_stream_infos(&pipeline, Direction::Output))?;
        debug!(inputs = inputs.len(), outputs = outputs.len(), "built inference pipeline");

        Ok(Self {
            pipeline: Mutex::new(pipeline),
            inputs,
            outputs,
            input_policy: InputPolicy::default(),
            network_group: network_group.clone(),
        })
    }

    /// Choose how caller-supplied names that match no input stream are treated
    pub fn with_input_policy(mut self, policy: InputPolicy) -> Self {
        self.input_policy = policy;
        self
    }

    /// The policy applied to caller-supplied names that match no input stream
    pub fn input_policy(&self) -> InputPolicy {
        self.input_policy
    }

    /// Input streams as bound into this pipeline.
    ///
    /// Resolved once at build time, so this never fails.
    pub fn input_stream_descriptors(&self) -> Result<Vec<StreamDescriptor>, QueryError> {
        Ok(self.inputs.descriptors().to_vec())
    }

    /// Output streams as bound into this pipeline
    pub fn output_stream_descriptors(&self) -> Result<Vec<StreamDescriptor>, QueryError> {
        Ok(self.outputs.descriptors().to_vec())
    }

    /// Run one frame of synchronous inference.
    ///
    /// Blocks the calling thread until the accelerator finishes or fails. Concurrent
    /// callers on the same pipeline are serialized.
    ///
    /// # Parameters
    ///
    /// * `inputs` - One frame per declared input stream, keyed by stream name. Each
    ///   must be exactly the stream's frame size.
    ///
    /// # Returns
    ///
    /// A freshly allocated frame for every output stream, or the first validation or
    /// device failure.
    pub fn infer<B>(&self, inputs: &HashMap<String, B>) -> Result<InferResponse, InferError>
    where
        B: AsRef<[u8]>,
    {
        execute(self, inputs)
    }

    /// The network group this pipeline keeps alive
    pub fn network_group(&self) -> &NetworkGroupHandle<A> {
        &self.network_group
    }

    pub(crate) fn inputs(&self) -> &StreamTable {
        &self.inputs
    }

    pub(crate) fn outputs(&self) -> &StreamTable {
        &self.outputs
    }

    pub(crate) fn accelerator(&self) -> &A {
        self.network_group.accelerator()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, A::Pipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A: Accelerator> fmt::Debug for InferencePipeline<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferencePipeline")
            .field("inputs", &self.inputs.descriptors())
            .field("outputs", &self.outputs.descriptors())
            .field("input_policy", &self.input_policy)
            .field("network_group", &self.network_group)
            .finish()
    }
}

impl<A: Accelerator> Drop for InferencePipeline<A> {
    fn drop(&mut self) {
        debug!("releasing inference pipeline");
    }
}
