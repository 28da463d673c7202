//! # Inference Call Executor
//!
//! One call moves through a fixed sequence of states:
//!
//! ```text
//! Idle → Validating → Bound → Executing → Completed
//!            │          │         │
//!            └──────────┴─────────┴────→ Failed
//! ```
//!
//! A call either succeeds completely or reports exactly one failure; partially
//! written output buffers never escape.

use std::collections::HashMap;
use std::fmt;
use tracing::{trace, warn};
use crate::backend::{Accelerator, InputView, OutputView};
use crate::config::InputPolicy;
use crate::error::InferError;
use crate::pipeline::InferencePipeline;
use crate::stream::FRAMES_PER_CALL;

/// Caller-supplied input frames keyed by stream name
pub type InferRequest = HashMap<String, Vec<u8>>;

/// Output frames keyed by stream name, freshly allocated for every call
pub type InferResponse = HashMap<String, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallState {
    Idle,
    Validating,
    Bound,
    Executing,
    Completed,
    Failed,
}

struct Call {
    state: CallState,
}

impl Call {
    fn new() -> Self {
        Self { state: CallState::Idle }
    }

    fn advance(&mut self, next: CallState) {
        trace!(from = ?self.state, to = ?next, "inference call");
        self.state = next;
    }

    fn fail<E: fmt::Display>(&mut self, err: E) -> E {
        warn!(state = ?self.state, error = %err, "inference call failed");
        self.advance(CallState::Failed);
        err
    }
}

pub(crate) fn execute<A, B>(
    pipeline: &InferencePipeline<A>,
    inputs: &HashMap<String, B>,
) -> Result<InferResponse, InferError>
where
    A: Accelerator,
    B: AsRef<[u8]>,
{
    execute_with(
        pipeline,
        |name| Ok(inputs.get(name).map(|data| data.as_ref())),
        inputs.keys().map(String::as_str),
    )
}

/// Run one call, resolving each declared input through `lookup`.
///
/// # Parameters
///
/// * `lookup` - Returns the frame supplied for a stream name, `None` when the caller
///   supplied nothing under that name, or an error when the supplied value is unusable.
///   It is consulted once per declared input, in declared order, so the first
///   offending stream decides the error.
/// * `names` - Every name the caller supplied, checked against the pipeline's
///   [`InputPolicy`] once all declared inputs have been resolved.
pub(crate) fn execute_with<'a, 'n, A, E, F, N>(
    pipeline: &'a InferencePipeline<A>,
    lookup: F,
    names: N,
) -> Result<InferResponse, E>
where
    A: Accelerator,
    E: From<InferError> + fmt::Display,
    F: FnMut(&str) -> Result<Option<&'a [u8]>, E>,
    N: IntoIterator<Item = &'n str>,
{
    let mut call = Call::new();

    call.advance(CallState::Validating);
    let input_views = validate(pipeline, lookup, names).map_err(|e| call.fail(e))?;

    call.advance(CallState::Bound);
    let mut buffers: Vec<Vec<u8>> = pipeline
        .outputs()
        .iter()
        .map(|desc| vec![0u8; desc.frame_size * FRAMES_PER_CALL])
        .collect();
    let mut output_views: Vec<OutputView<'_>> = pipeline
        .outputs()
        .iter()
        .zip(buffers.iter_mut())
        .map(|(desc, buffer)| OutputView {
            name: desc.name.as_str(),
            data: buffer.as_mut_slice(),
        })
        .collect();

    call.advance(CallState::Executing);
    let status = {
        let mut guard = pipeline.lock();
        pipeline
            .accelerator()
            .infer(&mut guard, &input_views, &mut output_views, FRAMES_PER_CALL)
    };
    drop(output_views);

    if !status.is_success() {
        return Err(call.fail(InferError::DeviceFailure(status)).into());
    }

    call.advance(CallState::Completed);
    Ok(pipeline
        .outputs()
        .iter()
        .map(|desc| desc.name.clone())
        .zip(buffers)
        .collect())
}

/// Check every declared input in order (missing, unusable, wrong size) and borrow
/// views over the buffers.
fn validate<'a, 'n, A, E, F, N>(
    pipeline: &'a InferencePipeline<A>,
    mut lookup: F,
    names: N,
) -> Result<Vec<InputView<'a>>, E>
where
    A: Accelerator,
    E: From<InferError>,
    F: FnMut(&str) -> Result<Option<&'a [u8]>, E>,
    N: IntoIterator<Item = &'n str>,
{
    let declared = pipeline.inputs();
    let mut views = Vec::with_capacity(declared.len());

    for desc in declared.iter() {
        let data = lookup(desc.name.as_str())?.ok_or_else(|| InferError::MissingInput(desc.name.clone()))?;
        let expected = desc.frame_size * FRAMES_PER_CALL;
        if data.len() != expected {
            return Err(InferError::SizeMismatch {
                name: desc.name.clone(),
                expected,
                got: data.len(),
            }
            .into());
        }
        views.push(InputView {
            name: desc.name.as_str(),
            data,
        });
    }

    if pipeline.input_policy() == InputPolicy::Strict {
        if let Some(unknown) = names.into_iter().find(|name| !declared.contains(name)) {
            return Err(InferError::UnknownInput(unknown.to_string()).into());
        }
    }

    Ok(views)
}
