//! Dedicated inference worker for hosts that must not block their own scheduler.
//!
//! Each [`InferenceWorker`] owns one OS thread that drains a bounded queue of
//! requests against a single pipeline, one at a time. Results travel back through
//! a oneshot channel wrapped in [`PendingInference`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use crate::backend::Accelerator;
use crate::config::WorkerConfig;
use crate::error::InferError;
use crate::infer::{InferRequest, InferResponse};
use crate::pipeline::InferencePipeline;

type InferResult = Result<InferResponse, InferError>;

/// Async inference seam for host adapters.
///
/// # Example
///
/// ```ignore
/// use hailo_bridge::AsyncInfer;
///
/// async fn classify<I: AsyncInfer>(infer: &I, frame: Vec<u8>) {
///     let mut inputs = std::collections::HashMap::new();
///     inputs.insert("in0".to_string(), frame);
///     let outputs = infer.run(inputs).await.unwrap();
///     println!("{:?}", outputs["out0"]);
/// }
/// ```
#[async_trait]
pub trait AsyncInfer {
    /// Submit one frame and wait for its outputs
    async fn run(&self, inputs: InferRequest) -> InferResult;
}

/// A request waiting for the worker, paired with the channel its result goes back on.
struct QueuedInference {
    inputs: InferRequest,
    sender: oneshot::Sender<InferResult>,
}

impl QueuedInference {
    fn new(inputs: InferRequest) -> (Self, PendingInference) {
        let (sender, receiver) = oneshot::channel();
        (Self { inputs, sender }, PendingInference::new(receiver))
    }

    fn complete(self, result: InferResult) {
        // The caller may have stopped waiting
        let _ = self.sender.send(result);
    }
}

/// The eventual result of a submitted inference call.
pub struct PendingInference {
    receiver: oneshot::Receiver<InferResult>,
}

impl PendingInference {
    fn new(receiver: oneshot::Receiver<InferResult>) -> Self {
        Self { receiver }
    }
}

impl Future for PendingInference {
    type Output = InferResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().receiver.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(InferError::WorkerGone)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Runs inference for one pipeline on a dedicated thread.
///
/// Dropping the worker shuts it down and joins its thread, waiting for the call
/// currently on the device to finish. Requests still queued at that point resolve
/// to [`InferError::WorkerGone`].
pub struct InferenceWorker<A: Accelerator> {
    pipeline: Arc<InferencePipeline<A>>,

    /// Becomes `None` once shutdown closes the queue
    sender: Option<mpsc::Sender<QueuedInference>>,

    /// Flag indicating whether queued work should still be executed
    running: Arc<AtomicBool>,

    handle: Option<JoinHandle<()>>,

    reject_when_busy: bool,
}

impl<A: Accelerator> InferenceWorker<A> {
    /// Start a worker thread for `pipeline`.
    ///
    /// # Parameters
    ///
    /// * `pipeline` - The pipeline every queued request runs against. The worker
    ///   keeps it alive until the thread has been joined.
    /// * `config` - Queue capacity and whether a full queue rejects or waits.
    ///
    /// # Returns
    ///
    /// A running worker, or the OS error if the thread could not be spawned.
    pub fn spawn(pipeline: Arc<InferencePipeline<A>>, config: &WorkerConfig) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));

        let handle = thread::Builder::new()
            .name("hailo-infer".to_string())
            .spawn({
                let pipeline = pipeline.clone();
                let running = running.clone();
                move || worker_loop(pipeline, running, receiver)
            })?;

        Ok(Self {
            pipeline,
            sender: Some(sender),
            running,
            handle: Some(handle),
            reject_when_busy: config.reject_when_busy,
        })
    }

    /// Queue a request without waiting.
    ///
    /// When the queue is full this fails with [`InferError::Busy`] if the worker
    /// rejects when busy; otherwise use [`InferenceWorker::submit_async`] to wait
    /// for room.
    pub fn submit(&self, inputs: InferRequest) -> Result<PendingInference, InferError> {
        let sender = self.sender.as_ref().ok_or(InferError::WorkerGone)?;
        let (item, pending) = QueuedInference::new(inputs);
        match sender.try_send(item) {
            Ok(()) => Ok(pending),
            Err(TrySendError::Full(_)) => Err(InferError::Busy),
            Err(TrySendError::Closed(_)) => Err(InferError::WorkerGone),
        }
    }

    /// Queue a request, waiting for room unless the worker rejects when busy.
    pub async fn submit_async(&self, inputs: InferRequest) -> Result<PendingInference, InferError> {
        if self.reject_when_busy {
            return self.submit(inputs);
        }
        let sender = self.sender.as_ref().ok_or(InferError::WorkerGone)?;
        let (item, pending) = QueuedInference::new(inputs);
        sender.send(item).await.map_err(|_| InferError::WorkerGone)?;
        Ok(pending)
    }

    /// The pipeline this worker drives
    pub fn pipeline(&self) -> &Arc<InferencePipeline<A>> {
        &self.pipeline
    }

    /// Whether queued requests will still be executed
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop accepting work and fail anything still queued.
    ///
    /// Returns immediately; the thread is joined on drop.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.sender.take();
    }
}

#[async_trait]
impl<A: Accelerator> AsyncInfer for InferenceWorker<A> {
    async fn run(&self, inputs: InferRequest) -> InferResult {
        self.submit_async(inputs).await?.await
    }
}

impl<A: Accelerator> Drop for InferenceWorker<A> {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("inference worker thread panicked");
            }
        }
    }
}

fn worker_loop<A: Accelerator>(
    pipeline: Arc<InferencePipeline<A>>,
    running: Arc<AtomicBool>,
    mut receiver: mpsc::Receiver<QueuedInference>,
) {
    debug!("inference worker started");
    while let Some(item) = receiver.blocking_recv() {
        if !running.load(Ordering::SeqCst) {
            item.complete(Err(InferError::WorkerGone));
            continue;
        }
        let result = pipeline.infer(&item.inputs);
        item.complete(result);
    }
    debug!("inference worker stopped");
}
