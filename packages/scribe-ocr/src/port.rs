//! Fire-and-await wrapper around a [`RecognitionEngine`].
//!
//! Each invocation owns a oneshot channel, so a caller sees exactly one
//! completion per call even when the backend misbehaves.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::decoder::DecodedImage;
use crate::engine::{EngineError, RecognitionEngine, RecognitionOptions};
use crate::region::TextObservation;

pub type Recognition = Result<Vec<TextObservation>, EngineError>;

#[derive(Clone)]
pub struct EnginePort {
    engine: Arc<dyn RecognitionEngine>,
}

impl EnginePort {
    pub fn new(engine: Arc<dyn RecognitionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Starts a recognition job and returns without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn invoke(&self, image: Arc<DecodedImage>, options: RecognitionOptions) -> PendingRecognition {
        let (tx, rx) = oneshot::channel();
        let engine = Arc::clone(&self.engine);
        let task = tokio::spawn(async move {
            let outcome = engine.recognize(&image, &options).await;
            if tx.send(outcome).is_err() {
                debug!(engine = engine.name(), "recognition finished after caller gave up");
            }
        });
        PendingRecognition {
            rx,
            abort: task.abort_handle(),
            engine: self.engine.name(),
        }
    }
}

/// Single-resolution handle for one engine invocation.
///
/// Dropping it (or calling [`abandon`](Self::abandon)) aborts the backend
/// task on a best-effort basis; a result produced afterwards is discarded.
pub struct PendingRecognition {
    rx: oneshot::Receiver<Recognition>,
    abort: AbortHandle,
    engine: &'static str,
}

impl PendingRecognition {
    pub fn abandon(self) {
        // Drop does the work.
    }
}

impl Future for PendingRecognition {
    type Output = Recognition;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let engine = self.engine;
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                warn!(engine, "recognition task ended without reporting");
                Err(EngineError::InternalFailure(
                    "recognition task ended without reporting".into(),
                ))
            })
        })
    }
}

impl Drop for PendingRecognition {
    fn drop(&mut self) {
        self.abort.abort();
    }
}
