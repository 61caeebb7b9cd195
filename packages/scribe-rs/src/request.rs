//! Per-request record and its state machine.
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use scribe_ocr::{DecodeError, DecodedImage, EngineError, OcrOutput};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// SHA-256 of the submitted bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(bytes));
        Self(digest)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", hex::encode(&self.0[..8]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestState {
    Received,
    Validating,
    Queued,
    Dispatched,
    Completed,
    Failed,
    TimedOut,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Failed | RequestState::TimedOut
        )
    }

    /// Edges of the lifecycle graph. Nothing leaves a terminal state.
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, Validating)
                | (Received, Failed)
                | (Validating, Queued)
                | (Validating, Failed)
                | (Queued, Dispatched)
                | (Queued, Failed)
                | (Queued, TimedOut)
                | (Dispatched, Completed)
                | (Dispatched, Failed)
                | (Dispatched, TimedOut)
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("request was cancelled")]
    Cancelled,
    #[error("internal failure: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} -> {to}")]
pub struct TransitionError {
    pub from: RequestState,
    pub to: RequestState,
}

/// Tracked state of one OCR job.
#[derive(Debug)]
pub struct Request {
    id: RequestId,
    fingerprint: Fingerprint,
    created_at: DateTime<Utc>,
    deadline: Instant,
    state: RequestState,
    result: Option<Arc<OcrOutput>>,
    failure: Option<FailureReason>,
    /// Held between validation and dispatch.
    pub(crate) image: Option<DecodedImage>,
    pub(crate) job: Option<AbortHandle>,
    pub(crate) watchdog: Option<AbortHandle>,
    pub(crate) settled_at: Option<Instant>,
    notify: watch::Sender<RequestState>,
}

impl Request {
    pub fn new(fingerprint: Fingerprint, deadline: Instant) -> Self {
        let (notify, _) = watch::channel(RequestState::Received);
        Self {
            id: RequestId::new(),
            fingerprint,
            created_at: Utc::now(),
            deadline,
            state: RequestState::Received,
            result: None,
            failure: None,
            image: None,
            job: None,
            watchdog: None,
            settled_at: None,
            notify,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn result(&self) -> Option<&Arc<OcrOutput>> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.notify.subscribe()
    }

    /// Moves along a non-terminal edge.
    pub fn advance(&mut self, next: RequestState) -> Result<(), TransitionError> {
        if next.is_terminal() {
            return Err(self.invalid(next));
        }
        self.transition(next)
    }

    pub fn complete(&mut self, output: Arc<OcrOutput>) -> Result<(), TransitionError> {
        self.transition(RequestState::Completed)?;
        self.result = Some(output);
        Ok(())
    }

    pub fn fail(&mut self, reason: FailureReason) -> Result<(), TransitionError> {
        self.transition(RequestState::Failed)?;
        self.failure = Some(reason);
        Ok(())
    }

    pub fn time_out(&mut self) -> Result<(), TransitionError> {
        self.transition(RequestState::TimedOut)
    }

    fn transition(&mut self, next: RequestState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(self.invalid(next));
        }
        self.state = next;
        if next.is_terminal() {
            self.image = None;
            self.settled_at = Some(Instant::now());
            if let Some(watchdog) = self.watchdog.take() {
                watchdog.abort();
            }
        }
        self.notify.send_replace(next);
        Ok(())
    }

    fn invalid(&self, to: RequestState) -> TransitionError {
        TransitionError {
            from: self.state,
            to,
        }
    }
}
