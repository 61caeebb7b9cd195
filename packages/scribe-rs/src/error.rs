use scribe_ocr::DecodeError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatcher::DispatcherError;
use crate::request::{FailureReason, RequestId, RequestState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("request {id} exceeded its deadline")]
    TimedOut { id: RequestId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Rejected(#[from] DispatcherError),
    #[error(transparent)]
    Internal(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request {0} is unknown or already reclaimed")]
    NotFound(RequestId),
    #[error("request {0} is not finished (state {1})")]
    NotReady(RequestId, RequestState),
    #[error("request failed: {0}")]
    Failed(FailureReason),
    #[error(transparent)]
    TimedOut(#[from] LifecycleError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelError {
    #[error("request {0} is unknown or already reclaimed")]
    NotFound(RequestId),
    #[error("request {0} already finished (state {1})")]
    AlreadyTerminal(RequestId, RequestState),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("the OCR service must be created inside a tokio runtime")]
    NoRuntime,
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
