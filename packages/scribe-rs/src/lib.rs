//! # scribe-rs
//!
//! A concurrent OCR request service: submit encoded image bytes, get back
//! structured recognized text, with bounded memory under load.
//!
//! ## Features
//!
//! - **Input Validation**: Bytes are decoded and normalized before any engine work; malformed input fails only its own request
//! - **Bounded Dispatch**: At most `max_in_flight` requests reach the engine, a bounded FIFO holds the rest, and overflow is rejected
//! - **Deadlines**: Every request times out on schedule even if the engine never answers
//! - **Cancellation**: Queued or running requests can be cancelled; late engine results are discarded
//! - **Single-flight**: Optional coalescing of concurrent requests carrying identical bytes
//! - **Pluggable Engines**: Apple Vision on macOS, or any [`RecognitionEngine`](scribe_ocr::RecognitionEngine)
//!
//! ## Quick Start
//!
//! ```ignore
//! use scribe_rs::prelude::*;
//!
//! let service = OcrService::new(ServiceConfig::default(), platform_engine()?)?;
//! let submission = service.submit(std::fs::read("scan.png")?, SubmitOptions::default()).await?;
//! service.wait(submission.id).await?;
//! let output = service.fetch_result(submission.id)?;
//! println!("{}", output.text);
//! ```

use std::sync::Arc;

use scribe_ocr::RecognitionEngine;

pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod inputs;
pub mod logging;
pub mod pool;
pub mod request;
pub mod service;

// Re-export commonly used types at the root level
pub use config::{ConfigError, ServiceConfig};
pub use dispatcher::{Admission, Dispatcher, DispatcherError};
pub use error::{CancelError, FetchError, LifecycleError, ServiceError, SubmitError};
pub use inputs::{collect_images, InputError};
pub use pool::WorkerPool;
pub use request::{FailureReason, Fingerprint, Request, RequestId, RequestState};
pub use service::{OcrService, ServiceStats, SubmitOptions, Submission};

/// The native recognition backend for this platform, if there is one.
pub fn platform_engine() -> anyhow::Result<Arc<dyn RecognitionEngine>> {
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(scribe_ocr::AppleVisionEngine::new()))
    }
    #[cfg(not(target_os = "macos"))]
    {
        anyhow::bail!("no recognition backend is available on this platform")
    }
}

/// Prelude module for convenient imports
///
/// Import everything you need with:
/// ```ignore
/// use scribe_rs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        platform_engine, Admission, CancelError, FailureReason, FetchError, OcrService, RequestId, RequestState,
        ServiceConfig, SubmitError, SubmitOptions, Submission,
    };
    pub use scribe_ocr::{OcrOutput, RecognitionLevel, RecognitionOptions, TextObservation};
}
