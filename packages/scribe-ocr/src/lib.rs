//! Recognition side of scribe: decode untrusted image bytes, hand the bitmap
//! to a pluggable OCR backend, and aggregate what it reports.

pub mod aggregate;
pub mod decoder;
pub mod engine;
pub mod mock;
pub mod port;
pub mod region;

#[cfg(target_os = "macos")]
pub mod apple;

pub use aggregate::{aggregate, OcrOutput};
pub use decoder::{decode, decode_with_limits, DecodeError, DecodedImage, DecoderLimits, PixelFormat};
pub use engine::{EngineError, RecognitionEngine, RecognitionLevel, RecognitionOptions};
pub use port::{EnginePort, PendingRecognition, Recognition};
pub use region::{BoundingBox, Candidate, ObservationError, TextObservation};

#[cfg(target_os = "macos")]
pub use apple::AppleVisionEngine;
