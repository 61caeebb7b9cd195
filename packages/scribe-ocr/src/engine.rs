use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decoder::DecodedImage;
use crate::region::TextObservation;

/// Vision-style speed/accuracy trade-off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionLevel {
    Fast,
    #[default]
    Accurate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionOptions {
    pub level: RecognitionLevel,
    /// BCP 47 tags, in priority order. Empty lets the backend decide.
    pub languages: Vec<String>,
    pub language_correction: bool,
    /// Candidates requested per region, clamped to `1..=MAX_CANDIDATES`.
    pub max_candidates: usize,
}

pub const MAX_CANDIDATES: usize = 10;

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            level: RecognitionLevel::Accurate,
            languages: Vec::new(),
            language_correction: true,
            max_candidates: 3,
        }
    }
}

impl RecognitionOptions {
    pub fn candidate_limit(&self) -> usize {
        self.max_candidates.clamp(1, MAX_CANDIDATES)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("engine timed out")]
    Timeout,
    #[error("engine internal failure: {0}")]
    InternalFailure(String),
}

impl EngineError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Unavailable(_) | EngineError::Timeout)
    }
}

/// A recognition backend.
///
/// Implementations report regions in reading order; nothing downstream
/// re-sorts them.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recognize(
        &self,
        image: &DecodedImage,
        options: &RecognitionOptions,
    ) -> Result<Vec<TextObservation>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(EngineError::Unavailable("busy".into()).is_retryable());
        assert!(EngineError::Timeout.is_retryable());
        assert!(!EngineError::InternalFailure("bad model".into()).is_retryable());
    }

    #[test]
    fn candidate_limit_is_clamped() {
        let mut options = RecognitionOptions::default();
        options.max_candidates = 0;
        assert_eq!(options.candidate_limit(), 1);
        options.max_candidates = 64;
        assert_eq!(options.candidate_limit(), MAX_CANDIDATES);
    }
}
