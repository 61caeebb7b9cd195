//! Service configuration, loadable from TOML.
use std::path::Path;
use std::time::Duration;

use scribe_ocr::decoder::DEFAULT_MAX_DIMENSION;
use scribe_ocr::DecoderLimits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Candidates scoring below this are dropped from results.
    pub confidence_threshold: f64,
    /// Requests allowed in the engine at once.
    pub max_in_flight: usize,
    /// Admitted requests allowed to wait for a slot.
    pub max_queued: usize,
    pub request_timeout_ms: u64,
    /// Share one engine call between concurrent requests with identical bytes.
    pub coalesce_duplicates: bool,
    /// Threads available for decoding and aggregation.
    pub worker_threads: usize,
    /// Extra attempts after a transient engine failure.
    pub engine_retries: usize,
    pub retry_backoff_ms: u64,
    /// Terminal requests nobody fetched are dropped after this long.
    pub result_ttl_ms: u64,
    pub max_image_width: u32,
    pub max_image_height: u32,
}

fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            max_in_flight: cpu_count(),
            max_queued: 256,
            request_timeout_ms: 30_000,
            coalesce_duplicates: false,
            worker_threads: cpu_count(),
            engine_retries: 2,
            retry_backoff_ms: 50,
            result_ttl_ms: 300_000,
            max_image_width: DEFAULT_MAX_DIMENSION,
            max_image_height: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl ServiceConfig {
    /// Reads a TOML file; missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within 0.0..=1.0, got {}",
                self.confidence_threshold
            )));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid("max_in_flight must be at least 1".into()));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid("worker_threads must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".into()));
        }
        if self.max_image_width == 0 || self.max_image_height == 0 {
            return Err(ConfigError::Invalid("image size limits must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_millis(self.result_ttl_ms)
    }

    pub fn decoder_limits(&self) -> DecoderLimits {
        DecoderLimits {
            max_width: self.max_image_width,
            max_height: self.max_image_height,
            ..DecoderLimits::default()
        }
    }
}
