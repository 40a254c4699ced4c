//! Server error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(#[from] strata_core::CoreError),

    #[error("segment error: {0}")]
    Segment(#[from] strata_segment::SegmentError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("garbage collector thread panicked")]
    CollectorPanicked,
}

impl ServerError {
    /// Returns a stable error code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::Io(_) => "IO_ERROR",
            ServerError::Core(e) => e.error_code(),
            ServerError::Segment(_) => "SEGMENT_ERROR",
            ServerError::Config(_) => "CONFIG_ERROR",
            ServerError::CollectorPanicked => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServerError::Io(_) => true,
            ServerError::Core(e) => e.is_retryable(),
            ServerError::Segment(e) => e.is_retryable(),
            ServerError::Config(_) | ServerError::CollectorPanicked => false,
        }
    }
}
