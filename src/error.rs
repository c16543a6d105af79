//! Error types for video background removal

use std::time::Duration;
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error taxonomy for the frame pipeline and its consumers
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Malformed or zero-size frame input
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Segmentation model failure or contract violation
    #[error("Inference error: {0}")]
    Inference(String),

    /// Video rejected by the pre-flight duration check
    #[error(
        "Video duration {:.2}s exceeds the maximum of {:.2}s",
        duration.as_secs_f64(),
        max.as_secs_f64()
    )]
    DurationExceeded {
        /// Duration computed from frame count and frame rate
        duration: Duration,
        /// Configured maximum
        max: Duration,
    },

    /// Malformed color code; recovered by defaulting to white
    #[error("Unsupported color: {0}")]
    UnsupportedColor(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Video source or sink failure
    #[error("Video error: {0}")]
    Video(String),

    /// Batch run aborted between frames
    #[error("Processing cancelled after {frames_processed} frame(s)")]
    Cancelled {
        /// Frames written before the cancellation was observed
        frames_processed: u64,
    },

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding or decoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new invalid frame error
    pub fn invalid_frame<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new unsupported color error
    pub fn unsupported_color<S: Into<String>>(color: S) -> Self {
        Self::UnsupportedColor(color.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new video source/sink error
    pub fn video<S: Into<String>>(msg: S) -> Self {
        Self::Video(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with the valid range spelled out
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Create inference error with the failing stage and model name
    pub fn inference_with_model(model: &str, stage: &str, error: &str) -> Self {
        Self::Inference(format!("{} failed for model '{}': {}", stage, model, error))
    }

    /// Whether this error is a policy rejection rather than a failure
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::DurationExceeded { .. })
    }

    /// Whether this error aborts only the current frame/request
    #[must_use]
    pub fn is_frame_error(&self) -> bool {
        matches!(self, Self::InvalidFrame(_) | Self::Inference(_))
    }
}
