//! Error types for background removal operations
//!
//! Every failure in the pipeline is terminal for its call and carries exactly one
//! [`ErrorKind`] tag plus a human-readable cause message.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Short category tag surfaced to callers alongside the cause message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    UnsupportedEnvironment,
    ModelUnavailable,
    InvalidSource,
    BufferAllocationFailed,
    InferenceFailed,
    MaskConstructionFailed,
    EncodingFailed,
    WriteFailed,
    InvalidConfig,
    Internal,
}

impl ErrorKind {
    /// Stable tag name, e.g. `"ModelUnavailable"`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedEnvironment => "UnsupportedEnvironment",
            Self::ModelUnavailable => "ModelUnavailable",
            Self::InvalidSource => "InvalidSource",
            Self::BufferAllocationFailed => "BufferAllocationFailed",
            Self::InferenceFailed => "InferenceFailed",
            Self::MaskConstructionFailed => "MaskConstructionFailed",
            Self::EncodingFailed => "EncodingFailed",
            Self::WriteFailed => "WriteFailed",
            Self::InvalidConfig => "InvalidConfig",
            Self::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for background removal operations
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// The execution context cannot run the model at all
    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// Model asset missing, corrupted or failed to initialize
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Input location unparseable, unreadable or undecodable
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Normalized pixel buffer could not be created
    #[error("Buffer allocation failed: {0}")]
    BufferAllocationFailed(String),

    /// The forward pass failed
    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// Raw model output could not be turned into a mask image
    #[error("Mask construction failed: {0}")]
    MaskConstructionFailed(String),

    /// Output image could not be encoded
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// Output could not be persisted
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected condition such as a panicked pipeline task
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Category tag of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedEnvironment(_) => ErrorKind::UnsupportedEnvironment,
            Self::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            Self::InvalidSource(_) => ErrorKind::InvalidSource,
            Self::BufferAllocationFailed(_) => ErrorKind::BufferAllocationFailed,
            Self::InferenceFailed(_) => ErrorKind::InferenceFailed,
            Self::MaskConstructionFailed(_) => ErrorKind::MaskConstructionFailed,
            Self::EncodingFailed(_) => ErrorKind::EncodingFailed,
            Self::WriteFailed(_) => ErrorKind::WriteFailed,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Underlying cause description without the category prefix
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::UnsupportedEnvironment(msg)
            | Self::ModelUnavailable(msg)
            | Self::InvalidSource(msg)
            | Self::BufferAllocationFailed(msg)
            | Self::InferenceFailed(msg)
            | Self::MaskConstructionFailed(msg)
            | Self::EncodingFailed(msg)
            | Self::WriteFailed(msg)
            | Self::InvalidConfig(msg)
            | Self::Internal(msg) => msg,
        }
    }

    pub fn unsupported_environment<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedEnvironment(msg.into())
    }

    pub fn model_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    pub fn invalid_source<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSource(msg.into())
    }

    pub fn buffer_allocation<S: Into<String>>(msg: S) -> Self {
        Self::BufferAllocationFailed(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceFailed(msg.into())
    }

    pub fn mask_construction<S: Into<String>>(msg: S) -> Self {
        Self::MaskConstructionFailed(msg.into())
    }

    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        Self::EncodingFailed(msg.into())
    }

    pub fn write_failed<S: Into<String>>(msg: S) -> Self {
        Self::WriteFailed(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    // Contextual constructors

    /// Source read error with path context
    pub fn source_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::InvalidSource(format!(
            "Failed to {} '{}': {}",
            operation,
            path.as_ref().display(),
            error
        ))
    }

    /// Output write error with path context
    pub fn write_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::WriteFailed(format!(
            "Failed to {} '{}': {}",
            operation,
            path.as_ref().display(),
            error
        ))
    }

    /// Model error with path context and troubleshooting suggestions
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::ModelUnavailable(format!(
            "Failed to {} model '{}': {}.{}",
            operation,
            model_path.as_ref().display(),
            error,
            suggestion_text
        ))
    }

    /// Configuration error with the valid range
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
}
