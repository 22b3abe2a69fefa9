//! Error types for imgtrans.
//!
//! Uses thiserror for structured errors with context. The taxonomy follows the
//! stages of a run:
//! - Usage errors are raised before any image work begins
//! - Decode/encode errors carry the offending path
//! - Transform errors come from a backend (bad parameter, GPU failure)
//!
//! Every error is fatal to the run; nothing is retried.

use crate::backend::BackendKind;
use crate::core::transform::TransformKind;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for imgtrans.
#[derive(Error, Debug)]
pub enum ImgtransError {
    /// Malformed command-line arguments.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The input file could not be read or decoded.
    #[error("Unable to load image {}: {source}", path.display())]
    Decode {
        /// File that failed to decode.
        path: PathBuf,
        /// Underlying image error.
        #[source]
        source: image::ImageError,
    },

    /// The transform name is not known.
    #[error("Unsupported transformation: {0}")]
    UnsupportedTransform(String),

    /// The backend name is not known or the backend is disabled.
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// The backend ran but produced no result for the transform.
    #[error("Transformation '{transform}' returned no result on the {backend} backend")]
    Unimplemented {
        /// Transform that was requested.
        transform: TransformKind,
        /// Backend that returned no result.
        backend: BackendKind,
    },

    /// The output file could not be encoded or written.
    #[error("Unable to write image {}: {source}", path.display())]
    Encode {
        /// File that failed to write.
        path: PathBuf,
        /// Underlying image error.
        #[source]
        source: image::ImageError,
    },

    /// A backend failed while running the transform.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// The report could not be serialized.
    #[error("Report serialization failed: {0}")]
    Report(#[from] serde_json::Error),
}

/// Errors raised by a backend while running a transform.
#[derive(Error, Debug)]
pub enum TransformError {
    /// A transform parameter is out of range.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A pixel buffer length disagrees with its dimensions.
    #[error("Buffer of {len} pixels does not match {width}x{height}")]
    DimensionMismatch {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
        /// Actual number of pixels.
        len: usize,
    },

    /// The GPU failed.
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

/// GPU-related errors.
#[derive(Error, Debug, Clone)]
pub enum GpuError {
    /// No adapter was found.
    #[error("GPU not available")]
    NotAvailable,

    /// The adapter was found but the device could not be created.
    #[error("GPU device initialization failed: {0}")]
    DeviceInit(String),

    /// A buffer would exceed the device binding limit.
    #[error("Buffer of {required} bytes exceeds the device limit of {limit} bytes")]
    BufferTooLarge {
        /// Bytes the buffer needs.
        required: u64,
        /// Bytes the device allows.
        limit: u64,
    },

    /// Validation or readback failed while running a kernel.
    #[error("GPU execution failed: {0}")]
    Execution(String),
}

// ============================================================================
// Error Utilities
// ============================================================================

impl ImgtransError {
    /// Whether this error stems from malformed arguments.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            ImgtransError::Usage(_)
                | ImgtransError::Transform(TransformError::InvalidParameter { .. })
        )
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        if self.is_usage() {
            2
        } else {
            1
        }
    }
}

/// Result type alias for backend operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type alias for harness operations.
pub type ImgtransResult<T> = Result<T, ImgtransError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ImgtransError::Usage("missing input".to_string()).exit_code(), 2);
        assert_eq!(ImgtransError::UnsupportedTransform("sepia".to_string()).exit_code(), 1);

        let invalid = ImgtransError::from(TransformError::InvalidParameter {
            name: "area",
            reason: "must be odd".to_string(),
        });
        assert!(invalid.is_usage());
        assert_eq!(invalid.exit_code(), 2);
    }

    #[test]
    fn test_unsupported_and_unimplemented_messages_differ() {
        let unsupported = ImgtransError::UnsupportedTransform("sepia".to_string());
        let unimplemented = ImgtransError::Unimplemented {
            transform: TransformKind::Emboss,
            backend: BackendKind::Library,
        };

        assert_eq!(unsupported.to_string(), "Unsupported transformation: sepia");
        assert_eq!(
            unimplemented.to_string(),
            "Transformation 'emboss' returned no result on the library backend"
        );
    }

    #[test]
    fn test_gpu_error_converts() {
        let err: TransformError = GpuError::NotAvailable.into();
        assert_eq!(err.to_string(), "GPU error: GPU not available");
    }
}
