//! Core types for imgtrans.
//!
//! This module contains the pieces every backend shares:
//! - The packed pixel buffer and channel accessors
//! - The transform contract (transform names, parameters, output status)
//! - Error types
//! - Image decode/encode
//! - GPU device plumbing used by the parallel backend

pub mod error;
pub mod gpu;
pub mod io;
pub mod pixel;
pub mod transform;

// Re-export commonly used types
pub use error::{GpuError, ImgtransError, ImgtransResult, TransformError, TransformResult};
pub use pixel::{pack, unpack, Channel, PixelBuffer};
pub use transform::{BlurArea, Status, Surface, Transform, TransformKind, TransformOutput, NOT_MEASURED};
