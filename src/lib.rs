//! # imgtrans - Image Transforms on Interchangeable Backends
//!
//! imgtrans applies a small set of per-pixel and neighborhood transforms to an
//! image and times them, with one contract implemented by several backends.
//!
//! ## Features
//!
//! - **Four transforms**: channel swap, grayscale, box blur, emboss
//! - **Three backends**: plain sequential loops, `image`/`imageproc`
//!   primitives, and wgpu compute kernels
//! - **Runtime selection**: backends are looked up by tag in a registry
//! - **Dual timing**: harness wall clock plus device time where available
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use imgtrans::prelude::*;
//!
//! let mut harness = Harness::new();
//! let report = harness.run(&RunRequest {
//!     transform: Transform::from_request("blur", Some(5))?,
//!     backend: BackendKind::Sequential,
//!     input: "input.png".into(),
//!     output: "output.png".into(),
//! })?;
//! println!("{}", report);
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: pixel packing, the transform contract, errors, image I/O, GPU plumbing
//! - [`backend`]: the [`Backend`](backend::Backend) trait, its implementations and the registry
//! - [`execution`]: the benchmark harness and stage progress

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod core;
pub mod execution;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use imgtrans::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::pixel::{pack, unpack, unpack_all, Channel, PixelBuffer};
    pub use crate::core::transform::{
        BlurArea, Status, Surface, Transform, TransformKind, TransformOutput, NOT_MEASURED,
    };

    // Errors
    pub use crate::core::error::{
        GpuError, ImgtransError, ImgtransResult, TransformError, TransformResult,
    };

    // Backends
    pub use crate::backend::{
        Backend, BackendKind, BackendMetadata, BackendRegistry, LibraryBackend, ParallelBackend,
        SequentialBackend,
    };

    // Execution
    pub use crate::execution::harness::{BenchmarkReport, Harness, Measurement, RunRequest};
    pub use crate::execution::progress::{ProgressCallback, ProgressTracker, Stage, StageUpdate};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "imgtrans");
    }

    #[test]
    fn test_registry_with_builtins() {
        let registry = BackendRegistry::with_builtins();

        for kind in BackendKind::ALL {
            assert!(registry.contains(kind));
        }
    }

    #[test]
    fn test_every_cpu_backend_runs_every_implemented_transform() {
        let registry = BackendRegistry::with_builtins();

        for kind in [BackendKind::Sequential, BackendKind::Library] {
            let backend = registry.create(kind).unwrap();
            for transform in [
                Transform::Swap,
                Transform::Gray,
                Transform::Blur { area: BlurArea::DEFAULT },
                Transform::Emboss,
            ] {
                let mut surface = Surface::from_pixels(PixelBuffer::new(4, 4));
                let output = backend.apply(transform, &mut surface).unwrap();
                assert_eq!(
                    output.has_result(),
                    backend.metadata().implements(transform.kind()),
                    "{} on {}",
                    transform,
                    kind
                );
            }
        }
    }
}
