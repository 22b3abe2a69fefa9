//! Interchangeable execution strategies for the transforms.
//!
//! Every backend implements the same [`Backend`] contract; which one runs is
//! decided at runtime from a [`BackendKind`] tag looked up in the
//! [`BackendRegistry`].

pub mod library;
pub mod parallel;
pub mod registry;
pub mod sequential;

pub use library::LibraryBackend;
pub use parallel::ParallelBackend;
pub use registry::{BackendFactory, BackendRegistry, RegistryEntry};
pub use sequential::SequentialBackend;

use crate::core::error::{ImgtransError, TransformError};
use crate::core::transform::{BlurArea, Surface, Transform, TransformKind, TransformOutput};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag identifying a backend implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Plain loops over the pixel buffer.
    Sequential,
    /// Image-library primitives on the image handle.
    Library,
    /// GPU compute kernels.
    Parallel,
}

impl BackendKind {
    /// All backends in display order.
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Sequential,
        BackendKind::Library,
        BackendKind::Parallel,
    ];

    /// Command-line name of the backend.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Sequential => "sequential",
            BackendKind::Library => "library",
            BackendKind::Parallel => "parallel",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = ImgtransError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ImgtransError::UnsupportedBackend(s.to_string()))
    }
}

/// Static description of a backend, available without instantiating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendMetadata {
    /// Backend tag.
    pub kind: BackendKind,
    /// One-line human-readable summary.
    pub description: String,
    /// Transforms that produce a result on this backend.
    pub implements: Vec<TransformKind>,
}

impl BackendMetadata {
    /// Create metadata for a backend implementing every transform.
    pub fn new(kind: BackendKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            implements: TransformKind::ALL.to_vec(),
        }
    }

    /// Mark a transform as returning no result on this backend.
    pub fn without(mut self, transform: TransformKind) -> Self {
        self.implements.retain(|t| *t != transform);
        self
    }

    /// Whether `transform` produces a result on this backend.
    pub fn implements(&self, transform: TransformKind) -> bool {
        self.implements.contains(&transform)
    }
}

/// The transform contract.
///
/// Each method mutates the surface in place and reports where the output
/// lives. A method that returns [`Status::NoResult`](crate::core::transform::Status::NoResult)
/// or an error must leave the surface exactly as it found it.
pub trait Backend: Send + Sync {
    /// Get backend metadata.
    fn metadata(&self) -> BackendMetadata;

    /// Exchange green and blue: `(r,g,b,a) -> (r,b,g,a)`.
    fn swap(&self, surface: &mut Surface) -> Result<TransformOutput, TransformError>;

    /// Replace colour channels with `floor(0.21r + 0.72g + 0.07b)`, keeping alpha.
    fn gray(&self, surface: &mut Surface) -> Result<TransformOutput, TransformError>;

    /// Average every channel over an `area x area` neighborhood.
    fn blur(&self, surface: &mut Surface, area: BlurArea) -> Result<TransformOutput, TransformError>;

    /// Relief effect: diagonal difference biased to mid-gray.
    fn emboss(&self, surface: &mut Surface) -> Result<TransformOutput, TransformError>;

    /// Dispatch a transform to the matching method.
    fn apply(&self, transform: Transform, surface: &mut Surface) -> Result<TransformOutput, TransformError> {
        match transform {
            Transform::Swap => self.swap(surface),
            Transform::Gray => self.gray(surface),
            Transform::Blur { area } => self.blur(surface, area),
            Transform::Emboss => self.emboss(surface),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
        assert!(matches!(
            "cuda".parse::<BackendKind>(),
            Err(ImgtransError::UnsupportedBackend(name)) if name == "cuda"
        ));
    }

    #[test]
    fn test_metadata_without() {
        let metadata = BackendMetadata::new(BackendKind::Library, "test").without(TransformKind::Emboss);
        assert!(metadata.implements(TransformKind::Blur));
        assert!(!metadata.implements(TransformKind::Emboss));
        assert_eq!(metadata.implements.len(), 3);
    }
}
