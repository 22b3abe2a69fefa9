//! Backend registry for runtime selection.

use crate::backend::{
    Backend, BackendKind, BackendMetadata, LibraryBackend, ParallelBackend, SequentialBackend,
};
use crate::core::error::{ImgtransError, TransformError};
use indexmap::IndexMap;
use std::sync::Arc;

/// Factory function for creating backend instances.
///
/// Creation is fallible: the parallel backend needs a GPU adapter.
pub type BackendFactory = Arc<dyn Fn() -> Result<Box<dyn Backend>, TransformError> + Send + Sync>;

/// Registry entry containing metadata and factory.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Factory function to create instances.
    pub factory: BackendFactory,
    /// Metadata, registered up front so listing never initializes a device.
    pub metadata: BackendMetadata,
    /// Whether this backend may be selected.
    pub enabled: bool,
}

/// Registry for all available backends.
///
/// Replaces link-time substitution of backend implementations: the harness
/// receives a registry and a [`BackendKind`] and asks for an instance.
pub struct BackendRegistry {
    backends: IndexMap<BackendKind, RegistryEntry>,
}

impl BackendRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            backends: IndexMap::new(),
        }
    }

    /// Create a registry pre-populated with the built-in backends.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register(SequentialBackend::describe(), || Ok(Box::new(SequentialBackend::new())));
        registry.register(LibraryBackend::describe(), || Ok(Box::new(LibraryBackend::new())));
        registry.register(ParallelBackend::describe(), || {
            Ok(Box::new(ParallelBackend::new()?))
        });

        registry
    }

    /// Register a backend, replacing any previous entry of the same kind.
    pub fn register<F>(&mut self, metadata: BackendMetadata, factory: F)
    where
        F: Fn() -> Result<Box<dyn Backend>, TransformError> + Send + Sync + 'static,
    {
        let entry = RegistryEntry {
            factory: Arc::new(factory),
            metadata,
            enabled: true,
        };
        self.backends.insert(entry.metadata.kind, entry);
    }

    /// Create a new instance of a backend.
    pub fn create(&self, kind: BackendKind) -> Result<Box<dyn Backend>, ImgtransError> {
        let entry = self
            .backends
            .get(&kind)
            .filter(|e| e.enabled)
            .ok_or_else(|| ImgtransError::UnsupportedBackend(kind.to_string()))?;

        log::debug!("Creating {} backend", kind);
        Ok((entry.factory)()?)
    }

    /// Get metadata for a backend without creating an instance.
    pub fn get_metadata(&self, kind: BackendKind) -> Option<&BackendMetadata> {
        self.backends.get(&kind).map(|e| &e.metadata)
    }

    /// Check if a backend is registered.
    pub fn contains(&self, kind: BackendKind) -> bool {
        self.backends.contains_key(&kind)
    }

    /// Iterate over registered backends in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&BackendKind, &RegistryEntry)> {
        self.backends.iter()
    }

    /// Enable or disable a backend.
    pub fn set_enabled(&mut self, kind: BackendKind, enabled: bool) -> bool {
        if let Some(entry) = self.backends.get_mut(&kind) {
            entry.enabled = enabled;
            true
        } else {
            false
        }
    }

    /// Get the total number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
