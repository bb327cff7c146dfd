//! # Service Registry
//!
//! Typed lookup of the running services, filled once during startup and
//! cleared on shutdown.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               ServiceRegistry                │
//! │                                              │
//! │  TypeId(UserHalService)            ──→ Arc   │
//! │  TypeId(CarPowerManagementService) ──→ Arc   │
//! │  TypeId(PowerHalService)           ──→ Arc   │
//! │  TypeId(SimulatedVehicle)          ──→ Arc   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Everything else is constructor injection; the registry only serves the
//! runtime edges (binary, integration tests) that need a service by type.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Registry errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No service of the requested type was registered.
    #[error("Service not registered: {0}")]
    NotRegistered(&'static str),
}

struct Entry {
    name: &'static str,
    service: Arc<dyn Any + Send + Sync>,
}

/// Type-keyed store of shared services.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: RwLock<HashMap<TypeId, Entry>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service`, replacing an earlier one of the same type.
    pub fn register<T: Any + Send + Sync>(&self, service: Arc<T>) {
        let name = type_name::<T>();
        let previous = self
            .entries
            .write()
            .insert(TypeId::of::<T>(), Entry { name, service });
        if previous.is_some() {
            warn!(service = name, "Service replaced in registry");
        } else {
            debug!(service = name, "Service registered");
        }
    }

    /// The registered service of type `T`, if any.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let service = self
            .entries
            .read()
            .get(&TypeId::of::<T>())
            .map(|entry| Arc::clone(&entry.service))?;
        service.downcast::<T>().ok()
    }

    /// Like [`get`](Self::get), but missing services are an error.
    pub fn require<T: Any + Send + Sync>(&self) -> Result<Arc<T>, RegistryError> {
        self.get::<T>()
            .ok_or(RegistryError::NotRegistered(type_name::<T>()))
    }

    /// Names of the registered services, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.read().values().map(|e| e.name).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        let dropped = {
            let mut entries = self.entries.write();
            let count = entries.len();
            entries.clear();
            count
        };
        info!(dropped, "Service registry cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Radio(u32);
    struct Seat;

    #[test]
    fn test_get_by_type() {
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(Radio(98)));

        assert_eq!(registry.get::<Radio>().unwrap().0, 98);
        assert!(registry.get::<Seat>().is_none());
    }

    #[test]
    fn test_require_names_missing_type() {
        let registry = ServiceRegistry::new();
        let err = registry.require::<Seat>().err().unwrap();
        assert!(err.to_string().contains("Seat"));
    }

    #[test]
    fn test_register_replaces() {
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(Radio(1)));
        registry.register(Arc::new(Radio(2)));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.require::<Radio>().unwrap().0, 2);
    }

    #[test]
    fn test_clear_drops_services() {
        let registry = ServiceRegistry::new();
        let radio = Arc::new(Radio(7));
        registry.register(Arc::clone(&radio));
        registry.register(Arc::new(Seat));
        assert_eq!(registry.names().len(), 2);

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(Arc::strong_count(&radio), 1);
    }
}
