//! Running sidecar services.
//!
//! A [`RunningService`] ties a started container service to the environment
//! that owns it, together with its endpoint mappings and the host-side
//! tunnel keeping the external addresses alive. Services live until the
//! owning process exits; they are not persisted in environment state.

use std::sync::{Arc, Mutex};

use crate::runtime::{ContainerService, EndpointMappings, Tunnel};

/// One running sidecar attached to an environment.
pub struct RunningService {
    /// Service identity; unique within the environment
    pub name: String,
    /// Started service handle
    pub handle: Arc<dyn ContainerService>,
    /// Port to address mappings
    pub endpoints: EndpointMappings,
    /// Host-side tunnel, kept alive for the lifetime of the entry
    pub tunnel: Option<Box<dyn Tunnel>>,
}

/// Process-lifetime registry of an environment's running services.
#[derive(Default)]
pub struct ServiceRegistry {
    inner: Mutex<Vec<RunningService>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a service with the given name is already running.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.iter().any(|s| s.name == name)
    }

    /// Register a running service.
    pub fn register(&self, service: RunningService) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.push(service);
    }

    /// Names and endpoints of all running services, in start order.
    #[must_use]
    pub fn list(&self) -> Vec<(String, EndpointMappings)> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.iter().map(|s| (s.name.clone(), s.endpoints.clone())).collect()
    }

    /// Started handles of all running services, in start order. Used when
    /// rebinding services into a rebuilt container.
    #[must_use]
    pub fn handles(&self) -> Vec<(String, Arc<dyn ContainerService>)> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.iter().map(|s| (s.name.clone(), Arc::clone(&s.handle))).collect()
    }
}
