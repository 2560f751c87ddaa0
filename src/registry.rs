//! Backend registry
//!
//! Owns one [`ProtocolService`] per configured backend and keeps the set in
//! step with configuration reloads.
//!
//! ## Reload Rules
//! - Name no longer configured: service dropped
//! - Name configured with different parameters: service replaced
//! - Name configured with identical parameters: service kept as is
//!
//! Dropped and replaced services fail their pending handlers once.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::client::{OwnerId, ProtocolService, OWNER_UNLOADING};
use crate::config::Config;
use crate::error::{LinkError, Result};
use crate::network::TransportFactory;

/// What a reload changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    pub added: Vec<String>,
    pub replaced: Vec<String>,
    pub removed: Vec<String>,
    pub kept: Vec<String>,
}

/// Named backends
pub struct BackendRegistry {
    /// Live services keyed by backend name
    services: BTreeMap<String, ProtocolService>,

    /// Shared by every service the registry creates
    factory: Rc<dyn TransportFactory>,
}

impl BackendRegistry {
    pub fn new(factory: Rc<dyn TransportFactory>) -> Self {
        Self {
            services: BTreeMap::new(),
            factory,
        }
    }

    /// Build a registry and load `config` into it
    pub fn from_config(config: &Config, factory: Rc<dyn TransportFactory>) -> Result<Self> {
        let mut registry = Self::new(factory);
        registry.reload(config)?;
        Ok(registry)
    }

    /// Reconcile live services against `config`
    ///
    /// New and replaced services try to connect right away; a failed
    /// connect is logged and retried on first use.
    pub fn reload(&mut self, config: &Config) -> Result<ReloadSummary> {
        config.validate()?;
        let mut summary = ReloadSummary::default();

        let stale: Vec<String> = self
            .services
            .keys()
            .filter(|name| config.backend(name).is_none())
            .cloned()
            .collect();
        for name in stale {
            if let Some(mut service) = self.services.remove(&name) {
                service.shutdown();
            }
            tracing::info!(backend = %name, "backend removed");
            summary.removed.push(name);
        }

        for backend in &config.backends {
            match self.services.get(&backend.name) {
                Some(service) if service.backend() == backend => {
                    summary.kept.push(backend.name.clone());
                    continue;
                }
                Some(_) => {
                    tracing::info!(backend = %backend.name, "backend parameters changed, reconnecting");
                    summary.replaced.push(backend.name.clone());
                }
                None => {
                    tracing::info!(backend = %backend.name, "backend added");
                    summary.added.push(backend.name.clone());
                }
            }

            let mut service = ProtocolService::new(backend.clone(), config, Rc::clone(&self.factory));
            if let Err(e) = service.connect() {
                tracing::warn!(backend = %backend.name, "initial connect failed: {}", e);
            }
            // Dropping the previous service fails its pending handlers
            if let Some(mut previous) = self.services.insert(backend.name.clone(), service) {
                previous.shutdown();
            }
        }

        Ok(summary)
    }

    pub fn get(&mut self, name: &str) -> Option<&mut ProtocolService> {
        self.services.get_mut(name)
    }

    /// Like [`get`](Self::get) but reports unknown names as an error
    pub fn service(&mut self, name: &str) -> Result<&mut ProtocolService> {
        self.services
            .get_mut(name)
            .ok_or_else(|| LinkError::UnknownBackend(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Sweep every backend for handlers owned by `owner`
    pub fn unload_owner(&mut self, owner: &OwnerId) -> usize {
        self.services
            .values_mut()
            .map(|service| service.unload_owner(owner, OWNER_UNLOADING))
            .sum()
    }

    /// Drive every backend without blocking
    pub fn poll(&mut self) {
        for service in self.services.values_mut() {
            service.poll();
        }
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("services", &self.services)
            .finish()
    }
}
