//! Vehicle lookup for protocol servers.
//!
//! Servers never touch the world lock. They resolve a vehicle name to its
//! [`VehicleApi`] here and talk to that directly.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::vehicle::api::VehicleApi;
use crate::vehicle::class::{ClassRegistry, ProtocolClass};

use super::message::ErrorCode;

/// Registered vehicle APIs, keyed by name.
#[derive(Debug)]
pub struct ApiProvider {
    registry: ClassRegistry,
    vehicles: RwLock<BTreeMap<String, Arc<VehicleApi>>>,
}

impl ApiProvider {
    #[must_use]
    pub fn new(registry: ClassRegistry) -> Self {
        Self {
            registry,
            vehicles: RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Registers (or replaces) a vehicle under its API name.
    pub fn register(&self, api: Arc<VehicleApi>) {
        self.vehicles.write().insert(api.name().to_owned(), api);
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<VehicleApi>> {
        self.vehicles.write().remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<VehicleApi>> {
        self.vehicles.read().get(name).cloned()
    }

    /// Resolves `name` for a server of class `protocol`.
    ///
    /// Uses the class the vehicle was instantiated with, so vehicles spawned
    /// outside settings resolve the same way.
    ///
    /// # Errors
    ///
    /// - [`ErrorCode::UnknownVehicle`] if no vehicle has that name.
    /// - [`ErrorCode::UnsupportedVehicleClass`] if its class is not registered.
    /// - [`ErrorCode::WrongClass`] if its class is served by another endpoint.
    pub fn resolve(&self, name: &str, protocol: ProtocolClass) -> Result<Arc<VehicleApi>, ErrorCode> {
        let api = self.get(name).ok_or(ErrorCode::UnknownVehicle)?;
        let capabilities = self
            .registry
            .get(api.class())
            .ok_or(ErrorCode::UnsupportedVehicleClass)?;
        if capabilities.protocol != protocol {
            return Err(ErrorCode::WrongClass);
        }
        Ok(api)
    }

    /// Names of vehicles served by `protocol`, sorted.
    #[must_use]
    pub fn names_for(&self, protocol: ProtocolClass) -> Vec<String> {
        self.vehicles
            .read()
            .iter()
            .filter(|(_, api)| {
                self.registry
                    .get(api.class())
                    .is_some_and(|caps| caps.protocol == protocol)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}
