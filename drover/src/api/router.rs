//! Per-class protocol servers started and stopped as a unit.

use std::net::AddrParseError;
use std::sync::Arc;

use thiserror::Error;

use crate::net::Endpoint;
use crate::settings::{DEFAULT_API_SERVER_PORT, Settings};
use crate::trace::{info, warn};
use crate::vehicle::class::{ProtocolClass, VehicleClass};

use super::provider::ApiProvider;
use super::server::{ProtocolServer, ServerError, StopHandle};

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Bind address; empty binds all interfaces.
    pub address: String,
    /// Port of the primary class. Other classes add their offset.
    pub base_port: u16,
    /// Ceiling for any server's worker count.
    pub max_threads: usize,
    /// Worker count for every secondary-class server.
    pub secondary_threads: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            base_port: DEFAULT_API_SERVER_PORT,
            max_threads: 8,
            secondary_threads: 1,
        }
    }
}

impl RouterConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            address: settings.api_server_address.clone(),
            base_port: settings.api_server_port,
            ..Self::default()
        }
    }

    /// Endpoint for `class`.
    ///
    /// A base port of 0 asks the OS for an ephemeral port for every class.
    ///
    /// # Errors
    ///
    /// Returns an error if `address` is not an IP address.
    pub fn endpoint_for(&self, class: ProtocolClass) -> Result<Endpoint, AddrParseError> {
        let port = if self.base_port == 0 {
            0
        } else {
            self.base_port.saturating_add(class.port_offset())
        };
        Endpoint::from_host(&self.address, port)
    }
}

/// Router failure.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid server address: {0}")]
    Address(#[from] AddrParseError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("unsupported vehicle class: {0}")]
    UnsupportedVehicleClass(VehicleClass),
}

/// Stops every server of a router from another thread.
#[derive(Debug, Clone)]
pub struct RouterStopHandle(Vec<StopHandle>);

impl RouterStopHandle {
    pub fn stop(&self) {
        for handle in &self.0 {
            handle.stop();
        }
    }

    /// Whether any server was told to stop.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.iter().any(StopHandle::is_stopped)
    }
}

/// Owns one [`ProtocolServer`] per protocol class in the registry.
///
/// The lowest class (multirotor when present) is primary; it starts last
/// and may block the caller. Every other class is secondary.
pub struct ProtocolRouter {
    config: RouterConfig,
    provider: Arc<ApiProvider>,
    /// Ascending class order; the first entry is primary.
    servers: Vec<ProtocolServer>,
    /// Indices into `servers` in the order they were started.
    started: Vec<usize>,
}

impl ProtocolRouter {
    /// Builds (but does not bind) a server per registered protocol class.
    ///
    /// # Errors
    ///
    /// [`RouterError::Address`] if the configured address is invalid.
    pub fn new(config: RouterConfig, provider: Arc<ApiProvider>) -> Result<Self, RouterError> {
        let mut servers = Vec::new();
        for class in provider.registry().protocol_classes() {
            let endpoint = config.endpoint_for(class)?;
            servers.push(ProtocolServer::new(class, endpoint, Arc::clone(&provider)));
        }
        Ok(Self {
            config,
            provider,
            servers,
            started: Vec::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<ApiProvider> {
        &self.provider
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.started.is_empty()
    }

    /// Classes served, in port order.
    #[must_use]
    pub fn classes(&self) -> Vec<ProtocolClass> {
        self.servers.iter().map(ProtocolServer::class).collect()
    }

    /// Endpoint per class: bound endpoints while running, else configured.
    #[must_use]
    pub fn endpoints(&self) -> Vec<(ProtocolClass, Endpoint)> {
        self.servers
            .iter()
            .map(|s| (s.class(), s.local_endpoint()))
            .collect()
    }

    /// Endpoint serving vehicles of `class`.
    ///
    /// # Errors
    ///
    /// [`RouterError::UnsupportedVehicleClass`] if `class` is not registered.
    pub fn endpoint_for_vehicle(&self, class: VehicleClass) -> Result<Endpoint, RouterError> {
        let protocol = self
            .provider
            .registry()
            .get(class)
            .map(|caps| caps.protocol)
            .ok_or(RouterError::UnsupportedVehicleClass(class))?;
        self.servers
            .iter()
            .find(|s| s.class() == protocol)
            .map(ProtocolServer::local_endpoint)
            .ok_or(RouterError::UnsupportedVehicleClass(class))
    }

    #[must_use]
    pub fn stop_handle(&self) -> RouterStopHandle {
        RouterStopHandle(self.servers.iter().map(ProtocolServer::stop_handle).collect())
    }

    /// Starts secondary servers (non-blocking), then the primary.
    ///
    /// Secondary pools use `secondary_threads` and the primary uses
    /// `thread_count`, both clamped to `[1, max_threads]`. With `blocking`
    /// this returns once a stop handle fires; call [`stop`](Self::stop)
    /// afterwards to release the secondaries.
    ///
    /// # Errors
    ///
    /// Returns the first server failure; servers already started are stopped.
    pub fn start(&mut self, blocking: bool, thread_count: usize) -> Result<(), RouterError> {
        if self.is_running() {
            return Ok(());
        }
        if self.servers.is_empty() {
            warn!("no vehicle classes registered, no protocol servers to start");
            return Ok(());
        }
        let ceiling = self.config.max_threads.max(1);
        let secondary_threads = self.config.secondary_threads.clamp(1, ceiling);
        let primary_threads = thread_count.clamp(1, ceiling);

        for index in 1..self.servers.len() {
            if let Err(e) = self.servers[index].start(false, secondary_threads) {
                self.stop();
                return Err(e.into());
            }
            self.started.push(index);
        }

        self.started.push(0);
        info!(
            classes = ?self.classes(),
            primary_threads,
            secondary_threads,
            blocking,
            "protocol router started"
        );
        if let Err(e) = self.servers[0].start(blocking, primary_threads) {
            self.started.pop();
            self.stop();
            return Err(e.into());
        }
        Ok(())
    }

    /// Stops every started server in reverse start order. Idempotent.
    pub fn stop(&mut self) {
        if self.started.is_empty() {
            return;
        }
        while let Some(index) = self.started.pop() {
            self.servers[index].stop();
        }
        info!("protocol router stopped");
    }
}

impl Drop for ProtocolRouter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::class::ClassRegistry;

    fn router(registry: ClassRegistry) -> ProtocolRouter {
        let config = RouterConfig {
            address: "127.0.0.1".into(),
            base_port: 0,
            ..RouterConfig::default()
        };
        ProtocolRouter::new(config, Arc::new(ApiProvider::new(registry))).unwrap()
    }

    #[test]
    fn ports_follow_class_offsets() {
        let config = RouterConfig::default();
        assert_eq!(
            config.endpoint_for(ProtocolClass::Multirotor).unwrap(),
            Endpoint::any(41451)
        );
        assert_eq!(
            config.endpoint_for(ProtocolClass::Car).unwrap(),
            Endpoint::any(41452)
        );
    }

    #[test]
    fn bad_address_is_rejected() {
        let config = RouterConfig {
            address: "localhost:80".into(),
            ..RouterConfig::default()
        };
        let provider = Arc::new(ApiProvider::new(ClassRegistry::standard()));
        assert!(matches!(
            ProtocolRouter::new(config, provider),
            Err(RouterError::Address(_))
        ));
    }

    #[test]
    fn one_server_per_protocol_class() {
        let r = router(ClassRegistry::standard());
        assert_eq!(r.classes(), vec![ProtocolClass::Multirotor, ProtocolClass::Car]);

        let mut multirotor_only = ClassRegistry::standard();
        multirotor_only.unregister(VehicleClass::Car);
        multirotor_only.unregister(VehicleClass::SkidSteer);
        let r = router(multirotor_only);
        assert_eq!(r.classes(), vec![ProtocolClass::Multirotor]);
        assert!(matches!(
            r.endpoint_for_vehicle(VehicleClass::Car),
            Err(RouterError::UnsupportedVehicleClass(VehicleClass::Car))
        ));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut r = router(ClassRegistry::standard());
        r.start(false, 64).unwrap();
        r.start(false, 64).unwrap();
        assert!(r.is_running());

        let endpoints = r.endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_ne!(endpoints[0].1.port(), 0);
        assert_ne!(endpoints[0].1, endpoints[1].1);

        r.stop();
        r.stop();
        assert!(!r.is_running());
    }

    #[test]
    fn empty_registry_starts_nothing() {
        let mut r = router(ClassRegistry::empty());
        r.start(false, 1).unwrap();
        assert!(!r.is_running());
    }
}
