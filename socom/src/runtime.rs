// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The runtime handle: the one object an embedding application holds,
//! wiring the registry and bridge hub together and fronting every
//! connector/discovery/bridge construction call.

use std::sync::Arc;

use crate::bridge::{BridgeHub, BridgeRegistration, RequestServiceFn, SubscribeFindServiceFn};
use crate::client_connector::ClientConnector;
use crate::credentials::PosixCredentials;
use crate::discovery::{self, FindResultCallback, FindResultChangeCallback, FindSubscription};
use crate::error::ConstructionError;
use crate::registry::ServiceRegistry;
use crate::server_connector::DisabledServerConnector;
use crate::service_interface::{
    ClientCallbacks, ClientServiceInterfaceConfiguration, ServerCallbacks,
    ServerServiceInterfaceConfiguration, ServiceInstance, ServiceInterface,
};

/// The process-wide (or test-scoped) runtime: one [`ServiceRegistry`] and one
/// [`BridgeHub`], shared by every connector, discovery subscription, and
/// bridge registration built through it.
pub struct Runtime {
    registry: Arc<ServiceRegistry>,
    bridge: Arc<BridgeHub>,
}

/// Builds a fresh, empty runtime.
pub fn create_runtime() -> Runtime {
    Runtime {
        registry: ServiceRegistry::new(),
        bridge: BridgeHub::new(),
    }
}

impl Runtime {
    /// Builds and registers a client connector, using the calling process's
    /// own posix credentials.
    pub fn make_client_connector(
        &self,
        instance: ServiceInstance,
        config: ClientServiceInterfaceConfiguration,
        callbacks: ClientCallbacks,
    ) -> Result<ClientConnector, ConstructionError> {
        self.make_client_connector_with_credentials(
            instance,
            config,
            callbacks,
            PosixCredentials::current_process(),
        )
    }

    /// Builds and registers a client connector with explicit posix
    /// credentials.
    pub fn make_client_connector_with_credentials(
        &self,
        instance: ServiceInstance,
        config: ClientServiceInterfaceConfiguration,
        callbacks: ClientCallbacks,
        credentials: PosixCredentials,
    ) -> Result<ClientConnector, ConstructionError> {
        let interface = config.interface().clone();
        ClientConnector::new(
            &self.registry,
            &self.bridge,
            interface,
            instance,
            config,
            callbacks,
            credentials,
        )
    }

    /// Builds a disabled server connector, using the calling process's own
    /// posix credentials. Call [`DisabledServerConnector::enable`] to publish
    /// it.
    pub fn make_server_connector(
        &self,
        instance: ServiceInstance,
        config: ServerServiceInterfaceConfiguration,
        callbacks: ServerCallbacks,
    ) -> Result<DisabledServerConnector, ConstructionError> {
        self.make_server_connector_with_credentials(
            instance,
            config,
            callbacks,
            PosixCredentials::current_process(),
        )
    }

    /// Builds a disabled server connector with explicit posix credentials.
    pub fn make_server_connector_with_credentials(
        &self,
        instance: ServiceInstance,
        config: ServerServiceInterfaceConfiguration,
        callbacks: ServerCallbacks,
        credentials: PosixCredentials,
    ) -> Result<DisabledServerConnector, ConstructionError> {
        DisabledServerConnector::new(&self.registry, config, instance, callbacks, credentials)
    }

    /// Change-based `subscribe_find_service`: fires an initial `Added` for
    /// every currently matching service, then one callback per subsequent
    /// add/remove. `interface: None` is a wildcard that only ever reports
    /// local services.
    pub fn subscribe_find_service_on_change(
        &self,
        on_change: FindResultChangeCallback,
        interface: Option<ServiceInterface>,
        instance: Option<ServiceInstance>,
    ) -> FindSubscription {
        discovery::subscribe_find_service_on_change(
            &self.registry,
            &self.bridge,
            on_change,
            interface,
            instance,
            None,
        )
    }

    /// Legacy set-based `subscribe_find_service`: maintains and reports the
    /// full matching result set on every change.
    pub fn subscribe_find_service_on_set(
        &self,
        on_result_set: FindResultCallback,
        interface: ServiceInterface,
        instance: Option<ServiceInstance>,
    ) -> FindSubscription {
        discovery::subscribe_find_service_on_set(&self.registry, &self.bridge, on_result_set, interface, instance)
    }

    /// Registers an external transport as a bridge: it will be asked to seek
    /// services local clients couldn't find, and to forward its own finds
    /// into local discovery subscriptions.
    pub fn register_service_bridge(
        &self,
        subscribe_find_service: SubscribeFindServiceFn,
        request_service: RequestServiceFn,
    ) -> BridgeRegistration {
        self.bridge.register_bridge(subscribe_find_service, request_service)
    }

    /// A bridge's own identity, for forwarding its finds without looping
    /// them back through [`Self::subscribe_find_service_on_change`] with
    /// `bridge_identity` set to the bridge's own registration.
    pub fn subscribe_find_service_on_change_as_bridge(
        &self,
        on_change: FindResultChangeCallback,
        interface: Option<ServiceInterface>,
        instance: Option<ServiceInstance>,
        bridge: &BridgeRegistration,
    ) -> FindSubscription {
        discovery::subscribe_find_service_on_change(
            &self.registry,
            &self.bridge,
            on_change,
            interface,
            instance,
            Some(bridge.identity()),
        )
    }

    /// Sets the process-wide log level for the `socom`/`socom-log` family.
    pub fn with_log_level(level: socom_log::LogLevel) {
        socom_log::set_log_level(level);
    }
}
