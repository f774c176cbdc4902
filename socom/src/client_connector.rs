// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-client state machine: discover/attach, subscribe/unsubscribe,
//! request-update, call-method.

use std::sync::{Arc, Mutex};

use socom_log::debug;

use crate::bridge::{BridgeHub, BridgeRequestLease};
use crate::credentials::PosixCredentials;
use crate::endpoint::{ClientConnectorEndpoint, ClientConnectorTarget, ServerConnectionEndpoint};
use crate::error::{ConstructionError, RuntimeError};
use crate::event::{EventId, EventMode};
use crate::message::{
    CallMethodRequest, ConnectRequest, EventRequestedUpdate, EventSubscriptionAdvisory,
    EventUpdate, ServiceStateChange, SubscribeEventRequest,
};
use crate::method::{MethodId, MethodInvocationHandle, MethodReplySink, MethodResult};
use crate::payload::Payload;
use crate::reference_token::ReferenceToken;
use crate::registry::{ClientRegistration, ServiceRegistry};
use crate::service_interface::{
    ClientCallbacks, ClientServiceInterfaceConfiguration, ServerServiceInterfaceConfiguration,
    ServiceInstance, ServiceInterface,
};

struct Binding {
    connection: ServerConnectionEndpoint,
    server_config: ServerServiceInterfaceConfiguration,
    num_methods: u16,
    num_events: u16,
}

struct ClientState {
    binding: Option<Binding>,
}

struct ClientConnectorInner {
    interface: ServiceInterface,
    instance: ServiceInstance,
    config: ClientServiceInterfaceConfiguration,
    callbacks: ClientCallbacks,
    credentials: PosixCredentials,
    state: Mutex<ClientState>,
    deadlock: crate::deadlock::DeadlockDetector,
    // Handed to every server this connector wires to, so the connector's
    // teardown can block until the server has dropped its last clone —
    // mirrors `EnabledInner::stop_block_token` on the server side.
    alive_token: Mutex<Option<ReferenceToken>>,
}

impl ClientConnectorInner {
    fn handle_server_update(self: &Arc<Self>, update: Option<(crate::endpoint::ListenEndpoint, ServiceInterface)>) {
        match update {
            Some((listen_endpoint, _server_interface)) => {
                let endpoint_token = match self.alive_token.lock().unwrap().clone() {
                    Some(token) => token,
                    // Already tearing down; the registration that would
                    // deliver this update is in the process of being
                    // dropped.
                    None => return,
                };
                let request = ConnectRequest {
                    client_endpoint: ClientConnectorEndpoint::new(
                        self.clone() as Arc<dyn ClientConnectorTarget>,
                        endpoint_token,
                    ),
                    client_config: self.config.clone(),
                    client_credentials: self.credentials,
                };
                let reply = listen_endpoint.connect(request);
                let (num_methods, num_events) = self.config.resolve(&reply.server_config);
                {
                    let mut state = self.state.lock().unwrap();
                    state.binding = Some(Binding {
                        connection: reply.server_connection_endpoint,
                        server_config: reply.server_config.clone(),
                        num_methods,
                        num_events,
                    });
                }
                let _guard = self.deadlock.enter_callback();
                (self.callbacks.on_service_state_change)(true, Some(reply.server_config));
            }
            None => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.binding = None;
                }
                let _guard = self.deadlock.enter_callback();
                (self.callbacks.on_service_state_change)(false, None);
            }
        }
    }
}

impl ClientConnectorTarget for ClientConnectorInner {
    fn deliver_event_update(&self, message: EventUpdate) {
        let _guard = self.deadlock.enter_callback();
        (self.callbacks.on_event_update)(message.id, message.payload);
    }

    fn deliver_event_requested_update(&self, message: EventRequestedUpdate) {
        let _guard = self.deadlock.enter_callback();
        (self.callbacks.on_event_requested_update)(message.id, message.payload);
    }

    fn deliver_service_state_change(&self, message: ServiceStateChange) {
        let _guard = self.deadlock.enter_callback();
        (self.callbacks.on_service_state_change)(message.available, message.server_config);
    }

    fn deliver_event_subscription_advisory(&self, message: EventSubscriptionAdvisory) {
        debug!(
            "event {} subscription advisory for ({}, {}): {:?}",
            message.id,
            self.interface.id(),
            self.instance.as_ref(),
            message.state
        );
    }
}

/// A per-client handle: discovers and wires to a compatible server, then
/// drives subscribe/call/update operations against it.
pub struct ClientConnector {
    inner: Arc<ClientConnectorInner>,
    registration: Option<ClientRegistration>,
    bridge_lease: Option<BridgeRequestLease>,
}

impl ClientConnector {
    /// Builds a client connector and registers it with `registry`. If no
    /// compatible local server is currently enabled, every registered
    /// bridge is asked to `request_service` this `(configuration,
    /// instance)`.
    pub fn new(
        registry: &Arc<ServiceRegistry>,
        bridge: &Arc<BridgeHub>,
        interface: ServiceInterface,
        instance: ServiceInstance,
        config: ClientServiceInterfaceConfiguration,
        callbacks: ClientCallbacks,
        credentials: PosixCredentials,
    ) -> Result<Self, ConstructionError> {
        callbacks.validate()?;

        let inner = Arc::new(ClientConnectorInner {
            interface: interface.clone(),
            instance: instance.clone(),
            config: config.clone(),
            callbacks,
            credentials,
            state: Mutex::new(ClientState { binding: None }),
            deadlock: crate::deadlock::DeadlockDetector::new(),
            alive_token: Mutex::new(Some(ReferenceToken::new(|| {}))),
        });

        let bridge_lease = if !registry.has_compatible_local_server(&interface, &instance) {
            Some(bridge.request_service(config.clone(), instance.clone()))
        } else {
            None
        };

        let cb_inner = inner.clone();
        let registration = registry.register_client(
            interface,
            instance,
            Arc::new(move |update| cb_inner.handle_server_update(update)),
        );

        Ok(Self {
            inner,
            registration: Some(registration),
            bridge_lease,
        })
    }

    fn with_binding<R>(
        &self,
        f: impl FnOnce(&Binding) -> Result<R, RuntimeError>,
    ) -> Result<R, RuntimeError> {
        let state = self.inner.state.lock().unwrap();
        match &state.binding {
            Some(binding) => f(binding),
            None => Err(RuntimeError::ServiceNotAvailable),
        }
    }

    /// Subscribes to `id` with the given mode. Overrides a previously weaker
    /// subscription to the same id; does not persist across re-availability.
    pub fn subscribe_event(&self, id: EventId, mode: EventMode) -> Result<(), RuntimeError> {
        self.with_binding(|binding| {
            if id >= binding.num_events {
                return Err(RuntimeError::IdOutOfRange);
            }
            binding.connection.subscribe_event(SubscribeEventRequest { id, mode })
        })
    }

    /// Unsubscribes from `id`.
    pub fn unsubscribe_event(&self, id: EventId) -> Result<(), RuntimeError> {
        self.with_binding(|binding| {
            if id >= binding.num_events {
                return Err(RuntimeError::IdOutOfRange);
            }
            binding.connection.unsubscribe_event(id)
        })
    }

    /// Requests an out-of-band refresh of `id`'s current value.
    pub fn request_event_update(&self, id: EventId) -> Result<(), RuntimeError> {
        self.with_binding(|binding| {
            if id >= binding.num_events {
                return Err(RuntimeError::IdOutOfRange);
            }
            binding.connection.request_event_update(id)
        })
    }

    /// Invokes method `id` with `payload`. If `reply` is supplied, returns a
    /// scoped handle whose drop cancels the outstanding call; if `reply` is
    /// `None`, no per-call resources are allocated and no reply is ever
    /// delivered.
    pub fn call_method(
        &self,
        id: MethodId,
        payload: Payload,
        reply: Option<Box<dyn Fn(MethodResult) + Send + Sync>>,
    ) -> Result<Option<MethodInvocationHandle>, RuntimeError> {
        let (connection, credentials) = self.with_binding(|binding| {
            if id >= binding.num_methods {
                return Err(RuntimeError::IdOutOfRange);
            }
            Ok((binding.connection.clone(), self.inner.credentials))
        })?;

        match reply {
            None => {
                connection.call_method(CallMethodRequest {
                    id,
                    payload,
                    reply: None,
                    credentials,
                })?;
                Ok(None)
            }
            Some(deliver) => {
                // This token only scopes the one call: it governs whether
                // `deliver` still runs, not whether the connector itself is
                // still alive. `deliver` is the caller's own closure, not
                // connector state, so a reply arriving after the connector
                // has torn down is harmless; the caller drops its handle to
                // cancel explicitly if it cares.
                let call_token = ReferenceToken::new(|| {});
                let sink = MethodReplySink::new(call_token.downgrade(), Arc::from(deliver));
                connection.call_method(CallMethodRequest {
                    id,
                    payload,
                    reply: Some(sink),
                    credentials,
                })?;
                Ok(Some(MethodInvocationHandle::new(call_token)))
            }
        }
    }

    /// Retrieves the server's posix credentials.
    pub fn get_peer_credentials(&self) -> Result<PosixCredentials, RuntimeError> {
        self.with_binding(|binding| Ok(binding.connection.peer_credentials()))
    }

    /// Allocates a writable payload for method id `id` via the connector's
    /// payload-allocate callback.
    pub fn allocate_method_payload(&self, id: MethodId) -> Result<Payload, RuntimeError> {
        self.with_binding(|binding| {
            if id >= binding.num_methods {
                return Err(RuntimeError::IdOutOfRange);
            }
            Ok((self.inner.callbacks.on_event_payload_allocate)(id))
        })
    }

    /// Whether the connector is currently wired to a compatible server.
    pub fn is_service_available(&self) -> bool {
        self.inner.state.lock().unwrap().binding.is_some()
    }

    /// The interface this connector was created with.
    pub fn interface(&self) -> &ServiceInterface {
        &self.inner.interface
    }

    /// The instance this connector was created with.
    pub fn instance(&self) -> &ServiceInstance {
        &self.inner.instance
    }
}

impl Drop for ClientConnector {
    fn drop(&mut self) {
        self.inner
            .deadlock
            .check_not_reentrant_teardown(self.inner.interface.id(), self.inner.instance.as_ref());

        debug!(
            "dropping client connector for ({}, {})",
            self.inner.interface.id(),
            self.inner.instance.as_ref()
        );

        // Stop the registry from wiring in a new server for this connector
        // while we're already tearing it down.
        drop(self.registration.take());

        // Drop our half of the connection outside the state lock: its
        // completion action runs the server's `disconnect_client`, which
        // invokes user callbacks on the server side and must not run while
        // we're holding a lock of our own.
        let old_binding = self.inner.state.lock().unwrap().binding.take();
        drop(old_binding);

        // Every `ClientConnectorEndpoint` handed to a server carries a clone
        // of this token; block until the server we were last wired to (if
        // any) has dropped its clone, so no in-flight delivery can still be
        // holding a reference to this connector once we return.
        let alive_token = self.inner.alive_token.lock().unwrap().take();
        if let Some(token) = alive_token {
            token.wait_for_release();
        }
    }
}
