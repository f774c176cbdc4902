// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Server-side state machine: a [`DisabledServerConnector`] holds
//! configuration but is invisible to discovery and clients; calling
//! [`DisabledServerConnector::enable`] publishes it to the registry and
//! returns an [`EnabledServerConnector`] that can wire up clients, push
//! events, and answer method calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::credentials::PosixCredentials;
use crate::deadlock::DeadlockDetector;
use crate::endpoint::{
    ClientConnectorEndpoint, ListenEndpoint, ListenTarget, ServerConnectionEndpoint,
    ServerConnectionTarget,
};
use crate::error::{ConstructionError, RuntimeError, ServerLogicError};
use crate::event::{EventId, EventMode, EventState};
use crate::message::{
    CallMethodRequest, ConnectReply, ConnectRequest, EventRequestedUpdate,
    EventSubscriptionAdvisory, EventUpdate, SubscribeEventRequest,
};
use crate::payload::Payload;
use crate::reference_token::ReferenceToken;
use crate::registry::{ServerRegistration, ServiceRegistry};
use crate::service_interface::{
    ServerCallbacks, ServerServiceInterfaceConfiguration, ServiceInstance, ServiceInterface,
};

#[derive(Default)]
struct EventBookkeeping {
    subscribers: Vec<(u64, EventMode)>,
    update_requesters: HashSet<u64>,
}

struct ClientRecord {
    endpoint: ClientConnectorEndpoint,
    #[allow(dead_code)]
    credentials: PosixCredentials,
}

struct EnabledState {
    clients: HashMap<u64, ClientRecord>,
    events: Vec<EventBookkeeping>,
}

struct EnabledInner {
    interface: ServiceInterface,
    instance: ServiceInstance,
    config: ServerServiceInterfaceConfiguration,
    callbacks: ServerCallbacks,
    credentials: PosixCredentials,
    state: Mutex<EnabledState>,
    next_client_id: AtomicU64,
    deadlock: DeadlockDetector,
    self_weak: Weak<EnabledInner>,
    stop_block_token: Mutex<Option<ReferenceToken>>,
}

impl EnabledInner {
    fn num_events(&self) -> usize {
        self.config.num_events() as usize
    }

    fn num_methods(&self) -> usize {
        self.config.num_methods() as usize
    }

    fn subscribe_event(&self, client_id: u64, request: SubscribeEventRequest) -> Result<(), RuntimeError> {
        if request.id as usize >= self.num_events() {
            return Err(RuntimeError::IdOutOfRange);
        }
        let (became_subscribed, became_requester) = {
            let mut state = self.state.lock().unwrap();
            let ev = &mut state.events[request.id as usize];
            let was_empty = ev.subscribers.is_empty();
            if let Some(slot) = ev.subscribers.iter_mut().find(|(id, _)| *id == client_id) {
                slot.1 = request.mode;
            } else {
                ev.subscribers.push((client_id, request.mode));
            }
            let already_requester = ev.update_requesters.contains(&client_id);
            if request.mode == EventMode::UpdateAndInitialValue {
                ev.update_requesters.insert(client_id);
            }
            (
                was_empty,
                request.mode == EventMode::UpdateAndInitialValue && !already_requester,
            )
        };
        if became_subscribed {
            let _guard = self.deadlock.enter_callback();
            (self.callbacks.on_event_subscription_change)(request.id, EventState::Subscribed);
        }
        if became_requester {
            let _guard = self.deadlock.enter_callback();
            (self.callbacks.on_event_update_request)(request.id);
        }
        Ok(())
    }

    fn unsubscribe_event(&self, client_id: u64, id: EventId) -> Result<(), RuntimeError> {
        if id as usize >= self.num_events() {
            return Err(RuntimeError::IdOutOfRange);
        }
        let became_unsubscribed = {
            let mut state = self.state.lock().unwrap();
            let ev = &mut state.events[id as usize];
            let had_subscribers = !ev.subscribers.is_empty();
            ev.subscribers.retain(|(cid, _)| *cid != client_id);
            ev.update_requesters.remove(&client_id);
            had_subscribers && ev.subscribers.is_empty()
        };
        if became_unsubscribed {
            let _guard = self.deadlock.enter_callback();
            (self.callbacks.on_event_subscription_change)(id, EventState::Unsubscribed);
        }
        Ok(())
    }

    fn request_event_update(&self, client_id: u64, id: EventId) -> Result<(), RuntimeError> {
        if id as usize >= self.num_events() {
            return Err(RuntimeError::IdOutOfRange);
        }
        let already_requester = {
            let mut state = self.state.lock().unwrap();
            let ev = &mut state.events[id as usize];
            let already = ev.update_requesters.contains(&client_id);
            ev.update_requesters.insert(client_id);
            already
        };
        if !already_requester {
            let _guard = self.deadlock.enter_callback();
            (self.callbacks.on_event_update_request)(id);
        }
        Ok(())
    }

    fn call_method(&self, request: CallMethodRequest) -> Result<(), RuntimeError> {
        if request.id as usize >= self.num_methods() {
            return Err(RuntimeError::IdOutOfRange);
        }
        let _guard = self.deadlock.enter_callback();
        (self.callbacks.on_method_call)(
            request.id,
            request.payload,
            request.reply,
            request.credentials,
        );
        Ok(())
    }

    fn peer_credentials(&self) -> PosixCredentials {
        self.credentials
    }

    /// Removes a departed client from the client table and every event it
    /// was subscribed to, firing `on_event_subscription_change` for any
    /// event whose subscriber set becomes empty as a result. Invoked as the
    /// completion action of that client's connection reference token — no
    /// explicit disconnect message is ever sent.
    fn disconnect_client(&self, client_id: u64) {
        let newly_unsubscribed: Vec<EventId> = {
            let mut state = self.state.lock().unwrap();
            state.clients.remove(&client_id);
            let mut newly_unsubscribed = Vec::new();
            for (idx, ev) in state.events.iter_mut().enumerate() {
                let had_subscribers = !ev.subscribers.is_empty();
                ev.subscribers.retain(|(cid, _)| *cid != client_id);
                ev.update_requesters.remove(&client_id);
                if had_subscribers && ev.subscribers.is_empty() {
                    newly_unsubscribed.push(idx as EventId);
                }
            }
            newly_unsubscribed
        };
        for id in newly_unsubscribed {
            let _guard = self.deadlock.enter_callback();
            (self.callbacks.on_event_subscription_change)(id, EventState::Unsubscribed);
        }
    }

    fn broadcast_update(&self, id: EventId, payload: Payload) -> Result<(), ServerLogicError> {
        if id as usize >= self.num_events() {
            return Err(ServerLogicError::IdOutOfRange);
        }
        let targets = {
            let state = self.state.lock().unwrap();
            state.events[id as usize]
                .subscribers
                .iter()
                .filter_map(|(cid, _)| state.clients.get(cid).map(|c| c.endpoint.clone()))
                .collect::<Vec<_>>()
        };
        for endpoint in targets {
            endpoint.send_event_update(EventUpdate {
                id,
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    /// Answers every client currently marked as an update-requester for `id`
    /// and clears that set — a requested update is a one-shot snapshot, not
    /// a standing subscription (distinct from `subscribers`, which persists
    /// until `unsubscribe_event`/disconnect).
    fn broadcast_requested_update(&self, id: EventId, payload: Payload) -> Result<(), ServerLogicError> {
        if id as usize >= self.num_events() {
            return Err(ServerLogicError::IdOutOfRange);
        }
        let targets = {
            let mut state = self.state.lock().unwrap();
            let requesters: Vec<u64> = state.events[id as usize].update_requesters.drain().collect();
            requesters
                .into_iter()
                .filter_map(|cid| state.clients.get(&cid).map(|c| c.endpoint.clone()))
                .collect::<Vec<_>>()
        };
        for endpoint in targets {
            endpoint.send_event_requested_update(EventRequestedUpdate {
                id,
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    fn set_event_subscription_state(&self, id: EventId, advisory: EventState) -> Result<(), ServerLogicError> {
        if id as usize >= self.num_events() {
            return Err(ServerLogicError::IdOutOfRange);
        }
        let targets = {
            let state = self.state.lock().unwrap();
            state.events[id as usize]
                .subscribers
                .iter()
                .filter_map(|(cid, _)| state.clients.get(cid).map(|c| c.endpoint.clone()))
                .collect::<Vec<_>>()
        };
        for endpoint in targets {
            endpoint.send_event_subscription_advisory(EventSubscriptionAdvisory { id, state: advisory });
        }
        Ok(())
    }

    fn get_event_mode(&self, id: EventId) -> Result<Option<EventMode>, ServerLogicError> {
        if id as usize >= self.num_events() {
            return Err(ServerLogicError::IdOutOfRange);
        }
        let state = self.state.lock().unwrap();
        Ok(state.events[id as usize]
            .subscribers
            .iter()
            .map(|(_, mode)| *mode)
            .fold(None, |acc, mode| Some(acc.map_or(mode, |a: EventMode| a.dominant(mode)))))
    }

    fn allocate_event_payload(&self, id: EventId) -> Result<Payload, ServerLogicError> {
        if id as usize >= self.num_events() {
            return Err(ServerLogicError::IdOutOfRange);
        }
        Ok(self
            .callbacks
            .on_event_payload_allocate
            .as_ref()
            .map(|f| f(id))
            .unwrap_or_else(Payload::empty))
    }

    fn allocate_method_reply_payload(&self) -> Payload {
        self.callbacks
            .on_method_reply_payload_allocate
            .as_ref()
            .map(|f| f())
            .unwrap_or_else(Payload::empty)
    }
}

impl ListenTarget for EnabledInner {
    fn connect(&self, request: ConnectRequest) -> ConnectReply {
        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.state.lock().unwrap();
            state.clients.insert(
                client_id,
                ClientRecord {
                    endpoint: request.client_endpoint,
                    credentials: request.client_credentials,
                },
            );
        }

        let inner_arc = self
            .self_weak
            .upgrade()
            .expect("enabled server connector alive while handling connect");
        let stop_clone = self.stop_block_token.lock().unwrap().clone();

        let disconnect_inner = inner_arc.clone();
        let connection_token = ReferenceToken::new(move || {
            disconnect_inner.disconnect_client(client_id);
            drop(stop_clone);
        });
        let connection_target: Arc<dyn ServerConnectionTarget> =
            Arc::new(ConnectionTarget { inner: inner_arc, client_id });

        ConnectReply {
            server_connection_endpoint: ServerConnectionEndpoint::new(connection_target, connection_token),
            server_config: self.config.clone(),
        }
    }
}

/// A server's view of one connected client; implements
/// [`ServerConnectionTarget`] by delegating to the shared enabled state with
/// this connection's `client_id` bound in.
struct ConnectionTarget {
    inner: Arc<EnabledInner>,
    client_id: u64,
}

impl ServerConnectionTarget for ConnectionTarget {
    fn subscribe_event(&self, request: SubscribeEventRequest) -> Result<(), RuntimeError> {
        self.inner.subscribe_event(self.client_id, request)
    }

    fn unsubscribe_event(&self, id: EventId) -> Result<(), RuntimeError> {
        self.inner.unsubscribe_event(self.client_id, id)
    }

    fn request_event_update(&self, id: EventId) -> Result<(), RuntimeError> {
        self.inner.request_event_update(self.client_id, id)
    }

    fn call_method(&self, request: CallMethodRequest) -> Result<(), RuntimeError> {
        self.inner.call_method(request)
    }

    fn peer_credentials(&self) -> PosixCredentials {
        self.inner.peer_credentials()
    }
}

/// A server connector not yet visible to the registry. Holds configuration
/// only; no client can discover or wire to it until [`Self::enable`].
pub struct DisabledServerConnector {
    registry: Arc<ServiceRegistry>,
    interface: ServiceInterface,
    instance: ServiceInstance,
    config: ServerServiceInterfaceConfiguration,
    callbacks: ServerCallbacks,
    credentials: PosixCredentials,
}

impl DisabledServerConnector {
    pub(crate) fn new(
        registry: &Arc<ServiceRegistry>,
        config: ServerServiceInterfaceConfiguration,
        instance: ServiceInstance,
        callbacks: ServerCallbacks,
        credentials: PosixCredentials,
    ) -> Result<Self, ConstructionError> {
        callbacks.validate()?;
        let interface = config.interface().clone();
        Ok(Self {
            registry: registry.clone(),
            interface,
            instance,
            config,
            callbacks,
            credentials,
        })
    }

    /// The interface this connector was created with.
    pub fn interface(&self) -> &ServiceInterface {
        &self.interface
    }

    /// The instance this connector was created with.
    pub fn instance(&self) -> &ServiceInstance {
        &self.instance
    }

    /// Publishes the connector to the registry, wiring it up to any clients
    /// already waiting on this `(interface, instance)`. Fails with
    /// [`ConstructionError::DuplicateService`] if another enabled server
    /// already holds the slot, in which case `self` is handed back unchanged
    /// so the caller can retry or drop it.
    pub fn enable(self) -> Result<EnabledServerConnector, (DisabledServerConnector, ConstructionError)> {
        let DisabledServerConnector {
            registry,
            interface,
            instance,
            config,
            callbacks,
            credentials,
        } = self;

        let stop_block_token = ReferenceToken::new(|| {});
        let num_events = config.num_events() as usize;

        let inner = Arc::new_cyclic(|weak: &Weak<EnabledInner>| EnabledInner {
            interface: interface.clone(),
            instance: instance.clone(),
            config: config.clone(),
            callbacks,
            credentials,
            state: Mutex::new(EnabledState {
                clients: HashMap::new(),
                events: (0..num_events).map(|_| EventBookkeeping::default()).collect(),
            }),
            next_client_id: AtomicU64::new(0),
            deadlock: DeadlockDetector::new(),
            self_weak: weak.clone(),
            stop_block_token: Mutex::new(Some(stop_block_token.clone())),
        });

        let listen_endpoint = ListenEndpoint::new(inner.clone() as Arc<dyn ListenTarget>, stop_block_token);

        match registry.register_server(interface.clone(), instance.clone(), listen_endpoint) {
            Ok(registration) => Ok(EnabledServerConnector {
                inner,
                registration,
                registry: registry.clone(),
            }),
            Err(err) => {
                let callbacks = match Arc::try_unwrap(inner) {
                    Ok(inner) => inner.callbacks,
                    Err(_) => unreachable!(
                        "no per-client connection can exist before register_server has succeeded"
                    ),
                };
                Err((
                    DisabledServerConnector {
                        registry,
                        interface,
                        instance,
                        config,
                        callbacks,
                        credentials,
                    },
                    err,
                ))
            }
        }
    }
}

/// A server connector published to the registry: visible to discovery and
/// wired to every compatible client, past and future, until [`Self::disable`].
pub struct EnabledServerConnector {
    inner: Arc<EnabledInner>,
    registration: ServerRegistration,
    registry: Arc<ServiceRegistry>,
}

impl EnabledServerConnector {
    /// The interface this connector was created with.
    pub fn interface(&self) -> &ServiceInterface {
        &self.inner.interface
    }

    /// The instance this connector was created with.
    pub fn instance(&self) -> &ServiceInstance {
        &self.inner.instance
    }

    /// Pushes `payload` on event `id` to every currently subscribed client,
    /// regardless of subscription mode.
    pub fn update_event(&self, id: EventId, payload: Payload) -> Result<(), ServerLogicError> {
        self.inner.broadcast_update(id, payload)
    }

    /// Answers every client currently awaiting a requested update on `id`
    /// with `payload`, then clears that request.
    pub fn update_requested_event(&self, id: EventId, payload: Payload) -> Result<(), ServerLogicError> {
        self.inner.broadcast_requested_update(id, payload)
    }

    /// Sends an advisory notice of `state` to every client currently
    /// subscribed to `id`. Purely informational: does not alter bookkeeping
    /// or gate delivery.
    pub fn set_event_subscription_state(&self, id: EventId, state: EventState) -> Result<(), ServerLogicError> {
        self.inner.set_event_subscription_state(id, state)
    }

    /// The dominant subscription mode currently in force for `id`, or `None`
    /// if nobody is subscribed.
    pub fn get_event_mode(&self, id: EventId) -> Result<Option<EventMode>, ServerLogicError> {
        self.inner.get_event_mode(id)
    }

    /// Allocates a payload for event `id` via the connector's optional
    /// payload-allocate callback, falling back to an empty payload.
    pub fn allocate_event_payload(&self, id: EventId) -> Result<Payload, ServerLogicError> {
        self.inner.allocate_event_payload(id)
    }

    /// Allocates a payload for a method reply via the connector's optional
    /// payload-allocate callback, falling back to an empty payload.
    pub fn allocate_method_reply_payload(&self) -> Payload {
        self.inner.allocate_method_reply_payload()
    }

    /// Retracts the connector from the registry, severing every wired
    /// client (each receives `on_service_state_change(false, None)`), and
    /// blocks until every in-flight connection has fully released this
    /// connector's reference token before returning the now-disabled
    /// connector.
    ///
    /// Aborts the process (via the deadlock detector) if called from inside
    /// one of this connector's own callbacks — that callback is itself one
    /// of the things this call would have to wait for.
    pub fn disable(self) -> DisabledServerConnector {
        self.inner
            .deadlock
            .check_not_reentrant_teardown(self.inner.interface.id(), self.inner.instance.as_ref());

        let EnabledServerConnector {
            inner,
            registration,
            registry,
        } = self;
        drop(registration);

        let master_token = inner.stop_block_token.lock().unwrap().take();
        if let Some(token) = master_token {
            token.wait_for_release();
        }

        let interface = inner.interface.clone();
        let instance = inner.instance.clone();
        let config = inner.config.clone();
        let credentials = inner.credentials;

        // `wait_for_release` above already guarantees every per-client
        // connection token has run its completion action (which drops its
        // captured `Arc<EnabledInner>` clone), so this is the only strong
        // holder left.
        let callbacks = Arc::try_unwrap(inner)
            .unwrap_or_else(|_| {
                unreachable!(
                    "stop_block_token released implies every connection clone has dropped"
                )
            })
            .callbacks;

        DisabledServerConnector {
            registry,
            interface,
            instance,
            config,
            callbacks,
            credentials,
        }
    }
}
