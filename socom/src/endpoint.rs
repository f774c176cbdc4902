// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Thin polymorphic send-surfaces. Each [`Endpoint`] variant carries a
//! non-owning (trait-object) pointer to its target plus a strong
//! [`ReferenceToken`] that keeps the target alive for as long as the
//! endpoint — or a clone of it — lives.
//!
//! Three concrete roles exist:
//! - [`ClientConnectorEndpoint`]: the server delivers events/replies to the
//!   client through this.
//! - [`ServerConnectionEndpoint`]: the client delivers subscribe/call/update
//!   operations to its per-client object inside the server through this.
//! - [`ListenEndpoint`]: the registry delivers a `connect` message to the
//!   server through this, to create a per-client connection.

use std::sync::Arc;

use crate::error::RuntimeError;
use crate::event::EventId;
use crate::message::{
    CallMethodRequest, ConnectReply, ConnectRequest, EventRequestedUpdate,
    EventSubscriptionAdvisory, EventUpdate, ServiceStateChange, SubscribeEventRequest,
};
use crate::reference_token::ReferenceToken;

/// Implemented by a client connector's inner state; the receiving half of a
/// [`ClientConnectorEndpoint`].
pub trait ClientConnectorTarget: Send + Sync {
    /// Delivers one event update.
    fn deliver_event_update(&self, message: EventUpdate);
    /// Delivers one requested-event answer.
    fn deliver_event_requested_update(&self, message: EventRequestedUpdate);
    /// Delivers a service-availability transition.
    fn deliver_service_state_change(&self, message: ServiceStateChange);
    /// Delivers an advisory notice about future event delivery.
    fn deliver_event_subscription_advisory(&self, message: EventSubscriptionAdvisory);
}

/// Implemented by a server's per-client connection object; the receiving
/// half of a [`ServerConnectionEndpoint`].
pub trait ServerConnectionTarget: Send + Sync {
    /// Subscribes the connection to an event.
    fn subscribe_event(&self, request: SubscribeEventRequest) -> Result<(), RuntimeError>;
    /// Unsubscribes the connection from an event.
    fn unsubscribe_event(&self, id: EventId) -> Result<(), RuntimeError>;
    /// Requests an out-of-band refresh of an event's current value.
    fn request_event_update(&self, id: EventId) -> Result<(), RuntimeError>;
    /// Dispatches a method call.
    fn call_method(&self, request: CallMethodRequest) -> Result<(), RuntimeError>;
    /// Reads the server's posix credentials.
    fn peer_credentials(&self) -> crate::credentials::PosixCredentials;
}

/// Implemented by an enabled server connector's shared state; the receiving
/// half of a [`ListenEndpoint`].
pub trait ListenTarget: Send + Sync {
    /// Wires a newly-arrived client, returning the per-client connection
    /// endpoint and the server's resolved configuration.
    fn connect(&self, request: ConnectRequest) -> ConnectReply;
}

/// Delivers events and method replies to one client connector.
#[derive(Clone)]
pub struct ClientConnectorEndpoint {
    target: Arc<dyn ClientConnectorTarget>,
    token: ReferenceToken,
}

impl ClientConnectorEndpoint {
    /// Builds an endpoint over `target`, keeping it alive via `token`.
    pub fn new(target: Arc<dyn ClientConnectorTarget>, token: ReferenceToken) -> Self {
        Self { target, token }
    }

    /// The reference token keeping the client connector alive.
    pub fn token(&self) -> &ReferenceToken {
        &self.token
    }

    /// Forwards an event update to the client.
    pub fn send_event_update(&self, message: EventUpdate) {
        self.target.deliver_event_update(message);
    }

    /// Forwards a requested-event answer to the client.
    pub fn send_event_requested_update(&self, message: EventRequestedUpdate) {
        self.target.deliver_event_requested_update(message);
    }

    /// Forwards a service-availability transition to the client.
    pub fn send_service_state_change(&self, message: ServiceStateChange) {
        self.target.deliver_service_state_change(message);
    }

    /// Forwards a subscription-state advisory to the client.
    pub fn send_event_subscription_advisory(&self, message: EventSubscriptionAdvisory) {
        self.target.deliver_event_subscription_advisory(message);
    }
}

/// Delivers subscribe/call/update operations to one per-client connection
/// object inside an enabled server.
#[derive(Clone)]
pub struct ServerConnectionEndpoint {
    target: Arc<dyn ServerConnectionTarget>,
    token: ReferenceToken,
}

impl ServerConnectionEndpoint {
    /// Builds an endpoint over `target`, keeping it alive via `token`.
    pub fn new(target: Arc<dyn ServerConnectionTarget>, token: ReferenceToken) -> Self {
        Self { target, token }
    }

    /// The reference token keeping the per-client connection alive.
    pub fn token(&self) -> &ReferenceToken {
        &self.token
    }

    /// Subscribes to an event through this connection.
    pub fn subscribe_event(&self, request: SubscribeEventRequest) -> Result<(), RuntimeError> {
        self.target.subscribe_event(request)
    }

    /// Unsubscribes from an event through this connection.
    pub fn unsubscribe_event(&self, id: EventId) -> Result<(), RuntimeError> {
        self.target.unsubscribe_event(id)
    }

    /// Requests an out-of-band event refresh through this connection.
    pub fn request_event_update(&self, id: EventId) -> Result<(), RuntimeError> {
        self.target.request_event_update(id)
    }

    /// Dispatches a method call through this connection.
    pub fn call_method(&self, request: CallMethodRequest) -> Result<(), RuntimeError> {
        self.target.call_method(request)
    }

    /// Reads the server's posix credentials through this connection.
    pub fn peer_credentials(&self) -> crate::credentials::PosixCredentials {
        self.target.peer_credentials()
    }
}

/// The registry's handle to ask an enabled server to wire up a newly
/// arrived, compatible client.
#[derive(Clone)]
pub struct ListenEndpoint {
    target: Arc<dyn ListenTarget>,
    token: ReferenceToken,
}

impl ListenEndpoint {
    /// Builds an endpoint over `target`, keeping it alive via `token`.
    pub fn new(target: Arc<dyn ListenTarget>, token: ReferenceToken) -> Self {
        Self { target, token }
    }

    /// The reference token keeping the server connector alive. A server's
    /// disable/drop path waits on a clone of this token before returning.
    pub fn token(&self) -> &ReferenceToken {
        &self.token
    }

    /// Wires a newly-arrived compatible client.
    pub fn connect(&self, request: ConnectRequest) -> ConnectReply {
        self.target.connect(request)
    }
}
