// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed request/reply shapes exchanged between the client and server
//! halves of a wired service pair.
//!
//! These are plain data, not an RPC-over-the-wire encoding: delivery is a
//! direct, synchronous method call on an [`Endpoint`](crate::endpoint) —
//! every user callback runs synchronously on whichever thread triggered the
//! underlying event.

use crate::credentials::PosixCredentials;
use crate::endpoint::ClientConnectorEndpoint;
use crate::endpoint::ServerConnectionEndpoint;
use crate::event::{EventId, EventMode, EventState};
use crate::method::{MethodId, MethodReplySink};
use crate::payload::Payload;
use crate::service_interface::{ClientServiceInterfaceConfiguration, ServerServiceInterfaceConfiguration};

/// Sent by a client connector to the server's listen endpoint once the
/// registry has wired them together.
pub struct ConnectRequest {
    /// The endpoint the server should deliver events/replies through.
    pub client_endpoint: ClientConnectorEndpoint,
    /// The client's declared (possibly deferred) configuration.
    pub client_config: ClientServiceInterfaceConfiguration,
    /// The client's posix credentials, for the server to inspect.
    pub client_credentials: PosixCredentials,
}

/// The listen endpoint's answer to a [`ConnectRequest`].
pub struct ConnectReply {
    /// The per-client endpoint the client should send subsequent
    /// subscribe/call/update operations through.
    pub server_connection_endpoint: ServerConnectionEndpoint,
    /// The server's resolved configuration, handed to the client's
    /// `on_service_state_change` callback for inspection.
    pub server_config: ServerServiceInterfaceConfiguration,
}

/// `subscribe_event`/`unsubscribe_event` request shape.
pub struct SubscribeEventRequest {
    /// The event id to (un)subscribe.
    pub id: EventId,
    /// The subscription strength; ignored for unsubscribe.
    pub mode: EventMode,
}

/// `call_method` request shape, sent from a client-connection-endpoint into
/// the server's per-client connection object.
pub struct CallMethodRequest {
    /// The method id being invoked.
    pub id: MethodId,
    /// The call's argument payload.
    pub payload: Payload,
    /// Present iff the caller wants a reply; consumed exactly once.
    pub reply: Option<MethodReplySink>,
    /// The calling client's posix credentials.
    pub credentials: PosixCredentials,
}

/// Delivered to a client's `on_event_update` callback.
pub struct EventUpdate {
    /// The published event id.
    pub id: EventId,
    /// The published payload.
    pub payload: Payload,
}

/// Delivered to a client's `on_event_requested_update` callback.
pub struct EventRequestedUpdate {
    /// The requested event id.
    pub id: EventId,
    /// The snapshot payload answering the request.
    pub payload: Payload,
}

/// Delivered to a client's `on_service_state_change` callback.
pub struct ServiceStateChange {
    /// `true` on `available`, `false` on `not_available`.
    pub available: bool,
    /// The server's configuration, present only on the `available` edge.
    pub server_config: Option<ServerServiceInterfaceConfiguration>,
}

/// Advisory notice from `set_event_subscription_state`: informs a currently
/// subscribed client that future updates will or will not be sent. Does not
/// gate delivery — a client may still receive (or not receive) updates
/// regardless of this notice.
pub struct EventSubscriptionAdvisory {
    /// The event this advisory concerns.
    pub id: EventId,
    /// The advertised future delivery state.
    pub state: EventState,
}
