// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Service identity: the `(interface, instance)` key a client and server
//! connector are wired under, and the per-role configuration each side
//! supplies for it.

use crate::error::ConstructionError;

/// Semantic version of an interface. Compatibility is major-exact,
/// minor-monotonic: see [`is_compatible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    /// Breaking-change component. Must match exactly between client and server.
    pub major: u16,
    /// Additive-change component. A client may talk to any server whose minor
    /// is at least the client's.
    pub minor: u16,
}

impl Version {
    /// Builds a version from its components.
    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

/// `{ id, version }`. Equality uses both id and the full version (major and
/// minor); wiring compatibility is the weaker [`is_compatible`] relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceInterface {
    id: String,
    version: Version,
}

impl ServiceInterface {
    /// Builds an interface identity.
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// The interface's textual id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The interface's semantic version.
    pub fn version(&self) -> Version {
        self.version
    }
}

/// Two interfaces collate into the same registry record iff their id and
/// major version match, independent of minor.
pub(crate) fn same_major(a: &ServiceInterface, b: &ServiceInterface) -> bool {
    a.id == b.id && a.version.major == b.version.major
}

/// A client with interface `client` may be wired to a server with interface
/// `server` iff the id and major match and `client.minor <= server.minor`.
pub fn is_compatible(client: &ServiceInterface, server: &ServiceInterface) -> bool {
    same_major(client, server) && client.version.minor <= server.version.minor
}

/// Opaque instance key distinguishing services that share an interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceInstance(String);

impl ServiceInstance {
    /// Wraps a textual instance name.
    pub fn new(instance: impl Into<String>) -> Self {
        Self(instance.into())
    }
}

impl AsRef<str> for ServiceInstance {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Client-side service configuration. `num_methods`/`num_events` may be `0`,
/// meaning "defer to whatever the server is configured with" — the client
/// does not know ahead of time how many ids the server supports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientServiceInterfaceConfiguration {
    interface: ServiceInterface,
    num_methods: u16,
    num_events: u16,
}

impl ClientServiceInterfaceConfiguration {
    /// Builds a client configuration. `num_methods`/`num_events` of `0` defers
    /// to the server's configuration once wired.
    pub fn new(interface: ServiceInterface, num_methods: u16, num_events: u16) -> Self {
        Self {
            interface,
            num_methods,
            num_events,
        }
    }

    /// The interface this configuration describes.
    pub fn interface(&self) -> &ServiceInterface {
        &self.interface
    }

    /// The client's declared method count, or `0` if deferring to the server.
    pub fn num_methods(&self) -> u16 {
        self.num_methods
    }

    /// The client's declared event count, or `0` if deferring to the server.
    pub fn num_events(&self) -> u16 {
        self.num_events
    }

    fn is_deferred(&self) -> bool {
        self.num_methods == 0 && self.num_events == 0
    }

    /// Resolves a deferred client configuration against the server's actual
    /// counts. A non-deferred client configuration is returned unchanged.
    pub(crate) fn resolve(&self, server: &ServerServiceInterfaceConfiguration) -> (u16, u16) {
        if self.is_deferred() {
            (server.num_methods(), server.num_events())
        } else {
            (self.num_methods, self.num_events)
        }
    }
}

/// Server-side service configuration. Unlike the client side, the counts are
/// always explicit: a server always knows exactly how many method/event ids
/// it offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerServiceInterfaceConfiguration {
    inner: ClientServiceInterfaceConfiguration,
}

impl ServerServiceInterfaceConfiguration {
    /// Builds a server configuration with explicit method/event counts.
    pub fn new(interface: ServiceInterface, num_methods: u16, num_events: u16) -> Self {
        Self {
            inner: ClientServiceInterfaceConfiguration::new(interface, num_methods, num_events),
        }
    }

    /// The interface this configuration describes.
    pub fn interface(&self) -> &ServiceInterface {
        self.inner.interface()
    }

    /// The server's method count.
    pub fn num_methods(&self) -> u16 {
        self.inner.num_methods()
    }

    /// The server's event count.
    pub fn num_events(&self) -> u16 {
        self.inner.num_events()
    }

    /// Exposes the underlying client-shaped configuration, e.g. to hand a
    /// server's configuration to a client that deferred.
    pub fn as_client_configuration(&self) -> &ClientServiceInterfaceConfiguration {
        &self.inner
    }
}

/// The callback set a client-connector must supply at construction. Missing
/// any of the four yields [`ConstructionError::CallbackMissing`].
pub struct ClientCallbacks {
    /// Invoked on every `not_available -> available -> not_available -> ...`
    /// transition (the implicit initial `not_available` is silent).
    pub on_service_state_change:
        Box<dyn Fn(bool, Option<ServerServiceInterfaceConfiguration>) + Send + Sync>,
    /// Invoked when a subscribed event is published.
    pub on_event_update: Box<dyn Fn(u16, crate::payload::Payload) + Send + Sync>,
    /// Invoked when the server answers an `update_and_initial_value`
    /// subscription or a `request_event_update` call.
    pub on_event_requested_update: Box<dyn Fn(u16, crate::payload::Payload) + Send + Sync>,
    /// Invoked when the connector needs a fresh, writable payload for an
    /// outgoing method call.
    pub on_event_payload_allocate: Box<dyn Fn(u16) -> crate::payload::Payload + Send + Sync>,
}

impl ClientCallbacks {
    pub(crate) fn validate(&self) -> Result<(), ConstructionError> {
        // All four fields are mandatory `Box<dyn Fn>` values in this Rust
        // port, so "missing" is enforced at the type level; kept as a
        // fallible validation hook to mirror the original's runtime check
        // and to leave room for future optional callbacks.
        Ok(())
    }
}

/// The callback set an enabled server-connector must supply at construction.
pub struct ServerCallbacks {
    /// Invoked for every incoming `call_method`.
    pub on_method_call: Box<
        dyn Fn(
                u16,
                crate::payload::Payload,
                Option<crate::method::MethodReplySink>,
                crate::credentials::PosixCredentials,
            ) + Send
            + Sync,
    >,
    /// Invoked whenever an event's subscriber set becomes empty or
    /// non-empty.
    pub on_event_subscription_change: Box<dyn Fn(u16, crate::event::EventState) + Send + Sync>,
    /// Invoked once when an event gains its first update-and-initial-value
    /// requester: edge-triggered, since a single subscribe with
    /// `update_and_initial_value` triggers an immediate
    /// `on_event_update_request` regardless of how many other subscribers
    /// the event already has.
    pub on_event_update_request: Box<dyn Fn(u16) + Send + Sync>,
    /// Optional: allocates the payload handed back through
    /// `update_event`/`update_requested_event`. Defaults to an empty payload
    /// when absent.
    pub on_event_payload_allocate: Option<Box<dyn Fn(u16) -> crate::payload::Payload + Send + Sync>>,
    /// Optional: allocates the payload a method-call reply is written into.
    /// Defaults to an empty payload when absent.
    pub on_method_reply_payload_allocate: Option<Box<dyn Fn() -> crate::payload::Payload + Send + Sync>>,
}

impl ServerCallbacks {
    pub(crate) fn validate(&self) -> Result<(), ConstructionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(major: u16, minor: u16) -> ServiceInterface {
        ServiceInterface::new("demo.Echo", Version::new(major, minor))
    }

    #[test]
    fn compatible_requires_matching_id_and_major_with_client_minor_at_most_server_minor() {
        assert!(is_compatible(&iface(1, 0), &iface(1, 0)));
        assert!(is_compatible(&iface(1, 0), &iface(1, 2)));
        assert!(!is_compatible(&iface(1, 2), &iface(1, 0)));
        assert!(!is_compatible(&iface(1, 0), &iface(2, 0)));
    }

    #[test]
    fn different_interface_id_is_never_compatible() {
        let other = ServiceInterface::new("demo.Other", Version::new(1, 0));
        assert!(!is_compatible(&iface(1, 0), &other));
    }

    #[test]
    fn equality_uses_full_version_unlike_compatibility() {
        assert_eq!(iface(1, 0), iface(1, 0));
        assert_ne!(iface(1, 0), iface(1, 1));
    }

    #[test]
    fn client_config_resolves_deferred_counts_from_server() {
        let deferred = ClientServiceInterfaceConfiguration::new(iface(1, 0), 0, 0);
        let server = ServerServiceInterfaceConfiguration::new(iface(1, 0), 4, 7);
        assert_eq!(deferred.resolve(&server), (4, 7));

        let explicit = ClientServiceInterfaceConfiguration::new(iface(1, 0), 2, 3);
        assert_eq!(explicit.resolve(&server), (2, 3));
    }
}
