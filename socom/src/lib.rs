// SPDX-License-Identifier: Apache-2.0 OR MIT

#![warn(missing_docs)]

//! # socom
//!
//! `socom` is an in-process service-oriented communication runtime. It
//! brokers typed service interactions between cooperating components living
//! in one address space: a *client-role* participant and a *server-role*
//! participant exchange **events** (server → many clients, publish/
//! subscribe), **requested events** (a client solicits a refreshed value),
//! and **methods** (client → server RPC with an optional reply).
//!
//! A service is identified by an `(interface, instance)` pair: at most one
//! server may provide it, any number of clients may consume it. An auxiliary
//! **bridge** facility lets an external transport (e.g. a wire protocol
//! gateway) contribute services discovered remotely, and receive requests
//! for services no in-process server currently offers.
//!
//! ```
//! use socom::prelude::*;
//!
//! let runtime = create_runtime();
//!
//! let interface = ServiceInterface::new("demo.Echo", Version::new(1, 0));
//! let instance = ServiceInstance::new("default");
//!
//! let server = runtime
//!     .make_server_connector(
//!         instance.clone(),
//!         ServerServiceInterfaceConfiguration::new(interface.clone(), 1, 1),
//!         ServerCallbacks {
//!             on_method_call: Box::new(|_id, _payload, reply, _creds| {
//!                 if let Some(reply) = reply {
//!                     reply.reply(MethodResult::ApplicationReturn { payload: Payload::empty() });
//!                 }
//!             }),
//!             on_event_subscription_change: Box::new(|_id, _state| {}),
//!             on_event_update_request: Box::new(|_id| {}),
//!             on_event_payload_allocate: None,
//!             on_method_reply_payload_allocate: None,
//!         },
//!     )
//!     .unwrap()
//!     .enable()
//!     .unwrap();
//!
//! let client = runtime
//!     .make_client_connector(
//!         instance,
//!         ClientServiceInterfaceConfiguration::new(interface, 0, 0),
//!         ClientCallbacks {
//!             on_service_state_change: Box::new(|_available, _config| {}),
//!             on_event_update: Box::new(|_id, _payload| {}),
//!             on_event_requested_update: Box::new(|_id, _payload| {}),
//!             on_event_payload_allocate: Box::new(|_id| Payload::empty()),
//!         },
//!     )
//!     .unwrap();
//!
//! assert!(client.is_service_available());
//! drop(server);
//! ```
//!
//! ## Module map
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`payload`] | Opaque byte container with an optional header region |
//! | [`reference_token`] | Shared guard gating teardown until all holders release it |
//! | [`message`] | Typed request/reply shapes exchanged between client and server |
//! | [`endpoint`] | Polymorphic delivery handle owning a reference token and a target |
//! | [`registry`] | Per-`(interface, instance)` record: one server slot, many client waiters |
//! | [`client_connector`] | Per-client state machine |
//! | [`server_connector`] | Per-server state machine |
//! | [`discovery`] | `subscribe_find_service`, change-based and legacy set-based |
//! | [`bridge`] | Forwards unmet service requests and find subscriptions to external transports |
//! | [`deadlock`] | Detects a connector torn down from inside its own callback |
//! | [`runtime`] | The public factory wiring the above together |
//!
//! Out of scope (external collaborators, not part of this crate): wire
//! formats, transport security, persistence, process lifecycle, any
//! particular gateway front-end.

pub mod bridge;
pub mod client_connector;
pub mod credentials;
pub mod deadlock;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod message;
pub mod method;
pub mod payload;
pub mod reference_token;
pub mod registry;
pub mod runtime;
pub mod server_connector;
pub mod service_interface;

/// Re-exports the surface a typical embedder needs: `use socom::prelude::*;`.
pub mod prelude {
    pub use crate::credentials::PosixCredentials;
    pub use crate::discovery::{FindResultCallback, FindResultChangeCallback, FindResultStatus, FindSubscription};
    pub use crate::error::{ConstructionError, RuntimeError, ServerLogicError};
    pub use crate::event::{EventId, EventMode, EventState};
    pub use crate::method::{MethodId, MethodInvocationHandle, MethodReplySink, MethodResult};
    pub use crate::payload::Payload;
    pub use crate::runtime::{create_runtime, Runtime};
    pub use crate::service_interface::{
        ClientCallbacks, ClientServiceInterfaceConfiguration, ServerCallbacks,
        ServerServiceInterfaceConfiguration, ServiceInstance, ServiceInterface, Version,
    };
}
