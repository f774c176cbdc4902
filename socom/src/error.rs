// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The three error categories of the runtime: logic errors caught at
//! construction, runtime errors surfaced on an operation, and the process-
//! fatal deadlock condition (which does not round-trip through a `Result`
//! at all — see [`crate::deadlock`]).

/// Errors returned from client- and server-connector operations.
///
/// Numeric values are part of the wire-stable error taxonomy (see the
/// crate's top-level documentation) and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RuntimeError {
    /// The connector is not currently wired to a peer.
    ServiceNotAvailable = 0,
    /// The peer rejected the request.
    RequestRejected = 1,
    /// An event or method id was outside the connector's configured range.
    IdOutOfRange = 2,
    /// A payload failed a structural check before being handed to a callback.
    MalformedPayload = 3,
    /// The peer's posix credentials failed a permission check.
    PermissionNotAllowed = 4,
}

impl core::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RuntimeError::{:?}", self)
    }
}

impl std::error::Error for RuntimeError {}

/// Errors a server-connector can report about its own bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ServerLogicError {
    /// An event or method id was outside the connector's configured range.
    IdOutOfRange = 0,
}

impl core::fmt::Display for ServerLogicError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ServerLogicError::{:?}", self)
    }
}

impl std::error::Error for ServerLogicError {}

/// Errors a connector can fail with at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ConstructionError {
    /// Another enabled server-connector already holds this `(interface, instance)`.
    DuplicateService = 0,
    /// One or more required callbacks were not supplied.
    CallbackMissing = 1,
}

impl core::fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ConstructionError::{:?}", self)
    }
}

impl std::error::Error for ConstructionError {}
