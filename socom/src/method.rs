// SPDX-License-Identifier: Apache-2.0 OR MIT

//! RPC method identities, call results, and the invocation handle that
//! tracks one in-flight call.

use std::sync::Arc;

use crate::error::RuntimeError;
use crate::payload::Payload;
use crate::reference_token::{ReferenceToken, WeakReferenceToken};

/// Index of a method within a connector's configured `num_methods`.
pub type MethodId = u16;

/// The outcome of one `call_method` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodResult {
    /// The server's callback returned a successful application-level result.
    ApplicationReturn {
        /// The returned payload.
        payload: Payload,
    },
    /// The server's callback returned an application-level error.
    ApplicationError {
        /// Application-defined error code, opaque to the runtime.
        code: i32,
        /// Error detail payload.
        payload: Payload,
    },
    /// The runtime itself failed the call (not an application-level result).
    Error(RuntimeError),
}

/// A scoped handle to one in-flight method call, returned to the caller of
/// `call_method` when a reply callback was supplied.
///
/// Dropping the handle cancels the call: the matching [`MethodReplySink`] on
/// the server side holds only a weak reference to the same completion token,
/// so a reply sent after cancellation is silently discarded rather than
/// invoking a callback the caller no longer expects.
pub struct MethodInvocationHandle {
    call_token: ReferenceToken,
}

impl MethodInvocationHandle {
    pub(crate) fn new(call_token: ReferenceToken) -> Self {
        Self { call_token }
    }

    pub(crate) fn downgrade(&self) -> WeakReferenceToken {
        self.call_token.downgrade()
    }
}

/// The server side's handle to deliver exactly one reply for a method call.
///
/// Constructed by the server connector and handed to `on_method_call`.
/// Consuming [`MethodReplySink::reply`] attempts to upgrade the weak
/// reference token it was built from; if the client already dropped its
/// [`MethodInvocationHandle`], the reply is dropped instead of invoked.
pub struct MethodReplySink {
    call_token: WeakReferenceToken,
    deliver: Arc<dyn Fn(MethodResult) + Send + Sync>,
}

impl MethodReplySink {
    pub(crate) fn new(
        call_token: WeakReferenceToken,
        deliver: Arc<dyn Fn(MethodResult) + Send + Sync>,
    ) -> Self {
        Self { call_token, deliver }
    }

    /// Delivers `result` to the client's `on_method_reply` callback, unless
    /// the client has already dropped its invocation handle.
    pub fn reply(self, result: MethodResult) {
        if self.call_token.upgrade().is_some() {
            (self.deliver)(result);
        }
    }
}
