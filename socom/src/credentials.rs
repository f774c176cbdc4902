// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Posix process credentials attached to a connection.

/// The `uid`/`gid` pair a server observes for a connected client (or a client
/// observes for its server, via `get_peer_credentials`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixCredentials {
    uid: u32,
    gid: u32,
}

impl PosixCredentials {
    /// Builds an explicit credentials value.
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// Reads the calling process's real uid/gid.
    ///
    /// Used by `Runtime::make_client_connector`/`make_server_connector` when
    /// the caller does not supply explicit credentials.
    pub fn current_process() -> Self {
        // SAFETY: getuid/getgid take no arguments and cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self { uid, gid }
    }

    /// The real user id.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// The real group id.
    pub fn gid(&self) -> u32 {
        self.gid
    }
}
