// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Detects a connector being torn down from inside one of its own user
//! callbacks — a guaranteed deadlock against the "wait for all callbacks to
//! finish" teardown contract.

use std::sync::Mutex;
use std::thread::ThreadId;

use socom_log::fatal_panic;

/// Per-connector set of thread ids currently executing one of that
/// connector's user callbacks.
#[derive(Default)]
pub struct DeadlockDetector {
    active: Mutex<Vec<ThreadId>>,
}

/// RAII guard pushed for the duration of one user-callback invocation; pops
/// itself on drop. Construct via [`DeadlockDetector::enter_callback`].
pub struct CallbackGuard<'a> {
    detector: &'a DeadlockDetector,
    thread: ThreadId,
}

impl DeadlockDetector {
    /// Builds an empty detector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the calling thread as "inside a user callback" for the
    /// duration of the returned guard.
    pub fn enter_callback(&self) -> CallbackGuard<'_> {
        let thread = std::thread::current().id();
        self.active.lock().unwrap().push(thread);
        CallbackGuard {
            detector: self,
            thread,
        }
    }

    /// Returns whether the calling thread is currently inside one of this
    /// connector's callbacks.
    pub fn current_thread_is_active(&self) -> bool {
        let thread = std::thread::current().id();
        self.active.lock().unwrap().contains(&thread)
    }

    /// Called right before a connector blocks on teardown. Aborts the
    /// process if the calling thread is already inside one of this
    /// connector's callbacks — destroying a connector from within its own
    /// callback can never complete, since the callback itself is one of the
    /// things teardown waits for.
    pub fn check_not_reentrant_teardown(&self, interface: &str, instance: &str) {
        if self.current_thread_is_active() {
            fatal_panic!(
                "Deadlock: connector for ({}, {}) is being destroyed from within one of its own callbacks",
                interface,
                instance
            );
        }
    }
}

impl Drop for CallbackGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.detector.active.lock().unwrap();
        if let Some(pos) = active.iter().position(|t| *t == self.thread) {
            active.swap_remove(pos);
        }
    }
}
