// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A shared guard that runs a single completion action once its last strong
//! holder is dropped.
//!
//! Every [`Endpoint`](crate::endpoint) holds a strong [`ReferenceToken`]
//! cloned from the target it points at, which is what lets a server-
//! connector's teardown path block until every in-flight endpoint has been
//! dropped. Asynchronous callbacks instead hold a
//! [`WeakReferenceToken`] and try to upgrade before entering user code; if
//! the target is already gone, the upgrade fails and the callback is
//! silently skipped.

use std::sync::{Arc, Condvar, Mutex, Weak};

/// The release signal lives behind its own `Arc`, separate from `Inner`'s,
/// so that a waiter can hold it without itself counting as a strong holder
/// of the token it is waiting to see released.
#[derive(Default)]
struct ReleaseSignal {
    released: Mutex<bool>,
    released_cond: Condvar,
}

struct Inner {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    release_signal: Arc<ReleaseSignal>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(action) = self.action.lock().unwrap().take() {
            action();
        }
        *self.release_signal.released.lock().unwrap() = true;
        self.release_signal.released_cond.notify_all();
    }
}

/// A strong, cloneable guard. The wrapped completion action runs exactly
/// once, when the last clone (and the last upgraded [`WeakReferenceToken`])
/// is dropped.
#[derive(Clone)]
pub struct ReferenceToken(Arc<Inner>);

/// A non-owning handle that can attempt to recover a [`ReferenceToken`] as
/// long as at least one strong holder remains.
#[derive(Clone)]
pub struct WeakReferenceToken(Weak<Inner>);

impl ReferenceToken {
    /// Creates a token whose `action` runs once when the last strong clone
    /// is dropped.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self(Arc::new(Inner {
            action: Mutex::new(Some(Box::new(action))),
            release_signal: Arc::new(ReleaseSignal::default()),
        }))
    }

    /// A token whose action does nothing, for call sites that need a token
    /// but have no teardown work to schedule (e.g. tests).
    pub fn inert() -> Self {
        Self::new(|| {})
    }

    /// Derives a weak handle that callbacks can safely hold across the
    /// connector's lifetime.
    pub fn downgrade(&self) -> WeakReferenceToken {
        WeakReferenceToken(Arc::downgrade(&self.0))
    }

    /// Blocks the calling thread until every strong clone of this token
    /// (including ones derived before this call) has been dropped and the
    /// completion action has run.
    ///
    /// Used by a server-connector's disable/drop path, which blocks on the
    /// listen-endpoint's reference token until all in-flight messages
    /// complete.
    pub fn wait_for_release(self) {
        // Clone the signal out from under `Inner` before dropping our own
        // strong ref: `Inner` itself must be allowed to reach a strong count
        // of zero for its `Drop` to fire, so nothing held across the wait
        // may keep it alive.
        let release_signal = self.0.release_signal.clone();
        drop(self);
        let mut released = release_signal.released.lock().unwrap();
        while !*released {
            released = release_signal.released_cond.wait(released).unwrap();
        }
    }

    /// The number of strong holders currently alive, including this one.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl WeakReferenceToken {
    /// Attempts to recover a strong token. Returns `None` once the last
    /// strong holder has already been dropped.
    pub fn upgrade(&self) -> Option<ReferenceToken> {
        self.0.upgrade().map(ReferenceToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn action_runs_once_last_clone_drops() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let token = ReferenceToken::new(move || fired_clone.store(true, Ordering::SeqCst));
        let second = token.clone();
        assert!(!fired.load(Ordering::SeqCst));
        drop(token);
        assert!(!fired.load(Ordering::SeqCst));
        drop(second);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn weak_upgrade_fails_after_release() {
        let token = ReferenceToken::new(|| {});
        let weak = token.downgrade();
        assert!(weak.upgrade().is_some());
        drop(token);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn wait_for_release_unblocks_on_drop() {
        let token = ReferenceToken::new(|| {});
        let waiter = token.clone();
        let handle = std::thread::spawn(move || waiter.wait_for_release());
        drop(token);
        handle.join().unwrap();
    }

    #[test]
    fn wait_for_release_on_the_only_clone_returns_immediately() {
        // Regression test: `wait_for_release` must not itself keep `Inner`
        // alive while it blocks, or the last clone can never actually
        // become the last clone.
        let token = ReferenceToken::new(|| {});
        token.wait_for_release();
    }
}
