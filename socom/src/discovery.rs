// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `subscribe_find_service`: discovering services as they come and go,
//! either change-based (an `added`/`deleted` event per service) or, for
//! legacy callers, as a maintained result set.
//!
//! A subscription always watches local services through the registry. If it
//! names a concrete interface (not a wildcard), it is additionally forwarded
//! to every registered bridge, so remotely-discovered services are reported
//! too — a wildcard subscription only ever sees local services, since there
//! is no bounded interface to forward.

use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use crate::bridge::{BridgeFindSubscriptionLease, BridgeHub, BridgeIdentity};
use crate::registry::ServiceRegistry;
use crate::service_interface::{ServiceInstance, ServiceInterface};

/// Whether a find-result callback reports a service coming into existence or
/// going away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindResultStatus {
    /// The service is now available.
    Added,
    /// The service is no longer available.
    Deleted,
}

/// Invoked once per matching service add/remove.
pub type FindResultChangeCallback =
    Arc<dyn Fn(ServiceInterface, ServiceInstance, FindResultStatus) + Send + Sync>;

/// Invoked with the full current result set whenever it changes (legacy).
pub type FindResultCallback = Arc<dyn Fn(&[ServiceInstance]) + Send + Sync>;

/// Serializes a subscription's callback dispatch across threads, while
/// allowing the same thread to re-enter (e.g. a callback that tears down its
/// own subscription) without deadlocking against itself.
struct DispatchGuard {
    lock: Mutex<()>,
    active_thread: Mutex<Option<ThreadId>>,
}

impl DispatchGuard {
    fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            active_thread: Mutex::new(None),
        }
    }

    fn call(&self, f: impl FnOnce()) {
        let current = std::thread::current().id();
        if *self.active_thread.lock().unwrap() == Some(current) {
            f();
            return;
        }
        let _guard = self.lock.lock().unwrap();
        *self.active_thread.lock().unwrap() = Some(current);
        f();
        *self.active_thread.lock().unwrap() = None;
    }
}

/// A scoped find-service subscription. Dropping it stops local notification
/// and, if it forwarded to bridges, releases that forwarding too.
pub struct FindSubscription {
    registry: Arc<ServiceRegistry>,
    registry_subscription_id: u64,
    _bridge_lease: Option<BridgeFindSubscriptionLease>,
}

impl Drop for FindSubscription {
    fn drop(&mut self) {
        self.registry.unsubscribe_changes(self.registry_subscription_id);
    }
}

/// Change-based `subscribe_find_service`: fires an initial `Added` for every
/// currently-known matching service, then one callback per subsequent
/// add/remove. `interface: None` is a wildcard — local services only, no
/// bridge forwarding. `bridge_identity`, if supplied, is excluded from
/// forwarding so a bridge doesn't receive its own reports back.
pub fn subscribe_find_service_on_change(
    registry: &Arc<ServiceRegistry>,
    bridge: &Arc<BridgeHub>,
    on_change: FindResultChangeCallback,
    interface: Option<ServiceInterface>,
    instance: Option<ServiceInstance>,
    bridge_identity: Option<BridgeIdentity>,
) -> FindSubscription {
    let dispatch = Arc::new(DispatchGuard::new());
    let filter_interface_id = interface.as_ref().map(|i| i.id().to_string());

    for (found_interface, found_instance) in
        registry.snapshot_local_services(filter_interface_id.as_deref(), instance.as_ref())
    {
        let cb = on_change.clone();
        dispatch.call(|| cb(found_interface, found_instance, FindResultStatus::Added));
    }

    let cb = on_change.clone();
    let registry_dispatch = dispatch.clone();
    let registry_subscription_id = registry.subscribe_changes(
        filter_interface_id,
        instance.clone(),
        Arc::new(move |found_interface, found_instance, added| {
            let cb = cb.clone();
            let status = if added { FindResultStatus::Added } else { FindResultStatus::Deleted };
            registry_dispatch.call(move || cb(found_interface, found_instance, status));
        }),
    );

    let bridge_lease = interface.map(|concrete_interface| {
        let cb = on_change;
        let bridge_dispatch = dispatch;
        bridge.subscribe_find_service(
            concrete_interface,
            instance,
            bridge_identity,
            Arc::new(move |found_interface, found_instance, added| {
                let cb = cb.clone();
                let status = if added { FindResultStatus::Added } else { FindResultStatus::Deleted };
                bridge_dispatch.call(move || cb(found_interface, found_instance, status));
            }),
        )
    });

    FindSubscription {
        registry: registry.clone(),
        registry_subscription_id,
        _bridge_lease: bridge_lease,
    }
}

/// Legacy set-based `subscribe_find_service`: maintains a snapshot of
/// matching instances and invokes `on_result_set` with the full set whenever
/// it changes (including once, immediately, with the initial snapshot).
/// Unlike the change-based variant, `interface` is always concrete — there
/// is no legacy wildcard form.
pub fn subscribe_find_service_on_set(
    registry: &Arc<ServiceRegistry>,
    bridge: &Arc<BridgeHub>,
    on_result_set: FindResultCallback,
    interface: ServiceInterface,
    instance: Option<ServiceInstance>,
) -> FindSubscription {
    let known: Arc<Mutex<Vec<ServiceInstance>>> = Arc::new(Mutex::new(Vec::new()));
    let dispatch = Arc::new(DispatchGuard::new());

    {
        let mut known_guard = known.lock().unwrap();
        for (_, found_instance) in registry.snapshot_local_services(Some(interface.id()), instance.as_ref()) {
            if !known_guard.contains(&found_instance) {
                known_guard.push(found_instance);
            }
        }
    }
    {
        let snapshot = known.lock().unwrap().clone();
        let cb = on_result_set.clone();
        dispatch.call(move || cb(&snapshot));
    }

    let merge: crate::registry::ChangeCallback = Arc::new(move |_found_interface, found_instance: ServiceInstance, added| {
        let changed_snapshot = {
            let mut known_guard = known.lock().unwrap();
            let changed = if added {
                if known_guard.contains(&found_instance) {
                    false
                } else {
                    known_guard.push(found_instance);
                    true
                }
            } else {
                let before = known_guard.len();
                known_guard.retain(|i| i != &found_instance);
                known_guard.len() != before
            };
            changed.then(|| known_guard.clone())
        };
        if let Some(snapshot) = changed_snapshot {
            let cb = on_result_set.clone();
            dispatch.call(move || cb(&snapshot));
        }
    });

    let registry_subscription_id =
        registry.subscribe_changes(Some(interface.id().to_string()), instance.clone(), merge.clone());

    let bridge_lease = Some(bridge.subscribe_find_service(interface, instance, None, merge));

    FindSubscription {
        registry: registry.clone(),
        registry_subscription_id,
        _bridge_lease: bridge_lease,
    }
}
