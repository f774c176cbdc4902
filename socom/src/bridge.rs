// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bridge forwarding: lets external transports contribute remotely-found
//! services to discovery, and receive requests to go find a service a local
//! client couldn't locate.
//!
//! A bridge registers two functions: one to subscribe for finds of a given
//! (or any) interface/instance, one to request that a specific service be
//! actively sought. Both are invoked outside the hub's own lock — bridge
//! code is arbitrary and may itself call back into the runtime — so every
//! registration/request converges via a snapshot-unlock-invoke-relock-merge
//! loop that terminates once a round adds nothing new, rather than holding
//! the lock across a user call.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::service_interface::{ClientServiceInterfaceConfiguration, ServiceInstance, ServiceInterface};

/// Opaque equality token identifying one registered bridge, used to suppress
/// forwarding a find result back to the very bridge that reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeIdentity(u64);

/// Reports one bridge-discovered service add/remove to whoever subscribed.
pub type BridgeFindCallback = Arc<dyn Fn(ServiceInterface, ServiceInstance, bool) + Send + Sync>;

/// A bridge's `subscribe_find_service` entry point: given a callback and an
/// optional interface/instance filter, returns an opaque handle the hub
/// holds for as long as the forwarded subscription should stay active.
pub type SubscribeFindServiceFn =
    Arc<dyn Fn(BridgeFindCallback, ServiceInterface, Option<ServiceInstance>) -> Box<dyn Any + Send> + Send + Sync>;

/// A bridge's `request_service` entry point: asks the bridge to actively
/// seek a service matching `(configuration, instance)`, returning an opaque
/// handle the hub holds for as long as some local client still needs it.
pub type RequestServiceFn =
    Arc<dyn Fn(ClientServiceInterfaceConfiguration, ServiceInstance) -> Box<dyn Any + Send> + Send + Sync>;

type RequestKey = (ClientServiceInterfaceConfiguration, ServiceInstance);

struct RegisteredBridge {
    identity: BridgeIdentity,
    subscribe_find_service: SubscribeFindServiceFn,
    request_service: RequestServiceFn,
}

struct ActiveRequest {
    configuration: ClientServiceInterfaceConfiguration,
    instance: ServiceInstance,
    refs: usize,
    handles: HashMap<u64, Box<dyn Any + Send>>,
}

struct ActiveFindSubscription {
    interface: ServiceInterface,
    instance: Option<ServiceInstance>,
    owner: Option<BridgeIdentity>,
    on_change: BridgeFindCallback,
    handles: HashMap<u64, Box<dyn Any + Send>>,
}

#[derive(Default)]
struct BridgeHubState {
    bridges: HashMap<u64, RegisteredBridge>,
    requests: HashMap<RequestKey, ActiveRequest>,
    find_subscriptions: HashMap<u64, ActiveFindSubscription>,
}

/// The process-wide bridge registry and forwarding engine.
#[derive(Default)]
pub struct BridgeHub {
    state: Mutex<BridgeHubState>,
    next_bridge_id: AtomicU64,
    next_subscription_id: AtomicU64,
}

/// A scoped bridge registration; unregisters (and releases every handle the
/// bridge was given) on drop.
pub struct BridgeRegistration {
    hub: Arc<BridgeHub>,
    id: u64,
    identity: BridgeIdentity,
}

impl BridgeRegistration {
    /// The identity this registration was assigned, for filtering
    /// self-originated find results out of a forwarded subscription.
    pub fn identity(&self) -> BridgeIdentity {
        self.identity
    }
}

impl Drop for BridgeRegistration {
    fn drop(&mut self) {
        self.hub.unregister_bridge(self.id);
    }
}

/// A scoped bridge request; releases the request (and, once no other client
/// shares it, every bridge's handle for it) on drop.
pub struct BridgeRequestLease {
    hub: Arc<BridgeHub>,
    key: RequestKey,
}

impl Drop for BridgeRequestLease {
    fn drop(&mut self) {
        self.hub.release_request(&self.key);
    }
}

/// A scoped find-service forwarding lease; releases the subscription (and
/// every bridge's handle for it) on drop.
pub struct BridgeFindSubscriptionLease {
    hub: Arc<BridgeHub>,
    id: u64,
}

impl Drop for BridgeFindSubscriptionLease {
    fn drop(&mut self) {
        self.hub.release_find_subscription(self.id);
    }
}

impl BridgeHub {
    /// Builds an empty bridge hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a bridge. Every currently active request and find
    /// subscription (other than ones this bridge itself owns) is forwarded
    /// to it immediately.
    pub fn register_bridge(
        self: &Arc<Self>,
        subscribe_find_service: SubscribeFindServiceFn,
        request_service: RequestServiceFn,
    ) -> BridgeRegistration {
        let bridge_id = self.next_bridge_id.fetch_add(1, Ordering::Relaxed);
        let identity = BridgeIdentity(bridge_id);
        {
            let mut state = self.state.lock().unwrap();
            state.bridges.insert(
                bridge_id,
                RegisteredBridge {
                    identity,
                    subscribe_find_service: subscribe_find_service.clone(),
                    request_service: request_service.clone(),
                },
            );
        }
        self.converge_requests_for_bridge(bridge_id, &request_service);
        self.converge_subscriptions_for_bridge(bridge_id, &subscribe_find_service);
        BridgeRegistration { hub: self.clone(), id: bridge_id, identity }
    }

    fn unregister_bridge(&self, bridge_id: u64) {
        let mut state = self.state.lock().unwrap();
        state.bridges.remove(&bridge_id);
        for request in state.requests.values_mut() {
            request.handles.remove(&bridge_id);
        }
        for subscription in state.find_subscriptions.values_mut() {
            subscription.handles.remove(&bridge_id);
        }
    }

    /// Asks every registered bridge to actively seek `(configuration,
    /// instance)`. Reference-counted: concurrent requests for the same key
    /// share one set of bridge-side handles.
    pub fn request_service(
        self: &Arc<Self>,
        configuration: ClientServiceInterfaceConfiguration,
        instance: ServiceInstance,
    ) -> BridgeRequestLease {
        let key = (configuration.clone(), instance.clone());
        {
            let mut state = self.state.lock().unwrap();
            let entry = state.requests.entry(key.clone()).or_insert_with(|| ActiveRequest {
                configuration,
                instance,
                refs: 0,
                handles: HashMap::new(),
            });
            entry.refs += 1;
        }
        self.converge_bridges_for_request(&key);
        BridgeRequestLease { hub: self.clone(), key }
    }

    fn release_request(&self, key: &RequestKey) {
        let mut state = self.state.lock().unwrap();
        if let Some(request) = state.requests.get_mut(key) {
            request.refs -= 1;
            if request.refs == 0 {
                state.requests.remove(key);
            }
        }
    }

    /// Forwards find-service subscriptions for a concrete (non-wildcard)
    /// `interface` to every registered bridge other than `owner` (the bridge
    /// that originated this subscription, if any — suppresses report loops).
    pub fn subscribe_find_service(
        self: &Arc<Self>,
        interface: ServiceInterface,
        instance: Option<ServiceInstance>,
        owner: Option<BridgeIdentity>,
        on_change: BridgeFindCallback,
    ) -> BridgeFindSubscriptionLease {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.state.lock().unwrap();
            state.find_subscriptions.insert(
                id,
                ActiveFindSubscription {
                    interface,
                    instance,
                    owner,
                    on_change,
                    handles: HashMap::new(),
                },
            );
        }
        self.converge_bridges_for_subscription(id);
        BridgeFindSubscriptionLease { hub: self.clone(), id }
    }

    fn release_find_subscription(&self, id: u64) {
        self.state.lock().unwrap().find_subscriptions.remove(&id);
    }

    /// Snapshot-unlock-invoke-relock-merge loop: asks `bridge_id`'s
    /// `request_service` for every active request it hasn't been asked
    /// about yet, repeating until a round finds nothing new (a concurrent
    /// `request_service` call racing this registration is the only way a
    /// round can add something; once both sides converge, it stops).
    fn converge_requests_for_bridge(&self, bridge_id: u64, request_service: &RequestServiceFn) {
        loop {
            let pending: Vec<RequestKey> = {
                let state = self.state.lock().unwrap();
                state
                    .requests
                    .iter()
                    .filter(|(_, r)| !r.handles.contains_key(&bridge_id))
                    .map(|(k, _)| k.clone())
                    .collect()
            };
            if pending.is_empty() {
                break;
            }
            let mut new_handles = Vec::with_capacity(pending.len());
            for key in &pending {
                new_handles.push((key.clone(), request_service(key.0.clone(), key.1.clone())));
            }
            let mut state = self.state.lock().unwrap();
            for (key, handle) in new_handles {
                if let Some(request) = state.requests.get_mut(&key) {
                    request.handles.entry(bridge_id).or_insert(handle);
                }
            }
        }
    }

    fn converge_subscriptions_for_bridge(&self, bridge_id: u64, subscribe_find_service: &SubscribeFindServiceFn) {
        loop {
            let pending: Vec<(u64, ServiceInterface, Option<ServiceInstance>, BridgeFindCallback)> = {
                let state = self.state.lock().unwrap();
                state
                    .find_subscriptions
                    .iter()
                    .filter(|(id, s)| !s.handles.contains_key(&bridge_id) && s.owner != Some(BridgeIdentity(bridge_id)))
                    .map(|(id, s)| (*id, s.interface.clone(), s.instance.clone(), s.on_change.clone()))
                    .collect()
            };
            if pending.is_empty() {
                break;
            }
            let mut new_handles = Vec::with_capacity(pending.len());
            for (id, interface, instance, on_change) in pending {
                let handle = subscribe_find_service(on_change, interface, instance);
                new_handles.push((id, handle));
            }
            let mut state = self.state.lock().unwrap();
            for (id, handle) in new_handles {
                if let Some(subscription) = state.find_subscriptions.get_mut(&id) {
                    subscription.handles.entry(bridge_id).or_insert(handle);
                }
            }
        }
    }

    fn converge_bridges_for_request(&self, key: &RequestKey) {
        loop {
            let pending: Vec<(u64, RequestServiceFn)> = {
                let state = self.state.lock().unwrap();
                let Some(request) = state.requests.get(key) else {
                    return;
                };
                state
                    .bridges
                    .iter()
                    .filter(|(bid, _)| !request.handles.contains_key(*bid))
                    .map(|(bid, b)| (*bid, b.request_service.clone()))
                    .collect()
            };
            if pending.is_empty() {
                break;
            }
            let (configuration, instance) = {
                let state = self.state.lock().unwrap();
                let Some(request) = state.requests.get(key) else {
                    return;
                };
                (request.configuration.clone(), request.instance.clone())
            };
            let mut new_handles = Vec::with_capacity(pending.len());
            for (bridge_id, request_service) in pending {
                new_handles.push((bridge_id, request_service(configuration.clone(), instance.clone())));
            }
            let mut state = self.state.lock().unwrap();
            if let Some(request) = state.requests.get_mut(key) {
                for (bridge_id, handle) in new_handles {
                    request.handles.entry(bridge_id).or_insert(handle);
                }
            }
        }
    }

    fn converge_bridges_for_subscription(&self, id: u64) {
        loop {
            let pending: Vec<(u64, SubscribeFindServiceFn)> = {
                let state = self.state.lock().unwrap();
                let Some(subscription) = state.find_subscriptions.get(&id) else {
                    return;
                };
                state
                    .bridges
                    .iter()
                    .filter(|(bid, b)| {
                        !subscription.handles.contains_key(*bid) && subscription.owner != Some(b.identity)
                    })
                    .map(|(bid, b)| (*bid, b.subscribe_find_service.clone()))
                    .collect()
            };
            if pending.is_empty() {
                break;
            }
            let (interface, instance, on_change) = {
                let state = self.state.lock().unwrap();
                let Some(subscription) = state.find_subscriptions.get(&id) else {
                    return;
                };
                (
                    subscription.interface.clone(),
                    subscription.instance.clone(),
                    subscription.on_change.clone(),
                )
            };
            let mut new_handles = Vec::with_capacity(pending.len());
            for (bridge_id, subscribe_find_service) in pending {
                new_handles.push((
                    bridge_id,
                    subscribe_find_service(on_change.clone(), interface.clone(), instance.clone()),
                ));
            }
            let mut state = self.state.lock().unwrap();
            if let Some(subscription) = state.find_subscriptions.get_mut(&id) {
                for (bridge_id, handle) in new_handles {
                    subscription.handles.entry(bridge_id).or_insert(handle);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service_interface::Version;
    use std::sync::atomic::AtomicUsize;

    fn iface() -> ServiceInterface {
        ServiceInterface::new("demo.Echo", Version::new(1, 0))
    }

    #[test]
    fn request_service_reaches_bridges_registered_before_and_after() {
        let hub = BridgeHub::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen1 = seen.clone();
        let request_fn: RequestServiceFn = Arc::new(move |_config, _instance| {
            seen1.fetch_add(1, Ordering::SeqCst);
            Box::new(())
        });
        let subscribe_fn: SubscribeFindServiceFn = Arc::new(|_cb, _iface, _inst| Box::new(()));
        let _reg = hub.register_bridge(subscribe_fn.clone(), request_fn.clone());

        let config = ClientServiceInterfaceConfiguration::new(iface(), 1, 1);
        let _lease = hub.request_service(config, ServiceInstance::new("a"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        let seen2 = seen.clone();
        let request_fn2: RequestServiceFn = Arc::new(move |_config, _instance| {
            seen2.fetch_add(1, Ordering::SeqCst);
            Box::new(())
        });
        let _reg2 = hub.register_bridge(subscribe_fn, request_fn2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn find_subscription_excludes_owning_bridge() {
        let hub = BridgeHub::new();
        let called = Arc::new(AtomicUsize::new(0));
        let called1 = called.clone();
        let subscribe_fn: SubscribeFindServiceFn = Arc::new(move |_cb, _iface, _inst| {
            called1.fetch_add(1, Ordering::SeqCst);
            Box::new(())
        });
        let request_fn: RequestServiceFn = Arc::new(|_c, _i| Box::new(()));
        let registration = hub.register_bridge(subscribe_fn, request_fn);

        let _lease = hub.subscribe_find_service(
            iface(),
            None,
            Some(registration.identity()),
            Arc::new(|_i, _inst, _added| {}),
        );
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }
}
