// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The service registry (database): a per-`(interface, instance)` record
//! holding at most one server slot and the list of clients waiting on it.
//!
//! Keys collate on interface id and *major* version only — a minor-version-
//! ignoring comparator — so that any client/server pair sharing an id and
//! major land in the same record and get a chance to be checked for
//! compatibility.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use socom_log::debug;

use crate::endpoint::ListenEndpoint;
use crate::error::ConstructionError;
use crate::service_interface::{is_compatible, ServiceInstance, ServiceInterface};

type RecordKey = (String, u16, String);

fn record_key(interface: &ServiceInterface, instance: &ServiceInstance) -> RecordKey {
    (
        interface.id().to_string(),
        interface.version().major,
        instance.as_ref().to_string(),
    )
}

/// Invoked when the server slot a client is waiting on changes.
///
/// `Some((listen_endpoint, server_interface))` on a compatible server
/// becoming available; `None` on that server departing.
pub type ServerUpdateCallback =
    Arc<dyn Fn(Option<(ListenEndpoint, ServiceInterface)>) + Send + Sync>;

/// Invoked on every local service add/remove matching a discovery
/// subscription's filter.
pub type ChangeCallback = Arc<dyn Fn(ServiceInterface, ServiceInstance, bool) + Send + Sync>;

struct ClientWaiter {
    id: u64,
    interface: ServiceInterface,
    on_server_update: ServerUpdateCallback,
}

struct ServerSlot {
    interface: ServiceInterface,
    listen_endpoint: ListenEndpoint,
}

#[derive(Default)]
struct ServiceRecord {
    server_slot: Option<ServerSlot>,
    clients: Vec<ClientWaiter>,
}

struct ChangeSubscription {
    filter_interface_id: Option<String>,
    filter_instance: Option<ServiceInstance>,
    callback: ChangeCallback,
}

impl ChangeSubscription {
    fn matches(&self, interface: &ServiceInterface, instance: &ServiceInstance) -> bool {
        if let Some(id) = &self.filter_interface_id {
            if id != interface.id() {
                return false;
            }
        }
        if let Some(wanted) = &self.filter_instance {
            if wanted != instance {
                return false;
            }
        }
        true
    }
}

/// The process-wide service database.
#[derive(Default)]
pub struct ServiceRegistry {
    records: Mutex<HashMap<RecordKey, ServiceRecord>>,
    next_client_id: AtomicU64,
    next_subscription_id: AtomicU64,
    change_subscribers: Mutex<HashMap<u64, ChangeSubscription>>,
}

/// A scoped client registration; removes the client's waiter entry from its
/// record on drop.
pub struct ClientRegistration {
    registry: Arc<ServiceRegistry>,
    key: RecordKey,
    client_id: u64,
}

impl Drop for ClientRegistration {
    fn drop(&mut self) {
        let mut records = self.registry.records.lock().unwrap();
        if let Some(record) = records.get_mut(&self.key) {
            record.clients.retain(|c| c.id != self.client_id);
        }
    }
}

/// A scoped server registration; clears the record's server slot and
/// notifies waiting clients (with `None`) on drop.
pub struct ServerRegistration {
    registry: Arc<ServiceRegistry>,
    key: RecordKey,
    interface: ServiceInterface,
    instance: ServiceInstance,
}

impl Drop for ServerRegistration {
    fn drop(&mut self) {
        let waiters = {
            let mut records = self.registry.records.lock().unwrap();
            let Some(record) = records.get_mut(&self.key) else {
                return;
            };
            record.server_slot = None;
            record
                .clients
                .iter()
                .filter(|c| is_compatible(&c.interface, &self.interface))
                .map(|c| c.on_server_update.clone())
                .collect::<Vec<_>>()
        };
        for callback in waiters {
            callback(None);
        }
        self.registry
            .notify_discovery(&self.interface, &self.instance, false);
    }
}

impl ServiceRegistry {
    /// Builds an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a waiting client under `(interface, instance)`. If a
    /// compatible server is already enabled, `on_server_update` fires
    /// immediately (after the registry lock is released).
    pub fn register_client(
        self: &Arc<Self>,
        interface: ServiceInterface,
        instance: ServiceInstance,
        on_server_update: ServerUpdateCallback,
    ) -> ClientRegistration {
        let key = record_key(&interface, &instance);
        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);

        let immediate = {
            let mut records = self.records.lock().unwrap();
            let record = records.entry(key.clone()).or_default();
            record.clients.push(ClientWaiter {
                id: client_id,
                interface: interface.clone(),
                on_server_update: on_server_update.clone(),
            });
            record.server_slot.as_ref().and_then(|slot| {
                if is_compatible(&interface, &slot.interface) {
                    Some((slot.listen_endpoint.clone(), slot.interface.clone()))
                } else {
                    if slot.interface.id() == interface.id()
                        && slot.interface.version().major == interface.version().major
                    {
                        debug!("minor version incompatible for service ({}, {})", interface.id(), instance.as_ref());
                    }
                    None
                }
            })
        };

        if let Some(found) = immediate {
            on_server_update(Some(found));
        }

        ClientRegistration {
            registry: self.clone(),
            key,
            client_id,
        }
    }

    /// Registers an enabled server under `(interface, instance)`. Fails with
    /// [`ConstructionError::DuplicateService`] if the slot is already taken.
    pub fn register_server(
        self: &Arc<Self>,
        interface: ServiceInterface,
        instance: ServiceInstance,
        listen_endpoint: ListenEndpoint,
    ) -> Result<ServerRegistration, ConstructionError> {
        let key = record_key(&interface, &instance);

        let waiters = {
            let mut records = self.records.lock().unwrap();
            let record = records.entry(key.clone()).or_default();
            if record.server_slot.is_some() {
                return Err(ConstructionError::DuplicateService);
            }
            record.server_slot = Some(ServerSlot {
                interface: interface.clone(),
                listen_endpoint: listen_endpoint.clone(),
            });
            record
                .clients
                .iter()
                .filter(|c| is_compatible(&c.interface, &interface))
                .map(|c| c.on_server_update.clone())
                .collect::<Vec<_>>()
        };

        for callback in waiters {
            callback(Some((listen_endpoint.clone(), interface.clone())));
        }
        self.notify_discovery(&interface, &instance, true);

        Ok(ServerRegistration {
            registry: self.clone(),
            key,
            interface,
            instance,
        })
    }

    /// Whether some enabled server is registered under an interface sharing
    /// `client_interface`'s id/major and compatible minor, for `instance`.
    pub fn has_compatible_local_server(
        &self,
        client_interface: &ServiceInterface,
        instance: &ServiceInstance,
    ) -> bool {
        let key = record_key(client_interface, instance);
        self.records
            .lock()
            .unwrap()
            .get(&key)
            .and_then(|r| r.server_slot.as_ref())
            .is_some_and(|slot| is_compatible(client_interface, &slot.interface))
    }

    /// All currently-enabled local services matching an optional interface
    /// id and instance filter, for discovery's initial snapshot.
    pub fn snapshot_local_services(
        &self,
        filter_interface_id: Option<&str>,
        filter_instance: Option<&ServiceInstance>,
    ) -> Vec<(ServiceInterface, ServiceInstance)> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|((id, _major, instance), record)| {
                let slot = record.server_slot.as_ref()?;
                if let Some(wanted) = filter_interface_id {
                    if wanted != id {
                        return None;
                    }
                }
                let instance_key = ServiceInstance::new(instance.clone());
                if let Some(wanted) = filter_instance {
                    if wanted != &instance_key {
                        return None;
                    }
                }
                Some((slot.interface.clone(), instance_key))
            })
            .collect()
    }

    /// Subscribes to local add/remove events matching the given filter.
    /// Returns a subscription id to pass to [`Self::unsubscribe_changes`].
    pub fn subscribe_changes(
        &self,
        filter_interface_id: Option<String>,
        filter_instance: Option<ServiceInstance>,
        callback: ChangeCallback,
    ) -> u64 {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        self.change_subscribers.lock().unwrap().insert(
            id,
            ChangeSubscription {
                filter_interface_id,
                filter_instance,
                callback,
            },
        );
        id
    }

    /// Removes a subscription installed by [`Self::subscribe_changes`].
    pub fn unsubscribe_changes(&self, id: u64) {
        self.change_subscribers.lock().unwrap().remove(&id);
    }

    fn notify_discovery(&self, interface: &ServiceInterface, instance: &ServiceInstance, added: bool) {
        let matching: Vec<_> = self
            .change_subscribers
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.matches(interface, instance))
            .map(|s| s.callback.clone())
            .collect();
        for callback in matching {
            callback(interface.clone(), instance.clone(), added);
        }
    }
}
