// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integration tests for event subscribe/publish fan-out and the
//! requested-event one-shot semantics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use socom::prelude::*;

fn no_op_server_callbacks() -> ServerCallbacks {
    ServerCallbacks {
        on_method_call: Box::new(|_id, _payload, reply, _credentials| {
            if let Some(reply) = reply {
                reply.reply(MethodResult::ApplicationReturn { payload: Payload::empty() });
            }
        }),
        on_event_subscription_change: Box::new(|_id, _state| {}),
        on_event_update_request: Box::new(|_id| {}),
        on_event_payload_allocate: None,
        on_method_reply_payload_allocate: None,
    }
}

fn client_with_event_capture(
    runtime: &Runtime,
    interface: ServiceInterface,
    instance: ServiceInstance,
) -> (ClientConnector, Arc<Mutex<Vec<(EventId, Vec<u8>)>>>, Arc<Mutex<Vec<(EventId, Vec<u8>)>>>) {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let updates_cb = updates.clone();
    let requested = Arc::new(Mutex::new(Vec::new()));
    let requested_cb = requested.clone();

    let client = runtime
        .make_client_connector(
            instance,
            ClientServiceInterfaceConfiguration::new(interface, 0, 0),
            ClientCallbacks {
                on_service_state_change: Box::new(|_available, _config| {}),
                on_event_update: Box::new(move |id, payload| {
                    updates_cb.lock().unwrap().push((id, payload.data().to_vec()));
                }),
                on_event_requested_update: Box::new(move |id, payload| {
                    requested_cb.lock().unwrap().push((id, payload.data().to_vec()));
                }),
                on_event_payload_allocate: Box::new(|_id| Payload::empty()),
            },
        )
        .unwrap();

    (client, updates, requested)
}

#[test]
fn subscribed_client_receives_exactly_one_update() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("TestInterface1", Version::new(1, 2));
    let instance = ServiceInstance::new("TestInterface1");

    let server = runtime
        .make_server_connector(
            instance.clone(),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 2, 3),
            no_op_server_callbacks(),
        )
        .unwrap()
        .enable()
        .unwrap();

    let (client, updates, _requested) = client_with_event_capture(&runtime, interface, instance);
    client.subscribe_event(2, EventMode::Update).unwrap();

    server.update_event(2, Payload::from_vec(vec![0x01, 0x02, 0x03, 0x04], 0, 0, 4)).unwrap();

    assert_eq!(*updates.lock().unwrap(), vec![(2, vec![0x01, 0x02, 0x03, 0x04])]);
}

#[test]
fn n_subscribed_clients_each_receive_exactly_one_update() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.FanOut", Version::new(1, 0));
    let instance = ServiceInstance::new("a");

    let server = runtime
        .make_server_connector(
            instance.clone(),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 1, 2),
            no_op_server_callbacks(),
        )
        .unwrap()
        .enable()
        .unwrap();

    const N: usize = 5;
    let mut clients = Vec::new();
    let mut capture = Vec::new();
    for _ in 0..N {
        let (client, updates, _) = client_with_event_capture(&runtime, interface.clone(), instance.clone());
        client.subscribe_event(1, EventMode::Update).unwrap();
        clients.push(client);
        capture.push(updates);
    }

    server.update_event(1, Payload::from_vec(vec![7, 7], 0, 0, 2)).unwrap();

    for updates in &capture {
        assert_eq!(*updates.lock().unwrap(), vec![(1, vec![7, 7])]);
    }

    server.disable();

    for client in &clients {
        assert!(!client.is_service_available());
    }
}

#[test]
fn unsubscribed_client_does_not_receive_update() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.Selective", Version::new(1, 0));
    let instance = ServiceInstance::new("a");

    let server = runtime
        .make_server_connector(
            instance.clone(),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 1, 2),
            no_op_server_callbacks(),
        )
        .unwrap()
        .enable()
        .unwrap();

    let (subscribed, subscribed_updates, _) = client_with_event_capture(&runtime, interface.clone(), instance.clone());
    let (_unsubscribed, unsubscribed_updates, _) = client_with_event_capture(&runtime, interface, instance);
    subscribed.subscribe_event(0, EventMode::Update).unwrap();

    server.update_event(0, Payload::empty()).unwrap();

    assert_eq!(subscribed_updates.lock().unwrap().len(), 1);
    assert!(unsubscribed_updates.lock().unwrap().is_empty());
}

#[test]
fn subscribe_with_update_and_initial_value_triggers_one_update_request() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.Requested", Version::new(1, 0));
    let instance = ServiceInstance::new("a");

    let requests = Arc::new(Mutex::new(Vec::new()));
    let requests_cb = requests.clone();

    let server = runtime
        .make_server_connector(
            instance.clone(),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 1, 1),
            ServerCallbacks {
                on_method_call: Box::new(|_id, _payload, _reply, _credentials| {}),
                on_event_subscription_change: Box::new(|_id, _state| {}),
                on_event_update_request: Box::new(move |id| {
                    requests_cb.lock().unwrap().push(id);
                }),
                on_event_payload_allocate: None,
                on_method_reply_payload_allocate: None,
            },
        )
        .unwrap()
        .enable()
        .unwrap();

    let (client, _updates, requested) = client_with_event_capture(&runtime, interface, instance);
    client.subscribe_event(0, EventMode::UpdateAndInitialValue).unwrap();

    assert_eq!(*requests.lock().unwrap(), vec![0]);

    server.update_requested_event(0, Payload::from_vec(vec![9], 0, 0, 1)).unwrap();
    assert_eq!(*requested.lock().unwrap(), vec![(0, vec![9])]);

    drop(client);
}

#[test]
fn requester_set_is_cleared_after_update_requested_event() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.OneShot", Version::new(1, 0));
    let instance = ServiceInstance::new("a");

    let server = runtime
        .make_server_connector(
            instance.clone(),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 1, 1),
            no_op_server_callbacks(),
        )
        .unwrap()
        .enable()
        .unwrap();

    let (client, _updates, requested) = client_with_event_capture(&runtime, interface, instance);
    client.request_event_update(0).unwrap();

    server.update_requested_event(0, Payload::from_vec(vec![1], 0, 0, 1)).unwrap();
    assert_eq!(requested.lock().unwrap().len(), 1);

    // Second publication must not re-deliver to the now-cleared requester set.
    server.update_requested_event(0, Payload::from_vec(vec![2], 0, 0, 1)).unwrap();
    assert_eq!(requested.lock().unwrap().len(), 1);
}

#[test]
fn event_id_out_of_range_is_rejected_without_effect() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.Bounded", Version::new(1, 0));
    let instance = ServiceInstance::new("a");

    let server = runtime
        .make_server_connector(
            instance.clone(),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 1, 1),
            no_op_server_callbacks(),
        )
        .unwrap()
        .enable()
        .unwrap();

    let (client, _updates, _requested) = client_with_event_capture(&runtime, interface, instance);
    assert_eq!(client.subscribe_event(1, EventMode::Update), Err(RuntimeError::IdOutOfRange));
    assert_eq!(client.unsubscribe_event(5), Err(RuntimeError::IdOutOfRange));
    assert_eq!(client.request_event_update(99), Err(RuntimeError::IdOutOfRange));
    assert_eq!(server.update_event(1, Payload::empty()), Err(ServerLogicError::IdOutOfRange));
}

#[test]
fn service_not_available_before_wiring_rejects_operations() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.NoServer", Version::new(1, 0));
    let instance = ServiceInstance::new("a");

    let (client, _updates, _requested) = client_with_event_capture(&runtime, interface, instance);
    assert_eq!(client.subscribe_event(0, EventMode::Update), Err(RuntimeError::ServiceNotAvailable));
}
