// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integration tests for method-call dispatch, the reply path, and
//! cancellation-vs-reply race safety.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use socom::prelude::*;

fn client_callbacks() -> ClientCallbacks {
    ClientCallbacks {
        on_service_state_change: Box::new(|_available, _config| {}),
        on_event_update: Box::new(|_id, _payload| {}),
        on_event_requested_update: Box::new(|_id, _payload| {}),
        on_event_payload_allocate: Box::new(|_id| Payload::empty()),
    }
}

#[test]
fn method_call_reply_is_delivered_exactly_once() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("TestInterface1", Version::new(1, 2));
    let instance = ServiceInstance::new("TestInterface1");

    let received_call = Arc::new(Mutex::new(Vec::new()));
    let received_call_cb = received_call.clone();

    let _server = runtime
        .make_server_connector(
            instance.clone(),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 2, 3),
            ServerCallbacks {
                on_method_call: Box::new(move |id, payload, reply, _credentials| {
                    received_call_cb.lock().unwrap().push((id, payload.data().to_vec()));
                    if let Some(reply) = reply {
                        reply.reply(MethodResult::ApplicationReturn { payload: Payload::empty() });
                    }
                }),
                on_event_subscription_change: Box::new(|_id, _state| {}),
                on_event_update_request: Box::new(|_id| {}),
                on_event_payload_allocate: None,
                on_method_reply_payload_allocate: None,
            },
        )
        .unwrap()
        .enable()
        .unwrap();

    let client = runtime
        .make_client_connector(instance, ClientServiceInterfaceConfiguration::new(interface, 2, 3), client_callbacks())
        .unwrap();

    let reply_count = Arc::new(AtomicUsize::new(0));
    let reply_count_cb = reply_count.clone();
    let last_reply = Arc::new(Mutex::new(None));
    let last_reply_cb = last_reply.clone();

    let handle = client
        .call_method(
            1,
            Payload::empty(),
            Some(Box::new(move |result| {
                reply_count_cb.fetch_add(1, Ordering::SeqCst);
                *last_reply_cb.lock().unwrap() = Some(result);
            })),
        )
        .unwrap();

    assert_eq!(received_call.lock().unwrap().len(), 1);
    assert_eq!(reply_count.load(Ordering::SeqCst), 1);
    assert!(matches!(
        last_reply.lock().unwrap().as_ref().unwrap(),
        MethodResult::ApplicationReturn { .. }
    ));

    drop(handle);
}

#[test]
fn call_without_reply_callback_allocates_nothing_and_never_replies() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.FireAndForget", Version::new(1, 0));
    let instance = ServiceInstance::new("a");

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_cb = calls.clone();

    let _server = runtime
        .make_server_connector(
            instance.clone(),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 1, 1),
            ServerCallbacks {
                on_method_call: Box::new(move |_id, _payload, reply, _credentials| {
                    calls_cb.fetch_add(1, Ordering::SeqCst);
                    assert!(reply.is_none());
                }),
                on_event_subscription_change: Box::new(|_id, _state| {}),
                on_event_update_request: Box::new(|_id| {}),
                on_event_payload_allocate: None,
                on_method_reply_payload_allocate: None,
            },
        )
        .unwrap()
        .enable()
        .unwrap();

    let client = runtime
        .make_client_connector(instance, ClientServiceInterfaceConfiguration::new(interface, 1, 1), client_callbacks())
        .unwrap();

    let handle = client.call_method(0, Payload::empty(), None).unwrap();
    assert!(handle.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn dropping_invocation_handle_before_reply_does_not_crash_or_invoke_callback() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.Cancelled", Version::new(1, 0));
    let instance = ServiceInstance::new("a");

    let held_reply: Arc<Mutex<Option<MethodReplySink>>> = Arc::new(Mutex::new(None));
    let held_reply_cb = held_reply.clone();

    let _server = runtime
        .make_server_connector(
            instance.clone(),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 1, 1),
            ServerCallbacks {
                on_method_call: Box::new(move |_id, _payload, reply, _credentials| {
                    *held_reply_cb.lock().unwrap() = reply;
                }),
                on_event_subscription_change: Box::new(|_id, _state| {}),
                on_event_update_request: Box::new(|_id| {}),
                on_event_payload_allocate: None,
                on_method_reply_payload_allocate: None,
            },
        )
        .unwrap()
        .enable()
        .unwrap();

    let client = runtime
        .make_client_connector(instance, ClientServiceInterfaceConfiguration::new(interface, 1, 1), client_callbacks())
        .unwrap();

    let reply_count = Arc::new(AtomicUsize::new(0));
    let reply_count_cb = reply_count.clone();

    let handle = client
        .call_method(0, Payload::empty(), Some(Box::new(move |_result| {
            reply_count_cb.fetch_add(1, Ordering::SeqCst);
        })))
        .unwrap()
        .expect("reply callback supplied");

    drop(handle);

    let sink = held_reply.lock().unwrap().take().expect("server captured the reply sink");
    sink.reply(MethodResult::ApplicationReturn { payload: Payload::empty() });

    assert_eq!(reply_count.load(Ordering::SeqCst), 0);
}

#[test]
fn method_id_out_of_range_is_rejected_without_effect() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.MethodBounds", Version::new(1, 0));
    let instance = ServiceInstance::new("a");

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_cb = calls.clone();

    let _server = runtime
        .make_server_connector(
            instance.clone(),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 1, 1),
            ServerCallbacks {
                on_method_call: Box::new(move |_id, _payload, _reply, _credentials| {
                    calls_cb.fetch_add(1, Ordering::SeqCst);
                }),
                on_event_subscription_change: Box::new(|_id, _state| {}),
                on_event_update_request: Box::new(|_id| {}),
                on_event_payload_allocate: None,
                on_method_reply_payload_allocate: None,
            },
        )
        .unwrap()
        .enable()
        .unwrap();

    let client = runtime
        .make_client_connector(instance, ClientServiceInterfaceConfiguration::new(interface, 1, 1), client_callbacks())
        .unwrap();

    let result = client.call_method(7, Payload::empty(), None);
    assert_eq!(result.err(), Some(RuntimeError::IdOutOfRange));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn get_peer_credentials_reads_the_servers_credentials() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.Creds", Version::new(1, 0));
    let instance = ServiceInstance::new("a");
    let server_credentials = PosixCredentials::new(4242, 99);

    let _server = runtime
        .make_server_connector_with_credentials(
            instance.clone(),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 1, 1),
            ServerCallbacks {
                on_method_call: Box::new(|_id, _payload, _reply, _credentials| {}),
                on_event_subscription_change: Box::new(|_id, _state| {}),
                on_event_update_request: Box::new(|_id| {}),
                on_event_payload_allocate: None,
                on_method_reply_payload_allocate: None,
            },
            server_credentials,
        )
        .unwrap()
        .enable()
        .unwrap();

    let client = runtime
        .make_client_connector(instance, ClientServiceInterfaceConfiguration::new(interface, 1, 1), client_callbacks())
        .unwrap();

    assert_eq!(client.get_peer_credentials().unwrap(), server_credentials);
}
