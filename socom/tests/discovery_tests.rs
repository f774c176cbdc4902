// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integration tests for `subscribe_find_service`: the change-based variant
//! and the legacy set-based variant, including concurrent-registration
//! snapshot isolation between two differently-filtered legacy subscriptions.

use std::sync::{Arc, Mutex};
use std::thread;

use socom::prelude::*;

fn no_op_server_callbacks() -> ServerCallbacks {
    ServerCallbacks {
        on_method_call: Box::new(|_id, _payload, _reply, _credentials| {}),
        on_event_subscription_change: Box::new(|_id, _state| {}),
        on_event_update_request: Box::new(|_id| {}),
        on_event_payload_allocate: None,
        on_method_reply_payload_allocate: None,
    }
}

#[test]
fn change_based_discovery_fires_added_for_preexisting_service_and_once_per_transition() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.Discoverable", Version::new(1, 0));
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

    let events: Arc<Mutex<Vec<(ServiceInstance, FindResultStatus)>>> = Arc::new(Mutex::new(Vec::new()));
    let events_cb = events.clone();

    let subscription = runtime.subscribe_find_service_on_change(
        Arc::new(move |_interface, instance, status| {
            events_cb.lock().unwrap().push((instance, status));
        }),
        Some(interface),
        None,
    );

    assert_eq!(
        *events.lock().unwrap(),
        vec![(ServiceInstance::new("a"), FindResultStatus::Added)]
    );

    server.disable();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            (ServiceInstance::new("a"), FindResultStatus::Added),
            (ServiceInstance::new("a"), FindResultStatus::Deleted),
        ]
    );

    drop(subscription);
}

#[test]
fn wildcard_discovery_sees_only_local_services() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.LocalOnly", Version::new(1, 0));
    let instance = ServiceInstance::new("a");

    let events: Arc<Mutex<Vec<ServiceInstance>>> = Arc::new(Mutex::new(Vec::new()));
    let events_cb = events.clone();

    let _subscription = runtime.subscribe_find_service_on_change(
        Arc::new(move |_interface, instance, _status| {
            events_cb.lock().unwrap().push(instance);
        }),
        None,
        None,
    );
    assert!(events.lock().unwrap().is_empty());

    let server = runtime
        .make_server_connector(instance, ServerServiceInterfaceConfiguration::new(interface, 1, 1), no_op_server_callbacks())
        .unwrap()
        .enable()
        .unwrap();

    assert_eq!(*events.lock().unwrap(), vec![ServiceInstance::new("a")]);
    drop(server);
}

#[test]
fn legacy_set_based_discovery_reports_full_set_on_every_change() {
    let runtime = create_runtime();
    let interface = ServiceInterface::new("demo.LegacySet", Version::new(1, 0));

    let snapshots: Arc<Mutex<Vec<Vec<ServiceInstance>>>> = Arc::new(Mutex::new(Vec::new()));
    let snapshots_cb = snapshots.clone();

    let _subscription = runtime.subscribe_find_service_on_set(
        Arc::new(move |set: &[ServiceInstance]| {
            snapshots_cb.lock().unwrap().push(set.to_vec());
        }),
        interface.clone(),
        None,
    );
    assert_eq!(*snapshots.lock().unwrap(), vec![Vec::<ServiceInstance>::new()]);

    let server_a = runtime
        .make_server_connector(
            ServiceInstance::new("a"),
            ServerServiceInterfaceConfiguration::new(interface.clone(), 1, 1),
            no_op_server_callbacks(),
        )
        .unwrap()
        .enable()
        .unwrap();

    let server_b = runtime
        .make_server_connector(
            ServiceInstance::new("b"),
            ServerServiceInterfaceConfiguration::new(interface, 1, 1),
            no_op_server_callbacks(),
        )
        .unwrap()
        .enable()
        .unwrap();

    let last = snapshots.lock().unwrap().last().unwrap().clone();
    assert_eq!(last.len(), 2);
    assert!(last.contains(&ServiceInstance::new("a")));
    assert!(last.contains(&ServiceInstance::new("b")));

    drop(server_a);
    drop(server_b);
}

#[test]
fn two_differently_filtered_legacy_subscriptions_stay_isolated_under_concurrent_registration() {
    let runtime = create_runtime();
    let interface_x = ServiceInterface::new("demo.ConcurrentX", Version::new(1, 0));
    let interface_y = ServiceInterface::new("demo.ConcurrentY", Version::new(1, 0));

    let snapshots_x: Arc<Mutex<Vec<Vec<ServiceInstance>>>> = Arc::new(Mutex::new(Vec::new()));
    let snapshots_x_cb = snapshots_x.clone();
    let snapshots_y: Arc<Mutex<Vec<Vec<ServiceInstance>>>> = Arc::new(Mutex::new(Vec::new()));
    let snapshots_y_cb = snapshots_y.clone();

    let _sub_x = runtime.subscribe_find_service_on_set(
        Arc::new(move |set: &[ServiceInstance]| snapshots_x_cb.lock().unwrap().push(set.to_vec())),
        interface_x.clone(),
        None,
    );
    let _sub_y = runtime.subscribe_find_service_on_set(
        Arc::new(move |set: &[ServiceInstance]| snapshots_y_cb.lock().unwrap().push(set.to_vec())),
        interface_y.clone(),
        None,
    );

    let runtime = Arc::new(runtime);
    const N: usize = 8;
    let mut handles = Vec::new();
    for i in 0..N {
        let runtime = runtime.clone();
        let interface_x = interface_x.clone();
        let interface_y = interface_y.clone();
        handles.push(thread::spawn(move || {
            let server_x = runtime
                .make_server_connector(
                    ServiceInstance::new(format!("x{i}")),
                    ServerServiceInterfaceConfiguration::new(interface_x, 1, 1),
                    no_op_server_callbacks(),
                )
                .unwrap()
                .enable()
                .unwrap();
            let server_y = runtime
                .make_server_connector(
                    ServiceInstance::new(format!("y{i}")),
                    ServerServiceInterfaceConfiguration::new(interface_y, 1, 1),
                    no_op_server_callbacks(),
                )
                .unwrap()
                .enable()
                .unwrap();
            (server_x, server_y)
        }));
    }
    let servers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let final_x = snapshots_x.lock().unwrap().last().unwrap().clone();
    let final_y = snapshots_y.lock().unwrap().last().unwrap().clone();

    assert_eq!(final_x.len(), N);
    assert_eq!(final_y.len(), N);
    for instance in &final_x {
        assert!(instance.as_ref().starts_with('x'), "x-subscription leaked a y-instance: {instance:?}");
    }
    for instance in &final_y {
        assert!(instance.as_ref().starts_with('y'), "y-subscription leaked an x-instance: {instance:?}");
    }

    drop(servers);
}
