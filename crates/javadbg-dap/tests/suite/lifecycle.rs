use std::time::Duration;

use crate::harness::{
    assert_success, error_id, eventually, spawn_adapter, spawn_adapter_with,
    suspended_main_thread,
};
use javadbg_config::AdapterConfig;
use javadbg_vm::{MockCall, MockFrame, VmEvent};
use serde_json::{json, Value};

#[tokio::test]
async fn launch_then_configuration_done_starts_the_debuggee() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    client.initialize_handshake().await;

    client.launch(&[]).await;
    let launches = adapter.manager.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].main_class, "com.acme.Foo");
    assert_eq!(launches[0].classpath, "/work/classes");
    assert!(!adapter.vm.calls().contains(&MockCall::Start));

    client.configuration_done().await;
    let vm = adapter.vm.clone();
    eventually("debuggee start", move || vm.calls().contains(&MockCall::Start)).await;

    client.disconnect().await;
    client.wait_for_event("terminated").await;
    assert!(adapter.vm.calls().contains(&MockCall::Terminate));
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn configuration_done_before_launch_starts_on_launch() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    client.initialize_handshake().await;

    client.configuration_done().await;
    client.launch(&[]).await;
    let vm = adapter.vm.clone();
    eventually("debuggee start", move || vm.calls().contains(&MockCall::Start)).await;

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn launch_failure_reports_error_and_terminates() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    client.initialize_handshake().await;
    adapter.manager.fail_with("no java executable");

    let resp = client
        .request("launch", json!({ "mainClass": "com.acme.Foo" }))
        .await;
    assert_eq!(resp.get("success").and_then(Value::as_bool), Some(false));
    assert_eq!(error_id(&resp), Some(1002), "{resp}");
    let message = resp.get("message").and_then(Value::as_str).unwrap_or_default();
    assert!(message.starts_with("Failed to launch debuggee VM"), "{message}");
    client.wait_for_event("terminated").await;

    // No session was created.
    let stack = client.request("stackTrace", json!({ "threadId": 1 })).await;
    assert_eq!(error_id(&stack), Some(1011));

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn duplicate_launch_is_rejected() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    client.initialize_handshake().await;
    client.launch(&[]).await;

    let resp = client
        .request("launch", json!({ "mainClass": "com.acme.Foo" }))
        .await;
    assert_eq!(error_id(&resp), Some(1002), "{resp}");
    assert_eq!(adapter.manager.launches().len(), 1);

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn attach_uses_configured_timeout_and_detaches_on_disconnect() {
    let config = AdapterConfig {
        attach_timeout_ms: 2_500,
        ..AdapterConfig::default()
    };
    let adapter = spawn_adapter_with(config);
    let client = &adapter.client;
    client.initialize_handshake().await;

    let resp = client
        .request("attach", json!({ "hostName": "localhost", "port": 5005 }))
        .await;
    assert_success(&resp);
    assert_eq!(
        adapter.manager.attaches(),
        vec![("localhost".to_string(), 5005, Duration::from_millis(2_500))]
    );

    client.disconnect().await;
    let calls = adapter.vm.calls();
    assert!(calls.contains(&MockCall::Detach), "{calls:?}");
    assert!(!calls.contains(&MockCall::Terminate), "{calls:?}");
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn attach_failure_names_the_target() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    client.initialize_handshake().await;
    adapter.manager.fail_with("connection refused");

    let resp = client
        .request("attach", json!({ "port": 5005, "timeout": 100 }))
        .await;
    assert_eq!(error_id(&resp), Some(1003), "{resp}");
    let message = resp.get("message").and_then(Value::as_str).unwrap_or_default();
    assert!(message.contains("127.0.0.1:5005"), "{message}");
    assert_eq!(adapter.manager.attaches()[0].2, Duration::from_millis(100));

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn disconnect_can_leave_a_launched_debuggee_running() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    client.initialize_handshake().await;
    client.launch(&[]).await;

    let resp = client
        .request("disconnect", json!({ "terminateDebuggee": false }))
        .await;
    assert_success(&resp);
    assert!(adapter.vm.calls().contains(&MockCall::Detach));
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn debuggee_events_become_notifications() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    suspended_main_thread(&adapter.vm, vec![MockFrame::new("com.acme.Foo", "run", 12)]);
    client.initialize_handshake().await;
    client.launch(&[]).await;
    client.configuration_done().await;

    adapter.vm.emit(VmEvent::ThreadStart { thread_id: 7 });
    let evt = client.wait_for_event("thread").await;
    assert_eq!(evt.pointer("/body/reason"), Some(&json!("started")));
    assert_eq!(evt.pointer("/body/threadId"), Some(&json!(7)));

    adapter.vm.hit_breakpoint(1);
    let evt = client.wait_for_stopped_reason("breakpoint").await;
    assert_eq!(evt.pointer("/body/threadId"), Some(&json!(1)));

    adapter.vm.emit(VmEvent::VmDeath);
    let evt = client.wait_for_event("exited").await;
    assert_eq!(evt.pointer("/body/exitCode"), Some(&json!(0)));

    adapter.vm.emit(VmEvent::VmDisconnect);
    client.wait_for_event("terminated").await;

    // The session is gone once the debuggee disconnects.
    let stack = client.request("stackTrace", json!({ "threadId": 1 })).await;
    assert_eq!(error_id(&stack), Some(1011));

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn debuggee_death_ends_the_session() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    suspended_main_thread(&adapter.vm, vec![MockFrame::new("com.acme.Foo", "run", 12)]);
    client.initialize_handshake().await;
    client.launch(&[]).await;
    client.configuration_done().await;
    let frame_id = client.first_frame_id(1).await;

    adapter.vm.emit(VmEvent::VmDeath);
    client.wait_for_event("exited").await;

    // No disconnect has arrived yet; the dead debuggee is not consulted.
    let calls_before = adapter.vm.calls().len();
    let stack = client.request("stackTrace", json!({ "threadId": 1 })).await;
    assert_eq!(error_id(&stack), Some(1011), "{stack}");
    client.wait_for_event("terminated").await;
    let scopes = client.request("scopes", json!({ "frameId": frame_id })).await;
    assert_eq!(error_id(&scopes), Some(1011), "{scopes}");
    let next = client.request("next", json!({ "threadId": 1 })).await;
    assert_eq!(error_id(&next), Some(1011), "{next}");
    assert_eq!(adapter.vm.calls().len(), calls_before);

    client.disconnect().await;
    assert!(!adapter.vm.calls().contains(&MockCall::Terminate));
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn threads_are_listed_with_their_names() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    adapter.vm.add_thread(1, "main", true);
    adapter.vm.add_thread(2, "worker-1", false);
    client.initialize_handshake().await;
    client.launch(&[]).await;

    let resp = client.request("threads", json!({})).await;
    assert_success(&resp);
    assert_eq!(
        resp.pointer("/body/threads"),
        Some(&json!([
            { "id": 1, "name": "Thread [main]" },
            { "id": 2, "name": "Thread [worker-1]" },
        ]))
    );

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}
