use crate::harness::{assert_success, error_id, spawn_adapter, suspended_main_thread, TestAdapter};
use javadbg_vm::{MockFrame, ObjectKind, ObjectRef};
use serde_json::{json, Value};

fn illegal_state(id: u64) -> ObjectRef {
    ObjectRef {
        id,
        type_name: "java.lang.IllegalStateException".to_string(),
        kind: ObjectKind::Plain,
    }
}

async fn running() -> TestAdapter {
    let adapter = spawn_adapter();
    suspended_main_thread(&adapter.vm, vec![MockFrame::new("com.acme.Foo", "run", 12)]);
    adapter.client.initialize_handshake().await;
    adapter.client.launch(&[]).await;
    adapter.client.configuration_done().await;
    adapter
}

#[tokio::test]
async fn describes_the_exception_a_thread_stopped_on() {
    let adapter = running().await;
    let client = &adapter.client;
    adapter
        .vm
        .set_to_string(40, "java.lang.IllegalStateException: closed");

    adapter.vm.throw_exception(1, illegal_state(40), true);
    let evt = client.wait_for_stopped_reason("exception").await;
    assert_eq!(evt.pointer("/body/threadId"), Some(&json!(1)));

    let resp = client.request("exceptionInfo", json!({ "threadId": 1 })).await;
    assert_success(&resp);
    assert_eq!(
        resp.pointer("/body/exceptionId"),
        Some(&json!("java.lang.IllegalStateException"))
    );
    assert_eq!(
        resp.pointer("/body/description"),
        Some(&json!("java.lang.IllegalStateException: closed"))
    );
    assert_eq!(resp.pointer("/body/breakMode"), Some(&json!("userUnhandled")));

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn caught_exceptions_fall_back_to_the_type_name() {
    let adapter = running().await;
    let client = &adapter.client;

    // No toString() result configured, so the invocation fails.
    adapter.vm.throw_exception(1, illegal_state(41), false);
    client.wait_for_stopped_reason("exception").await;

    let resp = client.request("exceptionInfo", json!({ "threadId": 1 })).await;
    assert_success(&resp);
    assert_eq!(
        resp.pointer("/body/description"),
        Some(&json!("java.lang.IllegalStateException"))
    );
    assert_eq!(resp.pointer("/body/breakMode"), Some(&json!("always")));

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn resumed_threads_and_unknown_threads_have_no_exception() {
    let adapter = running().await;
    let client = &adapter.client;

    let resp = client.request("exceptionInfo", json!({ "threadId": 1 })).await;
    assert_eq!(error_id(&resp), Some(1018), "{resp}");
    assert_eq!(
        resp.get("message").and_then(Value::as_str),
        Some("No exception exists in thread 1")
    );

    adapter.vm.throw_exception(1, illegal_state(42), true);
    client.wait_for_stopped_reason("exception").await;
    client.continue_with_thread_id(Some(1)).await;
    let resp = client.request("exceptionInfo", json!({ "threadId": 1 })).await;
    assert_eq!(error_id(&resp), Some(1018), "{resp}");

    let resp = client.request("exceptionInfo", json!({ "threadId": 99 })).await;
    assert_eq!(error_id(&resp), Some(1018), "{resp}");
    assert_eq!(
        resp.get("message").and_then(Value::as_str),
        Some("Thread 99 doesn't exist.")
    );

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}
