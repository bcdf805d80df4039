use std::collections::BTreeSet;

use crate::harness::{assert_success, error_id, spawn_adapter};
use javadbg_vm::VmEvent;
use serde_json::{json, Value};

#[tokio::test]
async fn unknown_command_is_rejected_and_connection_stays_usable() {
    let adapter = spawn_adapter();
    let client = &adapter.client;

    let resp = client.request("frobnicate", json!({ "x": 1 })).await;
    assert_eq!(resp.get("success").and_then(Value::as_bool), Some(false));
    assert_eq!(error_id(&resp), Some(1001), "{resp}");
    assert_eq!(
        resp.get("command").and_then(Value::as_str),
        Some("frobnicate")
    );

    client.initialize_handshake().await;
    let threads = client.request("threads", json!({})).await;
    assert_success(&threads);

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn outbound_seq_starts_at_one_and_increases() {
    let adapter = spawn_adapter();
    let client = &adapter.client;

    let seq = client
        .send_request("initialize", json!({ "adapterID": "java" }))
        .await;
    let resp = client.wait_for_response(seq).await;
    let initialized = client.wait_for_event("initialized").await;
    let threads = client.request("threads", json!({})).await;

    assert_eq!(resp.get("seq").and_then(Value::as_i64), Some(1));
    assert_eq!(initialized.get("seq").and_then(Value::as_i64), Some(2));
    assert_eq!(threads.get("seq").and_then(Value::as_i64), Some(3));
    assert_eq!(
        resp.pointer("/body/supportsConfigurationDoneRequest")
            .and_then(Value::as_bool),
        Some(true)
    );
    assert_eq!(
        resp.pointer("/body/supportsExceptionInfoRequest"),
        Some(&json!(true))
    );

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_request_is_answered_with_unrecognized_request() {
    let adapter = spawn_adapter();
    let client = &adapter.client;

    client.send_raw(json!({ "seq": 9, "type": "request" })).await;
    let resp = client.wait_for_response(9).await;
    assert_eq!(resp.get("success").and_then(Value::as_bool), Some(false));
    assert_eq!(error_id(&resp), Some(1001), "{resp}");

    client.initialize_handshake().await;
    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn missing_required_argument_reports_argument_missing() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    client.initialize_handshake().await;

    let resp = client.request("attach", json!({ "hostName": "localhost" })).await;
    assert_eq!(error_id(&resp), Some(1004), "{resp}");
    let message = resp.get("message").and_then(Value::as_str).unwrap_or_default();
    assert!(message.contains("port"), "{message}");
    assert!(adapter.manager.attaches().is_empty());

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn commands_without_a_session_fail_and_terminate_the_client() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    client.initialize_handshake().await;

    let resp = client.request("stackTrace", json!({ "threadId": 1 })).await;
    assert_eq!(error_id(&resp), Some(1011), "{resp}");
    assert_eq!(
        resp.get("message").and_then(Value::as_str),
        Some("Debug Session doesn't exist.")
    );
    client.wait_for_event("terminated").await;

    // `threads` is answered even without a debuggee.
    let threads = client.request("threads", json!({})).await;
    assert_success(&threads);
    assert_eq!(threads.pointer("/body/threads"), Some(&json!([])));

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn debuggee_events_and_responses_never_interleave_on_the_wire() {
    const COUNT: u64 = 64;

    let adapter = spawn_adapter();
    let client = &adapter.client;
    adapter.vm.add_thread(1, "main", true);
    client.initialize_handshake().await;
    client.launch(&[]).await;
    client.configuration_done().await;

    let vm = adapter.vm.clone();
    let emitter = tokio::spawn(async move {
        for thread_id in 100..100 + COUNT {
            vm.emit(VmEvent::ThreadStart { thread_id });
            tokio::task::yield_now().await;
        }
    });

    let mut pending = Vec::new();
    for _ in 0..COUNT {
        pending.push(client.send_request("threads", json!({})).await);
    }
    emitter.await.unwrap();

    let mut seqs = BTreeSet::new();
    for request_seq in pending {
        let resp = client.wait_for_response(request_seq).await;
        assert_success(&resp);
        assert_eq!(resp.pointer("/body/threads/0/id"), Some(&json!(1)));
        seqs.insert(resp.get("seq").and_then(Value::as_i64).unwrap());
    }
    let mut started = BTreeSet::new();
    for _ in 0..COUNT {
        let evt = client.wait_for_event("thread").await;
        seqs.insert(evt.get("seq").and_then(Value::as_i64).unwrap());
        started.insert(evt.pointer("/body/threadId").and_then(Value::as_u64).unwrap());
    }

    assert_eq!(started, (100..100 + COUNT).collect::<BTreeSet<_>>());
    // Every frame decoded and carried its own sequence number.
    assert_eq!(seqs.len() as u64, 2 * COUNT);

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}
