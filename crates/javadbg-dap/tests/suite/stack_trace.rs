use crate::harness::{assert_success, error_id, spawn_adapter, suspended_main_thread};
use javadbg_vm::MockFrame;
use serde_json::{json, Value};

fn three_frames() -> Vec<MockFrame> {
    vec![
        MockFrame::new("com.acme.Foo", "run", 12),
        MockFrame::new("com.acme.Foo", "main", 30),
        MockFrame::new("com.acme.Launcher$Inner", "start", -1),
    ]
}

#[tokio::test]
async fn stack_trace_supports_paging_and_total_frames() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    suspended_main_thread(&adapter.vm, three_frames());
    client.initialize_handshake().await;
    client.launch(&[]).await;

    let page = client
        .request(
            "stackTrace",
            json!({ "threadId": 1, "startFrame": 1, "levels": 1 }),
        )
        .await;
    assert_success(&page);
    let frames = page
        .pointer("/body/stackFrames")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("stackTrace response missing body.stackFrames: {page}"));
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["name"], "com.acme.Foo.main");
    assert_eq!(frames[0]["line"], 30);
    assert_eq!(page.pointer("/body/totalFrames"), Some(&json!(3)));

    let all = client
        .request("stackTrace", json!({ "threadId": 1, "levels": 0 }))
        .await;
    let frames = all.pointer("/body/stackFrames").and_then(Value::as_array).unwrap();
    assert_eq!(frames.len(), 3);
    // Unknown line numbers are reported as 0.
    assert_eq!(frames[2]["line"], 0);

    let clamped = client
        .request(
            "stackTrace",
            json!({ "threadId": 1, "startFrame": 2, "levels": 100 }),
        )
        .await;
    let frames = clamped.pointer("/body/stackFrames").and_then(Value::as_array).unwrap();
    assert_eq!(frames.len(), 1);

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn negative_paging_arguments_yield_no_frames() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    suspended_main_thread(&adapter.vm, three_frames());
    client.initialize_handshake().await;
    client.launch(&[]).await;

    let resp = client
        .request("stackTrace", json!({ "threadId": 1, "startFrame": -1 }))
        .await;
    assert_success(&resp);
    assert_eq!(resp.pointer("/body/stackFrames"), Some(&json!([])));
    assert_eq!(resp.pointer("/body/totalFrames"), Some(&json!(3)));

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn frame_sources_resolve_against_source_paths() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("src");
    std::fs::create_dir_all(root.join("com/acme")).unwrap();
    let file = root.join("com/acme/Foo.java");
    std::fs::write(&file, "package com.acme;\nclass Foo {}\n").unwrap();
    let root = root.display().to_string();

    let adapter = spawn_adapter();
    let client = &adapter.client;
    suspended_main_thread(&adapter.vm, three_frames());
    client.initialize_handshake().await;
    client.launch(&[root.as_str()]).await;

    let resp = client.request("stackTrace", json!({ "threadId": 1 })).await;
    assert_success(&resp);
    assert_eq!(
        resp.pointer("/body/stackFrames/0/source/path")
            .and_then(Value::as_str),
        Some(file.display().to_string().as_str())
    );
    assert_eq!(
        resp.pointer("/body/stackFrames/0/source/name"),
        Some(&json!("Foo.java"))
    );

    // No file for `Launcher`: the frame only carries the source name.
    assert_eq!(
        resp.pointer("/body/stackFrames/2/source"),
        Some(&json!({ "name": "Launcher.java" }))
    );

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn running_thread_has_no_stack() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    adapter.vm.add_thread(1, "main", false);
    client.initialize_handshake().await;
    client.launch(&[]).await;

    let resp = client.request("stackTrace", json!({ "threadId": 1 })).await;
    assert_eq!(error_id(&resp), Some(1007), "{resp}");

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn unknown_source_reference_is_rejected() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    client.initialize_handshake().await;

    let resp = client.request("source", json!({ "sourceReference": 42 })).await;
    assert_eq!(error_id(&resp), Some(1004), "{resp}");

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}
