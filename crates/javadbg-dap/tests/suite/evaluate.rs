use crate::harness::{assert_success, error_id, spawn_adapter, suspended_main_thread, TestAdapter};
use crate::suite::variables::{object, populate};
use javadbg_vm::{MockFrame, MockObject, Value, VariableInfo};
use serde_json::{json, Value as Json};

async fn evaluate(adapter: &TestAdapter, frame_id: i64, expression: &str) -> Json {
    adapter
        .client
        .request(
            "evaluate",
            json!({ "expression": expression, "frameId": frame_id, "context": "watch" }),
        )
        .await
}

async fn start(adapter: &TestAdapter) -> i64 {
    let client = &adapter.client;
    client.initialize_handshake().await;
    client.launch(&[]).await;
    client.first_frame_id(1).await
}

#[tokio::test]
async fn locals_and_field_paths_evaluate() {
    let adapter = spawn_adapter();
    populate(&adapter.vm);
    let frame_id = start(&adapter).await;

    let resp = evaluate(&adapter, frame_id, "count").await;
    assert_success(&resp);
    assert_eq!(resp.pointer("/body/result"), Some(&json!("3")));
    assert_eq!(resp.pointer("/body/type"), Some(&json!("int")));
    assert_eq!(resp.pointer("/body/variablesReference"), Some(&json!(0)));

    let resp = evaluate(&adapter, frame_id, "this.size").await;
    assert_success(&resp);
    assert_eq!(resp.pointer("/body/result"), Some(&json!("7")));

    // Bare field names resolve against `this`.
    let resp = evaluate(&adapter, frame_id, "size").await;
    assert_success(&resp);
    assert_eq!(resp.pointer("/body/result"), Some(&json!("7")));

    let resp = evaluate(&adapter, frame_id, "items").await;
    assert_success(&resp);
    assert_eq!(resp.pointer("/body/indexedVariables"), Some(&json!(3)));
    let reference = resp
        .pointer("/body/variablesReference")
        .and_then(Json::as_i64)
        .unwrap();
    assert!(reference > 0);
    let elements = adapter.client.variables(reference).await;
    assert_success(&elements);

    adapter.client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn unsupported_and_invalid_expressions_fail() {
    let adapter = spawn_adapter();
    populate(&adapter.vm);
    let frame_id = start(&adapter).await;

    for expression in ["a + b", "count.value", "items.length", "this.", "missing"] {
        let resp = evaluate(&adapter, frame_id, expression).await;
        assert_eq!(error_id(&resp), Some(1010), "{expression}: {resp}");
        let message = resp.get("message").and_then(Json::as_str).unwrap_or_default();
        assert!(message.starts_with("Failed to evaluate."), "{message}");
    }

    adapter.client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn null_in_the_middle_of_a_path_is_reported() {
    let adapter = spawn_adapter();
    suspended_main_thread(
        &adapter.vm,
        vec![MockFrame::new("com.acme.List", "add", 8).with_this(object(100, "com.acme.List"))],
    );
    adapter.vm.insert_object(
        100,
        MockObject {
            fields: vec![VariableInfo::field(
                "head",
                "com.acme.Node",
                "com.acme.List",
                Value::Null,
            )],
            elements: Vec::new(),
        },
    );
    let frame_id = start(&adapter).await;

    let resp = evaluate(&adapter, frame_id, "this.head.next").await;
    assert_eq!(error_id(&resp), Some(1010), "{resp}");
    let message = resp.get("message").and_then(Json::as_str).unwrap_or_default();
    assert!(message.contains("NPE: 'this.head' is null."), "{message}");

    adapter.client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn evaluate_needs_a_live_frame() {
    let adapter = spawn_adapter();
    populate(&adapter.vm);
    let frame_id = start(&adapter).await;

    let resp = adapter
        .client
        .request("evaluate", json!({ "expression": "count" }))
        .await;
    assert_eq!(error_id(&resp), Some(1004), "{resp}");

    adapter.client.continue_with_thread_id(Some(1)).await;
    let resp = evaluate(&adapter, frame_id, "count").await;
    assert_eq!(error_id(&resp), Some(1010), "{resp}");

    adapter.client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}
