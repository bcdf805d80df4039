use crate::harness::{assert_success, error_id, spawn_adapter, TestAdapter};
use crate::suite::variables::populate;
use javadbg_vm::{MockCall, ObjectKind, Value};
use serde_json::{json, Value as Json};

async fn locals_reference(adapter: &TestAdapter) -> i64 {
    let client = &adapter.client;
    populate(&adapter.vm);
    client.initialize_handshake().await;
    client.launch(&[]).await;
    let frame_id = client.first_frame_id(1).await;
    client.first_scope_variables_reference(frame_id).await
}

fn message(resp: &Json) -> &str {
    resp.get("message").and_then(Json::as_str).unwrap_or_default()
}

#[tokio::test]
async fn local_variables_can_be_assigned() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    let scope = locals_reference(&adapter).await;

    let resp = client
        .request(
            "setVariable",
            json!({ "variablesReference": scope, "name": "count", "value": "42" }),
        )
        .await;
    assert_success(&resp);
    assert_eq!(resp.pointer("/body/value"), Some(&json!("42")));
    assert_eq!(resp.pointer("/body/type"), Some(&json!("int")));
    assert_eq!(adapter.vm.local_value(1, 0, "count"), Some(Value::Int(42)));

    let resp = client
        .request(
            "setVariable",
            json!({ "variablesReference": scope, "name": "name", "value": "\"a\\tb\"" }),
        )
        .await;
    assert_success(&resp);
    let Some(Value::Object(object)) = adapter.vm.local_value(1, 0, "name") else {
        panic!("`name` should hold a string object");
    };
    assert_eq!(
        object.kind,
        ObjectKind::String {
            value: "a\tb".to_string()
        }
    );

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn invalid_assignments_are_reported() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    let scope = locals_reference(&adapter).await;

    let resp = client
        .request(
            "setVariable",
            json!({ "variablesReference": scope, "name": "count", "value": "forty" }),
        )
        .await;
    assert_eq!(error_id(&resp), Some(1009), "{resp}");
    assert!(message(&resp).starts_with("Failed to set variable."), "{resp}");
    assert_eq!(adapter.vm.local_value(1, 0, "count"), Some(Value::Int(3)));

    let resp = client
        .request(
            "setVariable",
            json!({ "variablesReference": scope, "name": "this", "value": "null" }),
        )
        .await;
    assert_eq!(error_id(&resp), Some(1009), "{resp}");
    assert!(message(&resp).contains("'this'"), "{resp}");

    // Without a value there is nothing to do.
    let resp = client
        .request(
            "setVariable",
            json!({ "variablesReference": scope, "name": "count" }),
        )
        .await;
    assert_success(&resp);

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn fields_and_array_elements_can_be_assigned() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    let scope = locals_reference(&adapter).await;
    let locals = client.variables(scope).await;
    let this = crate::harness::variable(&locals, "this")["variablesReference"]
        .as_i64()
        .unwrap();
    let items = crate::harness::variable(&locals, "items")["variablesReference"]
        .as_i64()
        .unwrap();

    let resp = client
        .request(
            "setVariable",
            json!({ "variablesReference": this, "name": "size", "value": "9" }),
        )
        .await;
    assert_success(&resp);
    assert!(adapter.vm.calls().contains(&MockCall::SetField(
        100,
        "size".to_string(),
        Some("com.acme.Foo".to_string()),
        Value::Int(9),
    )));

    let resp = client
        .request(
            "setVariable",
            json!({ "variablesReference": this, "name": "LIMIT", "value": "1" }),
        )
        .await;
    assert_eq!(error_id(&resp), Some(1009), "{resp}");

    let resp = client
        .request(
            "setVariable",
            json!({ "variablesReference": items, "name": "[1]", "value": "5" }),
        )
        .await;
    assert_success(&resp);
    assert!(adapter
        .vm
        .calls()
        .contains(&MockCall::SetArrayElement(200, 1, Value::Int(5))));

    let resp = client
        .request(
            "setVariable",
            json!({ "variablesReference": items, "name": "[3]", "value": "5" }),
        )
        .await;
    assert_eq!(error_id(&resp), Some(1009), "{resp}");

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn assignment_after_resume_is_rejected() {
    let adapter = spawn_adapter();
    let client = &adapter.client;
    let scope = locals_reference(&adapter).await;

    client.continue_with_thread_id(Some(1)).await;
    let resp = client
        .request(
            "setVariable",
            json!({ "variablesReference": scope, "name": "count", "value": "1" }),
        )
        .await;
    assert_eq!(error_id(&resp), Some(1009), "{resp}");
    assert!(message(&resp).contains("thread is resumed"), "{resp}");

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}
