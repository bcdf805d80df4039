use crate::harness::{assert_success, spawn_adapter, suspended_main_thread, TestAdapter};
use javadbg_vm::{MockCall, MockFrame, StepKind};
use serde_json::json;

async fn launched_with_main_thread() -> TestAdapter {
    let adapter = spawn_adapter();
    suspended_main_thread(&adapter.vm, vec![MockFrame::new("com.acme.Foo", "run", 12)]);
    adapter.client.initialize_handshake().await;
    adapter.client.launch(&[]).await;
    adapter
}

#[tokio::test]
async fn steps_map_to_step_kinds_and_invalidate_frames() {
    let adapter = launched_with_main_thread().await;
    let client = &adapter.client;

    for (command, kind) in [
        ("next", StepKind::Over),
        ("stepIn", StepKind::Into),
        ("stepOut", StepKind::Out),
    ] {
        suspended_main_thread(&adapter.vm, vec![MockFrame::new("com.acme.Foo", "run", 12)]);
        let frame_id = client.first_frame_id(1).await;

        let resp = client.request(command, json!({ "threadId": 1 })).await;
        assert_success(&resp);
        assert!(
            adapter.vm.calls().contains(&MockCall::Step(1, kind)),
            "{command}"
        );

        let scopes = client.request("scopes", json!({ "frameId": frame_id })).await;
        assert_eq!(scopes.pointer("/body/scopes"), Some(&json!([])), "{command}");
    }

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn pause_reports_stopped_events() {
    let adapter = launched_with_main_thread().await;
    let client = &adapter.client;

    let resp = client.request("pause", json!({ "threadId": 1 })).await;
    assert_success(&resp);
    assert!(adapter.vm.calls().contains(&MockCall::SuspendThread(1)));
    let evt = client.wait_for_stopped_reason("pause").await;
    assert_eq!(evt.pointer("/body/threadId"), Some(&json!(1)));
    assert_eq!(evt.pointer("/body/allThreadsStopped"), Some(&json!(false)));

    let resp = client.request("pause", json!({})).await;
    assert_success(&resp);
    assert!(adapter.vm.calls().contains(&MockCall::SuspendVm));
    let evt = client.wait_for_stopped_reason("pause").await;
    assert_eq!(evt.pointer("/body/allThreadsStopped"), Some(&json!(true)));
    assert_eq!(evt.pointer("/body/threadId"), None);

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn continue_resumes_one_thread_or_the_whole_vm() {
    let adapter = launched_with_main_thread().await;
    let client = &adapter.client;

    let resp = client.continue_with_thread_id(Some(1)).await;
    assert_eq!(resp.pointer("/body/allThreadsContinued"), Some(&json!(false)));
    assert!(adapter.vm.calls().contains(&MockCall::ResumeThread(1)));
    assert!(!adapter.vm.is_suspended(1));

    let resp = client.continue_with_thread_id(None).await;
    assert_eq!(resp.pointer("/body/allThreadsContinued"), Some(&json!(true)));
    assert!(adapter.vm.calls().contains(&MockCall::ResumeVm));

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn continue_with_unknown_thread_resumes_the_vm() {
    let adapter = launched_with_main_thread().await;
    let client = &adapter.client;

    let resp = client.continue_with_thread_id(Some(99)).await;
    assert_eq!(resp.pointer("/body/allThreadsContinued"), Some(&json!(true)));
    let calls = adapter.vm.calls();
    assert!(calls.contains(&MockCall::ResumeVm), "{calls:?}");
    assert!(!calls.contains(&MockCall::ResumeThread(99)), "{calls:?}");

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn resuming_one_thread_keeps_handles_of_other_suspended_threads() {
    let adapter = launched_with_main_thread().await;
    let client = &adapter.client;
    adapter.vm.add_thread(2, "worker", true);
    adapter
        .vm
        .set_frames(2, vec![MockFrame::new("com.acme.Worker", "call", 7)]);

    let main_frame = client.first_frame_id(1).await;
    let worker_frame = client.first_frame_id(2).await;

    client.continue_with_thread_id(Some(1)).await;

    let scopes = client.request("scopes", json!({ "frameId": main_frame })).await;
    assert_eq!(scopes.pointer("/body/scopes"), Some(&json!([])));
    let scopes = client
        .request("scopes", json!({ "frameId": worker_frame }))
        .await;
    assert_success(&scopes);
    assert_eq!(scopes.pointer("/body/scopes/0/name"), Some(&json!("Local")));

    client.disconnect().await;
    adapter.server_task.await.unwrap().unwrap();
}
