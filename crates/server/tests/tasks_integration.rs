//! Task listing, review verdicts and the delivery trigger.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestFixture;

#[tokio::test]
async fn test_list_tasks_with_filters() {
    let fixture = TestFixture::new().await;
    let pending = fixture.run_and_collect_pending().await;
    assert_eq!(pending.len(), 1);

    let all = fixture.get("/api/tasks").await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["total"], 1);

    let approved = fixture.get("/api/tasks?approval=approved").await;
    assert_eq!(approved.body["total"], 0);

    let by_transcript = fixture.get("/api/tasks?transcript_id=t-weekly").await;
    assert_eq!(by_transcript.body["total"], 1);
    assert_eq!(
        by_transcript.body["tasks"][0]["transcript_external_id"],
        "t-weekly"
    );
}

#[tokio::test]
async fn test_get_task_by_id() {
    let fixture = TestFixture::new().await;
    let pending = fixture.run_and_collect_pending().await;

    let response = fixture.get(&format!("/api/tasks/{}", pending[0])).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["approval_status"], "pending");

    let missing = fixture.get("/api/tasks/no-such-task").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_approve_then_deliver() {
    let fixture = TestFixture::new().await;
    let pending = fixture.run_and_collect_pending().await;

    let response = fixture
        .post(
            &format!("/api/tasks/{}/approve", pending[0]),
            json!({ "reviewer": "alice" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["approval_status"], "approved");
    assert_eq!(response.body["reviewer"], "alice");

    let response = fixture.post_empty("/api/tasks/deliver").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["delivered"], 1);
    assert_eq!(response.body["failed"], 0);
    assert_eq!(fixture.sink.call_count(), 1);

    let task = fixture.get(&format!("/api/tasks/{}", pending[0])).await;
    assert_eq!(task.body["delivery"]["status"], "delivered");
    assert!(task.body["delivery"]["remote_item_id"].is_string());
}

#[tokio::test]
async fn test_reject_keeps_task_out_of_delivery() {
    let fixture = TestFixture::new().await;
    let pending = fixture.run_and_collect_pending().await;

    let response = fixture
        .post(
            &format!("/api/tasks/{}/reject", pending[0]),
            json!({ "reviewer": "alice", "notes": "not actionable" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["approval_status"], "rejected");
    assert_eq!(response.body["review_notes"], "not actionable");

    let response = fixture.post_empty("/api/tasks/deliver").await;
    assert_eq!(response.body["delivered"], 0);
    assert_eq!(fixture.sink.call_count(), 0);
}

#[tokio::test]
async fn test_deliver_by_explicit_ids() {
    let fixture = TestFixture::new().await;
    let pending = fixture.run_and_collect_pending().await;
    fixture
        .post(
            &format!("/api/tasks/{}/approve", pending[0]),
            json!({ "reviewer": "alice" }),
        )
        .await;

    let response = fixture
        .post("/api/tasks/deliver", json!({ "ids": [pending[0]] }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["delivered"], 1);
    assert_eq!(response.body["outcomes"][0]["result"], "delivered");
}

#[tokio::test]
async fn test_deliver_unknown_id_is_404() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/tasks/deliver", json!({ "ids": ["no-such-task"] }))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deliver_twice_does_not_resend() {
    let fixture = TestFixture::new().await;
    let pending = fixture.run_and_collect_pending().await;
    fixture
        .post(
            &format!("/api/tasks/{}/approve", pending[0]),
            json!({ "reviewer": "alice" }),
        )
        .await;

    fixture.post_empty("/api/tasks/deliver").await;
    let response = fixture.post_empty("/api/tasks/deliver").await;

    assert_eq!(response.body["delivered"], 0);
    assert_eq!(fixture.sink.call_count(), 1);
}

#[tokio::test]
async fn test_approve_unknown_task_is_404() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/tasks/no-such-task/approve", json!({ "reviewer": "alice" }))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_approve_without_reviewer_is_client_error() {
    let fixture = TestFixture::new().await;
    let pending = fixture.run_and_collect_pending().await;

    let response = fixture
        .post(&format!("/api/tasks/{}/approve", pending[0]), json!({}))
        .await;
    assert!(response.status.is_client_error());
}
