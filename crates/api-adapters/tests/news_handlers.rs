use std::sync::Arc;

use api_adapters::{router, AppState};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use domains::MockAuthProvider;
use prometheus_client::registry::Registry;
use serde_json::{json, Value};
use services::{
    AggregatorConfig, Feed, Intake, ManualClock, MediaAggregator, ModerationDesk, ModerationWorkflow,
    PipelineMetrics, Publisher, ReactionLedger, SubmissionRepository, VersionedStore,
};
use storage_adapters::InMemoryBackend;
use tower::ServiceExt;

const KEY: &str = "letmein";
const INTAKE_KEY: &str = "relay-secret";

fn app() -> (Router, Arc<InMemoryBackend>) {
    let backend = Arc::new(InMemoryBackend::new());
    let metrics = PipelineMetrics::default();
    let mut registry = Registry::default();
    metrics.register(&mut registry);

    let store = Arc::new(VersionedStore::new(backend.clone()).with_metrics(metrics));
    let repo = Arc::new(SubmissionRepository::new(store.clone(), Arc::new(ManualClock::default())));
    let publisher = Arc::new(Publisher::new(repo.clone(), None));
    let aggregator = Arc::new(MediaAggregator::new(
        publisher.clone(),
        Arc::new(ManualClock::default()),
        AggregatorConfig::default(),
    ));

    let mut auth = MockAuthProvider::new();
    auth.expect_is_privileged().returning(|s| s.id == 99);
    auth.expect_verify_moderator_password()
        .returning(|password| password == KEY);
    auth.expect_verify_intake_key()
        .returning(|key| key == INTAKE_KEY);
    let auth: Arc<MockAuthProvider> = Arc::new(auth);

    let state = AppState {
        feed: Arc::new(Feed::new(store.clone())),
        reactions: Arc::new(ReactionLedger::new(store)),
        intake: Arc::new(Intake::new(publisher, aggregator, auth.clone())),
        desk: Arc::new(ModerationDesk::new(ModerationWorkflow::new(repo), None)),
        auth,
        registry: Arc::new(registry),
    };
    (router(state), backend)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn moderator_post(uri: &str, body: Value) -> Request<Body> {
    let mut request = post(uri, body);
    request
        .headers_mut()
        .insert("x-moderator-key", KEY.parse().unwrap());
    request
}

fn intake_post(body: Value) -> Request<Body> {
    let mut request = post("/api/intake", body);
    request
        .headers_mut()
        .insert("x-intake-key", INTAKE_KEY.parse().unwrap());
    request
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn approved_submission_reaches_the_feed() {
    let (app, _) = app();

    let (status, receipt) = send(
        &app,
        intake_post(json!({ "submitterId": 7, "submitterName": "Ana", "body": "Road closed on Main St" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["status"], "pending");
    let id = receipt["submission"]["id"].as_u64().unwrap();

    let (_, feed) = send(&app, get("/api/news")).await;
    assert_eq!(feed["total"], 0);

    let (status, decision) = send(
        &app,
        moderator_post("/api/moderation", json!({ "action": "approve", "submissionId": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decision["applied"], true);

    let (status, feed) = send(&app, get("/api/news?page=1&perPage=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["total"], 1);
    assert_eq!(feed["items"][0]["body"], "Road closed on Main St");
    assert_eq!(feed["items"][0]["likeCount"], 0);

    // A second decision is a no-op.
    let (_, again) = send(
        &app,
        moderator_post("/api/moderation", json!({ "action": "reject", "submissionId": id })),
    )
    .await;
    assert_eq!(again["applied"], false);
}

#[tokio::test]
async fn reactions_toggle_and_reject_unknown_types() {
    let (app, _) = app();
    let (_, receipt) = send(
        &app,
        intake_post(json!({ "submitterId": 99, "submitterName": "Desk", "body": "Bridge reopened" })),
    )
    .await;
    assert_eq!(receipt["status"], "published");
    let id = receipt["submission"]["id"].as_u64().unwrap();

    let (status, outcome) = send(
        &app,
        post("/api/reactions", json!({ "postId": id, "userId": 5, "type": "like" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["likeCount"], 1);
    assert_eq!(outcome["action"], "added");

    let (_, item) = send(&app, get(&format!("/api/news/{id}?userId=5"))).await;
    assert_eq!(item["myReaction"], "like");

    let (status, error) = send(
        &app,
        post("/api/reactions", json!({ "postId": id, "userId": 5, "type": "love" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["retryable"], false);
}

#[tokio::test]
async fn moderation_requires_the_moderator_key() {
    let (app, backend) = app();
    let (status, _) = send(
        &app,
        post("/api/moderation", json!({ "action": "approve", "submissionId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut wrong = post("/api/moderation", json!({ "action": "approve", "submissionId": 1 }));
    wrong.headers_mut().insert("x-moderator-key", "guess".parse().unwrap());
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(backend.write_count(), 0);
}

#[tokio::test]
async fn intake_without_the_bridge_key_cannot_claim_an_admin_identity() {
    let (app, backend) = app();
    let event = json!({ "submitterId": 99, "submitterName": "Desk", "body": "spam" });

    let (status, error) = send(&app, post("/api/intake", event.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["retryable"], false);

    let mut wrong = post("/api/intake", event);
    wrong.headers_mut().insert("x-intake-key", KEY.parse().unwrap());
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(backend.write_count(), 0);
    let (_, feed) = send(&app, get("/api/news")).await;
    assert_eq!(feed["total"], 0);
}

#[tokio::test]
async fn deleting_an_unknown_submission_is_not_found() {
    let (app, _) = app();
    let mut request = Request::builder()
        .method("DELETE")
        .uri("/api/news/404")
        .body(Body::empty())
        .unwrap();
    request
        .headers_mut()
        .insert("x-moderator-key", KEY.parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unavailable_backend_is_retryable() {
    let (app, backend) = app();
    backend.set_unavailable(true);
    let (status, error) = send(&app, get("/api/news")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error["retryable"], true);
}

#[tokio::test]
async fn metrics_are_exposed() {
    let (app, _) = app();
    send(
        &app,
        intake_post(json!({ "submitterId": 99, "body": "Power restored" })),
    )
    .await;
    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("newsroom_document_commits"));
}
