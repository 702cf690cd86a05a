//! End-to-end tests of the HTTP surface over in-memory collaborators.

mod support;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;
use sluice_core::CommitError;
use sluice_test_utils::fixtures::*;
use support::*;
use tower::ServiceExt;

fn body(collection: &str, key: &str, data: serde_json::Value) -> serde_json::Value {
    json!({ "collection": collection, "key": key, "data": data })
}

// ============================================================================
// /stream
// ============================================================================

#[tokio::test]
async fn test_stream_rejects_non_json_content_type() {
    let h = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/stream")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("{}"))
        .unwrap();

    let response = h.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let json = body_json(response).await;
    assert_eq!(
        json["message"],
        "Only \"application/json\" content type is allowed."
    );
    assert_eq!(h.auth.calls(), 0);
}

#[tokio::test]
async fn test_stream_accepts_json_with_charset() {
    let h = Harness::new();
    h.install(KEY, identity_module()).await;
    let request = Request::builder()
        .method("POST")
        .uri("/stream")
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Body::from(
            body(COLLECTION, KEY, json!([{"id": "a", "values": {"x": 1}}])).to_string(),
        ))
        .unwrap();

    let response = h.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}

#[tokio::test]
async fn test_stream_rejects_malformed_json() {
    let h = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/stream")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"collection\": "))
        .unwrap();

    let response = h.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().starts_with("Invalid JSON"));
}

#[tokio::test]
async fn test_stream_missing_key_is_401_without_validator_call() {
    let h = Harness::new();

    let response = h
        .router()
        .oneshot(stream_request(&json!({"collection": COLLECTION, "data": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "MISSING_PARAMETER");
    assert_eq!(h.auth.calls(), 0);
}

#[tokio::test]
async fn test_stream_unknown_pair_is_401() {
    let h = Harness::new();

    let response = h
        .router()
        .oneshot(stream_request(&body(COLLECTION, "nope", json!([]))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await["message"],
        "Invalid table name/secret key."
    );
}

#[tokio::test]
async fn test_stream_unreachable_validator_is_401() {
    let h = Harness::new();
    h.auth.set_unreachable(true);

    let response = h
        .router()
        .oneshot(stream_request(&body(COLLECTION, KEY, json!([]))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "VALIDATOR_UNAVAILABLE");
}

#[tokio::test]
async fn test_stream_wrong_key_against_cached_binding_is_rejected() {
    let h = Harness::new();
    h.install(KEY, identity_module()).await;
    h.auth.accept("k2", COLLECTION, "42");

    let ok = h
        .router()
        .oneshot(stream_request(&body(COLLECTION, KEY, json!([]))))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let response = h
        .router()
        .oneshot(stream_request(&body(COLLECTION, "k2", json!([]))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Invalid secret key.");
    assert_eq!(h.auth.calls(), 1);
}

#[tokio::test]
async fn test_stream_missing_table_is_illegal_collection() {
    let h = Harness::new();
    h.auth.accept(KEY, "orders", "42");

    let response = h
        .router()
        .oneshot(stream_request(&body("orders", KEY, json!([]))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Illegal collection name.");
    assert_eq!(h.loader.calls(), 0);
}

#[tokio::test]
async fn test_stream_without_processing_code_is_400_and_writes_nothing() {
    let h = Harness::new();

    let response = h
        .router()
        .oneshot(stream_request(&body(
            COLLECTION,
            KEY,
            json!([{"id": "a", "values": {"x": 1}}]),
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "TRANSFORM_LOAD_FAILED");
    assert_eq!(h.row_count().await, 0);
    assert_eq!(h.store.commit_count(), 0);
}

#[tokio::test]
async fn test_stream_store_rejection_uses_store_status() {
    let h = Harness::new();
    h.install(KEY, identity_module()).await;
    h.store.fail_next_commit(CommitError::Rejected {
        status: 507,
        reason: "region full".to_string(),
    });

    let response = h
        .router()
        .oneshot(stream_request(&body(
            COLLECTION,
            KEY,
            json!([{"id": "a", "values": {"x": 1}}, {"id": "b", "values": {"x": 2}}]),
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INSUFFICIENT_STORAGE);
    assert_eq!(body_json(response).await["message"], "region full");
    assert_eq!(h.row_count().await, 0);
    assert!(h.notifier.seen().is_empty());
}

// ============================================================================
// /processing_code
// ============================================================================

#[tokio::test]
async fn test_upload_then_stream_runs_uploaded_transform() {
    let h = Harness::new();

    let response = h
        .router()
        .oneshot(upload_request(COLLECTION, KEY, "file", &constant_module(r#"{"tag":"v1"}"#)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");

    let response = h
        .router()
        .oneshot(stream_request(&body(
            COLLECTION,
            KEY,
            json!([{"id": "a", "values": {"x": 1}}, {"id": 2, "values": {"y": "z"}}]),
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for id in ["a", "2"] {
        let row = h.row(id).await.unwrap();
        assert_eq!(row.get("tag"), Some(&json!("v1")));
        assert!(row.get("x").is_none());
    }
    assert_eq!(h.notifier.wait_for(1).await[0].as_str(), COLLECTION);
}

#[tokio::test]
async fn test_reupload_replaces_cached_transform() {
    let h = Harness::new();
    let records = json!([{"id": "a", "values": {"x": 1}}]);

    h.router()
        .oneshot(upload_request(COLLECTION, KEY, "file", &constant_module(r#"{"v":1}"#)))
        .await
        .unwrap();
    h.router()
        .oneshot(stream_request(&body(COLLECTION, KEY, records.clone())))
        .await
        .unwrap();
    assert_eq!(h.row("a").await.unwrap().get("v"), Some(&json!(1)));

    h.router()
        .oneshot(upload_request(COLLECTION, KEY, "file", &constant_module(r#"{"v":2}"#)))
        .await
        .unwrap();
    let response = h
        .router()
        .oneshot(stream_request(&body(COLLECTION, KEY, records)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.row("a").await.unwrap().get("v"), Some(&json!(2)));
}

#[tokio::test]
async fn test_upload_with_rejected_pair_returns_validator_message() {
    let h = Harness::new();

    let response = h
        .router()
        .oneshot(upload_request(COLLECTION, "nope", "file", &identity_module()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Invalid table name/secret key.");
    assert!(h.artifacts.is_empty());
}

#[tokio::test]
async fn test_upload_rejects_invalid_artifact() {
    let h = Harness::new();

    let response = h
        .router()
        .oneshot(upload_request(COLLECTION, KEY, "file", &not_a_module()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "TRANSFORM_LOAD_FAILED");
    assert!(h.artifacts.is_empty());
}

#[tokio::test]
async fn test_upload_without_file_part_is_400() {
    let h = Harness::new();

    let response = h
        .router()
        .oneshot(upload_request(COLLECTION, KEY, "attachment", &identity_module()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Missing 'file' part");
}

// ============================================================================
// HEALTH AND METRICS
// ============================================================================

#[tokio::test]
async fn test_health_and_metrics_respond() {
    let h = Harness::new();

    let ping = h
        .router()
        .oneshot(Request::builder().uri("/health/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ping.status(), StatusCode::OK);
    assert_eq!(body_text(ping).await, "pong");

    let live = h
        .router()
        .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(live).await["status"], "healthy");

    let metrics = h
        .router()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
    assert!(body_text(metrics).await.contains("sluice_http_requests_total"));
}
