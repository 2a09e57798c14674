mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Duration, Utc};
use common::{read_json, TestApp, CRON_SECRET};
use eraser_service::models::{UsageLogEntry, UsageStatus};
use eraser_service::services::storage::ObjectStore;
use eraser_service::services::usage::UsageLog;
use serde_json::json;

async fn cleanup_request(app: &TestApp, secret: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri("/api/cleanup")
        .header(header::AUTHORIZATION, format!("Bearer {}", secret))
        .body(Body::empty())
        .unwrap();
    let response = app.request(request).await;
    let status = response.status();
    (status, read_json(response).await)
}

#[tokio::test]
async fn sweep_removes_expired_objects_and_marks_logs_deleted() {
    let app = TestApp::spawn().await;

    app.storage
        .put("uploads/old-original.png", vec![1, 2, 3], "image/png")
        .await
        .unwrap();
    app.storage
        .put("uploads/old-processed.png", vec![4, 5, 6], "image/png")
        .await
        .unwrap();
    app.storage
        .put("uploads/fresh.png", vec![7], "image/png")
        .await
        .unwrap();

    let mut old = UsageLogEntry::new(
        "u1".to_string(),
        "req-old".to_string(),
        Some("uploads/old-original.png".to_string()),
    );
    old.processed_key = Some("uploads/old-processed.png".to_string());
    old.created_at = Utc::now() - Duration::hours(48);
    let old_id = old.id;
    app.store.create(old).await.unwrap();

    let fresh = UsageLogEntry::new(
        "u1".to_string(),
        "req-fresh".to_string(),
        Some("uploads/fresh.png".to_string()),
    );
    let fresh_id = fresh.id;
    app.store.create(fresh).await.unwrap();

    let (status, json) = cleanup_request(&app, CRON_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], json!(true));
    assert_eq!(json["scanned"], json!(1));
    assert_eq!(json["deleted"], json!(2));
    assert_eq!(json["errors"].as_array().unwrap().len(), 0);

    assert!(!app.storage.exists("uploads/old-original.png").await.unwrap());
    assert!(!app.storage.exists("uploads/old-processed.png").await.unwrap());
    assert!(app.storage.exists("uploads/fresh.png").await.unwrap());

    let swept = app.store.get(old_id).await.unwrap().unwrap();
    assert_eq!(swept.status, UsageStatus::Deleted);
    assert!(swept.original_key.is_none());
    assert!(swept.processed_key.is_none());

    let untouched = app.store.get(fresh_id).await.unwrap().unwrap();
    assert_eq!(untouched.status, UsageStatus::Processing);

    // Second sweep finds nothing.
    let (_, json) = cleanup_request(&app, CRON_SECRET).await;
    assert_eq!(json["scanned"], json!(0));
}

#[tokio::test]
async fn missing_objects_do_not_fail_the_sweep() {
    let app = TestApp::spawn().await;

    let mut old = UsageLogEntry::new(
        "u1".to_string(),
        "req".to_string(),
        Some("uploads/never-existed.png".to_string()),
    );
    old.created_at = Utc::now() - Duration::hours(48);
    let old_id = old.id;
    app.store.create(old).await.unwrap();

    let (status, json) = cleanup_request(&app, CRON_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["scanned"], json!(1));
    assert_eq!(json["deleted"], json!(0));
    assert_eq!(json["errors"].as_array().unwrap().len(), 0);

    assert_eq!(
        app.store.get(old_id).await.unwrap().unwrap().status,
        UsageStatus::Deleted
    );
}

#[tokio::test]
async fn wrong_or_missing_cron_secret_is_unauthorized() {
    let app = TestApp::spawn().await;

    let (status, _) = cleanup_request(&app, "wrong-secret").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("GET")
        .uri("/api/cleanup")
        .body(Body::empty())
        .unwrap();
    let response = app.request(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
