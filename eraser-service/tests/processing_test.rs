mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{data_uri, multipart_body, read_json, TestApp};
use eraser_service::models::UsageStatus;
use eraser_service::services::usage::{UsageLog, UsageQuery};
use serde_json::json;

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-image-data";

#[tokio::test]
async fn multipart_upload_processes_and_deducts_credits() {
    let app = TestApp::spawn().await;
    app.seed_user("u1", 5).await;

    let (content_type, body) = multipart_body(&[("photo.png", "image/png", PNG_BYTES)]);
    let request = Request::builder()
        .method("POST")
        .uri("/api/models/bg-remover")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token("u1")))
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();

    let response = app.request(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;

    assert_eq!(json["success"], json!(true));
    assert_eq!(json["count"], json!(1));
    assert_eq!(json["creditsUsed"], json!(1));
    assert_eq!(json["creditsRemaining"], json!(4));
    // Single image: results is an object, not an array.
    assert!(json["results"].is_object());
    let processed_url = json["results"]["processedUrl"].as_str().unwrap();
    assert!(processed_url.contains("/storage/uploads/"));
    assert!(processed_url.contains("-processed.png"));

    let page = app
        .store
        .list("u1", &UsageQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.entries[0].status, UsageStatus::Success);
    assert!(page.entries[0].processed_key.is_some());
    assert!(page.entries[0].processing_time_ms.is_some());
}

#[tokio::test]
async fn json_batch_returns_array_results() {
    let app = TestApp::spawn().await;
    app.seed_user("u1", 5).await;

    let body = json!({
        "images": [
            data_uri("image/png", PNG_BYTES),
            data_uri("image/jpeg", b"\xff\xd8fake-jpeg"),
        ],
    });
    let (status, json) = app.post_json("/api/models/bg-remover", "u1", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], json!(2));
    assert_eq!(json["creditsUsed"], json!(2));
    assert_eq!(json["creditsRemaining"], json!(3));
    assert_eq!(json["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn insufficient_credits_returns_402_without_side_effects() {
    let app = TestApp::spawn().await;
    app.seed_user("u1", 1).await;

    let body = json!({
        "images": [
            data_uri("image/png", PNG_BYTES),
            data_uri("image/png", PNG_BYTES),
        ],
    });
    let (status, json) = app.post_json("/api/models/bg-remover", "u1", body).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json["creditsRequired"], json!(2));
    assert_eq!(json["creditsAvailable"], json!(1));

    // Balance untouched, nothing logged.
    let (_, credits) = app.get_json("/api/credits", "u1").await;
    assert_eq!(credits["credits"], json!(1));
    let page = app.store.list("u1", &UsageQuery::default()).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let app = TestApp::spawn().await;
    app.seed_user("u1", 5).await;

    // Wrong MIME type.
    let body = json!({ "image": data_uri("application/pdf", b"%PDF") });
    let (status, _) = app.post_json("/api/models/bg-remover", "u1", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No image at all.
    let (status, _) = app
        .post_json("/api/models/bg-remover", "u1", json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Malformed data URI.
    let body = json!({ "image": "not-a-data-uri" });
    let (status, _) = app.post_json("/api/models/bg-remover", "u1", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_or_invalid_token_is_unauthorized() {
    let app = TestApp::spawn().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/models/bg-remover")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.request(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/models/bg-remover")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.request(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logs_endpoint_paginates_and_aggregates() {
    let app = TestApp::spawn().await;
    app.seed_user("u1", 10).await;

    for _ in 0..3 {
        let body = json!({ "image": data_uri("image/png", PNG_BYTES) });
        let (status, _) = app.post_json("/api/models/bg-remover", "u1", body).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = app
        .get_json("/api/models/bg-remover/logs?page=1&limit=2", "u1")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["logs"].as_array().unwrap().len(), 2);
    assert_eq!(json["pagination"]["total"], json!(3));
    assert_eq!(json["statistics"]["successCount"], json!(3));
    assert_eq!(json["statistics"]["totalCreditsUsed"], json!(3));
    assert_eq!(json["statistics"]["successRate"], json!(1.0));

    // Status filter.
    let (_, json) = app
        .get_json("/api/models/bg-remover/logs?status=error", "u1")
        .await;
    assert_eq!(json["logs"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn credits_endpoint_reports_balance() {
    let app = TestApp::spawn().await;
    app.seed_user("u1", 7).await;

    let (status, json) = app.get_json("/api/credits", "u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], serde_json::json!(true));
    assert_eq!(json["credits"], serde_json::json!(7));

    // Unknown user.
    let (status, _) = app.get_json("/api/credits", "ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_probes_need_no_auth() {
    let app = TestApp::spawn().await;

    for uri in ["/health", "/ready"] {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.request(request).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}
