mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{paddle_signature, read_json, TestApp};
use serde_json::json;

fn completed_event(event_id: &str, transaction_id: &str, customer_id: &str) -> String {
    json!({
        "event_id": event_id,
        "event_type": "transaction.completed",
        "occurred_at": "2026-01-10T12:00:00Z",
        "data": {
            "id": transaction_id,
            "status": "completed",
            "customer_id": customer_id,
            "currency_code": "USD",
            "custom_data": { "platform": "bg-eraser" },
            "items": [{
                "price": {
                    "id": "pri_starter",
                    "name": "Starter Pack",
                    "unit_price": { "amount": "500", "currency_code": "USD" },
                    "custom_data": { "credit": "100" }
                },
                "quantity": 1
            }],
            "details": { "totals": { "subtotal": "500", "tax": "0", "total": "500" } },
            "payments": [{ "method_details": { "type": "card" } }],
            "created_at": "2026-01-10T11:59:00Z",
            "updated_at": "2026-01-10T12:00:00Z"
        }
    })
    .to_string()
}

async fn deliver(app: &TestApp, body: &str, signature: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhook/paddle")
        .header(header::CONTENT_TYPE, "application/json")
        .header("paddle-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.request(request).await;
    let status = response.status();
    (status, read_json(response).await)
}

#[tokio::test]
async fn completed_event_credits_the_user_once() {
    let app = TestApp::spawn().await;
    app.seed_customer("u1", 5, "ctm_1").await;

    let body = completed_event("evt_1", "txn_1", "ctm_1");
    let signature = paddle_signature(&body, 1736500000);

    let (status, json) = deliver(&app, &body, &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["appended"], serde_json::json!(true));

    let (_, credits) = app.get_json("/api/credits", "u1").await;
    assert_eq!(credits["credits"], serde_json::json!(105));

    // Replay of the same event: acknowledged, but no second credit.
    let (status, json) = deliver(&app, &body, &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["appended"], serde_json::json!(false));

    let (_, credits) = app.get_json("/api/credits", "u1").await;
    assert_eq!(credits["credits"], serde_json::json!(105));
}

#[tokio::test]
async fn transaction_history_is_queryable_after_webhooks() {
    let app = TestApp::spawn().await;
    app.seed_customer("u1", 0, "ctm_1").await;

    let body = completed_event("evt_1", "txn_9", "ctm_1");
    let signature = paddle_signature(&body, 1736500000);
    deliver(&app, &body, &signature).await;

    let (status, json) = app.get_json("/api/transactions", "u1").await;
    assert_eq!(status, StatusCode::OK);
    let transactions = json["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["id"], serde_json::json!("txn_9"));
    assert_eq!(transactions[0]["status"], serde_json::json!("completed"));
    assert_eq!(json["statistics"]["totalSpent"], serde_json::json!(500));
    assert_eq!(json["statistics"]["totalCredits"], serde_json::json!(100));
    assert_eq!(json["statistics"]["completedCount"], serde_json::json!(1));

    let (status, json) = app.get_json("/api/transactions/txn_9", "u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["transaction"]["credits"], serde_json::json!(100));

    // Another user cannot see it.
    app.seed_user("u2", 0).await;
    let (status, _) = app.get_json("/api/transactions/txn_9", "u2").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_signature_is_rejected_without_mutation() {
    let app = TestApp::spawn().await;
    app.seed_customer("u1", 5, "ctm_1").await;

    let body = completed_event("evt_1", "txn_1", "ctm_1");

    let (status, _) = deliver(&app, &body, "ts=123;h1=deadbeef").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = deliver(&app, &body, "garbage").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Signature over a different body.
    let signature = paddle_signature("{}", 1736500000);
    let (status, _) = deliver(&app, &body, &signature).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, credits) = app.get_json("/api/credits", "u1").await;
    assert_eq!(credits["credits"], serde_json::json!(5));
}

#[tokio::test]
async fn unknown_customer_is_an_error_without_mutation() {
    let app = TestApp::spawn().await;
    app.seed_user("u1", 5).await;

    let body = completed_event("evt_1", "txn_1", "ctm_unknown");
    let signature = paddle_signature(&body, 1736500000);

    let (status, _) = deliver(&app, &body, &signature).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = app.get_json("/api/transactions", "u1").await;
    assert_eq!(json["transactions"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn foreign_platform_events_are_acknowledged_and_ignored() {
    let app = TestApp::spawn().await;
    app.seed_customer("u1", 5, "ctm_1").await;

    let body = json!({
        "event_id": "evt_1",
        "event_type": "transaction.completed",
        "occurred_at": "2026-01-10T12:00:00Z",
        "data": {
            "id": "txn_1",
            "status": "completed",
            "customer_id": "ctm_1",
            "currency_code": "USD",
            "custom_data": { "platform": "another-product" },
            "items": [],
            "created_at": "2026-01-10T11:59:00Z",
            "updated_at": "2026-01-10T12:00:00Z"
        }
    })
    .to_string();
    let signature = paddle_signature(&body, 1736500000);

    let (status, json) = deliver(&app, &body, &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ignored"], serde_json::json!(true));

    let (_, credits) = app.get_json("/api/credits", "u1").await;
    assert_eq!(credits["credits"], serde_json::json!(5));
    let (_, json) = app.get_json("/api/transactions", "u1").await;
    assert_eq!(json["transactions"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn non_completed_events_record_state_without_crediting() {
    let app = TestApp::spawn().await;
    app.seed_customer("u1", 5, "ctm_1").await;

    let body = completed_event("evt_1", "txn_1", "ctm_1").replace(
        "\"event_type\":\"transaction.completed\"",
        "\"event_type\":\"transaction.paid\"",
    );
    let signature = paddle_signature(&body, 1736500000);

    let (status, json) = deliver(&app, &body, &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["appended"], serde_json::json!(true));

    let (_, credits) = app.get_json("/api/credits", "u1").await;
    assert_eq!(credits["credits"], serde_json::json!(5));
    let (_, json) = app.get_json("/api/transactions", "u1").await;
    assert_eq!(json["transactions"].as_array().unwrap().len(), 1);
}
