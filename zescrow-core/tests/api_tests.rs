//! REST API tests
//!
//! Drive the router in-process against an in-memory store and simulated chains.
//!
//! Run with: cargo test --test api_tests -- --nocapture

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use zescrow_core::api::{app_router, AppState};
use zescrow_core::config::Config;
use zescrow_core::EscrowContext;

fn test_server() -> TestServer {
    let mut config = Config::default();
    config.monitor.confirmation_blocks = 1;
    let context = EscrowContext::in_memory(config).unwrap();
    TestServer::new(app_router(AppState::new(Arc::new(context)))).unwrap()
}

/// Create and fund both parties, then open a 1.5 ZEC deal
async fn open_deal(server: &TestServer) -> Value {
    for user_id in ["client0001", "freelancer01"] {
        server
            .post("/api/wallets")
            .json(&json!({ "userId": user_id }))
            .await
            .assert_status(StatusCode::CREATED);
    }
    server
        .post("/api/wallets/client0001/fund")
        .json(&json!({ "amountZec": 10 }))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/deals")
        .json(&json!({
            "clientId": "client0001",
            "freelancerId": "freelancer01",
            "amountZec": "1.5",
            "deadlineDays": 14,
            "description": "Write API docs"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

#[tokio::test]
async fn test_health() {
    let server = test_server();
    let response = server.get("/api/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["network"], "testnet");
}

#[tokio::test]
async fn test_wallet_endpoints() {
    let server = test_server();

    let created = server
        .post("/api/wallets")
        .json(&json!({ "userId": "client0001", "label": "main" }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let body: Value = created.json();
    assert_eq!(body["userId"], "client0001");
    assert!(body["shieldedAddress"].as_str().unwrap().starts_with("ztestsapling"));

    let funded = server
        .post("/api/wallets/client0001/fund")
        .json(&json!({ "amountZec": 2, "pool": "transparent" }))
        .await;
    funded.assert_status_ok();
    let body: Value = funded.json();
    assert_eq!(body["balance"]["transparent"], 200_000_000);

    let imported = server
        .post("/api/wallets/import")
        .json(&json!({ "userId": "freelancer01", "seedPhrase": "correct horse battery staple" }))
        .await;
    imported.assert_status(StatusCode::CREATED);

    let missing = server.get("/api/wallets/nobody123").await;
    missing.assert_status(StatusCode::NOT_FOUND);
    let body: Value = missing.json();
    assert_eq!(body["errorCode"], "NOT_FOUND");
}

#[tokio::test]
async fn test_deal_lifecycle_over_http() {
    let server = test_server();
    let deal = open_deal(&server).await;
    let deal_id = deal["dealId"].as_str().unwrap().to_string();
    assert_eq!(deal["status"], "created");
    assert_eq!(deal["amountZatoshi"], 150_000_000);

    let submitted = server
        .post(&format!("/api/deals/{}/submit", deal_id))
        .json(&json!({
            "freelancerId": "freelancer01",
            "proofLink": "https://docs.example.com",
            "notes": "v1"
        }))
        .await;
    submitted.assert_status_ok();
    let body: Value = submitted.json();
    assert_eq!(body["status"], "submitted");
    assert_eq!(body["message"], "Work submitted successfully");

    let approved = server
        .post(&format!("/api/deals/{}/approve", deal_id))
        .json(&json!({ "clientId": "client0001" }))
        .await;
    approved.assert_status_ok();
    let body: Value = approved.json();
    assert_eq!(body["status"], "approved");

    let txs: Value = server
        .get(&format!("/api/deals/{}/transactions", deal_id))
        .await
        .json();
    assert_eq!(txs.as_array().unwrap().len(), 3);

    // One confirmation is enough for this server
    let report = server.post("/api/monitor/check").await;
    report.assert_status_ok();
    let body: Value = report.json();
    assert_eq!(body["confirmed"], 2);
    assert_eq!(body["completedDeals"][0], deal_id.as_str());

    let deal: Value = server.get(&format!("/api/deals/{}", deal_id)).await.json();
    assert_eq!(deal["status"], "completed");

    let intent_id = deal["intentId"].as_str().unwrap();
    let intent: Value = server.get(&format!("/api/intents/{}", intent_id)).await.json();
    assert_eq!(intent["status"], "completed");

    let deals: Value = server.get("/api/users/freelancer01/deals").await.json();
    assert_eq!(deals.as_array().unwrap().len(), 1);

    let intents: Value = server.get("/api/users/freelancer01/intents").await.json();
    assert_eq!(intents.as_array().unwrap().len(), 1);
    assert_eq!(intents[0]["intentId"], intent_id);
    assert_eq!(intents[0]["status"], "completed");

    let status: Value = server.get("/api/status").await.json();
    assert_eq!(status["totalDeals"], 1);
    assert_eq!(status["totalIntents"], 1);
    assert_eq!(status["escrowedZatoshi"], 0);
}

#[tokio::test]
async fn test_error_responses() {
    let server = test_server();
    let deal = open_deal(&server).await;
    let deal_id = deal["dealId"].as_str().unwrap().to_string();

    // Wrong caller
    let response = server
        .post(&format!("/api/deals/{}/approve", deal_id))
        .json(&json!({ "clientId": "freelancer01" }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["errorCode"], "FORBIDDEN");
    assert!(body["error"].as_str().unwrap().contains("client"));

    // Nothing submitted yet
    let response = server
        .post(&format!("/api/deals/{}/dispute", deal_id))
        .json(&json!({ "clientId": "client0001", "reason": "late" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["errorCode"], "INVALID_TRANSITION");

    // Malformed body
    let response = server
        .post(&format!("/api/deals/{}/submit", deal_id))
        .json(&json!({ "freelancerId": "freelancer01" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["errorCode"], "VALIDATION_ERROR");

    // More than the client holds
    let response = server
        .post("/api/deals")
        .json(&json!({
            "clientId": "client0001",
            "freelancerId": "freelancer01",
            "amountZec": 50,
            "deadlineDays": 14,
            "description": "Too big"
        }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["errorCode"], "INSUFFICIENT_BALANCE");

    let response = server.get("/api/deals/deal-unknown").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dispute_and_resolution() {
    let server = test_server();
    let deal = open_deal(&server).await;
    let deal_id = deal["dealId"].as_str().unwrap().to_string();

    server
        .post(&format!("/api/deals/{}/submit", deal_id))
        .json(&json!({ "freelancerId": "freelancer01", "proofLink": "https://docs.example.com" }))
        .await
        .assert_status_ok();
    server
        .post(&format!("/api/deals/{}/dispute", deal_id))
        .json(&json!({ "clientId": "client0001", "reason": "Half the endpoints are missing" }))
        .await
        .assert_status_ok();

    let response = server
        .post(&format!("/api/deals/{}/resolve", deal_id))
        .json(&json!({ "adminId": "client0001", "resolution": "client" }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);

    let response = server
        .post(&format!("/api/deals/{}/resolve", deal_id))
        .json(&json!({ "adminId": "admin", "resolution": "client", "notes": "Refund agreed" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["resolution"], "client");
    assert_eq!(body["disputeReason"], "Half the endpoints are missing");
    assert_eq!(
        body["notes"],
        "Dispute resolved in favor of client. Admin notes: Refund agreed"
    );

    // Already settled
    let response = server
        .post(&format!("/api/deals/{}/resolve", deal_id))
        .json(&json!({ "adminId": "admin", "resolution": "freelancer" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["errorCode"], "INVALID_TRANSITION");
}
