use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use super::router;
use super::state::AppState;
use super::types::error_codes;
use crate::config::SettlementConfig;
use crate::settlement::{MemoryStore, SettlementService};

const HOST: i64 = 100;
const ALICE: i64 = 1;
const BOB: i64 = 2;

fn app() -> Router {
    let store = Arc::new(MemoryStore::new(Duration::from_millis(200)));
    let service = Arc::new(SettlementService::new(store, SettlementConfig::default()));
    router(Arc::new(AppState::new(service)))
}

async fn call(app: &Router, method: &str, uri: &str, actor: Option<i64>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header("x-actor-id", actor.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Opens a session with two seated players; returns (session, alice, bob) ids
async fn seated_table(app: &Router) -> (i64, i64, i64) {
    let (status, body) = call(app, "POST", "/api/v1/sessions", Some(HOST), Some(json!({"name": "Friday"}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let sid = body["data"]["id"].as_i64().unwrap();

    let mut ids = Vec::new();
    for (user, name) in [(ALICE, "Alice"), (BOB, "Bob")] {
        let (status, body) = call(
            app,
            "POST",
            &format!("/api/v1/sessions/{sid}/participants"),
            Some(user),
            Some(json!({"display_name": name})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["user_id"], user);
        ids.push(body["data"]["id"].as_i64().unwrap());
    }
    (sid, ids[0], ids[1])
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = call(&app, "GET", "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], error_codes::SUCCESS);
    assert_eq!(body["data"]["store"], "memory");
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_full_flow_over_http() {
    let app = app();
    let (sid, alice, bob) = seated_table(&app).await;

    for (actor, pid, kind, amount) in [
        (ALICE, alice, "debit", json!("100")),
        (BOB, bob, "debit", json!(100)),
        (ALICE, alice, "credit", json!("150.00")),
        (BOB, bob, "credit", json!(50.0)),
    ] {
        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/v1/sessions/{sid}/entries"),
            Some(actor),
            Some(json!({"participant_id": pid, "kind": kind, "amount": amount})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (_, body) = call(&app, "GET", &format!("/api/v1/sessions/{sid}/balance"), None, None).await;
    assert_eq!(body["data"]["ok"], true);
    assert_eq!(body["data"]["total_credit"], "200.00");

    // Settlement requires a closed session
    let (status, body) = call(&app, "POST", &format!("/api/v1/sessions/{sid}/settlement"), Some(HOST), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], error_codes::STATE_CONFLICT);

    let (status, _) = call(&app, "POST", &format!("/api/v1/sessions/{sid}/close"), Some(HOST), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "POST", &format!("/api/v1/sessions/{sid}/settlement"), Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let transfers = body["data"].as_array().unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0]["payer_id"], bob);
    assert_eq!(transfers[0]["payee_id"], alice);
    assert_eq!(transfers[0]["amount"], "50.00");
    assert_eq!(transfers[0]["pay_state"], "pending");
    let transfer_id = transfers[0]["id"].as_str().unwrap().to_string();

    let (_, view) = call(&app, "GET", &format!("/api/v1/sessions/{sid}/settlement"), None, None).await;
    assert_eq!(view["data"]["computed"], true);
    assert_eq!(view["data"]["transfers"][0]["id"], transfer_id.as_str());

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/v1/transfers/{transfer_id}/paid"),
        Some(BOB),
        Some(json!({"payment_method": "venmo"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["pay_state"], "paid");
    assert_eq!(body["data"]["payment_method"], "venmo");

    // Second mark is an invalid transition
    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/v1/transfers/{transfer_id}/paid"),
        Some(BOB),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, "POST", &format!("/api/v1/transfers/{transfer_id}/revert"), Some(HOST), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pay_state"], "pending");

    let (status, body) = call(&app, "GET", &format!("/api/v1/audit/transfers/{transfer_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let ops: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["operation"].as_str().unwrap())
        .collect();
    assert_eq!(ops, vec!["INSERT", "UPDATE", "UPDATE"]);
}

#[tokio::test]
async fn test_mismatch_is_unprocessable() {
    let app = app();
    let (sid, alice, _) = seated_table(&app).await;
    call(
        &app,
        "POST",
        &format!("/api/v1/sessions/{sid}/entries"),
        Some(ALICE),
        Some(json!({"participant_id": alice, "kind": "debit", "amount": "10"})),
    )
    .await;
    call(&app, "POST", &format!("/api/v1/sessions/{sid}/close"), Some(HOST), None).await;

    let (status, body) = call(&app, "POST", &format!("/api/v1/sessions/{sid}/settlement"), Some(HOST), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], error_codes::BALANCE_MISMATCH);
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_entry_update_and_delete() {
    let app = app();
    let (sid, alice, bob) = seated_table(&app).await;
    let (_, body) = call(
        &app,
        "POST",
        &format!("/api/v1/sessions/{sid}/entries"),
        Some(HOST),
        Some(json!({"participant_id": alice, "kind": "buy_in", "amount": "40"})),
    )
    .await;
    let entry_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/v1/entries/{entry_id}"),
        Some(HOST),
        Some(json!({"participant_id": bob, "amount": "45.5"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["participant_id"], bob);
    assert_eq!(body["data"]["amount"], "45.50");

    let (_, roster) = call(&app, "GET", &format!("/api/v1/sessions/{sid}/participants"), None, None).await;
    let roster = roster["data"].as_array().unwrap();
    assert_eq!(roster[0]["total_debit"], "0.00");
    assert_eq!(roster[1]["total_debit"], "45.50");

    let (status, _) = call(&app, "PUT", &format!("/api/v1/entries/{entry_id}"), Some(HOST), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "DELETE", &format!("/api/v1/entries/{entry_id}"), Some(HOST), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, entries) = call(&app, "GET", &format!("/api/v1/sessions/{sid}/entries"), None, None).await;
    assert!(entries["data"].as_array().unwrap().is_empty());

    let (status, body) = call(&app, "DELETE", &format!("/api/v1/entries/{entry_id}"), Some(HOST), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], error_codes::NOT_FOUND);
}

#[tokio::test]
async fn test_request_rejections() {
    let app = app();
    let (sid, alice, _) = seated_table(&app).await;
    let uri = format!("/api/v1/sessions/{sid}/entries");

    // No actor header
    let (status, body) = call(
        &app,
        "POST",
        &uri,
        None,
        Some(json!({"participant_id": alice, "kind": "debit", "amount": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], error_codes::MISSING_ACTOR);

    for amount in [json!("0"), json!("-5"), json!("1.005"), json!("abc"), json!(1e12)] {
        let (status, body) = call(
            &app,
            "POST",
            &uri,
            Some(ALICE),
            Some(json!({"participant_id": alice, "kind": "debit", "amount": amount})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "amount {amount}");
        assert_eq!(body["code"], error_codes::INVALID_PARAMETER);
    }

    let (status, _) = call(
        &app,
        "POST",
        &uri,
        Some(ALICE),
        Some(json!({"participant_id": alice, "kind": "refund", "amount": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Malformed body comes back in the envelope
    let (status, body) = call(&app, "POST", &uri, Some(ALICE), Some(json!({"kind": "debit"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"].as_str().unwrap().starts_with("Invalid JSON"));

    // Another user's participant
    let (status, body) = call(
        &app,
        "POST",
        &uri,
        Some(BOB),
        Some(json!({"participant_id": alice, "kind": "debit", "amount": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], error_codes::FORBIDDEN);

    let (status, _) = call(&app, "POST", "/api/v1/transfers/not-a-ulid/paid", Some(HOST), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", "/api/v1/audit/sessions/1", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", "/api/v1/sessions/424242", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mark_paid_without_body() {
    let app = app();
    let (sid, alice, bob) = seated_table(&app).await;
    for (pid, kind) in [(alice, "debit"), (bob, "credit")] {
        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/v1/sessions/{sid}/entries"),
            Some(HOST),
            Some(json!({"participant_id": pid, "kind": kind, "amount": "25"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    call(&app, "POST", &format!("/api/v1/sessions/{sid}/close"), Some(HOST), None).await;
    let (_, body) = call(&app, "POST", &format!("/api/v1/sessions/{sid}/settlement"), Some(HOST), None).await;
    let transfer_id = body["data"][0]["id"].as_str().unwrap().to_string();

    // No body and no content type at all
    let (status, body) = call(&app, "POST", &format!("/api/v1/transfers/{transfer_id}/paid"), Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["pay_state"], "paid");
    assert!(body["data"]["payment_method"].is_null());
}

#[tokio::test]
async fn test_openapi_served() {
    let app = app();
    let (status, body) = call(&app, "GET", "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["info"]["title"], "Settle Engine API");
}
