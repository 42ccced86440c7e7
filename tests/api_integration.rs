//! Router-level integration tests.
//!
//! Each test builds the full axum router over a fresh on-disk SQLite store
//! (offline orderbook, no live subscribers) and drives it with oneshot
//! requests, asserting the wire-visible contract: status codes, the
//! `{ok, error}` envelope, and the event history.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use domabid_backend::{
    api::{router, AppState},
    notify::LiveUpdates,
    settlement::{FeeConfig, SettlementEngine},
    store::AuctionDb,
    subgraph::SubgraphClient,
};

struct TestApp {
    _dir: tempfile::TempDir,
    app: Router,
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("api.db");
    let store = Arc::new(AuctionDb::new(path.to_str().unwrap()).unwrap());
    let updates = LiveUpdates::disabled();
    let settlement = Arc::new(SettlementEngine::new(
        store.clone(),
        updates.clone(),
        FeeConfig::default(),
    ));
    let state = AppState {
        store,
        settlement,
        updates,
        orderbook: None,
        subgraph: Arc::new(SubgraphClient::new(None, None)),
    };
    TestApp {
        _dir: dir,
        app: router(state),
    }
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    request(app, "GET", uri, None).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    request(app, "POST", uri, Some(body)).await
}

fn event_types(auction: &Value) -> Vec<String> {
    auction["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_reports_service() {
    let t = test_app();
    let (status, body) = get(&t.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "domabid-backend");
}

#[tokio::test]
async fn create_validates_required_fields() {
    let t = test_app();

    let (status, body) = post(&t.app, "/api/auctions", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "reservePriceEth required");

    let (status, body) = post(&t.app, "/api/auctions", json!({"reservePriceEth": "1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "tokenId or domainId required");

    let (status, body) = post(
        &t.app,
        "/api/auctions",
        json!({"reservePriceEth": "not-a-number", "tokenId": "42"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid reservePriceEth");
}

#[tokio::test]
async fn create_then_get_roundtrip() {
    let t = test_app();
    let (status, body) = post(
        &t.app,
        "/api/auctions",
        json!({"tokenId": "42", "reservePriceEth": "1.5", "decayMode": "sigmoid"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    let auction = &body["auction"];
    assert_eq!(auction["status"], "DRAFT");
    assert_eq!(auction["reservePriceWei"], "1500000000000000000");
    assert_eq!(auction["decayMode"], "sigmoid");
    // No window scheduled: the quote is the full reserve.
    assert_eq!(auction["priceEth"], "1.5000");
    assert_eq!(auction["progressPct"], 0);

    let id = auction["id"].as_str().unwrap();
    let (status, body) = get(&t.app, &format!("/api/auctions/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auction"]["id"], id);

    let (status, body) = get(&t.app, "/api/auctions/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "auction not found");
}

#[tokio::test]
async fn form_encoded_bodies_are_accepted() {
    let t = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/auctions")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("tokenId=7&reservePriceEth=2"))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["auction"]["reservePriceWei"], "2000000000000000000");
}

#[tokio::test]
async fn commit_validates_and_lowercases_bidder() {
    let t = test_app();
    let (_, body) = post(
        &t.app,
        "/api/auctions",
        json!({"tokenId": "42", "reservePriceEth": "1"}),
    )
    .await;
    let id = body["auction"]["id"].as_str().unwrap().to_string();

    let (status, body) = post(&t.app, &format!("/api/auctions/{id}/commit"), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bidder required");

    let (status, body) = post(
        &t.app,
        &format!("/api/auctions/{id}/commit"),
        json!({"bidder": "0xABC"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "amountEth required");

    let (status, body) = post(
        &t.app,
        &format!("/api/auctions/{id}/commit"),
        json!({"bidder": "0xABC", "amountEth": "oops"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid amountEth");

    let (status, body) = post(
        &t.app,
        "/api/auctions/nope/commit",
        json!({"bidder": "0xABC", "amountEth": "1"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "auction not found");

    let (status, body) = post(
        &t.app,
        &format!("/api/auctions/{id}/commit"),
        json!({"bidder": "0xABC", "amountEth": "0.5"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bid"]["bidder"], "0xabc");
    assert_eq!(body["bid"]["amountWei"], "500000000000000000");
}

#[tokio::test]
async fn predictions_require_an_active_auction_and_a_field() {
    let t = test_app();
    let (_, body) = post(
        &t.app,
        "/api/auctions",
        json!({"tokenId": "42", "reservePriceEth": "1"}),
    )
    .await;
    let id = body["auction"]["id"].as_str().unwrap().to_string();

    // DRAFT auction: predictions rejected.
    let (status, body) = post(
        &t.app,
        &format!("/api/auctions/{id}/predict"),
        json!({"userId": "u1", "priceEth": 1.0}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "predictions allowed only for ACTIVE auctions");

    // Activate via the listing route (offline stub).
    let (status, _) = post(
        &t.app,
        "/api/listing",
        json!({"auctionId": id, "reservePriceEth": "1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&t.app, &format!("/api/auctions/{id}/predict"), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Provide priceEth and/or time");

    let (status, body) = post(
        &t.app,
        &format!("/api/auctions/{id}/predict"),
        json!({"userId": "u1", "priceEth": 1.25}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"]["type"], "PREDICTION");
    assert_eq!(body["prediction"]["payload"]["predict"]["priceEth"], 1.25);
}

#[tokio::test]
async fn listing_activates_existing_draft_or_creates_active() {
    let t = test_app();
    let (_, body) = post(
        &t.app,
        "/api/auctions",
        json!({"tokenId": "42", "reservePriceEth": "1"}),
    )
    .await;
    let id = body["auction"]["id"].as_str().unwrap().to_string();

    // Listing an existing draft by tokenId flips it ACTIVE.
    let (status, body) = post(
        &t.app,
        "/api/listing",
        json!({"tokenId": "42", "reservePriceEth": "2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auction"]["id"], id.as_str());
    assert_eq!(body["auction"]["status"], "ACTIVE");
    assert_eq!(body["reservePriceWei"], "2000000000000000000");
    assert!(event_types(&body["auction"]).contains(&"LISTING_CREATED".to_string()));

    // An unknown target falls back to creating an ACTIVE auction.
    let (status, body) = post(
        &t.app,
        "/api/listing",
        json!({"domainId": "fresh.doma", "reservePriceEth": "3"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["auction"]["id"], id.as_str());
    assert_eq!(body["auction"]["status"], "ACTIVE");

    // Missing every target id is a validation error.
    let (status, body) = post(&t.app, "/api/listing", json!({"reservePriceEth": "3"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "auctionId or (tokenId/domainId) required");
}

#[tokio::test]
async fn full_auction_flow_settles_once() {
    let t = test_app();
    let (_, body) = post(
        &t.app,
        "/api/listing",
        json!({"tokenId": "42", "reservePriceEth": "2"}),
    )
    .await;
    let id = body["auction"]["id"].as_str().unwrap().to_string();

    post(
        &t.app,
        &format!("/api/auctions/{id}/commit"),
        json!({"bidder": "0xAAA", "amountEth": "2"}),
    )
    .await;
    post(
        &t.app,
        &format!("/api/auctions/{id}/reveal"),
        json!({"bidder": "0xAAA", "proof": "0xproof"}),
    )
    .await;
    post(
        &t.app,
        &format!("/api/auctions/{id}/predict"),
        json!({"userId": "u1", "priceEth": 2.0}),
    )
    .await;

    let (status, body) = post(
        &t.app,
        &format!("/api/auctions/{id}/settle"),
        json!({"txHash": "0xfeed"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let auction = &body["auction"];
    assert_eq!(auction["status"], "SETTLED");
    assert_eq!(auction["txHash"], "0xfeed");
    let types = event_types(auction);
    for expected in ["AUCTION_SETTLED", "FEE_CAPTURED", "PREDICTION_SCORED"] {
        assert!(types.contains(&expected.to_string()), "missing {expected}");
    }

    let fee = auction["events"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["type"] == "FEE_CAPTURED")
        .unwrap();
    // 2 ETH settle price, 3% fee, 20% pool share.
    assert_eq!(fee["payload"]["settlePriceWei"], "2000000000000000000");
    assert_eq!(fee["payload"]["feeWei"], "60000000000000000");
    assert_eq!(fee["payload"]["poolWei"], "12000000000000000");

    // Settling again neither fails nor double-writes.
    let (status, body) = post(&t.app, &format!("/api/auctions/{id}/settle"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let types = event_types(&body["auction"]);
    assert_eq!(types.iter().filter(|t| *t == "FEE_CAPTURED").count(), 1);
    assert_eq!(types.iter().filter(|t| *t == "PREDICTION_SCORED").count(), 1);

    let (_, body) = get(&t.app, "/api/auctions").await;
    assert_eq!(body["ok"], true);
    assert!(!body["auctions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn settle_expired_reports_zero_when_nothing_is_due() {
    let t = test_app();
    let (status, body) = post(&t.app, "/api/auctions/settle-expired", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
    assert_eq!(body["settled"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn domains_fall_back_to_canned_list() {
    let t = test_app();
    let (status, body) = get(&t.app, "/api/domains").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["domains"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alice.doma", "bob.doma"]);

    let (status, body) = post(&t.app, "/api/subgraph/mock", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["names"]["items"].is_array());
}
