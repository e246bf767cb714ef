//! HTTP surface tests driven through the router

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use common::{Harness, MockOracle, Participant, T0, TOKEN, VALIDATOR_STAKE};
use tradegate::api::{create_router, AppState, WsSettings};
use tradegate::error::OracleError;
use tradegate::events::EventBroadcaster;
use tradegate::oracle::PriceOracle;
use tradegate::types::{MinerRegistration, TokenEvent, TokenPrice};

fn router(h: &Harness, oracle: Arc<dyn PriceOracle>) -> Router {
    create_router(Arc::new(AppState {
        validator: h.validator.clone(),
        identity: h.identity.clone(),
        limiter: h.limiter.clone(),
        trades: h.store.clone(),
        registry: h.store.clone(),
        oracle,
        events: h.store.clone(),
        broadcaster: EventBroadcaster::default(),
        clock: h.clock.clone(),
        chains: vec!["eth".to_string()],
        tokens: vec![TOKEN.to_string()],
        ws: WsSettings::default(),
    }))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn signed_get(path: &str, who: &Participant, extra: &str) -> Request<Body> {
    let timestamp = T0.to_string();
    let sig = who.sign(&format!("{}{}{}", who.address, who.pub_key, timestamp));
    let uri = format!(
        "{path}?userId={}&pubKey={}&timestamp={}&sig={}{extra}",
        who.address, who.pub_key, timestamp, sig
    );
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ============================================================================
// /createtrade
// ============================================================================

#[tokio::test]
async fn test_create_trade_success_envelope() {
    let h = Harness::new().await;
    let miner = h.miner(1).await;
    let app = router(&h, h.prices.clone());

    let sub = miner.submission(TOKEN, 1, "open", h.now(), Some(2.0));
    let (status, body) = send(app, post_json("/createtrade", serde_json::to_string(&sub).unwrap())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);
    assert_eq!(body["message"], "create trade success");
    assert_eq!(body["data"]["trade"]["nonce"], 1);
    assert_eq!(body["data"]["trade"]["position_manager"], "open");
    assert_eq!(body["data"]["price_4h_backfilled"], false);
}

#[tokio::test]
async fn test_create_trade_rejection_carries_reason_code() {
    let h = Harness::new().await;
    let miner = h.miner(1).await;
    let app = router(&h, h.prices.clone());

    let mut sub = miner.submission(TOKEN, 1, "open", h.now(), None);
    sub.direction = -1;
    let (status, body) = send(app, post_json("/createtrade", serde_json::to_string(&sub).unwrap())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);
    assert_eq!(body["message"], "signature_invalid");
}

#[tokio::test]
async fn test_malformed_body_is_invalid_input() {
    let h = Harness::new().await;
    let app = router(&h, h.prices.clone());

    let (status, body) = send(app, post_json("/createtrade", "{\"miner_id\": 1".to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "invalid_input");
}

// ============================================================================
// Signed reads
// ============================================================================

#[tokio::test]
async fn test_user_trades_returns_own_history() {
    let h = Harness::new().await;
    let miner = h.miner(1).await;
    h.validator
        .submit(miner.submission(TOKEN, 1, "open", h.now(), None))
        .await
        .unwrap();
    let app = router(&h, h.prices.clone());

    let (status, body) = send(app, signed_get("/getusertrades", &miner, "")).await;

    assert_eq!(status, StatusCode::OK);
    let trades = body["data"].as_array().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0]["miner_id"], miner.address.as_str());
}

#[tokio::test]
async fn test_all_trades_requires_validator() {
    let h = Harness::new().await;
    let miner = h.miner(1).await;
    let validator = Participant::new(9);
    h.register(&validator, VALIDATOR_STAKE, 1).await;
    h.validator
        .submit(miner.submission(TOKEN, 1, "open", h.now(), None))
        .await
        .unwrap();

    let app = router(&h, h.prices.clone());
    let (status, body) = send(app.clone(), signed_get("/getalltrades", &miner, "")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "validator_required");

    let (status, body) = send(app, signed_get("/getalltrades", &validator, "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_register_time_is_validator_only_and_newest_first() {
    let h = Harness::new().await;
    let miner = h.miner(1).await;
    let validator = Participant::new(9);
    h.register(&validator, VALIDATOR_STAKE, 1).await;
    for (uid, at) in [
        (11, "2024-04-30 23:00:00"),
        (12, "2024-05-01 00:00:00"),
        (13, "2024-05-03 09:30:00"),
    ] {
        h.store
            .add_registration(MinerRegistration {
                uid,
                address: format!("5Miner{uid}"),
                register_time: at.to_string(),
            })
            .await;
    }
    let since = "&starttime=2024-05-01%2000:00:00";

    let app = router(&h, h.prices.clone());
    let (status, body) = send(app.clone(), signed_get("/getregistertime", &miner, since)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "validator_required");

    let (status, body) = send(app, signed_get("/getregistertime", &validator, since)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "get register time success");
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["uid"], 13);
    assert_eq!(rows[0]["register_time"], "2024-05-03 09:30:00");
    assert_eq!(rows[1]["uid"], 12);
}

#[tokio::test]
async fn test_read_with_bad_signature_is_unauthorized() {
    let h = Harness::new().await;
    let miner = h.miner(1).await;
    let app = router(&h, h.prices.clone());

    let uri = format!(
        "/getusertrades?userId={}&pubKey={}&timestamp={}&sig={}",
        miner.address,
        miner.pub_key,
        T0,
        "00".repeat(64)
    );
    let (status, body) = send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "signature_invalid");
}

#[tokio::test]
async fn test_latest_price_passes_tokens_and_as_of_time() {
    let h = Harness::new().await;
    let miner = h.miner(1).await;

    let mut oracle = MockOracle::new();
    oracle
        .expect_latest_prices()
        .withf(|tokens, at| tokens.len() == 1 && tokens[0] == TOKEN && *at == Some(T0 - 60))
        .times(1)
        .returning(|_, _| {
            Ok(vec![TokenPrice {
                token_address: TOKEN.to_string(),
                chain: "eth".to_string(),
                price: dec!(14.5),
                pt: Utc.timestamp_opt(T0 - 120, 0).unwrap(),
            }])
        });
    let app = router(&h, Arc::new(oracle));

    let (status, body) = send(
        app,
        signed_get("/getlatestprice", &miner, &format!("&latesttime={}", T0 - 60)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["token_address"], TOKEN);
    assert_eq!(body["data"][0]["chain"], "eth");
}

// ============================================================================
// Oracle failures on the submission path
// ============================================================================

#[tokio::test]
async fn test_oracle_failure_is_price_unavailable() {
    let mut oracle = MockOracle::new();
    oracle
        .expect_price_at()
        .withf(|token, timestamp| token == TOKEN && *timestamp == T0)
        .times(1)
        .returning(|token, timestamp| {
            Err(OracleError::NoPrice {
                token: token.to_string(),
                timestamp,
            })
        });
    let oracle: Arc<dyn PriceOracle> = Arc::new(oracle);
    let h = Harness::with_oracle(oracle.clone());
    let miner = h.miner(1).await;
    let app = router(&h, oracle);

    let sub = miner.submission(TOKEN, 1, "open", h.now(), None);
    let (status, body) = send(app, post_json("/createtrade", serde_json::to_string(&sub).unwrap())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "price_unavailable");
    assert!(h.store.trades().await.is_empty());
}

// ============================================================================
// Events and health
// ============================================================================

#[tokio::test]
async fn test_events_are_filtered_to_tracked_tokens() {
    let h = Harness::new().await;
    for (token, id) in [(TOKEN, "e1"), ("0xother", "e2")] {
        h.store
            .add_event(TokenEvent {
                token_address: token.to_string(),
                chain: "eth".to_string(),
                event_id: id.to_string(),
                event_type: "listing".to_string(),
                event: "listed".to_string(),
                event_detail: "{}".to_string(),
                pt: "2023-11-14 22".to_string(),
                base_score: "1".to_string(),
            })
            .await;
    }
    let app = router(&h, h.prices.clone());

    let uri = format!("/getallevents?start={}&end={}", T0 - 3600, T0);
    let (status, body) = send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    let events = body["data"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_id"], "e1");
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new().await;
    let app = router(&h, h.prices.clone());

    let (status, body) = send(app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["timestamp"], T0);
}
