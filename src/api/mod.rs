//! HTTP API
//!
//! Trade submission, signed read endpoints, the event history query and the
//! event websocket. Every JSON response uses the `{code, message, data}`
//! envelope; on rejection `message` is the stable reason code.

mod error;
mod handlers;
mod types;
mod websocket;

pub use error::ApiError;
pub use types::*;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::clock::Clock;
use crate::events::EventBroadcaster;
use crate::identity::IdentityGuard;
use crate::oracle::PriceOracle;
use crate::persistence::{EventSource, TradeStore, WhitelistStore};
use crate::risk::RateLimiter;
use crate::validator::TradeValidator;

/// Row caps of the trade read endpoints
pub const USER_TRADES_LIMIT: i64 = 1000;
pub const ALL_TRADES_LIMIT: i64 = 5000;
pub const REGISTER_TIMES_LIMIT: i64 = 50_000;
/// Default look-back of `/getalltrades`
pub const ALL_TRADES_LOOKBACK_SECS: i64 = 7 * 24 * 60 * 60;
/// Default look-back of `/getallevents`
pub const EVENTS_LOOKBACK_SECS: i64 = 90 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct WsSettings {
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared handler state
pub struct AppState {
    pub validator: Arc<TradeValidator>,
    pub identity: Arc<IdentityGuard>,
    pub limiter: Arc<RateLimiter>,
    pub trades: Arc<dyn TradeStore>,
    pub registry: Arc<dyn WhitelistStore>,
    pub oracle: Arc<dyn PriceOracle>,
    pub events: Arc<dyn EventSource>,
    pub broadcaster: EventBroadcaster,
    pub clock: Arc<dyn Clock>,
    pub chains: Vec<String>,
    pub tokens: Vec<String>,
    pub ws: WsSettings,
}

/// Create the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/createtrade", post(handlers::create_trade))
        .route("/getusertrades", get(handlers::get_user_trades))
        .route("/getalltrades", get(handlers::get_all_trades))
        .route("/getlatestprice", get(handlers::get_latest_price))
        .route("/getregistertime", get(handlers::get_register_time))
        .route("/getallevents", get(handlers::get_all_events))
        .route("/health", get(handlers::health))
        // WebSocket
        .route("/ws/getevents", get(websocket::events_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
