//! API request and response types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{PositionAction, Trade};
use crate::validator::Accepted;

/// Response envelope shared by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            code: 200,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Trade as returned to readers; omits the key and signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeView {
    pub miner_id: String,
    pub nonce: i64,
    pub token: String,
    pub position_manager: PositionAction,
    pub direction: i32,
    pub timestamp: i64,
    pub price: Decimal,
    pub price_4h: Option<Decimal>,
    pub leverage: f64,
    pub create_at: DateTime<Utc>,
    pub update_at: DateTime<Utc>,
}

impl From<Trade> for TradeView {
    fn from(t: Trade) -> Self {
        Self {
            miner_id: t.miner_id,
            nonce: t.nonce,
            token: t.token,
            position_manager: t.position_manager,
            direction: t.direction,
            timestamp: t.timestamp,
            price: t.price,
            price_4h: t.price_4h,
            leverage: t.leverage,
            create_at: t.created_at,
            update_at: t.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTradeResponse {
    pub trade: TradeView,
    pub auto_closed: Option<TradeView>,
    pub price_4h_backfilled: bool,
}

impl From<Accepted> for CreateTradeResponse {
    fn from(a: Accepted) -> Self {
        Self {
            trade: a.trade.into(),
            auto_closed: a.auto_closed.map(Into::into),
            price_4h_backfilled: a.price_4h_backfilled,
        }
    }
}

/// Query string of the signed read endpoints.
///
/// The signature covers `userId ‖ pubKey ‖ timestamp` exactly as sent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedQuery {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub pub_key: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub sig: String,
    /// `/getalltrades`: lower bound on trade timestamp
    #[serde(default)]
    pub tradetime: Option<i64>,
    /// `/getlatestprice`: as-of unix time
    #[serde(default)]
    pub latesttime: Option<i64>,
    /// `/getregistertime`: lower bound on register time, e.g. "2024-05-01 00:00:00"
    #[serde(default)]
    pub starttime: Option<String>,
}

impl SignedQuery {
    pub fn signing_message(&self) -> String {
        format!("{}{}{}", self.user_id, self.pub_key, self.timestamp)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventRangeQuery {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub event_subscribers: usize,
    pub timestamp: i64,
}
