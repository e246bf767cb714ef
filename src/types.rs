//! Core types used throughout TradeGate
//!
//! Defines trades, submissions, whitelist entries, prices and chain events.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Signature recorded on trades synthesized by the service itself.
pub const SYSTEM_SIGNATURE: &str = "no need sign";

/// Leverage recorded when the caller does not supply one.
pub const DEFAULT_LEVERAGE: f64 = 1.0;

/// Position manager action of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionAction {
    Open,
    Close,
}

impl PositionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionAction::Open => "open",
            PositionAction::Close => "close",
        }
    }

    /// Parse from the wire value. Matching is exact: "Open" is not "open".
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PositionAction::Open),
            "close" => Some(PositionAction::Close),
            _ => None,
        }
    }
}

impl fmt::Display for PositionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural key of a trade row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TradeKey {
    pub miner_id: String,
    pub token: String,
    pub nonce: i64,
}

/// A persisted trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub miner_id: String,
    pub pub_key: String,
    pub nonce: i64,
    pub token: String,
    pub position_manager: PositionAction,
    pub direction: i32,
    /// Logical trade time (unix seconds, caller supplied)
    pub timestamp: i64,
    /// Oracle price at `timestamp`
    pub price: Decimal,
    /// Oracle price four hours after `timestamp`, once known
    pub price_4h: Option<Decimal>,
    pub signature: String,
    /// 0 = disabled, >0 = active
    pub status: i32,
    pub leverage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    pub fn key(&self) -> TradeKey {
        TradeKey {
            miner_id: self.miner_id.clone(),
            token: self.token.clone(),
            nonce: self.nonce,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status > 0
    }

    pub fn is_open(&self) -> bool {
        self.position_manager == PositionAction::Open
    }

    pub fn is_system_generated(&self) -> bool {
        self.signature == SYSTEM_SIGNATURE
    }
}

/// Raw trade request as submitted by a miner.
///
/// `position_manager` stays a string so an unknown value can be rejected with
/// its own reason code. A `leverage` of `None` or `Some(0.0)` means "not supplied".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSubmission {
    pub miner_id: String,
    pub pub_key: String,
    pub nonce: i64,
    pub token: String,
    pub position_manager: String,
    pub direction: i32,
    pub timestamp: i64,
    #[serde(default)]
    pub leverage: Option<f64>,
    pub signature: String,
}

impl TradeSubmission {
    /// Leverage as supplied by the caller, ignoring the zero placeholder.
    pub fn supplied_leverage(&self) -> Option<f64> {
        self.leverage.filter(|l| *l != 0.0)
    }

    /// Message the miner signs: the concatenated fields, followed by the
    /// leverage in shortest decimal form when one was supplied.
    pub fn signing_message(&self) -> String {
        let mut msg = format!(
            "{}{}{}{}{}{}{}",
            self.miner_id,
            self.pub_key,
            self.nonce,
            self.token,
            self.position_manager,
            self.direction,
            self.timestamp
        );
        if let Some(leverage) = self.supplied_leverage() {
            msg.push_str(&leverage.to_string());
        }
        msg
    }
}

/// Whitelist row for a network participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub address: String,
    pub uid: i32,
    pub stake: i64,
    /// <1 = not validated
    pub status: i32,
    pub timestamp: i64,
}

/// Registration record of a miner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerRegistration {
    pub uid: i32,
    pub address: String,
    /// As stored, e.g. "2024-05-01 13:20:00"; compared lexically
    pub register_time: String,
}

/// Role of a whitelisted address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May submit trades
    Miner,
    /// May read aggregate trade data, may not trade
    Validator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Miner => write!(f, "MINER"),
            Role::Validator => write!(f, "VALIDATOR"),
        }
    }
}

/// Price snapshot for a token on a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrice {
    pub token_address: String,
    pub chain: String,
    pub price: Decimal,
    pub pt: DateTime<Utc>,
}

/// On-chain event row, forwarded as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub token_address: String,
    pub chain: String,
    pub event_id: String,
    pub event_type: String,
    pub event: String,
    pub event_detail: String,
    /// Hour partition, e.g. "2024-05-01 13"
    pub pt: String,
    pub base_score: String,
}
