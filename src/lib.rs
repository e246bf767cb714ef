//! TradeGate Library
//!
//! Trade submission gateway for a miner trading network: signature and
//! whitelist checks, rate limits, leverage policy, position lifecycle with
//! the leverage ratchet, and 4h price reconciliation.

pub mod api;
pub mod clock;
pub mod config;
pub mod counter;
pub mod error;
pub mod events;
pub mod identity;
pub mod jobs;
pub mod oracle;
pub mod persistence;
pub mod risk;
pub mod types;
pub mod validator;
