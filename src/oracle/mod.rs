//! Oracle module - historical token prices
//!
//! Answers "what was the price of token T at time t": the most recent quote
//! at or before t. Trades are priced at their own timestamp and reconciled
//! against the price four hours later.

mod postgres;

pub use postgres::PgPriceOracle;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::error::OracleError;
use crate::types::TokenPrice;

/// Trait for historical price lookups
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Price of `token` at or before unix time `timestamp`
    async fn price_at(&self, token: &str, timestamp: i64) -> Result<Decimal, OracleError>;

    /// Latest quote per token, optionally as of unix time `at`.
    /// Tokens without any quote are left out.
    async fn latest_prices(
        &self,
        tokens: &[String],
        at: Option<i64>,
    ) -> Result<Vec<TokenPrice>, OracleError>;
}

pub(crate) fn to_datetime(timestamp: i64) -> Result<DateTime<Utc>, OracleError> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or(OracleError::InvalidTimestamp(timestamp))
}

/// In-memory price history, one series per token
#[derive(Default)]
pub struct PriceBook {
    series: RwLock<HashMap<String, BTreeMap<i64, TokenPrice>>>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, token: &str, chain: &str, timestamp: i64, price: Decimal) {
        let pt = match Utc.timestamp_opt(timestamp, 0).single() {
            Some(pt) => pt,
            None => return,
        };
        self.series
            .write()
            .await
            .entry(token.to_string())
            .or_default()
            .insert(
                timestamp,
                TokenPrice {
                    token_address: token.to_string(),
                    chain: chain.to_string(),
                    price,
                    pt,
                },
            );
    }

    async fn quote_at(&self, token: &str, timestamp: i64) -> Option<TokenPrice> {
        let series = self.series.read().await;
        series
            .get(token)?
            .range(..=timestamp)
            .next_back()
            .map(|(_, quote)| quote.clone())
    }
}

#[async_trait]
impl PriceOracle for PriceBook {
    async fn price_at(&self, token: &str, timestamp: i64) -> Result<Decimal, OracleError> {
        to_datetime(timestamp)?;
        self.quote_at(token, timestamp)
            .await
            .map(|q| q.price)
            .ok_or_else(|| OracleError::NoPrice {
                token: token.to_string(),
                timestamp,
            })
    }

    async fn latest_prices(
        &self,
        tokens: &[String],
        at: Option<i64>,
    ) -> Result<Vec<TokenPrice>, OracleError> {
        let at = at.unwrap_or(i64::MAX);
        let mut prices = Vec::with_capacity(tokens.len());
        for token in tokens {
            if let Some(quote) = self.quote_at(token, at).await {
                prices.push(quote);
            }
        }
        Ok(prices)
    }
}
