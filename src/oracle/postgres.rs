//! Price oracle over the `token_prices` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use super::{to_datetime, PriceOracle};
use crate::error::OracleError;
use crate::types::TokenPrice;

#[derive(Debug, FromRow)]
struct PriceRow {
    token_address: String,
    chain: String,
    price: Decimal,
    pt: DateTime<Utc>,
}

/// Looks up quotes across a fixed set of chains
#[derive(Clone)]
pub struct PgPriceOracle {
    pool: PgPool,
    chains: Vec<String>,
}

impl PgPriceOracle {
    pub fn new(pool: PgPool, chains: Vec<String>) -> Self {
        Self { pool, chains }
    }
}

#[async_trait]
impl PriceOracle for PgPriceOracle {
    async fn price_at(&self, token: &str, timestamp: i64) -> Result<Decimal, OracleError> {
        let at = to_datetime(timestamp)?;
        let price: Option<Decimal> = sqlx::query_scalar(
            "SELECT price FROM token_prices \
             WHERE token_address = $1 AND chain = ANY($2) AND pt <= $3 \
             ORDER BY pt DESC LIMIT 1",
        )
        .bind(token)
        .bind(&self.chains)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        debug!(token, timestamp, ?price, "Price lookup");
        price.ok_or_else(|| OracleError::NoPrice {
            token: token.to_string(),
            timestamp,
        })
    }

    async fn latest_prices(
        &self,
        tokens: &[String],
        at: Option<i64>,
    ) -> Result<Vec<TokenPrice>, OracleError> {
        let at = at.map(to_datetime).transpose()?;
        let rows = sqlx::query_as::<_, PriceRow>(
            "SELECT DISTINCT ON (token_address) token_address, chain, price, pt \
             FROM token_prices \
             WHERE token_address = ANY($1) AND chain = ANY($2) \
               AND ($3::timestamptz IS NULL OR pt <= $3) \
             ORDER BY token_address, pt DESC",
        )
        .bind(tokens)
        .bind(&self.chains)
        .bind(at)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TokenPrice {
                token_address: r.token_address,
                chain: r.chain,
                price: r.price,
                pt: r.pt,
            })
            .collect())
    }
}
