//! PostgreSQL backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::info;

use super::{EventSource, ScanCursor, TradeStore, WhitelistStore};
use crate::error::StoreError;
use crate::types::{
    MinerRegistration, PositionAction, TokenEvent, Trade, TradeKey, WhitelistEntry,
};

const TRADE_COLUMNS: &str = "miner_id, pub_key, nonce, token, position_manager, direction, \
     timestamp, price, price_4h, signature, status, leverage, create_at, update_at";

const SCHEMA: [&str; 6] = [
    r#"CREATE TABLE IF NOT EXISTS ads_token_trades (
        miner_id TEXT NOT NULL,
        pub_key TEXT NOT NULL,
        nonce BIGINT NOT NULL,
        token TEXT NOT NULL,
        position_manager TEXT NOT NULL,
        direction INTEGER NOT NULL,
        timestamp BIGINT NOT NULL,
        price NUMERIC NOT NULL,
        price_4h NUMERIC,
        signature TEXT NOT NULL,
        status INTEGER NOT NULL,
        leverage DOUBLE PRECISION NOT NULL DEFAULT 1,
        create_at TIMESTAMPTZ NOT NULL,
        update_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (miner_id, token, nonce, timestamp)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_ads_token_trades_timestamp
        ON ads_token_trades (timestamp)"#,
    r#"CREATE TABLE IF NOT EXISTS ads_addr_whitelist (
        address TEXT PRIMARY KEY,
        uid INTEGER NOT NULL DEFAULT 0,
        stake BIGINT NOT NULL DEFAULT 0,
        status INTEGER NOT NULL DEFAULT 0,
        timestamp BIGINT NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS ads_miner_performance (
        uid INTEGER PRIMARY KEY,
        address TEXT NOT NULL,
        register_time TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS ads_token_events (
        token_address TEXT NOT NULL,
        chain TEXT NOT NULL,
        event_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        event TEXT NOT NULL,
        event_detail TEXT NOT NULL,
        pt TEXT NOT NULL,
        base_score TEXT NOT NULL,
        PRIMARY KEY (token_address, chain, event_id, event_type, event, pt)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS token_prices (
        token_address TEXT NOT NULL,
        chain TEXT NOT NULL,
        price NUMERIC NOT NULL,
        pt TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (token_address, chain, pt)
    )"#,
];

#[derive(Debug, FromRow)]
struct TradeRow {
    miner_id: String,
    pub_key: String,
    nonce: i64,
    token: String,
    position_manager: String,
    direction: i32,
    timestamp: i64,
    price: Decimal,
    price_4h: Option<Decimal>,
    signature: String,
    status: i32,
    leverage: f64,
    create_at: DateTime<Utc>,
    update_at: DateTime<Utc>,
}

impl TryFrom<TradeRow> for Trade {
    type Error = StoreError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        let position_manager = PositionAction::parse(&row.position_manager).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "trade {}/{}/{} has position_manager {:?}",
                row.miner_id, row.token, row.nonce, row.position_manager
            ))
        })?;
        Ok(Trade {
            miner_id: row.miner_id,
            pub_key: row.pub_key,
            nonce: row.nonce,
            token: row.token,
            position_manager,
            direction: row.direction,
            timestamp: row.timestamp,
            price: row.price,
            price_4h: row.price_4h,
            signature: row.signature,
            status: row.status,
            leverage: row.leverage,
            created_at: row.create_at,
            updated_at: row.update_at,
        })
    }
}

fn into_trades(rows: Vec<TradeRow>) -> Result<Vec<Trade>, StoreError> {
    rows.into_iter().map(Trade::try_from).collect()
}

#[derive(Debug, FromRow)]
struct WhitelistRow {
    address: String,
    uid: i32,
    stake: i64,
    status: i32,
    timestamp: i64,
}

#[derive(Debug, FromRow)]
struct RegistrationRow {
    uid: i32,
    address: String,
    register_time: String,
}

#[derive(Debug, FromRow)]
struct EventRow {
    token_address: String,
    chain: String,
    event_id: String,
    event_type: String,
    event: String,
    event_detail: String,
    pt: String,
    base_score: String,
}

impl From<EventRow> for TokenEvent {
    fn from(row: EventRow) -> Self {
        TokenEvent {
            token_address: row.token_address,
            chain: row.chain,
            event_id: row.event_id,
            event_type: row.event_type,
            event: row.event,
            event_detail: row.event_detail,
            pt: row.pt,
            base_score: row.base_score,
        }
    }
}

/// sqlx-backed store over a shared connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables this service reads and writes if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema ensured");
        Ok(())
    }
}

#[async_trait]
impl TradeStore for PgStore {
    async fn latest_trade(&self, miner_id: &str, token: &str) -> Result<Option<Trade>, StoreError> {
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM ads_token_trades \
             WHERE miner_id = $1 AND token = $2 ORDER BY timestamp DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, TradeRow>(&sql)
            .bind(miner_id)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Trade::try_from).transpose()
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO ads_token_trades ({TRADE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );
        let result = sqlx::query(&sql)
            .bind(&trade.miner_id)
            .bind(&trade.pub_key)
            .bind(trade.nonce)
            .bind(&trade.token)
            .bind(trade.position_manager.as_str())
            .bind(trade.direction)
            .bind(trade.timestamp)
            .bind(trade.price)
            .bind(trade.price_4h)
            .bind(&trade.signature)
            .bind(trade.status)
            .bind(trade.leverage)
            .bind(trade.created_at)
            .bind(trade.updated_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate {
                    miner_id: trade.miner_id.clone(),
                    token: trade.token.clone(),
                    nonce: trade.nonce,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_price_4h(&self, key: &TradeKey, price: Decimal) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE ads_token_trades SET price_4h = $1, update_at = now() \
             WHERE miner_id = $2 AND token = $3 AND nonce = $4",
        )
        .bind(price)
        .bind(&key.miner_id)
        .bind(&key.token)
        .bind(key.nonce)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn trades_missing_price_4h(
        &self,
        cutoff: i64,
        after: Option<&ScanCursor>,
        limit: i64,
    ) -> Result<Vec<Trade>, StoreError> {
        // Byte collation keeps the row order identical to ScanCursor's Ord
        const PENDING: &str = "status > 0 AND (price_4h IS NULL OR price_4h = 0) AND timestamp <= $1";
        const ORDER: &str = "timestamp, miner_id COLLATE \"C\", token COLLATE \"C\", nonce";

        let rows = match after {
            None => {
                let sql = format!(
                    "SELECT {TRADE_COLUMNS} FROM ads_token_trades \
                     WHERE {PENDING} ORDER BY {ORDER} LIMIT $2"
                );
                sqlx::query_as::<_, TradeRow>(&sql)
                    .bind(cutoff)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            Some(cursor) => {
                let sql = format!(
                    "SELECT {TRADE_COLUMNS} FROM ads_token_trades \
                     WHERE {PENDING} \
                     AND (timestamp, miner_id COLLATE \"C\", token COLLATE \"C\", nonce) > ($2, $3, $4, $5) \
                     ORDER BY {ORDER} LIMIT $6"
                );
                sqlx::query_as::<_, TradeRow>(&sql)
                    .bind(cutoff)
                    .bind(cursor.timestamp)
                    .bind(&cursor.miner_id)
                    .bind(&cursor.token)
                    .bind(cursor.nonce)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        into_trades(rows)
    }

    async fn trades_by_miner(&self, miner_id: &str, limit: i64) -> Result<Vec<Trade>, StoreError> {
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM ads_token_trades \
             WHERE miner_id = $1 ORDER BY timestamp DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, TradeRow>(&sql)
            .bind(miner_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        into_trades(rows)
    }

    async fn trades_since(&self, since: i64, limit: i64) -> Result<Vec<Trade>, StoreError> {
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM ads_token_trades \
             WHERE timestamp >= $1 ORDER BY timestamp DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, TradeRow>(&sql)
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        into_trades(rows)
    }

    async fn disable_trades_of_inactive_miners(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE ads_token_trades t SET status = 0, update_at = now() \
             FROM ads_addr_whitelist w \
             WHERE t.miner_id = w.address AND w.status = 0 AND t.status <> 0",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl WhitelistStore for PgStore {
    async fn whitelist_entry(&self, address: &str) -> Result<Option<WhitelistEntry>, StoreError> {
        let row = sqlx::query_as::<_, WhitelistRow>(
            "SELECT address, uid, stake, status, timestamp FROM ads_addr_whitelist WHERE address = $1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| WhitelistEntry {
            address: r.address,
            uid: r.uid,
            stake: r.stake,
            status: r.status,
            timestamp: r.timestamp,
        }))
    }

    async fn register_times(
        &self,
        since: &str,
        limit: i64,
    ) -> Result<Vec<MinerRegistration>, StoreError> {
        let rows = sqlx::query_as::<_, RegistrationRow>(
            "SELECT uid, address, register_time FROM ads_miner_performance \
             WHERE register_time >= $1 ORDER BY register_time DESC LIMIT $2",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| MinerRegistration {
                uid: r.uid,
                address: r.address,
                register_time: r.register_time,
            })
            .collect())
    }
}

#[async_trait]
impl EventSource for PgStore {
    async fn max_pt(&self, chains: &[String]) -> Result<Option<String>, StoreError> {
        let pt: Option<String> =
            sqlx::query_scalar("SELECT max(pt) FROM ads_token_events WHERE chain = ANY($1)")
                .bind(chains)
                .fetch_one(&self.pool)
                .await?;
        Ok(pt)
    }

    async fn events_at(
        &self,
        pt: &str,
        chains: &[String],
        tokens: &[String],
    ) -> Result<Vec<TokenEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT token_address, chain, event_id, event_type, event, event_detail, pt, base_score \
             FROM ads_token_events \
             WHERE pt = $1 AND chain = ANY($2) AND token_address = ANY($3)",
        )
        .bind(pt)
        .bind(chains)
        .bind(tokens)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TokenEvent::from).collect())
    }

    async fn events_between(
        &self,
        start: &str,
        end: &str,
        chains: &[String],
        tokens: &[String],
    ) -> Result<Vec<TokenEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT token_address, chain, event_id, event_type, event, event_detail, pt, base_score \
             FROM ads_token_events \
             WHERE chain = ANY($1) AND token_address = ANY($2) AND pt BETWEEN $3 AND $4 \
             ORDER BY pt DESC",
        )
        .bind(chains)
        .bind(tokens)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TokenEvent::from).collect())
    }
}
