//! Redis-backed counter store for multi-instance deployments.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::info;

use super::CounterStore;
use crate::error::CounterError;

/// Counters stored as plain Redis integers. INCR is atomic server-side, EXPIRE
/// carries the window.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self, CounterError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(reply = %pong, "Connected to Redis counter store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<i64, CounterError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value.unwrap_or(0))
    }

    async fn increment(&self, key: &str) -> Result<i64, CounterError> {
        let mut conn = self.conn.clone();
        let value: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), CounterError> {
        let secs = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(secs)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<(), CounterError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}
