//! Counter store - shared counters for rate-limit windows and ratchet streaks
//!
//! Counters are read-modify-written by concurrent request handlers, so every
//! backend must make `increment` atomic. Expiry is per key: once a key's TTL
//! elapses it reads as zero and the next increment starts a fresh window.

mod redis_store;

pub use redis_store::RedisCounterStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::error::CounterError;

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value, zero when missing or expired
    async fn get(&self, key: &str) -> Result<i64, CounterError>;

    /// Atomically add one and return the new value
    async fn increment(&self, key: &str) -> Result<i64, CounterError>;

    /// Expire the key `ttl` from now, replacing any previous expiry
    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), CounterError>;

    /// Drop the key
    async fn reset(&self, key: &str) -> Result<(), CounterError>;
}

#[derive(Debug, Clone)]
struct CounterEntry {
    value: i64,
    expires_at: Option<DateTime<Utc>>,
}

impl CounterEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| now < t).unwrap_or(true)
    }
}

/// Process-local counter store.
///
/// A single mutex guards the map; it is never held across an await point.
pub struct InMemoryCounterStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CounterEntry>>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, CounterEntry>) -> R) -> R {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        entries.retain(|_, entry| entry.is_live(now));
        f(&mut entries)
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<i64, CounterError> {
        Ok(self.with_entries(|entries| entries.get(key).map(|e| e.value).unwrap_or(0)))
    }

    async fn increment(&self, key: &str) -> Result<i64, CounterError> {
        Ok(self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(CounterEntry {
                value: 0,
                expires_at: None,
            });
            entry.value += 1;
            entry.value
        }))
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), CounterError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CounterError::InvalidTtl(e.to_string()))?;
        let expires_at = self.clock.now() + ttl;
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(expires_at);
            }
        });
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<(), CounterError> {
        self.with_entries(|entries| {
            entries.remove(key);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (Arc<ManualClock>, InMemoryCounterStore) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = InMemoryCounterStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn increment_counts_from_one() {
        let (_, store) = store();
        assert_eq!(store.get("k").await.unwrap(), 0);
        assert_eq!(store.increment("k").await.unwrap(), 1);
        assert_eq!(store.increment("k").await.unwrap(), 2);
        assert_eq!(store.get("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn expiry_drops_the_key() {
        let (clock, store) = store();
        store.increment("k").await.unwrap();
        store.set_expiry("k", Duration::from_secs(60)).await.unwrap();

        clock.advance(59);
        assert_eq!(store.get("k").await.unwrap(), 1);

        clock.advance(1);
        assert_eq!(store.get("k").await.unwrap(), 0);
        assert_eq!(store.increment("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_expiry_on_missing_key_is_noop() {
        let (_, store) = store();
        store.set_expiry("missing", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reset_clears_value() {
        let (_, store) = store();
        store.increment("k").await.unwrap();
        store.reset("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let (_, store) = store();
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.increment("k").await.unwrap() }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.get("k").await.unwrap(), 32);
    }
}
