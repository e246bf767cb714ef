//! Persistence Module
//!
//! Storage seams for trades, the participant whitelist and chain events.
//! `PgStore` is the production backend; `InMemoryStore` backs tests and
//! local runs without a database.

mod postgres;

pub use postgres::PgStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{MinerRegistration, TokenEvent, Trade, TradeKey, WhitelistEntry};

#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Most recent trade (by trade timestamp) for a miner and token
    async fn latest_trade(&self, miner_id: &str, token: &str) -> Result<Option<Trade>, StoreError>;

    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError>;

    /// Set `price_4h` on the trade with this key; returns rows touched.
    async fn update_price_4h(&self, key: &TradeKey, price: Decimal) -> Result<u64, StoreError>;

    /// Active trades without a 4h price whose timestamp is at or before
    /// `cutoff`, in [`ScanCursor`] order, strictly after `after` when given.
    async fn trades_missing_price_4h(
        &self,
        cutoff: i64,
        after: Option<&ScanCursor>,
        limit: i64,
    ) -> Result<Vec<Trade>, StoreError>;

    /// A miner's trades, newest first
    async fn trades_by_miner(&self, miner_id: &str, limit: i64) -> Result<Vec<Trade>, StoreError>;

    /// All trades with timestamp >= `since`, newest first
    async fn trades_since(&self, since: i64, limit: i64) -> Result<Vec<Trade>, StoreError>;

    /// Disable every trade whose miner's whitelist row has status 0.
    async fn disable_trades_of_inactive_miners(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait WhitelistStore: Send + Sync {
    async fn whitelist_entry(&self, address: &str) -> Result<Option<WhitelistEntry>, StoreError>;

    /// Registrations with `register_time >= since`, newest first
    async fn register_times(&self, since: &str, limit: i64)
        -> Result<Vec<MinerRegistration>, StoreError>;
}

/// Position in the missing-price scan: oldest timestamp first, ties broken
/// by miner, token and nonce (byte order).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScanCursor {
    pub timestamp: i64,
    pub miner_id: String,
    pub token: String,
    pub nonce: i64,
}

impl ScanCursor {
    pub fn of(trade: &Trade) -> Self {
        Self {
            timestamp: trade.timestamp,
            miner_id: trade.miner_id.clone(),
            token: trade.token.clone(),
            nonce: trade.nonce,
        }
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Latest hour partition present for any of `chains`
    async fn max_pt(&self, chains: &[String]) -> Result<Option<String>, StoreError>;

    async fn events_at(
        &self,
        pt: &str,
        chains: &[String],
        tokens: &[String],
    ) -> Result<Vec<TokenEvent>, StoreError>;

    /// Events with `start <= pt <= end`, newest partition first
    async fn events_between(
        &self,
        start: &str,
        end: &str,
        chains: &[String],
        tokens: &[String],
    ) -> Result<Vec<TokenEvent>, StoreError>;
}

fn is_missing_price(price: Option<Decimal>) -> bool {
    price.map(|p| p.is_zero()).unwrap_or(true)
}

/// Process-local store implementing every persistence seam
#[derive(Default)]
pub struct InMemoryStore {
    trades: RwLock<Vec<Trade>>,
    whitelist: RwLock<HashMap<String, WhitelistEntry>>,
    registrations: RwLock<Vec<MinerRegistration>>,
    events: RwLock<Vec<TokenEvent>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_whitelist(&self, entry: WhitelistEntry) {
        self.whitelist
            .write()
            .await
            .insert(entry.address.clone(), entry);
    }

    pub async fn add_registration(&self, registration: MinerRegistration) {
        self.registrations.write().await.push(registration);
    }

    pub async fn add_event(&self, event: TokenEvent) {
        self.events.write().await.push(event);
    }

    /// Snapshot of every stored trade in insertion order
    pub async fn trades(&self) -> Vec<Trade> {
        self.trades.read().await.clone()
    }

    pub async fn find_trade(&self, key: &TradeKey) -> Option<Trade> {
        self.trades
            .read()
            .await
            .iter()
            .find(|t| t.key() == *key)
            .cloned()
    }
}

#[async_trait]
impl TradeStore for InMemoryStore {
    async fn latest_trade(&self, miner_id: &str, token: &str) -> Result<Option<Trade>, StoreError> {
        let trades = self.trades.read().await;
        Ok(trades
            .iter()
            .filter(|t| t.miner_id == miner_id && t.token == token)
            .max_by_key(|t| t.timestamp)
            .cloned())
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let mut trades = self.trades.write().await;
        let duplicate = trades.iter().any(|t| {
            t.miner_id == trade.miner_id
                && t.token == trade.token
                && t.nonce == trade.nonce
                && t.timestamp == trade.timestamp
        });
        if duplicate {
            return Err(StoreError::Duplicate {
                miner_id: trade.miner_id.clone(),
                token: trade.token.clone(),
                nonce: trade.nonce,
            });
        }
        trades.push(trade.clone());
        Ok(())
    }

    async fn update_price_4h(&self, key: &TradeKey, price: Decimal) -> Result<u64, StoreError> {
        let mut trades = self.trades.write().await;
        let now = chrono::Utc::now();
        let mut touched = 0;
        for trade in trades.iter_mut().filter(|t| t.key() == *key) {
            trade.price_4h = Some(price);
            trade.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn trades_missing_price_4h(
        &self,
        cutoff: i64,
        after: Option<&ScanCursor>,
        limit: i64,
    ) -> Result<Vec<Trade>, StoreError> {
        let trades = self.trades.read().await;
        let mut pending: Vec<(ScanCursor, Trade)> = trades
            .iter()
            .filter(|t| t.is_active() && is_missing_price(t.price_4h) && t.timestamp <= cutoff)
            .map(|t| (ScanCursor::of(t), t.clone()))
            .filter(|(cursor, _)| after.map_or(true, |a| cursor > a))
            .collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        pending.truncate(limit.max(0) as usize);
        Ok(pending.into_iter().map(|(_, t)| t).collect())
    }

    async fn trades_by_miner(&self, miner_id: &str, limit: i64) -> Result<Vec<Trade>, StoreError> {
        let trades = self.trades.read().await;
        let mut found: Vec<Trade> = trades
            .iter()
            .filter(|t| t.miner_id == miner_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn trades_since(&self, since: i64, limit: i64) -> Result<Vec<Trade>, StoreError> {
        let trades = self.trades.read().await;
        let mut found: Vec<Trade> = trades
            .iter()
            .filter(|t| t.timestamp >= since)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn disable_trades_of_inactive_miners(&self) -> Result<u64, StoreError> {
        let inactive: Vec<String> = self
            .whitelist
            .read()
            .await
            .values()
            .filter(|e| e.status == 0)
            .map(|e| e.address.clone())
            .collect();

        let mut trades = self.trades.write().await;
        let mut touched = 0;
        for trade in trades.iter_mut().filter(|t| inactive.contains(&t.miner_id)) {
            trade.status = 0;
            touched += 1;
        }
        Ok(touched)
    }
}

#[async_trait]
impl WhitelistStore for InMemoryStore {
    async fn whitelist_entry(&self, address: &str) -> Result<Option<WhitelistEntry>, StoreError> {
        Ok(self.whitelist.read().await.get(address).cloned())
    }

    async fn register_times(
        &self,
        since: &str,
        limit: i64,
    ) -> Result<Vec<MinerRegistration>, StoreError> {
        let mut found: Vec<MinerRegistration> = self
            .registrations
            .read()
            .await
            .iter()
            .filter(|r| r.register_time.as_str() >= since)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.register_time.cmp(&a.register_time));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }
}

#[async_trait]
impl EventSource for InMemoryStore {
    async fn max_pt(&self, chains: &[String]) -> Result<Option<String>, StoreError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| chains.contains(&e.chain))
            .map(|e| e.pt.clone())
            .max())
    }

    async fn events_at(
        &self,
        pt: &str,
        chains: &[String],
        tokens: &[String],
    ) -> Result<Vec<TokenEvent>, StoreError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.pt == pt && chains.contains(&e.chain) && tokens.contains(&e.token_address))
            .cloned()
            .collect())
    }

    async fn events_between(
        &self,
        start: &str,
        end: &str,
        chains: &[String],
        tokens: &[String],
    ) -> Result<Vec<TokenEvent>, StoreError> {
        let events = self.events.read().await;
        let mut found: Vec<TokenEvent> = events
            .iter()
            .filter(|e| {
                e.pt.as_str() >= start
                    && e.pt.as_str() <= end
                    && chains.contains(&e.chain)
                    && tokens.contains(&e.token_address)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.pt.cmp(&a.pt));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PositionAction;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn trade(miner: &str, nonce: i64, timestamp: i64) -> Trade {
        Trade {
            miner_id: miner.to_string(),
            pub_key: "pk".to_string(),
            nonce,
            token: "0xt".to_string(),
            position_manager: PositionAction::Open,
            direction: 1,
            timestamp,
            price: dec!(100),
            price_4h: None,
            signature: "sig".to_string(),
            status: 1,
            leverage: 1.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn event(chain: &str, token: &str, pt: &str) -> TokenEvent {
        TokenEvent {
            token_address: token.to_string(),
            chain: chain.to_string(),
            event_id: format!("{chain}-{pt}"),
            event_type: "transfer".to_string(),
            event: "large_transfer".to_string(),
            event_detail: "{}".to_string(),
            pt: pt.to_string(),
            base_score: "1".to_string(),
        }
    }

    #[tokio::test]
    async fn latest_trade_is_by_timestamp() {
        let store = InMemoryStore::new();
        store.insert_trade(&trade("m", 2, 200)).await.unwrap();
        store.insert_trade(&trade("m", 1, 100)).await.unwrap();

        let latest = store.latest_trade("m", "0xt").await.unwrap().unwrap();
        assert_eq!(latest.nonce, 2);
        assert!(store.latest_trade("m", "0xother").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_trade(&trade("m", 1, 100)).await.unwrap();
        let err = store.insert_trade(&trade("m", 1, 100)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { nonce: 1, .. }));
    }

    #[tokio::test]
    async fn update_price_4h_is_idempotent() {
        let store = InMemoryStore::new();
        let t = trade("m", 1, 100);
        store.insert_trade(&t).await.unwrap();

        assert_eq!(store.update_price_4h(&t.key(), dec!(105)).await.unwrap(), 1);
        let once = store.find_trade(&t.key()).await.unwrap();
        assert_eq!(store.update_price_4h(&t.key(), dec!(105)).await.unwrap(), 1);
        let twice = store.find_trade(&t.key()).await.unwrap();

        assert_eq!(once.price_4h, Some(dec!(105)));
        assert_eq!(once.price_4h, twice.price_4h);
    }

    #[tokio::test]
    async fn missing_price_scan_filters_and_orders() {
        let store = InMemoryStore::new();
        store.insert_trade(&trade("m", 3, 300)).await.unwrap();
        store.insert_trade(&trade("m", 1, 100)).await.unwrap();
        let mut filled = trade("m", 2, 200);
        filled.price_4h = Some(dec!(1));
        store.insert_trade(&filled).await.unwrap();
        let mut zero = trade("m", 4, 150);
        zero.price_4h = Some(dec!(0));
        store.insert_trade(&zero).await.unwrap();
        let mut disabled = trade("m", 5, 50);
        disabled.status = 0;
        store.insert_trade(&disabled).await.unwrap();
        store.insert_trade(&trade("m", 6, 999)).await.unwrap();

        let pending = store.trades_missing_price_4h(300, None, 100).await.unwrap();
        let nonces: Vec<i64> = pending.iter().map(|t| t.nonce).collect();
        assert_eq!(nonces, vec![1, 4, 3]);
    }

    #[tokio::test]
    async fn missing_price_scan_pages_past_cursor() {
        let store = InMemoryStore::new();
        store.insert_trade(&trade("b", 1, 100)).await.unwrap();
        store.insert_trade(&trade("a", 2, 100)).await.unwrap();
        store.insert_trade(&trade("a", 1, 100)).await.unwrap();
        store.insert_trade(&trade("a", 3, 200)).await.unwrap();

        let first = store.trades_missing_price_4h(300, None, 2).await.unwrap();
        let seen: Vec<(&str, i64)> = first.iter().map(|t| (t.miner_id.as_str(), t.nonce)).collect();
        assert_eq!(seen, vec![("a", 1), ("a", 2)]);

        let cursor = ScanCursor::of(first.last().unwrap());
        let second = store
            .trades_missing_price_4h(300, Some(&cursor), 2)
            .await
            .unwrap();
        let seen: Vec<(&str, i64)> = second.iter().map(|t| (t.miner_id.as_str(), t.nonce)).collect();
        assert_eq!(seen, vec![("b", 1), ("a", 3)]);
    }

    #[tokio::test]
    async fn register_times_are_newest_first_from_start() {
        let store = InMemoryStore::new();
        for (uid, at) in [(1, "2024-04-30 23:59:59"), (2, "2024-05-01 00:00:00"), (3, "2024-05-02 08:00:00")] {
            store
                .add_registration(MinerRegistration {
                    uid,
                    address: format!("5Addr{uid}"),
                    register_time: at.to_string(),
                })
                .await;
        }

        let found = store.register_times("2024-05-01 00:00:00", 100).await.unwrap();
        let uids: Vec<i32> = found.iter().map(|r| r.uid).collect();
        assert_eq!(uids, vec![3, 2]);
        assert_eq!(store.register_times("", 1).await.unwrap()[0].uid, 3);
    }

    #[tokio::test]
    async fn inactive_miner_trades_are_disabled() {
        let store = InMemoryStore::new();
        store.insert_trade(&trade("active", 1, 100)).await.unwrap();
        store.insert_trade(&trade("gone", 1, 100)).await.unwrap();
        store.insert_trade(&trade("gone", 2, 200)).await.unwrap();
        for (address, status) in [("active", 1), ("gone", 0)] {
            store
                .upsert_whitelist(WhitelistEntry {
                    address: address.to_string(),
                    uid: 1,
                    stake: 0,
                    status,
                    timestamp: 0,
                })
                .await;
        }

        assert_eq!(store.disable_trades_of_inactive_miners().await.unwrap(), 2);
        let trades = store.trades().await;
        assert!(trades.iter().filter(|t| t.miner_id == "gone").all(|t| t.status == 0));
        assert!(trades.iter().filter(|t| t.miner_id == "active").all(|t| t.status == 1));
    }

    #[tokio::test]
    async fn events_are_filtered_by_chain_token_and_partition() {
        let store = InMemoryStore::new();
        store.add_event(event("eth", "0xa", "2024-05-01 10")).await;
        store.add_event(event("eth", "0xa", "2024-05-01 12")).await;
        store.add_event(event("sol", "0xa", "2024-05-01 13")).await;
        store.add_event(event("eth", "0xb", "2024-05-01 11")).await;

        let chains = vec!["eth".to_string()];
        let tokens = vec!["0xa".to_string()];

        assert_eq!(
            store.max_pt(&chains).await.unwrap().as_deref(),
            Some("2024-05-01 12")
        );
        assert_eq!(
            store
                .events_at("2024-05-01 12", &chains, &tokens)
                .await
                .unwrap()
                .len(),
            1
        );

        let between = store
            .events_between("2024-05-01 00", "2024-05-01 23", &chains, &tokens)
            .await
            .unwrap();
        let pts: Vec<&str> = between.iter().map(|e| e.pt.as_str()).collect();
        assert_eq!(pts, vec!["2024-05-01 12", "2024-05-01 10"]);
    }
}
