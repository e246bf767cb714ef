//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use rust_decimal::Decimal;
use schnorrkel::{ExpansionMode, Keypair, MiniSecretKey};
use std::sync::Arc;

use tradegate::clock::{Clock, ManualClock};
use tradegate::counter::{CounterStore, InMemoryCounterStore};
use tradegate::error::OracleError;
use tradegate::identity::{
    ss58_encode, IdentityGuard, Sr25519Verifier, DEFAULT_VALIDATOR_STAKE_THRESHOLD,
    SIGNING_CONTEXT, SS58_PREFIX,
};
use tradegate::oracle::{PriceBook, PriceOracle};
use tradegate::persistence::{InMemoryStore, TradeStore};
use tradegate::risk::{LeverageRatchet, RateLimitConfig, RateLimiter, RatchetConfig};
use tradegate::types::{TokenPrice, TradeSubmission, WhitelistEntry};
use tradegate::validator::{TradeValidator, ValidatorConfig};

pub const T0: i64 = 1_700_000_000;
pub const TOKEN: &str = "0x514910771af9ca656af840dff83e8264ecf986ca";
pub const MINER_STAKE: i64 = 5_000_000;
pub const VALIDATOR_STAKE: i64 = DEFAULT_VALIDATOR_STAKE_THRESHOLD + 1;

mock! {
    pub Oracle {}

    #[async_trait]
    impl PriceOracle for Oracle {
        async fn price_at(&self, token: &str, timestamp: i64) -> Result<Decimal, OracleError>;
        async fn latest_prices(
            &self,
            tokens: &[String],
            at: Option<i64>,
        ) -> Result<Vec<TokenPrice>, OracleError>;
    }
}

/// A test participant with a deterministic sr25519 key
pub struct Participant {
    pub keypair: Keypair,
    pub pub_key: String,
    pub address: String,
}

impl Participant {
    pub fn new(seed: u8) -> Self {
        let keypair = MiniSecretKey::from_bytes(&[seed; 32])
            .unwrap()
            .expand_to_keypair(ExpansionMode::Ed25519);
        let public = keypair.public.to_bytes();
        Self {
            pub_key: hex::encode(public),
            address: ss58_encode(&public, SS58_PREFIX),
            keypair,
        }
    }

    pub fn sign(&self, message: &str) -> String {
        hex::encode(
            self.keypair
                .sign_simple(SIGNING_CONTEXT, message.as_bytes())
                .to_bytes(),
        )
    }

    /// Signed submission for `token`
    pub fn submission(
        &self,
        token: &str,
        nonce: i64,
        action: &str,
        timestamp: i64,
        leverage: Option<f64>,
    ) -> TradeSubmission {
        let mut sub = TradeSubmission {
            miner_id: self.address.clone(),
            pub_key: self.pub_key.clone(),
            nonce,
            token: token.to_string(),
            position_manager: action.to_string(),
            direction: 1,
            timestamp,
            leverage,
            signature: String::new(),
        };
        sub.signature = self.sign(&sub.signing_message());
        sub
    }
}

/// Validator wired to in-memory backends and a manual clock
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryStore>,
    pub prices: Arc<PriceBook>,
    pub counters: Arc<InMemoryCounterStore>,
    pub identity: Arc<IdentityGuard>,
    pub limiter: Arc<RateLimiter>,
    pub validator: Arc<TradeValidator>,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_trade_store(store.clone(), store).await
    }

    /// Harness whose validator writes trades through `trades` while
    /// whitelist lookups still use `store`.
    pub async fn with_trade_store(store: Arc<InMemoryStore>, trades: Arc<dyn TradeStore>) -> Self {
        let prices = Arc::new(PriceBook::new());
        prices.record(TOKEN, "eth", T0 - 3600, Decimal::new(100, 0)).await;
        Self::build(store, trades, prices.clone(), prices)
    }

    pub fn with_oracle(oracle: Arc<dyn PriceOracle>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::build(store.clone(), store, Arc::new(PriceBook::new()), oracle)
    }

    fn build(
        store: Arc<InMemoryStore>,
        trades: Arc<dyn TradeStore>,
        prices: Arc<PriceBook>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let counters = Arc::new(InMemoryCounterStore::new(clock.clone()));
        let counter_store: Arc<dyn CounterStore> = counters.clone();

        let identity = Arc::new(IdentityGuard::new(
            Arc::new(Sr25519Verifier::default()),
            store.clone(),
            DEFAULT_VALIDATOR_STAKE_THRESHOLD,
        ));
        let limiter = Arc::new(RateLimiter::new(
            counter_store.clone(),
            RateLimitConfig::default(),
        ));
        let ratchet = LeverageRatchet::new(counter_store, RatchetConfig::default());
        let validator = Arc::new(TradeValidator::new(
            identity.clone(),
            limiter.clone(),
            ratchet,
            trades,
            oracle,
            clock.clone(),
            ValidatorConfig::default(),
        ));

        Self {
            clock,
            store,
            prices,
            counters,
            identity,
            limiter,
            validator,
        }
    }

    pub async fn register(&self, who: &Participant, stake: i64, status: i32) {
        self.store
            .upsert_whitelist(WhitelistEntry {
                address: who.address.clone(),
                uid: 1,
                stake,
                status,
                timestamp: T0,
            })
            .await;
    }

    /// Registered, active miner
    pub async fn miner(&self, seed: u8) -> Participant {
        let who = Participant::new(seed);
        self.register(&who, MINER_STAKE, 1).await;
        who
    }

    pub fn now(&self) -> i64 {
        self.clock.unix()
    }
}
