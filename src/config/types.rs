//! Configuration sections

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Counter backend. Without a URL counters live in process memory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitsConfig {
    pub trade_per_minute: i64,
    pub trade_per_day: i64,
    pub trade_per_token_per_day: i64,
    pub query_per_minute: i64,
    pub minute_window_secs: u64,
    pub day_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeverageConfig {
    /// Tokens with the wider bounds
    pub major_tokens: Vec<String>,
    pub major_min: f64,
    pub major_max: f64,
    pub other_min: f64,
    pub other_max: f64,
    pub step: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatchetSection {
    pub threshold: i64,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    pub allow_close_first: bool,
    /// Oldest accepted trade timestamp, seconds before now
    pub max_age_secs: i64,
    pub price_4h_window_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileSection {
    pub interval_secs: u64,
    pub horizon_secs: i64,
    pub batch_limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistConfig {
    /// Stake strictly above this classifies as validator
    pub validator_stake_threshold: i64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    pub poll_interval_secs: u64,
    pub channel_capacity: usize,
    /// Server ping period on event websockets
    pub ping_interval_secs: u64,
    /// Drop a websocket that has been silent this long
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Chains consulted for prices and events
    pub chains: Vec<String>,
    /// Tokens served by price and event endpoints
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    pub json: bool,
}
