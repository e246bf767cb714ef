//! Multi-window rate limiter
//!
//! Fixed windows per (scope, identity): the first hit of a window registers the
//! window's expiry, every hit increments, and a hit whose count exceeds the cap
//! is refused. The window start never moves on a refused hit, so a caller that
//! keeps hammering is released exactly when the first hit's window elapses.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::counter::CounterStore;
use crate::error::{CounterError, RejectReason, Rejection};

/// What a counter is bounding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitScope {
    TradePerMinute,
    TradePerDay,
    TradePerTokenPerDay,
    QueryPerMinute,
}

impl LimitScope {
    fn key_prefix(&self) -> &'static str {
        match self {
            LimitScope::TradePerMinute => "trade_min_rate_limit",
            LimitScope::TradePerDay => "trade_day_rate_limit",
            LimitScope::TradePerTokenPerDay => "trade_token_day_rate_limit",
            LimitScope::QueryPerMinute => "trade_query_min_rate_limit",
        }
    }

    pub fn reject_reason(&self) -> RejectReason {
        match self {
            LimitScope::TradePerMinute => RejectReason::RateLimitedMinute,
            LimitScope::TradePerDay => RejectReason::RateLimitedDay,
            LimitScope::TradePerTokenPerDay => RejectReason::RateLimitedTokenDay,
            LimitScope::QueryPerMinute => RejectReason::RateLimitedQuery,
        }
    }
}

/// Cap and window length for one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub cap: i64,
    pub window: Duration,
}

impl WindowLimit {
    pub const fn new(cap: i64, window: Duration) -> Self {
        Self { cap, window }
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub trade_per_minute: WindowLimit,
    pub trade_per_day: WindowLimit,
    pub trade_per_token_per_day: WindowLimit,
    pub query_per_minute: WindowLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        const MINUTE: Duration = Duration::from_secs(60);
        const DAY: Duration = Duration::from_secs(24 * 60 * 60);
        Self {
            trade_per_minute: WindowLimit::new(20, MINUTE),
            trade_per_day: WindowLimit::new(100, DAY),
            trade_per_token_per_day: WindowLimit::new(50, DAY),
            query_per_minute: WindowLimit::new(60, MINUTE),
        }
    }
}

impl RateLimitConfig {
    pub fn limit(&self, scope: LimitScope) -> WindowLimit {
        match scope {
            LimitScope::TradePerMinute => self.trade_per_minute,
            LimitScope::TradePerDay => self.trade_per_day,
            LimitScope::TradePerTokenPerDay => self.trade_per_token_per_day,
            LimitScope::QueryPerMinute => self.query_per_minute,
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Counter key for a scope and identity
    pub fn key(scope: LimitScope, identity: &str) -> String {
        format!("{}:{}", scope.key_prefix(), identity)
    }

    /// Record an attempt and report whether it fits under the cap.
    pub async fn allow(&self, scope: LimitScope, identity: &str) -> Result<bool, CounterError> {
        let limit = self.config.limit(scope);
        let key = Self::key(scope, identity);

        let count = self.store.increment(&key).await?;
        if count == 1 {
            self.store.set_expiry(&key, limit.window).await?;
        }

        if count > limit.cap {
            debug!(key = %key, count, cap = limit.cap, "Rate limit exceeded");
            return Ok(false);
        }
        Ok(true)
    }

    /// Per-minute, per-day and per-token-per-day trade limits, in that order.
    pub async fn check_trade(&self, pub_key: &str, token: &str) -> Result<(), Rejection> {
        let token_identity = format!("{pub_key}:{token}");
        let checks = [
            (LimitScope::TradePerMinute, pub_key),
            (LimitScope::TradePerDay, pub_key),
            (LimitScope::TradePerTokenPerDay, token_identity.as_str()),
        ];

        for (scope, identity) in checks {
            self.check(scope, identity).await?;
        }
        Ok(())
    }

    /// Read-endpoint limit
    pub async fn check_query(&self, pub_key: &str) -> Result<(), Rejection> {
        self.check(LimitScope::QueryPerMinute, pub_key).await
    }

    async fn check(&self, scope: LimitScope, identity: &str) -> Result<(), Rejection> {
        match self.allow(scope, identity).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                let limit = self.config.limit(scope);
                Err(Rejection::new(
                    scope.reject_reason(),
                    format!(
                        "access limit of {} per {}s exceeded, please try again later",
                        limit.cap,
                        limit.window.as_secs()
                    ),
                ))
            }
            Err(e) => {
                warn!(error = %e, ?scope, "Counter store unavailable for rate limit");
                Err(Rejection::new(RejectReason::InternalFailure, e.to_string()))
            }
        }
    }
}
