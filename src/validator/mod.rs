//! Trade validator - the submission path
//!
//! A submission is checked in a fixed order: identity, address binding,
//! signature, rate limits, leverage, position action, freshness, and finally
//! its place in the (miner, token) position sequence. Accepted trades are
//! priced from the oracle at their own timestamp and persisted together with
//! any side effects the lifecycle transition requires.

pub mod leverage;
pub mod lifecycle;

pub use leverage::{LeverageBounds, LeveragePolicy, NATIVE_ETH, WBTC};
pub use lifecycle::{LifecyclePolicy, PositionState, SideEffect, Transition, TransitionPlan};

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::{RejectReason, Rejection, StoreError};
use crate::identity::IdentityGuard;
use crate::oracle::PriceOracle;
use crate::persistence::TradeStore;
use crate::risk::{LeverageRatchet, RateLimiter, RatchetVerdict};
use crate::types::{PositionAction, Role, Trade, TradeSubmission};

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    pub leverage: LeveragePolicy,
    pub lifecycle: LifecyclePolicy,
    /// Oldest acceptable trade timestamp, in seconds before now
    pub max_age_secs: i64,
    /// A close this soon after its open backfills the open's 4h price
    pub price_4h_window_secs: i64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            leverage: LeveragePolicy::default(),
            lifecycle: LifecyclePolicy::default(),
            max_age_secs: 60,
            price_4h_window_secs: 4 * 60 * 60,
        }
    }
}

/// A submission that passed every check, with the writes it implies
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTrade {
    pub action: PositionAction,
    pub leverage: f64,
    pub prior: Option<Trade>,
    pub plan: TransitionPlan,
}

/// Result of an accepted submission
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub trade: Trade,
    pub auto_closed: Option<Trade>,
    pub price_4h_backfilled: bool,
}

pub struct TradeValidator {
    identity: Arc<IdentityGuard>,
    limiter: Arc<RateLimiter>,
    ratchet: LeverageRatchet,
    trades: Arc<dyn TradeStore>,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    config: ValidatorConfig,
}

impl TradeValidator {
    pub fn new(
        identity: Arc<IdentityGuard>,
        limiter: Arc<RateLimiter>,
        ratchet: LeverageRatchet,
        trades: Arc<dyn TradeStore>,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            identity,
            limiter,
            ratchet,
            trades,
            oracle,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate and persist a submission.
    pub async fn submit(&self, submission: TradeSubmission) -> Result<Accepted, Rejection> {
        let validated = match self.validate(&submission).await {
            Ok(v) => v,
            Err(rejection) => {
                warn!(
                    miner = %submission.miner_id,
                    token = %submission.token,
                    nonce = submission.nonce,
                    reason = %rejection.reason,
                    detail = %rejection.detail,
                    "Trade rejected"
                );
                return Err(rejection);
            }
        };
        self.commit(submission, validated).await
    }

    /// Run every check and plan the transition. Rate-limit and ratchet
    /// counters are updated as a side effect; nothing is persisted.
    pub async fn validate(&self, sub: &TradeSubmission) -> Result<ValidatedTrade, Rejection> {
        if self.identity.role_of(&sub.miner_id).await? == Role::Validator {
            return Err(Rejection::new(
                RejectReason::ValidatorNotPermitted,
                "validators may not submit trades",
            ));
        }

        self.identity
            .check_address_matches(&sub.pub_key, &sub.miner_id)?;

        self.identity.authenticate(
            sub.signing_message().as_bytes(),
            &sub.pub_key,
            &sub.signature,
        )?;

        self.limiter.check_trade(&sub.pub_key, &sub.token).await?;

        let leverage = self
            .config
            .leverage
            .resolve(&sub.token, sub.supplied_leverage())?;

        let action = PositionAction::parse(&sub.position_manager).ok_or_else(|| {
            Rejection::new(
                RejectReason::PositionManagerInvalid,
                format!("position manager {:?} is invalid", sub.position_manager),
            )
        })?;

        self.check_freshness(sub.timestamp)?;

        let prior = self
            .trades
            .latest_trade(&sub.miner_id, &sub.token)
            .await
            .map_err(|e| store_failure("latest trade lookup", e))?;

        let transition = lifecycle::plan(
            prior.as_ref(),
            action,
            sub.nonce,
            sub.timestamp,
            &self.config.lifecycle,
        )?;

        let mut plan = TransitionPlan::new(transition);
        match (transition, prior.as_ref()) {
            (Transition::Reopen, Some(open)) => {
                let verdict = self
                    .ratchet
                    .evaluate(open, sub.direction, leverage, self.clock.now())
                    .await
                    .map_err(|e| {
                        error!(error = %e, "Ratchet counter unavailable");
                        Rejection::new(RejectReason::InternalFailure, e.to_string())
                    })?;
                match verdict {
                    RatchetVerdict::Rolled { auto_close, .. } => {
                        plan.effects.push(SideEffect::AutoClose(auto_close));
                    }
                    RatchetVerdict::Blocked { streak } => {
                        return Err(Rejection::new(
                            RejectReason::OpenTradeLimitExceeded,
                            format!("open trade limit exceeded after {} rolls", streak),
                        ));
                    }
                }
            }
            (Transition::Close, Some(open)) if open.is_open() => {
                if sub.timestamp - open.timestamp <= self.config.price_4h_window_secs {
                    plan.effects.push(SideEffect::BackfillPrior(open.key()));
                }
            }
            _ => {}
        }

        Ok(ValidatedTrade {
            action,
            leverage,
            prior,
            plan,
        })
    }

    fn check_freshness(&self, timestamp: i64) -> Result<(), Rejection> {
        let now = self.clock.unix();
        if timestamp > now {
            return Err(Rejection::new(
                RejectReason::TimestampFuture,
                format!("timestamp {} is after now ({})", timestamp, now),
            ));
        }
        if timestamp < now - self.config.max_age_secs {
            return Err(Rejection::new(
                RejectReason::TimestampStale,
                format!(
                    "timestamp {} is more than {}s old",
                    timestamp, self.config.max_age_secs
                ),
            ));
        }
        Ok(())
    }

    async fn commit(
        &self,
        sub: TradeSubmission,
        validated: ValidatedTrade,
    ) -> Result<Accepted, Rejection> {
        let price = self
            .oracle
            .price_at(&sub.token, sub.timestamp)
            .await
            .map_err(|e| {
                warn!(token = %sub.token, timestamp = sub.timestamp, error = %e, "No price for trade");
                Rejection::new(RejectReason::PriceUnavailable, e.to_string())
            })?;

        let now = self.clock.now();
        let trade = Trade {
            miner_id: sub.miner_id,
            pub_key: sub.pub_key,
            nonce: sub.nonce,
            token: sub.token,
            position_manager: validated.action,
            direction: sub.direction,
            timestamp: sub.timestamp,
            price,
            price_4h: None,
            signature: sub.signature,
            status: 1,
            leverage: validated.leverage,
            created_at: now,
            updated_at: now,
        };

        let auto_closed = validated.plan.auto_close().cloned();
        if let Some(close) = &auto_closed {
            self.trades
                .insert_trade(close)
                .await
                .map_err(|e| store_failure("automatic close insert", e))?;
            info!(
                "🔁 Auto-closed {}/{} nonce {} before reopen",
                close.miner_id, close.token, close.nonce
            );
        }

        self.trades
            .insert_trade(&trade)
            .await
            .map_err(|e| store_failure("trade insert", e))?;

        let mut price_4h_backfilled = false;
        if let Some(key) = validated.plan.backfill_target() {
            match self.trades.update_price_4h(key, price).await {
                Ok(_) => price_4h_backfilled = true,
                Err(e) => warn!(
                    miner = %key.miner_id,
                    token = %key.token,
                    nonce = key.nonce,
                    error = %e,
                    "Failed to backfill 4h price of prior open"
                ),
            }
        }

        info!(
            miner = %trade.miner_id,
            token = %trade.token,
            nonce = trade.nonce,
            action = %trade.position_manager,
            leverage = trade.leverage,
            price = %trade.price,
            "✅ Trade accepted"
        );

        Ok(Accepted {
            trade,
            auto_closed,
            price_4h_backfilled,
        })
    }
}

fn store_failure(operation: &str, e: StoreError) -> Rejection {
    match e {
        StoreError::Duplicate { .. } => {
            Rejection::new(RejectReason::PositionSequenceInvalid, e.to_string())
        }
        _ => {
            error!(operation, error = %e, "Trade store failure");
            Rejection::new(RejectReason::PersistenceFailure, format!("{operation}: {e}"))
        }
    }
}
