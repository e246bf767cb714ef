//! Leverage ratchet - stops a miner from escalating leverage on a position
//! forever without closing it.
//!
//! An "open" on top of an open position is allowed by rolling the position:
//! the old one is closed by a synthetic trade and the new open starts fresh.
//! Each roll that strictly increases leverage extends the streak for
//! (miner, token, direction); a roll that does not increase leverage resets it.
//! Once the streak reaches the threshold further rolls are refused and the
//! counter is held for the cooldown period.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::counter::CounterStore;
use crate::error::CounterError;
use crate::types::{PositionAction, Trade, SYSTEM_SIGNATURE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatchetConfig {
    /// Streak length at which rolls are refused
    pub threshold: i64,
    /// How long the block holds after being hit
    pub cooldown: Duration,
}

impl Default for RatchetConfig {
    fn default() -> Self {
        Self {
            threshold: 7,
            cooldown: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Outcome of a roll attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RatchetVerdict {
    /// Roll permitted; `auto_close` must be persisted before the new open
    Rolled { auto_close: Trade, streak: i64 },
    /// Streak limit reached
    Blocked { streak: i64 },
}

pub struct LeverageRatchet {
    store: Arc<dyn CounterStore>,
    config: RatchetConfig,
}

impl LeverageRatchet {
    pub fn new(store: Arc<dyn CounterStore>, config: RatchetConfig) -> Self {
        Self { store, config }
    }

    pub fn key(miner_id: &str, token: &str, direction: i32) -> String {
        format!("open_trade_ratchet:{miner_id}:{token}:{direction}")
    }

    /// Evaluate an open arriving while `prior` is still open.
    ///
    /// Mutates the streak counter; the synthetic close is returned, not written.
    pub async fn evaluate(
        &self,
        prior: &Trade,
        direction: i32,
        leverage: f64,
        now: DateTime<Utc>,
    ) -> Result<RatchetVerdict, CounterError> {
        let key = Self::key(&prior.miner_id, &prior.token, direction);
        let streak = self.store.get(&key).await?;

        if streak >= self.config.threshold {
            self.store.set_expiry(&key, self.config.cooldown).await?;
            warn!(
                miner = %prior.miner_id,
                token = %prior.token,
                direction,
                streak,
                "Open trade limit exceeded"
            );
            return Ok(RatchetVerdict::Blocked { streak });
        }

        let streak = if prior.leverage >= leverage {
            self.store.reset(&key).await?;
            0
        } else {
            self.store.increment(&key).await?
        };

        info!(
            miner = %prior.miner_id,
            token = %prior.token,
            prior_leverage = prior.leverage,
            leverage,
            streak,
            "Rolling open position"
        );

        Ok(RatchetVerdict::Rolled {
            auto_close: synthesize_close(prior, now),
            streak,
        })
    }
}

/// Close trade for `prior` generated by the service: one nonce and one second
/// after the open, at the open's own price.
pub fn synthesize_close(prior: &Trade, now: DateTime<Utc>) -> Trade {
    Trade {
        miner_id: prior.miner_id.clone(),
        pub_key: prior.pub_key.clone(),
        nonce: prior.nonce + 1,
        token: prior.token.clone(),
        position_manager: PositionAction::Close,
        direction: prior.direction,
        timestamp: prior.timestamp + 1,
        price: prior.price,
        price_4h: None,
        signature: SYSTEM_SIGNATURE.to_string(),
        status: 1,
        leverage: prior.leverage,
        created_at: now,
        updated_at: now,
    }
}
