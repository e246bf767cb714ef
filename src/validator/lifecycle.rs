//! Position lifecycle per (miner, token)
//!
//! ```text
//! NoPosition --open--> Open --close--> Closed
//!                       |                 |
//!                       +--open (rolled)--+--open--> Open
//! ```
//!
//! `Closed` behaves exactly like `NoPosition`. An open on top of an open
//! position is a roll: the prior open is closed by a synthetic trade first.

use serde::{Deserialize, Serialize};

use crate::error::{RejectReason, Rejection};
use crate::types::{PositionAction, Trade, TradeKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    /// Accept a close as the very first trade for a (miner, token)
    pub allow_close_first: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            allow_close_first: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    NoPosition,
    Open,
    Closed,
}

impl PositionState {
    pub fn of(latest: Option<&Trade>) -> Self {
        match latest.map(|t| t.position_manager) {
            None => PositionState::NoPosition,
            Some(PositionAction::Open) => PositionState::Open,
            Some(PositionAction::Close) => PositionState::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Open with no position held
    OpenFresh,
    /// Close of the held position, or a leading close when allowed
    Close,
    /// Open on top of an open position; subject to the leverage ratchet
    Reopen,
}

/// Writes that must accompany an accepted transition
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Persist this synthetic close before the candidate
    AutoClose(Trade),
    /// Set `price_4h` of this trade to the candidate's price, best effort
    BackfillPrior(TradeKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub transition: Transition,
    pub effects: Vec<SideEffect>,
}

impl TransitionPlan {
    pub fn new(transition: Transition) -> Self {
        Self {
            transition,
            effects: Vec::new(),
        }
    }

    pub fn auto_close(&self) -> Option<&Trade> {
        self.effects.iter().find_map(|e| match e {
            SideEffect::AutoClose(t) => Some(t),
            _ => None,
        })
    }

    pub fn backfill_target(&self) -> Option<&TradeKey> {
        self.effects.iter().find_map(|e| match e {
            SideEffect::BackfillPrior(k) => Some(k),
            _ => None,
        })
    }
}

fn sequence_error(detail: impl Into<String>) -> Rejection {
    Rejection::new(RejectReason::PositionSequenceInvalid, detail)
}

/// Pick the transition for a candidate against the latest stored trade.
///
/// Only ordering rules live here; the ratchet decision and side effects are
/// layered on by the validator.
pub fn plan(
    latest: Option<&Trade>,
    action: PositionAction,
    nonce: i64,
    timestamp: i64,
    policy: &LifecyclePolicy,
) -> Result<Transition, Rejection> {
    let prior = match latest {
        None => {
            return match action {
                PositionAction::Open => Ok(Transition::OpenFresh),
                PositionAction::Close if policy.allow_close_first => Ok(Transition::Close),
                PositionAction::Close => Err(sequence_error("close trade without open position")),
            };
        }
        Some(prior) => prior,
    };

    if nonce == prior.nonce {
        return Err(sequence_error(format!("nonce {} already used", nonce)));
    }
    if timestamp <= prior.timestamp {
        return Err(sequence_error(format!(
            "timestamp {} is not after latest trade at {}",
            timestamp, prior.timestamp
        )));
    }

    match (PositionState::of(Some(prior)), action) {
        (PositionState::Open, PositionAction::Close) => Ok(Transition::Close),
        (PositionState::Closed, PositionAction::Open) => Ok(Transition::OpenFresh),
        (PositionState::Open, PositionAction::Open) => {
            // the synthetic close takes nonce+1 and timestamp+1
            if nonce == prior.nonce + 1 {
                return Err(sequence_error(format!(
                    "nonce {} is reserved for the automatic close",
                    nonce
                )));
            }
            if timestamp <= prior.timestamp + 1 {
                return Err(sequence_error(format!(
                    "timestamp {} leaves no room for the automatic close",
                    timestamp
                )));
            }
            Ok(Transition::Reopen)
        }
        (_, PositionAction::Close) => Err(sequence_error("close trade without open position")),
        (_, PositionAction::Open) => Err(sequence_error("open trade is invalid")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn prior(action: PositionAction, nonce: i64, timestamp: i64) -> Trade {
        Trade {
            miner_id: "m".to_string(),
            pub_key: "pk".to_string(),
            nonce,
            token: "0xt".to_string(),
            position_manager: action,
            direction: 1,
            timestamp,
            price: dec!(10),
            price_4h: None,
            signature: "sig".to_string(),
            status: 1,
            leverage: 1.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn first_trade() {
        let policy = LifecyclePolicy::default();
        assert_eq!(
            plan(None, PositionAction::Open, 1, 100, &policy).unwrap(),
            Transition::OpenFresh
        );
        assert_eq!(
            plan(None, PositionAction::Close, 1, 100, &policy).unwrap(),
            Transition::Close
        );

        let strict = LifecyclePolicy {
            allow_close_first: false,
        };
        let err = plan(None, PositionAction::Close, 1, 100, &strict).unwrap_err();
        assert_eq!(err.reason, RejectReason::PositionSequenceInvalid);
    }

    #[test]
    fn alternation() {
        let policy = LifecyclePolicy::default();
        let open = prior(PositionAction::Open, 1, 100);
        let closed = prior(PositionAction::Close, 1, 100);

        assert_eq!(
            plan(Some(&open), PositionAction::Close, 2, 101, &policy).unwrap(),
            Transition::Close
        );
        assert_eq!(
            plan(Some(&closed), PositionAction::Open, 2, 101, &policy).unwrap(),
            Transition::OpenFresh
        );
        assert!(plan(Some(&closed), PositionAction::Close, 2, 101, &policy).is_err());
    }

    #[test]
    fn open_over_open_is_a_reopen() {
        let policy = LifecyclePolicy::default();
        let open = prior(PositionAction::Open, 1, 100);
        assert_eq!(
            plan(Some(&open), PositionAction::Open, 3, 102, &policy).unwrap(),
            Transition::Reopen
        );
    }

    #[test]
    fn reopen_must_not_collide_with_the_automatic_close() {
        let policy = LifecyclePolicy::default();
        let open = prior(PositionAction::Open, 1, 100);
        assert!(plan(Some(&open), PositionAction::Open, 2, 150, &policy).is_err());
        assert!(plan(Some(&open), PositionAction::Open, 5, 101, &policy).is_err());
    }

    #[test]
    fn nonce_and_timestamp_rules() {
        let policy = LifecyclePolicy::default();
        let open = prior(PositionAction::Open, 7, 100);

        let err = plan(Some(&open), PositionAction::Close, 7, 200, &policy).unwrap_err();
        assert_eq!(err.reason, RejectReason::PositionSequenceInvalid);
        assert!(plan(Some(&open), PositionAction::Close, 8, 100, &policy).is_err());
        assert!(plan(Some(&open), PositionAction::Close, 8, 99, &policy).is_err());
        // nonces need not increase, only differ
        assert!(plan(Some(&open), PositionAction::Close, 3, 101, &policy).is_ok());
    }

    #[test]
    fn plan_exposes_effects() {
        let mut plan = TransitionPlan::new(Transition::Close);
        assert!(plan.auto_close().is_none());
        let key = prior(PositionAction::Open, 1, 100).key();
        plan.effects.push(SideEffect::BackfillPrior(key.clone()));
        assert_eq!(plan.backfill_target(), Some(&key));
    }
}
