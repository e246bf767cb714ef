//! Leverage policy: per-asset bounds on a fixed step grid

use serde::{Deserialize, Serialize};

use crate::error::{RejectReason, Rejection};
use crate::types::DEFAULT_LEVERAGE;

/// Float tolerance for bound and grid checks
const EPSILON: f64 = 1e-9;

/// Native ETH
pub const NATIVE_ETH: &str = "0x0000000000000000000000000000000000000000";
/// WBTC
pub const WBTC: &str = "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeverageBounds {
    pub min: f64,
    pub max: f64,
}

impl LeverageBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn contains(&self, value: f64) -> bool {
        value >= self.min - EPSILON && value <= self.max + EPSILON
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeveragePolicy {
    /// Tokens that get the wider `major` bounds
    pub major_tokens: Vec<String>,
    pub major: LeverageBounds,
    pub other: LeverageBounds,
    /// Leverage must be a whole multiple of this
    pub step: f64,
}

impl Default for LeveragePolicy {
    fn default() -> Self {
        Self {
            major_tokens: vec![NATIVE_ETH.to_string(), WBTC.to_string()],
            major: LeverageBounds::new(0.1, 50.0),
            other: LeverageBounds::new(0.1, 20.0),
            step: 0.1,
        }
    }
}

impl LeveragePolicy {
    pub fn is_major(&self, token: &str) -> bool {
        self.major_tokens
            .iter()
            .any(|t| t.eq_ignore_ascii_case(token))
    }

    pub fn bounds_for(&self, token: &str) -> LeverageBounds {
        if self.is_major(token) {
            self.major
        } else {
            self.other
        }
    }

    /// Effective leverage for a submission: the default when none was
    /// supplied, otherwise the supplied value if it is in range and on grid.
    pub fn resolve(&self, token: &str, supplied: Option<f64>) -> Result<f64, Rejection> {
        let leverage = match supplied {
            Some(l) => l,
            None => return Ok(DEFAULT_LEVERAGE),
        };

        let bounds = self.bounds_for(token);
        if !leverage.is_finite() || !bounds.contains(leverage) {
            return Err(Rejection::new(
                RejectReason::LeverageOutOfRange,
                format!(
                    "leverage {} is not in the range [{}, {}]",
                    leverage, bounds.min, bounds.max
                ),
            ));
        }

        if !self.is_on_grid(leverage) {
            return Err(Rejection::new(
                RejectReason::LeverageNotAligned,
                format!("leverage {} is not a multiple of {}", leverage, self.step),
            ));
        }

        Ok(leverage)
    }

    fn is_on_grid(&self, value: f64) -> bool {
        if self.step <= 0.0 {
            return true;
        }
        let steps = (value / self.step).round();
        (steps * self.step - value).abs() < EPSILON
    }
}
