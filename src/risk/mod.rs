//! Risk controls - request throttling and the leverage ratchet
//!
//! Implements:
//! - Fixed-window rate limits per public key and per (public key, token)
//! - Query throttling for the read endpoints
//! - Streak tracking for rolled open positions, with a cooldown once the
//!   streak limit is hit
//!
//! Both controls keep their state in a shared [`CounterStore`](crate::counter::CounterStore)
//! so that several service instances enforce the same limits.

mod rate_limit;
mod ratchet;

pub use rate_limit::{LimitScope, RateLimitConfig, RateLimiter, WindowLimit};
pub use ratchet::{synthesize_close, LeverageRatchet, RatchetConfig, RatchetVerdict};
