//! Error types for TradeGate
//!
//! Infrastructure errors are plain `thiserror` enums per collaborator. Everything
//! a trade submitter can see is a [`Rejection`] carrying a stable [`RejectReason`]
//! code; consumers branch on the code, so codes are never merged or renamed.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Broad class of a rejection, used to pick the HTTP status and retry semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorClass {
    /// Malformed or out-of-policy request; do not retry as-is
    Input,
    /// Identity or authorization failure; never retried automatically
    Identity,
    /// Retry after the window elapses
    RateLimited,
    /// Store, oracle or counter backend unavailable; submission did not take effect
    Infrastructure,
}

/// Stable reason codes surfaced to trade submitters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RejectReason {
    IdentityNotRegistered,
    IdentityNotActivated,
    ValidatorNotPermitted,
    ValidatorRequired,
    AddressMismatch,
    SignatureInvalid,
    RateLimitedMinute,
    RateLimitedDay,
    RateLimitedTokenDay,
    RateLimitedQuery,
    LeverageOutOfRange,
    LeverageNotAligned,
    PositionManagerInvalid,
    PositionSequenceInvalid,
    OpenTradeLimitExceeded,
    TimestampFuture,
    TimestampStale,
    InvalidInput,
    PriceUnavailable,
    PersistenceFailure,
    InternalFailure,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::IdentityNotRegistered => "identity_not_registered",
            RejectReason::IdentityNotActivated => "identity_not_activated",
            RejectReason::ValidatorNotPermitted => "validator_not_permitted",
            RejectReason::ValidatorRequired => "validator_required",
            RejectReason::AddressMismatch => "address_mismatch",
            RejectReason::SignatureInvalid => "signature_invalid",
            RejectReason::RateLimitedMinute => "rate_limited_minute",
            RejectReason::RateLimitedDay => "rate_limited_day",
            RejectReason::RateLimitedTokenDay => "rate_limited_token_day",
            RejectReason::RateLimitedQuery => "rate_limited_query",
            RejectReason::LeverageOutOfRange => "leverage_out_of_range",
            RejectReason::LeverageNotAligned => "leverage_not_aligned",
            RejectReason::PositionManagerInvalid => "position_manager_invalid",
            RejectReason::PositionSequenceInvalid => "position_sequence_invalid",
            RejectReason::OpenTradeLimitExceeded => "open_trade_limit_exceeded",
            RejectReason::TimestampFuture => "timestamp_future",
            RejectReason::TimestampStale => "timestamp_stale",
            RejectReason::InvalidInput => "invalid_input",
            RejectReason::PriceUnavailable => "price_unavailable",
            RejectReason::PersistenceFailure => "persistence_failure",
            RejectReason::InternalFailure => "internal_failure",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            RejectReason::IdentityNotRegistered
            | RejectReason::IdentityNotActivated
            | RejectReason::ValidatorNotPermitted
            | RejectReason::ValidatorRequired
            | RejectReason::AddressMismatch
            | RejectReason::SignatureInvalid => ErrorClass::Identity,
            RejectReason::RateLimitedMinute
            | RejectReason::RateLimitedDay
            | RejectReason::RateLimitedTokenDay
            | RejectReason::RateLimitedQuery
            | RejectReason::OpenTradeLimitExceeded => ErrorClass::RateLimited,
            RejectReason::LeverageOutOfRange
            | RejectReason::LeverageNotAligned
            | RejectReason::PositionManagerInvalid
            | RejectReason::PositionSequenceInvalid
            | RejectReason::TimestampFuture
            | RejectReason::TimestampStale
            | RejectReason::InvalidInput => ErrorClass::Input,
            RejectReason::PriceUnavailable
            | RejectReason::PersistenceFailure
            | RejectReason::InternalFailure => ErrorClass::Infrastructure,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A terminal rejection of one request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {detail}")]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Persistence backend errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("duplicate trade {miner_id}/{token}/{nonce}")]
    Duplicate {
        miner_id: String,
        token: String,
        nonce: i64,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Price oracle errors
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no price for {token} at or before {timestamp}")]
    NoPrice { token: String, timestamp: i64 },

    #[error("invalid timestamp {0}")]
    InvalidTimestamp(i64),

    #[error("price database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Counter store errors
#[derive(Debug, Error)]
pub enum CounterError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("invalid counter ttl: {0}")]
    InvalidTtl(String),
}

/// Signature verification failures, kept apart for diagnostics
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("cannot decode {field}: {source}")]
    Decode {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("verification error: {0}")]
    Verification(String),

    #[error("signature does not match message")]
    Mismatch,
}

/// Whitelist classification failures
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("{0} is not in whitelist")]
    NotWhitelisted(String),

    #[error("{0} is not activated")]
    NotActivated(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
