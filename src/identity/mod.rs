//! Identity guard - who is calling, and are they allowed to
//!
//! A caller proves control of a public key with an sr25519 signature, proves
//! the key belongs to the claimed address by re-deriving the SS58 address, and
//! is then classified against the whitelist as a miner or a validator.

mod signature;

pub use signature::{ss58_encode, SignatureVerifier, Sr25519Verifier, SIGNING_CONTEXT, SS58_PREFIX};

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{IdentityError, RejectReason, Rejection, SignatureError};
use crate::persistence::WhitelistStore;
use crate::types::Role;

/// Whitelisted stake strictly above this makes the address a validator
pub const DEFAULT_VALIDATOR_STAKE_THRESHOLD: i64 = 1_000_000_000_000;

pub struct IdentityGuard {
    verifier: Arc<dyn SignatureVerifier>,
    whitelist: Arc<dyn WhitelistStore>,
    validator_stake_threshold: i64,
}

impl IdentityGuard {
    pub fn new(
        verifier: Arc<dyn SignatureVerifier>,
        whitelist: Arc<dyn WhitelistStore>,
        validator_stake_threshold: i64,
    ) -> Self {
        Self {
            verifier,
            whitelist,
            validator_stake_threshold,
        }
    }

    pub fn verify(&self, message: &[u8], pub_key: &str, signature: &str) -> Result<(), SignatureError> {
        self.verifier.verify(message, pub_key, signature)
    }

    /// The public key must derive to exactly `claimed_address`.
    pub fn check_address_matches(&self, pub_key: &str, claimed_address: &str) -> Result<(), Rejection> {
        let derived = self.verifier.derive_address(pub_key).map_err(|e| {
            Rejection::new(RejectReason::AddressMismatch, format!("invalid public key: {e}"))
        })?;
        if derived != claimed_address {
            warn!(claimed = %claimed_address, derived = %derived, "Address and public key do not match");
            return Err(Rejection::new(
                RejectReason::AddressMismatch,
                "address and pubkey not match",
            ));
        }
        Ok(())
    }

    pub async fn classify(&self, address: &str) -> Result<Role, IdentityError> {
        let entry = self
            .whitelist
            .whitelist_entry(address)
            .await?
            .ok_or_else(|| IdentityError::NotWhitelisted(address.to_string()))?;

        if entry.status < 1 {
            return Err(IdentityError::NotActivated(address.to_string()));
        }

        let role = if entry.stake > self.validator_stake_threshold {
            Role::Validator
        } else {
            Role::Miner
        };
        debug!(address, stake = entry.stake, %role, "Classified caller");
        Ok(role)
    }

    /// Signature check mapped to the caller-facing rejection
    pub fn authenticate(&self, message: &[u8], pub_key: &str, signature: &str) -> Result<(), Rejection> {
        self.verify(message, pub_key, signature).map_err(|e| {
            warn!(pub_key, error = %e, "Signature verification failed");
            Rejection::new(RejectReason::SignatureInvalid, e.to_string())
        })
    }

    /// Classification mapped to the caller-facing rejection
    pub async fn role_of(&self, address: &str) -> Result<Role, Rejection> {
        self.classify(address).await.map_err(|e| match e {
            IdentityError::NotWhitelisted(_) => {
                Rejection::new(RejectReason::IdentityNotRegistered, e.to_string())
            }
            IdentityError::NotActivated(_) => {
                Rejection::new(RejectReason::IdentityNotActivated, e.to_string())
            }
            IdentityError::Store(_) => {
                warn!(address, error = %e, "Whitelist lookup failed");
                Rejection::new(RejectReason::InternalFailure, e.to_string())
            }
        })
    }
}
