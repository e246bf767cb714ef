//! sr25519 verification and SS58 address derivation

use blake2::{Blake2b512, Digest};
use schnorrkel::{PublicKey, Signature};

use crate::error::SignatureError;

/// Signing context used by substrate wallets
pub const SIGNING_CONTEXT: &[u8] = b"substrate";

/// Generic substrate network prefix
pub const SS58_PREFIX: u8 = 42;

const SS58_CHECKSUM_PREAMBLE: &[u8] = b"SS58PRE";

pub trait SignatureVerifier: Send + Sync {
    /// Verify a hex-encoded signature over `message` by a hex-encoded public key.
    fn verify(&self, message: &[u8], pub_key_hex: &str, sig_hex: &str)
        -> Result<(), SignatureError>;

    /// Network address for a hex-encoded public key.
    fn derive_address(&self, pub_key_hex: &str) -> Result<String, SignatureError>;
}

/// Schnorrkel-backed verifier
#[derive(Debug, Clone)]
pub struct Sr25519Verifier {
    prefix: u8,
}

impl Default for Sr25519Verifier {
    fn default() -> Self {
        Self {
            prefix: SS58_PREFIX,
        }
    }
}

impl Sr25519Verifier {
    pub fn with_prefix(prefix: u8) -> Self {
        Self { prefix }
    }

    fn public_key(pub_key_hex: &str) -> Result<PublicKey, SignatureError> {
        let bytes = decode_hex("pubKey", pub_key_hex)?;
        PublicKey::from_bytes(&bytes).map_err(|e| SignatureError::Verification(e.to_string()))
    }
}

impl SignatureVerifier for Sr25519Verifier {
    fn verify(
        &self,
        message: &[u8],
        pub_key_hex: &str,
        sig_hex: &str,
    ) -> Result<(), SignatureError> {
        let public = Self::public_key(pub_key_hex)?;
        let sig_bytes = decode_hex("signature", sig_hex)?;
        let signature = Signature::from_bytes(&sig_bytes)
            .map_err(|e| SignatureError::Verification(e.to_string()))?;

        public
            .verify_simple(SIGNING_CONTEXT, message, &signature)
            .map_err(|e| match e {
                schnorrkel::SignatureError::EquationFalse => SignatureError::Mismatch,
                other => SignatureError::Verification(other.to_string()),
            })
    }

    fn derive_address(&self, pub_key_hex: &str) -> Result<String, SignatureError> {
        let public = Self::public_key(pub_key_hex)?;
        Ok(ss58_encode(&public.to_bytes(), self.prefix))
    }
}

/// Hex with or without a leading `0x`
fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, SignatureError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(trimmed).map_err(|source| SignatureError::Decode { field, source })
}

/// SS58 encoding for a single-byte network prefix
pub fn ss58_encode(public: &[u8; 32], prefix: u8) -> String {
    let mut payload = Vec::with_capacity(35);
    payload.push(prefix);
    payload.extend_from_slice(public);

    let mut hasher = Blake2b512::new();
    hasher.update(SS58_CHECKSUM_PREAMBLE);
    hasher.update(&payload);
    let checksum = hasher.finalize();

    payload.extend_from_slice(&checksum[..2]);
    bs58::encode(payload).into_string()
}
