//! Ed25519 account keys, signing and signature verification.
//!
//! Provides:
//! - [`AccountKey`]: a secret key loaded from the config source, with its address
//! - [`verify_signature`]: strict Ed25519 verification against an [`Address`]
//! - [`decode_signature_hex`] / [`encode_signature_hex`]: wire encoding of signatures

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::address::Address;
use crate::error::RelayError;

/// Length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// A signing key and the account address it controls.
#[derive(Clone)]
pub struct AccountKey {
    key: SigningKey,
    address: Address,
}

impl AccountKey {
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        let key = SigningKey::from_bytes(seed);
        let address = Address::new(key.verifying_key().to_bytes());
        Self { key, address }
    }

    /// Parse a hex secret key. Accepts the 32-byte seed or the 64-byte
    /// `seed || pubkey` form; in the latter case the embedded public key must
    /// match the one derived from the seed.
    pub fn from_hex(s: &str) -> Result<Self, RelayError> {
        let bytes = alloy_primitives::hex::decode(s.trim())
            .map_err(|_| RelayError::ConfigError("secret key is not valid hex".to_string()))?;
        let seed: [u8; 32] = match bytes.len() {
            32 | 64 => bytes[..32]
                .try_into()
                .map_err(|_| RelayError::ConfigError("secret key length".to_string()))?,
            n => {
                return Err(RelayError::ConfigError(format!(
                    "secret key must be 32 or 64 bytes, got {n}"
                )))
            }
        };
        let account = Self::from_bytes(&seed);
        if bytes.len() == 64 && bytes[32..] != account.address.as_bytes()[..] {
            return Err(RelayError::ConfigError(
                "secret key does not match its embedded public key".to_string(),
            ));
        }
        Ok(account)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.key.sign(message).to_bytes()
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("address", &self.address)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Verify `signature` over `message` against the account's public key.
///
/// Uses `verify_strict`, which rejects small-order public keys and
/// non-canonical signature encodings.
pub fn verify_signature(
    signer: &Address,
    message: &[u8],
    signature: &[u8; SIGNATURE_LEN],
) -> Result<(), RelayError> {
    let key = VerifyingKey::from_bytes(signer.as_bytes())
        .map_err(|e| RelayError::SignatureError(format!("invalid public key: {e}")))?;
    let sig = Signature::from_bytes(signature);
    key.verify_strict(message, &sig)
        .map_err(|_| RelayError::SignatureError("signature does not verify".to_string()))
}

/// Decode a hex signature (optional `0x` prefix) into its fixed-size form.
pub fn decode_signature_hex(s: &str) -> Result<[u8; SIGNATURE_LEN], RelayError> {
    let bytes = alloy_primitives::hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| RelayError::invalid("signature", format!("invalid hex: {e}")))?;
    bytes.as_slice().try_into().map_err(|_| {
        RelayError::invalid(
            "signature",
            format!("must be {SIGNATURE_LEN} bytes, got {}", bytes.len()),
        )
    })
}

pub fn encode_signature_hex(sig: &[u8; SIGNATURE_LEN]) -> String {
    alloy_primitives::hex::encode(sig)
}
