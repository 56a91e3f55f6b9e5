//! Shared security utilities.
//!
//! Constant-time comparison and bearer-token checks. All comparisons use the
//! `subtle` crate for timing-attack resistance.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Constant-time byte comparison that does not leak input lengths or content.
///
/// Both inputs are hashed to fixed-length SHA-256 digests before comparison,
/// so timing reveals neither the content nor the length of either input.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

/// Check an `Authorization` header against the configured API key.
///
/// With no key configured every request is accepted (development mode).
pub fn authorize_bearer(expected: Option<&[u8]>, header: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    header
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| constant_time_eq(token.as_bytes(), expected))
        .unwrap_or(false)
}
