//! Bech32 account addresses over 32-byte Ed25519 public keys.

use std::fmt;
use std::str::FromStr;

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::ADDRESS_HRP;
use crate::error::ValidationError;

/// Length of an account public key.
pub const PUBKEY_LEN: usize = 32;

/// An account address. Holds the raw public key; renders as `erd1...`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; PUBKEY_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; PUBKEY_LEN]);

    pub const fn new(pubkey: [u8; PUBKEY_LEN]) -> Self {
        Self(pubkey)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ValidationError> {
        let pubkey: [u8; PUBKEY_LEN] = bytes.try_into().map_err(|_| {
            ValidationError::new(
                "address",
                format!("expected {PUBKEY_LEN} bytes, got {}", bytes.len()),
            )
        })?;
        Ok(Self(pubkey))
    }

    /// Decode a bech32 address, rejecting any other human-readable part.
    ///
    /// Only the canonical spelling is accepted: lower-case with a bech32
    /// (not bech32m) checksum, so each key has exactly one address string.
    pub fn from_bech32(s: &str) -> Result<Self, ValidationError> {
        let (hrp, data) = bech32::decode(s)
            .map_err(|e| ValidationError::new("address", format!("invalid bech32: {e}")))?;
        if hrp.to_lowercase() != ADDRESS_HRP {
            return Err(ValidationError::new(
                "address",
                format!("unexpected prefix '{hrp}'"),
            ));
        }
        let address = Self::from_slice(&data)?;
        if address.to_bech32() != s {
            return Err(ValidationError::new("address", "non-canonical bech32 encoding"));
        }
        Ok(address)
    }

    pub fn to_bech32(&self) -> String {
        let hrp = Hrp::parse_unchecked(ADDRESS_HRP);
        // 32 bytes is far below the bech32 length limit, so encoding cannot fail.
        bech32::encode::<Bech32>(hrp, &self.0).unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        alloy_primitives::hex::encode(self.0)
    }

    /// Contract accounts carry eight leading zero bytes.
    pub fn is_smart_contract(&self) -> bool {
        self.0[..8].iter().all(|b| *b == 0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bech32())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_bech32())
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bech32(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_bech32())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_bech32(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known contract address from the network's documentation.
    const CONTRACT: &str = "erd1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq6gq4hu";

    #[test]
    fn bech32_roundtrip_preserves_pubkey() {
        let addr = Address::new([7u8; 32]);
        let parsed: Address = addr.to_bech32().parse().unwrap();
        assert_eq!(parsed, addr);
        assert!(addr.to_bech32().starts_with("erd1"));
    }

    #[test]
    fn zero_address_decodes_as_contract() {
        let addr = Address::from_bech32(CONTRACT).unwrap();
        assert_eq!(addr, Address::ZERO);
        assert!(addr.is_smart_contract());
    }

    #[test]
    fn rejects_foreign_prefix() {
        let hrp = Hrp::parse_unchecked("bc");
        let foreign = bech32::encode::<Bech32>(hrp, &[1u8; 32]).unwrap();
        assert!(Address::from_bech32(&foreign).is_err());
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut s = Address::new([9u8; 32]).to_bech32();
        let last = s.pop().unwrap();
        s.push(if last == 'q' { 'p' } else { 'q' });
        assert!(Address::from_bech32(&s).is_err());
    }

    #[test]
    fn rejects_alternate_spellings_of_same_key() {
        let addr = Address::new([5u8; 32]);
        let upper = addr.to_bech32().to_uppercase();
        assert!(bech32::decode(&upper).is_ok());
        assert!(Address::from_bech32(&upper).is_err());

        let hrp = Hrp::parse_unchecked(ADDRESS_HRP);
        let bech32m = bech32::encode::<bech32::Bech32m>(hrp, addr.as_bytes()).unwrap();
        assert!(bech32::decode(&bech32m).is_ok());
        assert!(Address::from_bech32(&bech32m).is_err());

        assert_eq!(Address::from_bech32(&addr.to_bech32()), Ok(addr));
    }

    #[test]
    fn rejects_wrong_length() {
        let hrp = Hrp::parse_unchecked(ADDRESS_HRP);
        let short = bech32::encode::<Bech32>(hrp, &[1u8; 20]).unwrap();
        assert!(Address::from_bech32(&short).is_err());
    }

    #[test]
    fn serde_uses_bech32_string() {
        let addr = Address::new([3u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_bech32()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
