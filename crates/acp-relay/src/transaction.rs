//! Canonical transaction model and its signing serialization.

use alloy_primitives::U256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;

use crate::address::Address;
use crate::constants::NetworkConfig;
use crate::error::RelayError;
use crate::signing::{encode_signature_hex, SIGNATURE_LEN};

/// A transfer instruction, optionally relayed through a co-signer.
///
/// Rebuilt from the caller's payload on every request; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub value: U256,
    pub receiver: Address,
    pub sender: Address,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub data: Vec<u8>,
    pub chain_id: String,
    pub version: u32,
    pub options: u32,
    /// Co-signer paying for gas. `None` means a plain, non-relayed transaction.
    pub relayer: Option<Address>,
    pub signature: Option<[u8; SIGNATURE_LEN]>,
    pub relayer_signature: Option<[u8; SIGNATURE_LEN]>,
}

/// Field order of this struct is the canonical order of the signed JSON.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalView<'a> {
    nonce: u64,
    value: String,
    receiver: String,
    sender: String,
    gas_price: u64,
    gas_limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(rename = "chainID")]
    chain_id: &'a str,
    version: u32,
    #[serde(skip_serializing_if = "is_zero")]
    options: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    relayer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    relayer_signature: Option<String>,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl Transaction {
    /// An unsigned, non-relayed transaction carrying the network defaults.
    pub fn new(sender: Address, receiver: Address, nonce: u64, config: &NetworkConfig) -> Self {
        Self {
            nonce,
            value: U256::ZERO,
            receiver,
            sender,
            gas_price: config.gas_price,
            gas_limit: config.gas_limit,
            data: Vec::new(),
            chain_id: config.chain_id.clone(),
            version: config.tx_version,
            options: 0,
            relayer: None,
            signature: None,
            relayer_signature: None,
        }
    }

    fn view(&self, with_signature: bool, with_relayer_signature: bool) -> CanonicalView<'_> {
        CanonicalView {
            nonce: self.nonce,
            value: self.value.to_string(),
            receiver: self.receiver.to_bech32(),
            sender: self.sender.to_bech32(),
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            data: (!self.data.is_empty()).then(|| self.data_base64()),
            chain_id: &self.chain_id,
            version: self.version,
            options: self.options,
            relayer: self.relayer.map(|r| r.to_bech32()),
            signature: self
                .signature
                .filter(|_| with_signature)
                .map(|s| encode_signature_hex(&s)),
            relayer_signature: self
                .relayer_signature
                .filter(|_| with_relayer_signature)
                .map(|s| encode_signature_hex(&s)),
        }
    }

    /// Bytes the sender signs: canonical JSON without either signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, RelayError> {
        Ok(serde_json::to_vec(&self.view(false, false))?)
    }

    /// Bytes the co-signer signs: the canonical JSON including the sender's
    /// signature, so the co-signature attests to the fully client-signed
    /// transaction.
    pub fn co_signer_signing_bytes(&self) -> Result<Vec<u8>, RelayError> {
        if self.signature.is_none() {
            return Err(RelayError::SignatureError(
                "client signature must be set before co-signing".to_string(),
            ));
        }
        Ok(serde_json::to_vec(&self.view(true, false))?)
    }

    /// Submission body for the network provider.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::to_value(self.view(true, true)).unwrap_or(serde_json::Value::Null)
    }

    pub fn data_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    pub fn is_relayed(&self) -> bool {
        self.relayer.is_some()
    }
}
