//! Relayed-transaction pipeline: verify, co-sign, simulate, submit.
//!
//! Every call rebuilds the [`Transaction`] from the untrusted [`RelayPayload`]
//! through one shared `rebuild`, so `verify` and `pack` always apply the same
//! defaults and see the same signing bytes.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::U256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::constants::NetworkConfig;
use crate::error::RelayError;
use crate::provider::NetworkProvider;
use crate::shard::ShardKeyring;
use crate::signing::{decode_signature_hex, encode_signature_hex, verify_signature};
use crate::transaction::Transaction;

/// A client-signed transaction as submitted by the agent.
///
/// Fields stay in their wire form until `rebuild` parses them; optional fields
/// fall back to the relayer's [`NetworkConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPayload {
    pub sender: String,
    pub receiver: String,
    pub nonce: u64,
    /// Decimal amount in base units.
    #[serde(default = "zero_value")]
    pub value: String,
    /// Base64 payload bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Hex Ed25519 signature over the canonical signing bytes.
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
    #[serde(default, alias = "chainID", skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<u32>,
    /// Explicit co-signer. Must equal the sender's shard relayer when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relayer: Option<String>,
}

fn zero_value() -> String {
    "0".to_string()
}

impl RelayPayload {
    /// Wire form of a client-signed transaction, every field explicit.
    pub fn from_signed(tx: &Transaction) -> Result<Self, RelayError> {
        let signature = tx.signature.ok_or_else(|| {
            RelayError::SignatureError("transaction is not client-signed".to_string())
        })?;
        Ok(Self {
            sender: tx.sender.to_bech32(),
            receiver: tx.receiver.to_bech32(),
            nonce: tx.nonce,
            value: tx.value.to_string(),
            data: (!tx.data.is_empty()).then(|| tx.data_base64()),
            signature: encode_signature_hex(&signature),
            gas_limit: Some(tx.gas_limit),
            gas_price: Some(tx.gas_price),
            chain_id: Some(tx.chain_id.clone()),
            version: Some(tx.version),
            options: Some(tx.options),
            relayer: tx.relayer.map(|r| r.to_bech32()),
        })
    }
}

/// Pipeline stage, attached to relay log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    Received,
    Verified,
    CoSigned,
    Simulated,
    Submitted,
    Rejected,
    SimulationFailed,
}

impl RelayStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayStage::Received => "received",
            RelayStage::Verified => "verified",
            RelayStage::CoSigned => "co_signed",
            RelayStage::Simulated => "simulated",
            RelayStage::Submitted => "submitted",
            RelayStage::Rejected => "rejected",
            RelayStage::SimulationFailed => "simulation_failed",
        }
    }
}

impl fmt::Display for RelayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReceipt {
    pub tx_hash: String,
    pub sender: Address,
    pub relayer: Address,
    pub shard: u32,
}

/// Co-signs and submits relayed transactions for every shard in its keyring.
pub struct Relayer<P> {
    provider: P,
    keyring: Arc<ShardKeyring>,
    config: NetworkConfig,
}

impl<P> fmt::Debug for Relayer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relayer")
            .field("keyring", &self.keyring)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P> Relayer<P> {
    pub fn new(provider: P, keyring: Arc<ShardKeyring>, config: NetworkConfig) -> Self {
        Self {
            provider,
            keyring,
            config,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn keyring(&self) -> &ShardKeyring {
        &self.keyring
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Co-signer expected for transactions from `sender`.
    pub fn relayer_for(&self, sender: &Address) -> Option<Address> {
        self.keyring.relayer_for(sender)
    }

    /// Parse the payload into a client-signed transaction, applying defaults.
    fn rebuild(&self, payload: &RelayPayload) -> Result<Transaction, RelayError> {
        let sender = parse_address("sender", &payload.sender)?;
        let receiver = parse_address("receiver", &payload.receiver)?;
        let value = U256::from_str_radix(payload.value.trim(), 10)
            .map_err(|_| RelayError::invalid("value", "must be a decimal integer"))?;
        let data = match payload.data.as_deref() {
            Some(d) if !d.is_empty() => BASE64
                .decode(d)
                .map_err(|_| RelayError::invalid("data", "must be base64"))?,
            _ => Vec::new(),
        };
        let relayer = match payload.relayer.as_deref() {
            Some(r) => Some(parse_address("relayer", r)?),
            None => self.relayer_for(&sender),
        };

        let mut tx = Transaction::new(sender, receiver, payload.nonce, &self.config);
        tx.value = value;
        tx.data = data;
        tx.gas_limit = payload.gas_limit.unwrap_or(self.config.gas_limit);
        tx.gas_price = payload.gas_price.unwrap_or(self.config.gas_price);
        if let Some(chain_id) = &payload.chain_id {
            tx.chain_id = chain_id.clone();
        }
        tx.version = payload.version.unwrap_or(self.config.tx_version);
        tx.options = payload.options.unwrap_or(0);
        tx.relayer = relayer;
        tx.signature = Some(decode_signature_hex(&payload.signature)?);
        Ok(tx)
    }

    /// Full verification with the failure reason.
    pub fn check(&self, payload: &RelayPayload) -> Result<Transaction, RelayError> {
        let tx = self.rebuild(payload)?;
        let expected = self.relayer_for(&tx.sender).ok_or_else(|| {
            let shard = self.keyring.shard_of(&tx.sender);
            RelayError::MissingSigningKey(format!("no co-signer key for shard {shard}"))
        })?;

        if payload.relayer.is_some() && tx.relayer != Some(expected) {
            return Err(RelayError::CoSignerMismatch {
                expected: expected.to_bech32(),
                provided: display_opt(tx.relayer),
            });
        }

        let signature = tx
            .signature
            .ok_or_else(|| RelayError::SignatureError("missing client signature".to_string()))?;
        verify_signature(&tx.sender, &tx.signing_bytes()?, &signature)?;
        Ok(tx)
    }

    /// Whether the payload is a validly signed transaction for the expected
    /// co-signer. Never panics; every failure is `false`.
    pub fn verify(&self, payload: &RelayPayload) -> bool {
        match self.check(payload) {
            Ok(tx) => {
                tracing::debug!(
                    stage = %RelayStage::Verified,
                    sender = %tx.sender,
                    nonce = tx.nonce,
                    "relay payload verified"
                );
                true
            }
            Err(RelayError::CoSignerMismatch { expected, provided }) => {
                tracing::warn!(
                    stage = %RelayStage::Rejected,
                    sender = %payload.sender,
                    expected = %expected,
                    provided = %provided,
                    "co-signer does not match sender shard"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    stage = %RelayStage::Rejected,
                    sender = %payload.sender,
                    error = %e,
                    "relay payload rejected"
                );
                false
            }
        }
    }

    /// Rebuild and attach the co-signature of the sender's shard key.
    ///
    /// Does not verify the client signature; callers run [`Relayer::verify`]
    /// first.
    pub fn pack(&self, payload: &RelayPayload) -> Result<Transaction, RelayError> {
        let mut tx = self.rebuild(payload)?;
        let shard = self.keyring.shard_of(&tx.sender);
        let key = self.keyring.key_for_shard(shard).ok_or_else(|| {
            RelayError::MissingSigningKey(format!("no co-signer key for shard {shard}"))
        })?;

        if tx.relayer != Some(key.address()) {
            return Err(RelayError::CoSignerMismatch {
                expected: key.address().to_bech32(),
                provided: display_opt(tx.relayer),
            });
        }

        let co_signature = key.sign(&tx.co_signer_signing_bytes()?);
        tx.relayer_signature = Some(co_signature);

        tracing::debug!(
            stage = %RelayStage::CoSigned,
            sender = %tx.sender,
            relayer = %key.address(),
            shard,
            "transaction co-signed"
        );
        Ok(tx)
    }
}

impl<P: NetworkProvider> Relayer<P> {
    /// Co-sign, dry-run, then submit. Submission only happens after a
    /// successful simulation. No retries.
    pub async fn broadcast(&self, payload: &RelayPayload) -> Result<BroadcastReceipt, RelayError> {
        tracing::info!(
            stage = %RelayStage::Received,
            sender = %payload.sender,
            nonce = payload.nonce,
            "broadcast requested"
        );
        let tx = self.pack(payload)?;
        let shard = self.keyring.shard_of(&tx.sender);

        let outcome = self.provider.simulate(&tx).await?;
        if !outcome.success {
            let reason = outcome
                .reason
                .unwrap_or_else(|| "unknown reason".to_string());
            tracing::warn!(
                stage = %RelayStage::SimulationFailed,
                sender = %tx.sender,
                nonce = tx.nonce,
                reason = %reason,
                "simulation failed, not submitting"
            );
            return Err(RelayError::SimulationFailed(reason));
        }
        tracing::debug!(stage = %RelayStage::Simulated, sender = %tx.sender, "simulation passed");

        let tx_hash = self.provider.submit(&tx).await?;
        let relayer = tx.relayer.unwrap_or(Address::ZERO);
        tracing::info!(
            stage = %RelayStage::Submitted,
            sender = %tx.sender,
            relayer = %relayer,
            shard,
            tx_hash = %tx_hash,
            "relayed transaction submitted"
        );

        Ok(BroadcastReceipt {
            tx_hash,
            sender: tx.sender,
            relayer,
            shard,
        })
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address, RelayError> {
    Address::from_bech32(value.trim()).map_err(|e| RelayError::invalid(field, e.message))
}

fn display_opt(address: Option<Address>) -> String {
    address
        .map(|a| a.to_bech32())
        .unwrap_or_else(|| "none".to_string())
}
