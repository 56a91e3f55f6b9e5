//! Escrow contract call payloads.
//!
//! Builders return unsigned transactions whose data field encodes a call as
//! `function@arg@arg`, each argument hex-encoded. Token deposits wrap the call
//! in the network's token-transfer envelope.

use std::sync::Arc;

use alloy_primitives::{hex, U256};

use crate::address::Address;
use crate::constants::{NetworkConfig, NATIVE_TICKER, NATIVE_TOKEN};
use crate::error::RelayError;
use crate::shard::ShardKeyring;
use crate::transaction::Transaction;

const DEPOSIT_ENDPOINT: &str = "deposit";
const RELEASE_ENDPOINT: &str = "release";
const REFUND_ENDPOINT: &str = "refund";
const FUNGIBLE_TRANSFER: &str = "ESDTTransfer";
const SUB_ID_TRANSFER: &str = "ESDTNFTTransfer";

/// A validated escrow deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositInstruction {
    pub job_id: String,
    /// [`NATIVE_TOKEN`] (or its ticker alias) for the native currency,
    /// otherwise a token identifier.
    pub token: String,
    /// Token sub-id; 0 for fungible tokens and the native currency.
    pub token_nonce: u64,
    pub amount: U256,
    pub counterparty: Address,
    /// Hex SHA-256 proof-of-agreement.
    pub poa_hash: String,
    /// Unix seconds after which the buyer may refund.
    pub deadline: u64,
}

impl DepositInstruction {
    pub fn is_native(&self) -> bool {
        is_native_token(&self.token)
    }
}

pub fn is_native_token(token: &str) -> bool {
    token == NATIVE_TOKEN || token == NATIVE_TICKER
}

/// Minimal big-endian hex of an unsigned integer, padded to an even length.
fn hex_uint(value: impl std::fmt::LowerHex) -> String {
    let s = format!("{value:x}");
    if s.len() % 2 == 1 {
        format!("0{s}")
    } else {
        s
    }
}

fn hex_str(s: &str) -> String {
    hex::encode(s.as_bytes())
}

/// Builds deposit, release and refund transactions against one escrow contract.
#[derive(Debug, Clone)]
pub struct EscrowPayloadBuilder {
    contract: Address,
    config: NetworkConfig,
    keyring: Option<Arc<ShardKeyring>>,
}

impl EscrowPayloadBuilder {
    pub fn new(contract: Address, config: NetworkConfig) -> Self {
        Self {
            contract,
            config,
            keyring: None,
        }
    }

    /// Keyring used to pick the co-signer for relayed payloads.
    pub fn with_keyring(mut self, keyring: Arc<ShardKeyring>) -> Self {
        self.keyring = Some(keyring);
        self
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn deposit(
        &self,
        sender: Address,
        nonce: u64,
        deposit: &DepositInstruction,
    ) -> Result<Transaction, RelayError> {
        if deposit.job_id.is_empty() {
            return Err(RelayError::invalid("job_id", "must not be empty"));
        }
        if deposit.amount.is_zero() {
            return Err(RelayError::invalid("amount", "must be greater than zero"));
        }
        let poa = hex::decode(&deposit.poa_hash)
            .map_err(|_| RelayError::invalid("poa_hash", "must be hex"))?;
        if poa.len() != 32 {
            return Err(RelayError::invalid("poa_hash", "must be 32 bytes"));
        }

        let args = [
            hex_str(&deposit.job_id),
            deposit.counterparty.to_hex(),
            hex::encode(poa),
            hex_uint(deposit.deadline),
        ]
        .join("@");

        let mut tx = Transaction::new(sender, self.contract, nonce, &self.config);
        if deposit.is_native() {
            tx.value = deposit.amount;
            tx.data = format!("{DEPOSIT_ENDPOINT}@{args}").into_bytes();
        } else if deposit.token_nonce == 0 {
            tx.data = format!(
                "{FUNGIBLE_TRANSFER}@{}@{}@{}@{args}",
                hex_str(&deposit.token),
                hex_uint(deposit.amount),
                hex_str(DEPOSIT_ENDPOINT),
            )
            .into_bytes();
        } else {
            // sub-id transfers are sent to self; the envelope names the contract
            tx.receiver = sender;
            tx.data = format!(
                "{SUB_ID_TRANSFER}@{}@{}@{}@{}@{}@{args}",
                hex_str(&deposit.token),
                hex_uint(deposit.token_nonce),
                hex_uint(deposit.amount),
                self.contract.to_hex(),
                hex_str(DEPOSIT_ENDPOINT),
            )
            .into_bytes();
        }

        tracing::debug!(
            job_id = %deposit.job_id,
            token = %deposit.token,
            sender = %sender,
            "built escrow deposit"
        );
        Ok(tx)
    }

    pub fn release(&self, sender: Address, nonce: u64, job_id: &str) -> Result<Transaction, RelayError> {
        self.settle(RELEASE_ENDPOINT, sender, nonce, job_id)
    }

    pub fn refund(&self, sender: Address, nonce: u64, job_id: &str) -> Result<Transaction, RelayError> {
        self.settle(REFUND_ENDPOINT, sender, nonce, job_id)
    }

    fn settle(
        &self,
        endpoint: &str,
        sender: Address,
        nonce: u64,
        job_id: &str,
    ) -> Result<Transaction, RelayError> {
        if job_id.is_empty() {
            return Err(RelayError::invalid("job_id", "must not be empty"));
        }
        let mut tx = Transaction::new(sender, self.contract, nonce, &self.config);
        tx.data = format!("{endpoint}@{}", hex_str(job_id)).into_bytes();
        Ok(tx)
    }

    /// Mark `tx` as relayed through the co-signer of its sender's shard.
    pub fn relayed(&self, mut tx: Transaction) -> Result<Transaction, RelayError> {
        let relayer = self
            .keyring
            .as_ref()
            .and_then(|k| k.relayer_for(&tx.sender))
            .ok_or_else(|| {
                RelayError::MissingSigningKey(format!("no co-signer for sender {}", tx.sender))
            })?;
        tx.relayer = Some(relayer);
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::AccountKey;

    const POA: &str = "ab00000000000000000000000000000000000000000000000000000000000001";

    fn contract() -> Address {
        let mut pk = [0u8; 32];
        pk[8] = 0x05;
        pk[31] = 0x01;
        Address::new(pk)
    }

    fn builder() -> EscrowPayloadBuilder {
        EscrowPayloadBuilder::new(contract(), NetworkConfig::default())
    }

    fn deposit(token: &str, token_nonce: u64) -> DepositInstruction {
        DepositInstruction {
            job_id: "job-1".to_string(),
            token: token.to_string(),
            token_nonce,
            amount: U256::from(1000u64),
            counterparty: Address::new([0x22; 32]),
            poa_hash: POA.to_string(),
            deadline: 1_700_000_000,
        }
    }

    fn data(tx: &Transaction) -> String {
        String::from_utf8(tx.data.clone()).unwrap()
    }

    fn call_args() -> String {
        format!("6a6f622d31@{}@{POA}@6553f100", "22".repeat(32))
    }

    #[test]
    fn native_deposit_carries_value_without_envelope() {
        let sender = Address::new([0x11; 32]);
        let tx = builder().deposit(sender, 4, &deposit("native", 0)).unwrap();
        assert_eq!(tx.receiver, contract());
        assert_eq!(tx.value, U256::from(1000u64));
        assert_eq!(tx.nonce, 4);
        assert_eq!(data(&tx), format!("deposit@{}", call_args()));
        assert!(tx.signature.is_none() && tx.relayer.is_none());
    }

    #[test]
    fn native_ticker_is_an_alias() {
        let sender = Address::new([0x11; 32]);
        let a = builder().deposit(sender, 0, &deposit("native", 0)).unwrap();
        let b = builder().deposit(sender, 0, &deposit("EGLD", 0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fungible_deposit_wraps_call_in_transfer() {
        let sender = Address::new([0x11; 32]);
        let tx = builder().deposit(sender, 0, &deposit("USDC-c76f1f", 0)).unwrap();
        assert_eq!(tx.receiver, contract());
        assert_eq!(tx.value, U256::ZERO);
        assert_eq!(
            data(&tx),
            format!(
                "ESDTTransfer@{}@03e8@6465706f736974@{}",
                hex::encode("USDC-c76f1f"),
                call_args()
            )
        );
    }

    #[test]
    fn native_and_token_deposits_share_call_arguments() {
        let sender = Address::new([0x11; 32]);
        let native = data(&builder().deposit(sender, 0, &deposit("native", 0)).unwrap());
        let token = data(&builder().deposit(sender, 0, &deposit("USDC-c76f1f", 0)).unwrap());
        assert!(!native.starts_with("ESDTTransfer"));
        assert!(token.starts_with("ESDTTransfer@"));
        assert!(native.ends_with(&call_args()));
        assert!(token.ends_with(&call_args()));
    }

    #[test]
    fn sub_id_deposit_is_sent_to_self() {
        let sender = Address::new([0x11; 32]);
        let tx = builder().deposit(sender, 0, &deposit("SFT-abcdef", 10)).unwrap();
        assert_eq!(tx.receiver, sender);
        assert_eq!(
            data(&tx),
            format!(
                "ESDTNFTTransfer@{}@0a@03e8@{}@6465706f736974@{}",
                hex::encode("SFT-abcdef"),
                contract().to_hex(),
                call_args()
            )
        );
    }

    #[test]
    fn release_and_refund_take_only_job_id() {
        let sender = Address::new([0x11; 32]);
        let release = builder().release(sender, 1, "job-1").unwrap();
        let refund = builder().refund(sender, 2, "job-1").unwrap();
        assert_eq!(data(&release), "release@6a6f622d31");
        assert_eq!(data(&refund), "refund@6a6f622d31");
        assert_eq!(release.receiver, contract());
        assert_eq!(refund.value, U256::ZERO);
        assert!(builder().release(sender, 1, "").is_err());
    }

    #[test]
    fn invalid_deposits_are_rejected() {
        let sender = Address::new([0x11; 32]);
        let mut d = deposit("native", 0);
        d.poa_hash = "xyz".to_string();
        assert!(builder().deposit(sender, 0, &d).is_err());

        let mut d = deposit("native", 0);
        d.amount = U256::ZERO;
        assert!(builder().deposit(sender, 0, &d).is_err());
    }

    #[test]
    fn odd_length_amounts_are_padded() {
        assert_eq!(hex_uint(U256::from(0xfffu64)), "0fff");
        assert_eq!(hex_uint(255u64), "ff");
    }

    #[test]
    fn relayed_flag_sets_shard_co_signer() {
        let key = AccountKey::from_bytes(&[0x01; 32]);
        let keyring = (0..3).try_fold(ShardKeyring::new(3), |ring, s| {
            ring.with_key(s, key.clone())
        });
        let b = builder().with_keyring(Arc::new(keyring.unwrap()));
        let tx = b.release(Address::new([0x11; 32]), 0, "job-1").unwrap();
        let tx = b.relayed(tx).unwrap();
        assert_eq!(tx.relayer, Some(key.address()));

        let bare = builder().release(Address::new([0x11; 32]), 0, "job-1").unwrap();
        assert!(matches!(
            builder().relayed(bare),
            Err(RelayError::MissingSigningKey(_))
        ));
    }
}
