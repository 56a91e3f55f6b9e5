//! Parse-and-validate step for inbound request bodies.
//!
//! Every body becomes one [`AdapterRequest`] variant before any business
//! logic runs. Shapes that do not validate never reach signing code.

use alloy_primitives::U256;
use serde::Deserialize;
use thiserror::Error;

use crate::address::Address;
use crate::error::ValidationError;
use crate::escrow::{is_native_token, DepositInstruction};
use crate::negotiation::Rfp;
use crate::relayer::RelayPayload;

/// Which endpoint a body was posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    DelegatePayment,
    Capture,
    Negotiate,
    EscrowDeposit,
    EscrowRelease,
    EscrowRefund,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub payment_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowDepositRequest {
    pub sender: Address,
    pub nonce: u64,
    pub deposit: DepositInstruction,
    pub relayed: bool,
}

/// Release or refund of an escrowed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowSettleRequest {
    pub sender: Address,
    pub nonce: u64,
    pub job_id: String,
    pub relayed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterRequest {
    DelegatePayment(RelayPayload),
    Capture(CaptureRequest),
    Negotiate(Rfp),
    EscrowDeposit(EscrowDepositRequest),
    EscrowRelease(EscrowSettleRequest),
    EscrowRefund(EscrowSettleRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Only relayed on-chain payments are delegated here; cards and the like
    /// belong to another provider.
    #[error("unsupported payment method: {0}")]
    UnsupportedPaymentMethod(String),
}

#[derive(Deserialize)]
struct PaymentMethod {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct CaptureBody {
    #[serde(alias = "id")]
    payment_token: String,
}

#[derive(Deserialize)]
struct DepositBody {
    sender: String,
    #[serde(default)]
    nonce: u64,
    job_id: String,
    token: String,
    #[serde(default)]
    token_nonce: u64,
    amount: String,
    #[serde(alias = "vendor")]
    counterparty: String,
    poa_hash: String,
    deadline: u64,
    #[serde(default)]
    relayed: bool,
}

#[derive(Deserialize)]
struct SettleBody {
    sender: String,
    #[serde(default)]
    nonce: u64,
    job_id: String,
    #[serde(default)]
    relayed: bool,
}

fn decode<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, ValidationError> {
    serde_json::from_slice(body).map_err(|e| ValidationError::new("body", e.to_string()))
}

fn address(field: &str, value: &str) -> Result<Address, ValidationError> {
    Address::from_bech32(value.trim()).map_err(|e| ValidationError::new(field, e.message))
}

fn non_empty(field: &str, value: String) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field, "must not be empty"))
    } else {
        Ok(value)
    }
}

impl AdapterRequest {
    pub fn parse(kind: RequestKind, body: &[u8]) -> Result<Self, RequestError> {
        match kind {
            RequestKind::DelegatePayment => Self::parse_delegate_payment(body),
            RequestKind::Capture => {
                let b: CaptureBody = decode(body)?;
                Ok(AdapterRequest::Capture(CaptureRequest {
                    payment_token: non_empty("payment_token", b.payment_token)?,
                }))
            }
            RequestKind::Negotiate => {
                let rfp: Rfp = decode(body)?;
                non_empty("client_id", rfp.client_id.clone())?;
                if rfp.budget_limit.is_empty()
                    || !rfp.budget_limit.bytes().all(|b| b.is_ascii_digit())
                {
                    return Err(ValidationError::new(
                        "budget_limit",
                        "must be a non-negative decimal integer",
                    )
                    .into());
                }
                non_empty("token_identifier", rfp.token_identifier.clone())?;
                Ok(AdapterRequest::Negotiate(rfp))
            }
            RequestKind::EscrowDeposit => Ok(AdapterRequest::EscrowDeposit(
                Self::parse_deposit(decode(body)?)?,
            )),
            RequestKind::EscrowRelease => Ok(AdapterRequest::EscrowRelease(
                Self::parse_settle(decode(body)?)?,
            )),
            RequestKind::EscrowRefund => Ok(AdapterRequest::EscrowRefund(
                Self::parse_settle(decode(body)?)?,
            )),
        }
    }

    fn parse_delegate_payment(body: &[u8]) -> Result<Self, RequestError> {
        let raw: serde_json::Value = decode(body)?;
        if let Some(method) = raw.get("payment_method") {
            let kind = serde_json::from_value::<PaymentMethod>(method.clone())
                .map(|m| m.kind)
                .unwrap_or_default();
            if kind != "relayed" {
                return Err(RequestError::UnsupportedPaymentMethod(kind));
            }
        }
        let payload: RelayPayload = serde_json::from_value(raw)
            .map_err(|e| ValidationError::new("body", e.to_string()))?;
        // structural checks only; signature validity is the relayer's call
        address("sender", &payload.sender)?;
        address("receiver", &payload.receiver)?;
        non_empty("signature", payload.signature.clone())?;
        Ok(AdapterRequest::DelegatePayment(payload))
    }

    fn parse_deposit(b: DepositBody) -> Result<EscrowDepositRequest, ValidationError> {
        let amount = U256::from_str_radix(b.amount.trim(), 10)
            .map_err(|_| ValidationError::new("amount", "must be a decimal integer"))?;
        if is_native_token(&b.token) && b.token_nonce != 0 {
            return Err(ValidationError::new(
                "token_nonce",
                "native transfers have no sub-id",
            ));
        }
        let poa_hash = b.poa_hash.trim().trim_start_matches("0x").to_ascii_lowercase();
        Ok(EscrowDepositRequest {
            sender: address("sender", &b.sender)?,
            nonce: b.nonce,
            deposit: DepositInstruction {
                job_id: non_empty("job_id", b.job_id)?,
                token: non_empty("token", b.token)?,
                token_nonce: b.token_nonce,
                amount,
                counterparty: address("counterparty", &b.counterparty)?,
                poa_hash,
                deadline: b.deadline,
            },
            relayed: b.relayed,
        })
    }

    fn parse_settle(b: SettleBody) -> Result<EscrowSettleRequest, ValidationError> {
        Ok(EscrowSettleRequest {
            sender: address("sender", &b.sender)?,
            nonce: b.nonce,
            job_id: non_empty("job_id", b.job_id)?,
            relayed: b.relayed,
        })
    }
}
