//! Vendor-signed price proposals in response to a request for proposal.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::error::RelayError;
use crate::signing::{
    decode_signature_hex, encode_signature_hex, verify_signature, AccountKey,
};

/// A buyer's request for proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rfp {
    pub rfp_id: String,
    pub client_id: String,
    pub task_description: String,
    /// Decimal integer in base units of `token_identifier`.
    pub budget_limit: String,
    pub token_identifier: String,
    pub deadline_block: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_reputation: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub job_id: String,
    pub price: String,
    pub token: String,
    pub deadline_block: u64,
    pub vendor_signature: String,
    pub vendor: Address,
    /// Hex SHA-256 of the agreement message; embedded in the escrow deposit.
    pub poa_hash: String,
}

/// Agreement message: the fields concatenated with no separators.
///
/// Ambiguous when a field can contain another as a substring, but it is the
/// format counterparties verify against, so it stays as is.
fn agreement_message(
    job_id: &str,
    client_id: &str,
    vendor: &Address,
    token: &str,
    price: &str,
    deadline_block: u64,
) -> String {
    format!(
        "{job_id}{client_id}{}{token}{price}{deadline_block}",
        vendor.to_bech32()
    )
}

fn agreement_digest(message: &str) -> [u8; 32] {
    Sha256::digest(message.as_bytes()).into()
}

fn is_decimal_integer(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Signs proposals with the vendor key, when one is configured.
#[derive(Debug, Clone, Default)]
pub struct ProposalSigner {
    vendor_key: Option<AccountKey>,
}

impl ProposalSigner {
    pub fn new(vendor_key: Option<AccountKey>) -> Self {
        Self { vendor_key }
    }

    pub fn vendor(&self) -> Option<Address> {
        self.vendor_key.as_ref().map(AccountKey::address)
    }

    /// Accept the RFP at its budget and sign the agreement.
    ///
    /// Every call draws a fresh job id, so repeating an RFP yields a new job.
    pub fn create_proposal(&self, rfp: &Rfp) -> Result<Proposal, RelayError> {
        let key = self
            .vendor_key
            .as_ref()
            .ok_or_else(|| RelayError::MissingSigningKey("vendor".to_string()))?;

        if !is_decimal_integer(&rfp.budget_limit) {
            return Err(RelayError::invalid(
                "budget_limit",
                "must be a non-negative decimal integer",
            ));
        }
        if rfp.token_identifier.is_empty() {
            return Err(RelayError::invalid("token_identifier", "must not be empty"));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let price = rfp.budget_limit.clone();
        let vendor = key.address();
        let message = agreement_message(
            &job_id,
            &rfp.client_id,
            &vendor,
            &rfp.token_identifier,
            &price,
            rfp.deadline_block,
        );
        let digest = agreement_digest(&message);
        let signature = key.sign(&digest);

        tracing::info!(
            rfp_id = %rfp.rfp_id,
            job_id = %job_id,
            client_id = %rfp.client_id,
            token = %rfp.token_identifier,
            price = %price,
            "proposal signed"
        );

        Ok(Proposal {
            job_id,
            price,
            token: rfp.token_identifier.clone(),
            deadline_block: rfp.deadline_block,
            vendor_signature: encode_signature_hex(&signature),
            vendor,
            poa_hash: alloy_primitives::hex::encode(digest),
        })
    }
}

/// Check a proposal's vendor signature and agreement hash for `client_id`.
pub fn verify_proposal(proposal: &Proposal, client_id: &str) -> Result<(), RelayError> {
    let message = agreement_message(
        &proposal.job_id,
        client_id,
        &proposal.vendor,
        &proposal.token,
        &proposal.price,
        proposal.deadline_block,
    );
    let digest = agreement_digest(&message);
    if alloy_primitives::hex::encode(digest) != proposal.poa_hash {
        return Err(RelayError::SignatureError(
            "agreement hash does not match proposal fields".to_string(),
        ));
    }
    let signature = decode_signature_hex(&proposal.vendor_signature)?;
    verify_signature(&proposal.vendor, &digest, &signature)
}
