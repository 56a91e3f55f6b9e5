//! Relayed payments for autonomous buying agents.
//!
//! An agent signs a transaction but holds no gas; the relayer verifies the
//! agent's signature, co-signs with the key of the sender's shard, dry-runs the
//! result and submits it. Around that pipeline sit request authentication,
//! idempotency-key deduplication and byte-exact escrow and negotiation
//! payload builders.
//!
//! # Pipeline
//!
//! - **Authenticate** ([`RequestAuthenticator`]): HMAC over `"{timestamp}.{body}"`
//! - **Deduplicate** ([`IdempotencyCache`]): replay or reject reused keys
//! - **Relay** ([`Relayer`]): verify, co-sign, simulate, submit
//!
//! # Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use acp_relay::{GatewayProvider, NetworkConfig, Relayer, RelayPayload, ShardKeyring, AccountKey};
//!
//! # async fn run(payload: RelayPayload) -> Result<(), acp_relay::RelayError> {
//! let config = NetworkConfig::default();
//! let keyring = ShardKeyring::new(config.num_shards)
//!     .with_key(0, AccountKey::from_hex("<hex secret key>")?)?;
//! let provider = GatewayProvider::new(&config.gateway_url)?;
//! let relayer = Relayer::new(provider, Arc::new(keyring), config);
//!
//! if relayer.verify(&payload) {
//!     let receipt = relayer.broadcast(&payload).await?;
//!     println!("submitted {}", receipt.tx_hash);
//! }
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod constants;
pub mod error;
pub mod signing;
pub mod transaction;

pub mod hmac;
pub mod idempotency;
pub mod security;
pub mod shard;

pub mod escrow;
pub mod negotiation;
pub mod provider;
pub mod relayer;
pub mod request;

pub mod notify;
pub mod repository;

pub use address::Address;
pub use constants::*;
pub use error::{RelayError, ValidationError};
pub use escrow::{DepositInstruction, EscrowPayloadBuilder};
pub use hmac::{AuthFailure, AuthOutcome, RequestAuthenticator};
pub use idempotency::{
    content_hash, CachedResponse, IdempotencyCache, IdempotencyLookup, IdempotencyStore,
    InMemoryIdempotencyStore,
};
pub use negotiation::{Proposal, ProposalSigner, Rfp};
pub use notify::{NoopNotifier, Notifier, NotifyEvent};
pub use provider::{NetworkProvider, SimulationOutcome};
pub use relayer::{BroadcastReceipt, RelayPayload, RelayStage, Relayer};
pub use repository::{InMemoryRepository, Repository};
pub use request::{AdapterRequest, RequestError, RequestKind};
pub use shard::{shard_of, ShardKeyring};
pub use signing::AccountKey;
pub use transaction::Transaction;

#[cfg(feature = "full")]
pub use idempotency::SqliteIdempotencyStore;
#[cfg(feature = "full")]
pub use provider::GatewayProvider;
#[cfg(feature = "full")]
pub use repository::SqliteRepository;
