//! Shard routing and the per-shard co-signer keyring.
//!
//! Account-to-shard assignment is part of the network's addressing scheme:
//! the low bits of the last public-key byte select the shard. Any deviation
//! would route a transaction to a co-signer in another shard, and the network
//! would reject the relayed transaction.

use crate::address::Address;
use crate::constants::METACHAIN_SHARD_ID;
use crate::error::RelayError;
use crate::signing::AccountKey;

/// Leading bytes shared by every system (metachain) contract address.
const METACHAIN_PREFIX: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];

/// Partition used when a shard id has no slot in the keyring.
pub const FALLBACK_SHARD: u32 = 0;

fn is_metachain(address: &Address) -> bool {
    let pubkey = address.as_bytes();
    pubkey[..METACHAIN_PREFIX.len()] == METACHAIN_PREFIX || *address == Address::ZERO
}

/// Compute the shard owning `address` in a network of `num_shards` shards.
pub fn shard_of(address: &Address, num_shards: u32) -> u32 {
    if is_metachain(address) {
        return METACHAIN_SHARD_ID;
    }
    if num_shards <= 1 {
        return 0;
    }

    let bits = u32::BITS - (num_shards - 1).leading_zeros();
    let mask_high = (1u32 << bits) - 1;
    let mask_low = (1u32 << (bits - 1)) - 1;

    let last_byte = u32::from(address.as_bytes()[31]);
    let shard = last_byte & mask_high;
    if shard > num_shards - 1 {
        last_byte & mask_low
    } else {
        shard
    }
}

/// Fixed-size table from shard id to co-signer key.
///
/// Loaded once at startup and read-only afterwards. Repartitioning the
/// network only changes the table's size, never its call sites.
#[derive(Debug, Clone)]
pub struct ShardKeyring {
    slots: Vec<Option<AccountKey>>,
}

impl ShardKeyring {
    /// A keyring with `num_shards` empty slots.
    pub fn new(num_shards: u32) -> Self {
        Self {
            slots: vec![None; num_shards.max(1) as usize],
        }
    }

    /// Install the key for `shard`.
    ///
    /// The key's own address should live in the same shard; a relayed
    /// transaction is only valid when sender and co-signer share a shard.
    pub fn with_key(mut self, shard: u32, key: AccountKey) -> Result<Self, RelayError> {
        let num_shards = self.num_shards();
        let slot = self.slots.get_mut(shard as usize).ok_or_else(|| {
            RelayError::ConfigError(format!(
                "shard {shard} is outside the keyring (0..{num_shards})"
            ))
        })?;
        let key_shard = shard_of(&key.address(), num_shards);
        if key_shard != shard {
            tracing::warn!(
                shard,
                key_shard,
                relayer = %key.address(),
                "relayer key lives in a different shard than the slot it serves"
            );
        }
        *slot = Some(key);
        Ok(self)
    }

    pub fn num_shards(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Shard of `address` under this keyring's partition count.
    pub fn shard_of(&self, address: &Address) -> u32 {
        shard_of(address, self.num_shards())
    }

    /// Key serving `shard`, falling back to [`FALLBACK_SHARD`] for ids
    /// outside the table (e.g. the metachain).
    pub fn key_for_shard(&self, shard: u32) -> Option<&AccountKey> {
        let index = if (shard as usize) < self.slots.len() {
            shard
        } else {
            FALLBACK_SHARD
        };
        self.slots[index as usize].as_ref()
    }

    pub fn key_for(&self, address: &Address) -> Option<&AccountKey> {
        self.key_for_shard(self.shard_of(address))
    }

    /// Co-signer address expected for transactions sent by `address`.
    pub fn relayer_for(&self, address: &Address) -> Option<Address> {
        self.key_for(address).map(AccountKey::address)
    }

    /// Addresses of every configured co-signer, indexed by shard.
    pub fn relayers(&self) -> Vec<Option<Address>> {
        self.slots
            .iter()
            .map(|slot| slot.as_ref().map(AccountKey::address))
            .collect()
    }
}
