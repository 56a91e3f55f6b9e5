/// Human-readable part of account addresses.
pub const ADDRESS_HRP: &str = "erd";

/// Devnet chain ID.
pub const DEFAULT_CHAIN_ID: &str = "D";

/// Gas limit applied when a payload does not carry one.
pub const DEFAULT_GAS_LIMIT: u64 = 60_000_000;

/// Minimum gas price on the reference network.
pub const DEFAULT_GAS_PRICE: u64 = 1_000_000_000;

/// Transaction version that supports relayed (co-signed) transactions.
pub const DEFAULT_TX_VERSION: u32 = 2;

/// Number of regular shards in the reference deployment.
pub const DEFAULT_NUM_SHARDS: u32 = 3;

/// Shard id reported for metachain (system) addresses.
pub const METACHAIN_SHARD_ID: u32 = u32::MAX;

/// Sentinel token identifier for the network's native currency.
pub const NATIVE_TOKEN: &str = "native";

/// Ticker of the native currency, accepted as an alias of [`NATIVE_TOKEN`].
pub const NATIVE_TICKER: &str = "EGLD";

/// Default gateway endpoint (devnet).
pub const GATEWAY_URL: &str = "https://devnet-gateway.multiversx.com";

/// Clock skew tolerated on signed requests, in seconds (both directions).
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

/// Lifetime of an idempotency record.
pub const IDEMPOTENCY_TTL_SECS: u64 = 24 * 60 * 60;

/// Runtime network configuration. Every default that influences signing bytes
/// lives here so that verification and co-signing read the same values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: String,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub tx_version: u32,
    pub num_shards: u32,
    pub gateway_url: String,
}

impl Default for NetworkConfig {
    /// Defaults to devnet.
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: DEFAULT_GAS_PRICE,
            tx_version: DEFAULT_TX_VERSION,
            num_shards: DEFAULT_NUM_SHARDS,
            gateway_url: GATEWAY_URL.to_string(),
        }
    }
}
