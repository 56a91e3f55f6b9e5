use std::env;

use acp_relay::{AccountKey, Address, NetworkConfig, ShardKeyring};
use url::Url;

const DEFAULT_PORT: u16 = 4030;
const DEFAULT_RATE_LIMIT_RPM: u32 = 120;
const RELAYER_KEY_PREFIX: &str = "RELAYER_SECRET_KEY_SHARD_";

#[derive(Clone)]
pub struct AdapterConfig {
    pub port: u16,
    /// Chain id, gas defaults, shard count and gateway URL
    pub network: NetworkConfig,
    /// Hex co-signer secret keys by shard
    pub relayer_keys: Vec<(u32, String)>,
    /// Single co-signer key, installed in its own shard when that shard has no
    /// dedicated key
    pub legacy_relayer_key: Option<String>,
    pub vendor_secret_key: Option<String>,
    /// Escrow contract (None = escrow endpoints disabled)
    pub escrow_address: Option<Address>,
    /// HMAC request signing secret (None = dev mode, signatures not checked)
    pub signing_secret: Option<Vec<u8>>,
    /// Bearer API key (None = dev mode)
    pub api_key: Option<Vec<u8>>,
    pub webhook_urls: Vec<String>,
    pub webhook_secret: Option<Vec<u8>>,
    /// SQLite database for payments, jobs and idempotency records (None = in-memory)
    pub db_path: Option<String>,
    pub idempotency_ttl_secs: u64,
    /// Bearer token required for /metrics (None = metrics disabled)
    pub metrics_token: Option<Vec<u8>>,
    pub rate_limit_rpm: u32,
    pub allowed_origins: Vec<String>,
}

impl std::fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |set: bool| if set { Some("[REDACTED]") } else { None };
        f.debug_struct("AdapterConfig")
            .field("port", &self.port)
            .field("network", &self.network)
            .field(
                "relayer_keys",
                &self.relayer_keys.iter().map(|(s, _)| s).collect::<Vec<_>>(),
            )
            .field("legacy_relayer_key", &redact(self.legacy_relayer_key.is_some()))
            .field("vendor_secret_key", &redact(self.vendor_secret_key.is_some()))
            .field("escrow_address", &self.escrow_address)
            .field("signing_secret", &redact(self.signing_secret.is_some()))
            .field("api_key", &redact(self.api_key.is_some()))
            .field("webhook_urls", &self.webhook_urls)
            .field("webhook_secret", &redact(self.webhook_secret.is_some()))
            .field("db_path", &self.db_path)
            .field("idempotency_ttl_secs", &self.idempotency_ttl_secs)
            .field("metrics_token", &redact(self.metrics_token.is_some()))
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            network: NetworkConfig::default(),
            relayer_keys: Vec::new(),
            legacy_relayer_key: None,
            vendor_secret_key: None,
            escrow_address: None,
            signing_secret: None,
            api_key: None,
            webhook_urls: Vec::new(),
            webhook_secret: None,
            db_path: None,
            idempotency_ttl_secs: acp_relay::IDEMPOTENCY_TTL_SECS,
            metrics_token: None,
            rate_limit_rpm: DEFAULT_RATE_LIMIT_RPM,
            allowed_origins: Vec::new(),
        }
    }
}

fn list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn number<T: std::str::FromStr>(name: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    raw.map(|s| s.trim().parse().map_err(|_| ConfigError::InvalidNumber(name, s)))
        .transpose()
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = NetworkConfig::default();

        let gateway_url = get("GATEWAY_URL").unwrap_or(defaults.gateway_url);
        Url::parse(&gateway_url).map_err(|_| ConfigError::InvalidUrl(gateway_url.clone()))?;

        let num_shards = number("NUM_SHARDS", get("NUM_SHARDS"))?.unwrap_or(defaults.num_shards);
        if num_shards == 0 {
            return Err(ConfigError::InvalidNumber("NUM_SHARDS", "0".to_string()));
        }

        let network = NetworkConfig {
            chain_id: get("CHAIN_ID").unwrap_or(defaults.chain_id),
            gas_limit: number("GAS_LIMIT", get("GAS_LIMIT"))?.unwrap_or(defaults.gas_limit),
            gas_price: number("GAS_PRICE", get("GAS_PRICE"))?.unwrap_or(defaults.gas_price),
            tx_version: defaults.tx_version,
            num_shards,
            gateway_url,
        };

        let relayer_keys = (0..num_shards)
            .filter_map(|shard| get(&format!("{RELAYER_KEY_PREFIX}{shard}")).map(|k| (shard, k)))
            .collect();

        let escrow_address = get("ESCROW_ADDRESS")
            .map(|s| Address::from_bech32(s.trim()).map_err(|_| ConfigError::InvalidAddress(s)))
            .transpose()?;

        let signing_secret = get("ACP_SIGNING_SECRET").map(String::into_bytes);
        if signing_secret.is_none() {
            tracing::warn!("ACP_SIGNING_SECRET not set, request signatures will NOT be checked");
        }
        let api_key = get("ACP_API_KEY").map(String::into_bytes);
        if api_key.is_none() {
            tracing::warn!("ACP_API_KEY not set, bearer authentication is disabled");
        }

        let metrics_token = get("METRICS_TOKEN").map(String::into_bytes);
        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set, /metrics endpoint is disabled");
        }

        let allowed_origins = list(get("ALLOWED_ORIGINS"));
        if allowed_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::InvalidUrl(
                "wildcard CORS origin '*' is not allowed for payment endpoints".to_string(),
            ));
        }

        Ok(Self {
            port: number("PORT", get("PORT"))?.unwrap_or(DEFAULT_PORT),
            network,
            relayer_keys,
            legacy_relayer_key: get("RELAYER_SECRET_KEY"),
            vendor_secret_key: get("VENDOR_SECRET_KEY"),
            escrow_address,
            signing_secret,
            api_key,
            webhook_urls: list(get("WEBHOOK_URLS")),
            webhook_secret: get("WEBHOOK_SECRET").map(String::into_bytes),
            db_path: get("DB_PATH"),
            idempotency_ttl_secs: number("IDEMPOTENCY_TTL_SECS", get("IDEMPOTENCY_TTL_SECS"))?
                .unwrap_or(acp_relay::IDEMPOTENCY_TTL_SECS),
            metrics_token,
            rate_limit_rpm: number("RATE_LIMIT_RPM", get("RATE_LIMIT_RPM"))?
                .unwrap_or(DEFAULT_RATE_LIMIT_RPM),
            allowed_origins,
        })
    }

    /// Load co-signer keys into a keyring sized to the shard count.
    pub fn build_keyring(&self) -> Result<ShardKeyring, ConfigError> {
        let mut keyring = ShardKeyring::new(self.network.num_shards);
        for (shard, hex) in &self.relayer_keys {
            let key = AccountKey::from_hex(hex)
                .map_err(|e| ConfigError::InvalidKey(format!("{RELAYER_KEY_PREFIX}{shard}: {e}")))?;
            keyring = keyring
                .with_key(*shard, key)
                .map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
        }

        if let Some(hex) = &self.legacy_relayer_key {
            let key = AccountKey::from_hex(hex)
                .map_err(|e| ConfigError::InvalidKey(format!("RELAYER_SECRET_KEY: {e}")))?;
            let shard = keyring.shard_of(&key.address());
            let slot = if shard < keyring.num_shards() {
                shard
            } else {
                acp_relay::shard::FALLBACK_SHARD
            };
            if self.relayer_keys.iter().any(|(s, _)| *s == slot) {
                tracing::debug!(shard = slot, "legacy relayer key shadowed by per-shard key");
            } else {
                keyring = keyring
                    .with_key(slot, key)
                    .map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
            }
        }

        let missing: Vec<usize> = keyring
            .relayers()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_none())
            .map(|(s, _)| s)
            .collect();
        if !missing.is_empty() {
            tracing::warn!(?missing, "no co-signer key for some shards, relaying from them will fail");
        }
        Ok(keyring)
    }

    pub fn vendor_key(&self) -> Result<Option<AccountKey>, ConfigError> {
        self.vendor_secret_key
            .as_deref()
            .map(|hex| {
                AccountKey::from_hex(hex)
                    .map_err(|e| ConfigError::InvalidKey(format!("VENDOR_SECRET_KEY: {e}")))
            })
            .transpose()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid number in {0}: {1}")]
    InvalidNumber(&'static str, String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("HTTP client: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> Result<AdapterConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AdapterConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = from(&[]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.network, NetworkConfig::default());
        assert!(config.signing_secret.is_none());
        assert!(config.api_key.is_none());
        assert_eq!(config.idempotency_ttl_secs, 86_400);
    }

    #[test]
    fn network_overrides_are_read() {
        let config = from(&[
            ("CHAIN_ID", "1"),
            ("GAS_LIMIT", "50000"),
            ("NUM_SHARDS", "4"),
            ("GATEWAY_URL", "https://gateway.example.org"),
        ])
        .unwrap();
        assert_eq!(config.network.chain_id, "1");
        assert_eq!(config.network.gas_limit, 50_000);
        assert_eq!(config.network.num_shards, 4);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            from(&[("PORT", "eighty")]),
            Err(ConfigError::InvalidNumber("PORT", _))
        ));
        assert!(matches!(
            from(&[("GATEWAY_URL", "not a url")]),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            from(&[("ESCROW_ADDRESS", "erd1bogus")]),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(from(&[("ALLOWED_ORIGINS", "https://a.example, *")]).is_err());
        assert!(from(&[("NUM_SHARDS", "0")]).is_err());
    }

    #[test]
    fn per_shard_keys_fill_the_keyring() {
        let k0 = "01".repeat(32);
        let k2 = "02".repeat(32);
        let config = from(&[
            ("RELAYER_SECRET_KEY_SHARD_0", k0.as_str()),
            ("RELAYER_SECRET_KEY_SHARD_2", k2.as_str()),
        ])
        .unwrap();
        let keyring = config.build_keyring().unwrap();
        let relayers = keyring.relayers();
        assert_eq!(relayers[0], Some(AccountKey::from_bytes(&[1; 32]).address()));
        assert_eq!(relayers[1], None);
        assert_eq!(relayers[2], Some(AccountKey::from_bytes(&[2; 32]).address()));
    }

    #[test]
    fn legacy_key_lands_in_its_own_shard() {
        let key = AccountKey::from_bytes(&[9; 32]);
        let hex = "09".repeat(32);
        let config = from(&[("RELAYER_SECRET_KEY", hex.as_str())]).unwrap();
        let keyring = config.build_keyring().unwrap();
        let shard = keyring.shard_of(&key.address()) as usize;
        assert_eq!(keyring.relayers()[shard], Some(key.address()));
    }

    #[test]
    fn invalid_key_is_a_config_error() {
        let config = from(&[("RELAYER_SECRET_KEY_SHARD_1", "nothex")]).unwrap();
        assert!(matches!(config.build_keyring(), Err(ConfigError::InvalidKey(_))));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = from(&[
            ("ACP_SIGNING_SECRET", "super-secret"),
            ("VENDOR_SECRET_KEY", "aa"),
        ])
        .unwrap();
        let out = format!("{config:?}");
        assert!(!out.contains("super-secret"));
        assert!(out.contains("[REDACTED]"));
    }
}
