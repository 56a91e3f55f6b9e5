//! Build the shared [`AppState`] from an [`AdapterConfig`].

use std::sync::Arc;

use acp_relay::{
    EscrowPayloadBuilder, GatewayProvider, IdempotencyCache, IdempotencyStore,
    InMemoryIdempotencyStore, InMemoryRepository, NoopNotifier, Notifier, ProposalSigner,
    Relayer, Repository, RequestAuthenticator, SqliteIdempotencyStore, SqliteRepository,
};

use crate::config::{AdapterConfig, ConfigError};
use crate::state::AppState;
use crate::webhook::{self, WebhookNotifier};

/// Wire the gateway provider, keyring, stores and notifier together.
///
/// With `db_path` set, idempotency records and the repository share one
/// SQLite file and survive restarts; otherwise both live in memory.
/// Starts the idempotency cleanup task, so call from inside a Tokio runtime.
pub fn bootstrap(config: &AdapterConfig) -> Result<AppState<GatewayProvider>, ConfigError> {
    let provider = GatewayProvider::new(&config.network.gateway_url)
        .map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
    let state = build_state(config, provider)?;
    state.idempotency.start_cleanup();
    Ok(state)
}

/// Same as [`bootstrap`] with a caller-supplied provider and no background task.
pub fn build_state<P>(config: &AdapterConfig, provider: P) -> Result<AppState<P>, ConfigError> {
    let keyring = Arc::new(config.build_keyring()?);
    for (shard, relayer) in keyring.relayers().iter().enumerate() {
        if let Some(address) = relayer {
            tracing::info!(shard, relayer = %address, "co-signer loaded");
        }
    }

    let (store, repository): (Arc<dyn IdempotencyStore>, Arc<dyn Repository>) =
        match &config.db_path {
            Some(path) => {
                let store = SqliteIdempotencyStore::open(path)
                    .map_err(|e| ConfigError::Storage(e.to_string()))?;
                let repo =
                    SqliteRepository::open(path).map_err(|e| ConfigError::Storage(e.to_string()))?;
                tracing::info!("Storage: SQLite at {path}");
                (Arc::new(store), Arc::new(repo))
            }
            None => {
                tracing::warn!("DB_PATH not set, idempotency records and payments are in-memory only");
                (
                    Arc::new(InMemoryIdempotencyStore::new()),
                    Arc::new(InMemoryRepository::new()),
                )
            }
        };
    let idempotency = IdempotencyCache::new(store).with_ttl(config.idempotency_ttl_secs);

    let notifier: Arc<dyn Notifier> = if config.webhook_urls.is_empty() {
        Arc::new(NoopNotifier)
    } else {
        webhook::validate_webhook_urls(&config.webhook_urls).map_err(ConfigError::InvalidUrl)?;
        tracing::info!("Webhook URLs configured: {}", config.webhook_urls.len());
        if config.webhook_secret.is_none() {
            tracing::warn!("WEBHOOK_SECRET not set, webhooks will be sent unsigned");
        }
        let notifier = WebhookNotifier::new(config.webhook_urls.clone(), config.webhook_secret.clone())
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Arc::new(notifier)
    };

    let proposals = ProposalSigner::new(config.vendor_key()?);
    match proposals.vendor() {
        Some(vendor) => tracing::info!(vendor = %vendor, "proposal signing enabled"),
        None => tracing::warn!("VENDOR_SECRET_KEY not set, negotiation endpoint will refuse"),
    }

    let escrow = config.escrow_address.map(|contract| {
        tracing::info!(contract = %contract, "escrow payloads enabled");
        EscrowPayloadBuilder::new(contract, config.network.clone()).with_keyring(keyring.clone())
    });

    Ok(AppState {
        relayer: Relayer::new(provider, keyring, config.network.clone()),
        authenticator: RequestAuthenticator::new(config.signing_secret.clone()),
        api_key: config.api_key.clone(),
        idempotency,
        repository,
        notifier,
        proposals,
        escrow,
        metrics_token: config.metrics_token.clone(),
    })
}
