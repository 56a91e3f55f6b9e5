use std::sync::Arc;

use acp_relay::{
    EscrowPayloadBuilder, IdempotencyCache, Notifier, ProposalSigner, Relayer, Repository,
    RequestAuthenticator,
};

/// Repository collection holding delegated payments, keyed by payment token.
pub const PAYMENTS: &str = "payments";
/// Repository collection holding negotiated jobs, keyed by job id.
pub const JOBS: &str = "jobs";

/// Shared application state. Generic over the network provider so tests can
/// swap the HTTP gateway for an in-process mock.
pub struct AppState<P> {
    pub relayer: Relayer<P>,
    pub authenticator: RequestAuthenticator,
    /// Bearer key for API clients. `None` disables the check.
    pub api_key: Option<Vec<u8>>,
    pub idempotency: IdempotencyCache,
    pub repository: Arc<dyn Repository>,
    pub notifier: Arc<dyn Notifier>,
    pub proposals: ProposalSigner,
    /// `None` when no escrow contract is configured.
    pub escrow: Option<EscrowPayloadBuilder>,
    /// Separate bearer token for /metrics (not the request signing secret).
    pub metrics_token: Option<Vec<u8>>,
}
