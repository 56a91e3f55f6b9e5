//! HTTP adapter for relayed agent payments.
//!
//! Wires the core [`acp_relay`] crate to actix-web: every POST is
//! authenticated (bearer key, then request signature), deduplicated by
//! `Idempotency-Key`, parsed into one validated request and dispatched.
//! All payment decisions live in the core crate.
//!
//! # Modules
//!
//! - [`routes`]: endpoints (health, metrics, delegate_payment, capture, proposals, escrow)
//! - [`state`]: shared [`AppState`](state::AppState), generic over the network provider
//! - [`bootstrap`]: builds the state from an [`AdapterConfig`](config::AdapterConfig)
//! - [`webhook`]: signed, HTTPS-only event delivery
//! - [`metrics`]: Prometheus counters for auth, idempotency and relaying

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod webhook;
