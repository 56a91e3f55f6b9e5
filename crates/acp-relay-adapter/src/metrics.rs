use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::sync::LazyLock;

pub static AUTH_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "acp_auth_failures_total",
        "Request authentication failures",
        &["reason"]
    )
    .unwrap()
});

pub static IDEMPOTENCY_LOOKUPS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "acp_idempotency_lookups_total",
        "Idempotency cache lookups",
        &["result"]
    )
    .unwrap()
});

pub static VERIFY_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "acp_relay_verify_total",
        "Relay payload verifications",
        &["result"]
    )
    .unwrap()
});

pub static BROADCAST_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "acp_relay_broadcast_total",
        "Relayed transaction broadcasts",
        &["result"]
    )
    .unwrap()
});

pub static BROADCAST_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "acp_relay_broadcast_duration_seconds",
        "Broadcast latency (pack, simulate, submit) in seconds",
        &["result"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

pub static PAYLOADS_BUILT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "acp_payloads_built_total",
        "Escrow payloads and proposals built",
        &["kind"]
    )
    .unwrap()
});

pub fn metrics_output() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
