use actix_web::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde_json::{json, Value};

use acp_relay::request::{CaptureRequest, EscrowDepositRequest, EscrowSettleRequest};
use acp_relay::{
    content_hash, AdapterRequest, IdempotencyLookup, NetworkProvider, NotifyEvent, RelayError,
    RelayPayload, RequestKind, Rfp, Transaction,
};

use crate::error::AdapterError;
use crate::metrics;
use crate::state::{AppState, JOBS, PAYMENTS};

pub const SUPPORTED_API_VERSIONS: &[&str] = &["2025-09-12"];

const REQUEST_ID: &str = "request-id";
const IDEMPOTENCY_KEY: &str = "idempotency-key";
const API_VERSION: &str = "api-version";
const TIMESTAMP: &str = "timestamp";
const SIGNATURE: &str = "signature";

/// Register every route for a state built over provider `P`.
pub fn configure<P: NetworkProvider + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::<P>))
        .route("/metrics", web::get().to(metrics_endpoint::<P>))
        .route(
            "/agentic_commerce/delegate_payment",
            web::post().to(delegate_payment::<P>),
        )
        .route("/agentic_commerce/capture", web::post().to(capture::<P>))
        .route("/negotiation/proposals", web::post().to(proposals::<P>))
        .route("/escrow/deposit", web::post().to(escrow_deposit::<P>))
        .route("/escrow/release", web::post().to(escrow_release::<P>))
        .route("/escrow/refund", web::post().to(escrow_refund::<P>));
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Echo `Request-Id` and `Idempotency-Key` back on every response path.
fn echo_headers(mut resp: HttpResponse, request_id: Option<&str>, key: Option<&str>) -> HttpResponse {
    for (name, value) in [(REQUEST_ID, request_id), (IDEMPOTENCY_KEY, key)] {
        if let Some(v) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
            resp.headers_mut().insert(HeaderName::from_static(name), v);
        }
    }
    resp
}

fn json_response(status: StatusCode, body: Vec<u8>) -> HttpResponse {
    HttpResponse::build(status)
        .insert_header((CONTENT_TYPE, "application/json"))
        .body(body)
}

/// Bearer key first, then the request signature. Every failure is the same
/// 401 to the caller; the reason goes to logs and metrics.
fn authenticate<P>(req: &HttpRequest, body: &[u8], state: &AppState<P>) -> Result<(), AdapterError> {
    if !acp_relay::security::authorize_bearer(state.api_key.as_deref(), header(req, "authorization")) {
        tracing::warn!(path = %req.path(), "bearer authentication failed");
        metrics::AUTH_FAILURES.with_label_values(&["bearer"]).inc();
        return Err(AdapterError::Unauthorized);
    }

    state
        .authenticator
        .authenticate(
            body,
            header(req, TIMESTAMP),
            header(req, SIGNATURE),
            chrono::Utc::now(),
        )
        .map(|_| ())
        .map_err(|failure| {
            tracing::warn!(path = %req.path(), reason = failure.as_str(), "request signature rejected");
            metrics::AUTH_FAILURES
                .with_label_values(&[failure.as_str()])
                .inc();
            AdapterError::Unauthorized
        })
}

/// Authenticate, deduplicate, parse, dispatch.
///
/// With an `Idempotency-Key`, the key's lock is held from lookup until the
/// response is stored, so concurrent retries execute once.
async fn handle<P: NetworkProvider>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<P>>,
    kind: RequestKind,
) -> HttpResponse {
    let request_id = header(&req, REQUEST_ID);
    let key = header(&req, IDEMPOTENCY_KEY);

    if let Some(version) = header(&req, API_VERSION) {
        if !SUPPORTED_API_VERSIONS.contains(&version) {
            tracing::warn!(api_version = %version, "unsupported API version");
        }
    }

    if let Err(e) = authenticate(&req, &body, &state) {
        return echo_headers(e.error_response(), request_id, key);
    }

    let Some(key) = key else {
        let (status, bytes) = execute(&state, kind, &body).await;
        return echo_headers(json_response(status, bytes), request_id, None);
    };

    let _guard = match state.idempotency.lock(key).await {
        Ok(guard) => guard,
        Err(e) => {
            return echo_headers(AdapterError::from(e).error_response(), request_id, Some(key));
        }
    };

    let hash = content_hash(req.method().as_str(), req.path(), &body);
    match state.idempotency.lookup(key, &hash) {
        IdempotencyLookup::Hit(cached) => {
            metrics::IDEMPOTENCY_LOOKUPS.with_label_values(&["hit"]).inc();
            tracing::debug!(idempotency_key = %key, "replaying cached response");
            let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
            echo_headers(json_response(status, cached.body), request_id, Some(key))
        }
        IdempotencyLookup::Conflict => {
            metrics::IDEMPOTENCY_LOOKUPS.with_label_values(&["conflict"]).inc();
            tracing::warn!(idempotency_key = %key, "idempotency key reused with different parameters");
            echo_headers(
                AdapterError::IdempotencyConflict.error_response(),
                request_id,
                Some(key),
            )
        }
        IdempotencyLookup::Miss => {
            metrics::IDEMPOTENCY_LOOKUPS.with_label_values(&["miss"]).inc();
            let (status, bytes) = execute(&state, kind, &body).await;
            if status.as_u16() < 500 {
                state
                    .idempotency
                    .store(key, &hash, status.as_u16(), bytes.clone());
            }
            echo_headers(json_response(status, bytes), request_id, Some(key))
        }
    }
}

async fn execute<P: NetworkProvider>(
    state: &AppState<P>,
    kind: RequestKind,
    body: &[u8],
) -> (StatusCode, Vec<u8>) {
    let result = match AdapterRequest::parse(kind, body) {
        Ok(request) => dispatch(state, request).await,
        Err(e) => Err(e.into()),
    };
    let (status, value) = match result {
        Ok(ok) => ok,
        Err(e) => {
            e.log();
            (e.status_code(), e.body())
        }
    };
    let bytes = serde_json::to_vec(&value).unwrap_or_else(|_| b"{}".to_vec());
    (status, bytes)
}

type Handled = Result<(StatusCode, Value), AdapterError>;

async fn dispatch<P: NetworkProvider>(state: &AppState<P>, request: AdapterRequest) -> Handled {
    match request {
        AdapterRequest::DelegatePayment(payload) => delegate(state, payload),
        AdapterRequest::Capture(capture) => capture_payment(state, capture).await,
        AdapterRequest::Negotiate(rfp) => propose(state, &rfp),
        AdapterRequest::EscrowDeposit(deposit) => build_deposit(state, deposit),
        AdapterRequest::EscrowRelease(settle) => build_settlement(state, settle, "release"),
        AdapterRequest::EscrowRefund(settle) => build_settlement(state, settle, "refund"),
    }
}

fn delegate<P>(state: &AppState<P>, payload: RelayPayload) -> Handled {
    if !state.relayer.verify(&payload) {
        metrics::VERIFY_REQUESTS.with_label_values(&["invalid"]).inc();
        return Err(AdapterError::VerificationFailed);
    }
    metrics::VERIFY_REQUESTS.with_label_values(&["valid"]).inc();

    let id = format!("vt_{}", uuid::Uuid::new_v4().simple());
    let created = chrono::Utc::now().to_rfc3339();
    let record = json!({
        "id": id,
        "created": created,
        "status": "authorized",
        "payload": payload,
    });
    state.repository.put(PAYMENTS, &id, &record)?;
    tracing::info!(payment = %id, sender = %payload.sender, nonce = payload.nonce, "payment delegated");

    Ok((StatusCode::CREATED, json!({ "id": id, "created": created })))
}

async fn capture_payment<P: NetworkProvider>(state: &AppState<P>, capture: CaptureRequest) -> Handled {
    let id = capture.payment_token;
    let mut record = state
        .repository
        .get(PAYMENTS, &id)?
        .ok_or_else(|| AdapterError::NotFound("payment".to_string()))?;

    if let Some(tx_hash) = record.get("tx_hash").and_then(Value::as_str) {
        tracing::info!(payment = %id, tx_hash, "payment already captured");
        return Ok((
            StatusCode::OK,
            json!({ "id": id, "status": record["status"], "tx_hash": tx_hash }),
        ));
    }

    let payload: RelayPayload = serde_json::from_value(record["payload"].clone())
        .map_err(|e| AdapterError::Internal(format!("stored payment {id} is corrupt: {e}")))?;

    let start = std::time::Instant::now();
    let result = state.relayer.broadcast(&payload).await;
    let label = match &result {
        Ok(_) => "success",
        Err(RelayError::SimulationFailed(_)) => "simulation_failed",
        Err(_) => "error",
    };
    metrics::BROADCAST_REQUESTS.with_label_values(&[label]).inc();
    metrics::BROADCAST_LATENCY
        .with_label_values(&[label])
        .observe(start.elapsed().as_secs_f64());
    let receipt = result?;

    if let Some(fields) = record.as_object_mut() {
        fields.insert("status".to_string(), json!("processing"));
        fields.insert("tx_hash".to_string(), json!(receipt.tx_hash));
    }
    state.repository.put(PAYMENTS, &id, &record)?;

    state.notifier.notify(NotifyEvent::new(
        "payment.captured",
        json!({
            "id": id,
            "tx_hash": receipt.tx_hash,
            "sender": receipt.sender,
            "relayer": receipt.relayer,
            "shard": receipt.shard,
        }),
    ));

    Ok((
        StatusCode::OK,
        json!({ "id": id, "status": "processing", "tx_hash": receipt.tx_hash }),
    ))
}

fn propose<P>(state: &AppState<P>, rfp: &Rfp) -> Handled {
    let proposal = state.proposals.create_proposal(rfp)?;
    state.repository.put(
        JOBS,
        &proposal.job_id,
        &json!({ "status": "proposed", "rfp": rfp, "proposal": proposal }),
    )?;
    metrics::PAYLOADS_BUILT.with_label_values(&["proposal"]).inc();

    let body = serde_json::to_value(&proposal).map_err(|e| AdapterError::Internal(e.to_string()))?;
    Ok((StatusCode::CREATED, body))
}

fn escrow_body(tx: &Transaction) -> Value {
    json!({
        "transaction": tx.to_wire(),
        "data": String::from_utf8_lossy(&tx.data),
    })
}

fn build_deposit<P>(state: &AppState<P>, request: EscrowDepositRequest) -> Handled {
    let escrow = state
        .escrow
        .as_ref()
        .ok_or_else(|| AdapterError::NotConfigured("ESCROW_ADDRESS".to_string()))?;
    let mut tx = escrow.deposit(request.sender, request.nonce, &request.deposit)?;
    if request.relayed {
        tx = escrow.relayed(tx)?;
    }
    metrics::PAYLOADS_BUILT.with_label_values(&["deposit"]).inc();
    tracing::info!(job_id = %request.deposit.job_id, sender = %request.sender, relayed = request.relayed, "escrow deposit built");
    Ok((StatusCode::OK, escrow_body(&tx)))
}

fn build_settlement<P>(state: &AppState<P>, request: EscrowSettleRequest, action: &'static str) -> Handled {
    let escrow = state
        .escrow
        .as_ref()
        .ok_or_else(|| AdapterError::NotConfigured("ESCROW_ADDRESS".to_string()))?;
    let mut tx = match action {
        "release" => escrow.release(request.sender, request.nonce, &request.job_id)?,
        _ => escrow.refund(request.sender, request.nonce, &request.job_id)?,
    };
    if request.relayed {
        tx = escrow.relayed(tx)?;
    }
    metrics::PAYLOADS_BUILT.with_label_values(&[action]).inc();
    tracing::info!(job_id = %request.job_id, sender = %request.sender, action, "escrow settlement built");
    Ok((StatusCode::OK, escrow_body(&tx)))
}

pub async fn health<P: NetworkProvider + 'static>(state: web::Data<AppState<P>>) -> HttpResponse {
    let keyring = state.relayer.keyring();
    let relayers: Vec<Option<String>> = keyring
        .relayers()
        .into_iter()
        .map(|r| r.map(|a| a.to_bech32()))
        .collect();
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "acp-relay-adapter",
        "chainId": state.relayer.config().chain_id,
        "shards": keyring.num_shards(),
        "relayers": relayers,
        "escrow": state.escrow.as_ref().map(|e| e.contract().to_bech32()),
        "requestSigning": state.authenticator.is_enabled(),
    }))
}

pub async fn metrics_endpoint<P: NetworkProvider + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<P>>,
) -> HttpResponse {
    let Some(token) = &state.metrics_token else {
        return HttpResponse::Forbidden().json(json!({
            "type": "invalid_request",
            "code": "forbidden",
            "message": "Set METRICS_TOKEN to access /metrics",
        }));
    };
    if !acp_relay::security::authorize_bearer(Some(token.as_slice()), header(&req, "authorization")) {
        return HttpResponse::Unauthorized().json(json!({
            "type": "invalid_request",
            "code": "unauthorized",
            "message": "Valid Bearer token required for /metrics",
        }));
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

pub async fn delegate_payment<P: NetworkProvider + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<P>>,
) -> HttpResponse {
    handle(req, body, state, RequestKind::DelegatePayment).await
}

pub async fn capture<P: NetworkProvider + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<P>>,
) -> HttpResponse {
    handle(req, body, state, RequestKind::Capture).await
}

pub async fn proposals<P: NetworkProvider + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<P>>,
) -> HttpResponse {
    handle(req, body, state, RequestKind::Negotiate).await
}

pub async fn escrow_deposit<P: NetworkProvider + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<P>>,
) -> HttpResponse {
    handle(req, body, state, RequestKind::EscrowDeposit).await
}

pub async fn escrow_release<P: NetworkProvider + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<P>>,
) -> HttpResponse {
    handle(req, body, state, RequestKind::EscrowRelease).await
}

pub async fn escrow_refund<P: NetworkProvider + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<P>>,
) -> HttpResponse {
    handle(req, body, state, RequestKind::EscrowRefund).await
}
