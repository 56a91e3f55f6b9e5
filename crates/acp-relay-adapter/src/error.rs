use acp_relay::{RelayError, RequestError, ValidationError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Any authentication failure. The reason is logged, never returned.
    #[error("unauthorized")]
    Unauthorized,

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("unsupported payment method: {0}")]
    UnsupportedPaymentMethod(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Client signature or co-signer check failed.
    #[error("payment verification failed")]
    VerificationFailed,

    #[error("Simulation failed: {0}")]
    SimulationFailed(String),

    #[error("idempotency key reused with different parameters")]
    IdempotencyConflict,

    /// A signing key or contract address the operation needs is not configured.
    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RequestError> for AdapterError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::Validation(v) => AdapterError::Validation(v),
            RequestError::UnsupportedPaymentMethod(m) => AdapterError::UnsupportedPaymentMethod(m),
        }
    }
}

impl From<RelayError> for AdapterError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Validation(v) => AdapterError::Validation(v),
            RelayError::SignatureError(_) | RelayError::CoSignerMismatch { .. } => {
                AdapterError::VerificationFailed
            }
            RelayError::MissingSigningKey(what) => AdapterError::NotConfigured(what),
            RelayError::SimulationFailed(reason) => AdapterError::SimulationFailed(reason),
            RelayError::NetworkError(msg) => AdapterError::Upstream(msg),
            RelayError::ConfigError(msg) => AdapterError::NotConfigured(msg),
            other => AdapterError::Internal(other.to_string()),
        }
    }
}

impl AdapterError {
    fn code(&self) -> &'static str {
        match self {
            AdapterError::Unauthorized => "unauthorized",
            AdapterError::Validation(_) => "validation_error",
            AdapterError::UnsupportedPaymentMethod(_) => "unsupported_payment_method",
            AdapterError::NotFound(_) => "not_found",
            AdapterError::VerificationFailed => "invalid_signature",
            AdapterError::SimulationFailed(_) => "simulation_failed",
            AdapterError::IdempotencyConflict => "idempotency_conflict",
            AdapterError::NotConfigured(_) => "not_configured",
            AdapterError::Upstream(_) => "upstream_error",
            AdapterError::Internal(_) => "internal_error",
        }
    }

    fn error_type(&self) -> &'static str {
        match self.status_code() {
            s if s.is_server_error() => "processing_error",
            _ => "invalid_request",
        }
    }

    /// JSON error body: `{type, code, message}`.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.error_type(),
            "code": self.code(),
            "message": self.public_message(),
        })
    }

    /// Server-side detail for failures whose body hides it.
    pub fn log(&self) {
        match self {
            AdapterError::NotConfigured(msg) => tracing::error!("not configured: {msg}"),
            AdapterError::Upstream(msg) => tracing::error!("gateway error: {msg}"),
            AdapterError::Internal(msg) => tracing::error!("internal error: {msg}"),
            _ => {}
        }
    }

    /// Client-facing message. Security-relevant failures get fixed text.
    fn public_message(&self) -> String {
        match self {
            AdapterError::Unauthorized => "Missing or invalid request credentials".to_string(),
            AdapterError::VerificationFailed => "Payment verification failed".to_string(),
            AdapterError::SimulationFailed(_) => self.to_string(),
            AdapterError::Validation(v) => v.to_string(),
            AdapterError::UnsupportedPaymentMethod(m) => {
                format!("Payment method '{m}' is not supported")
            }
            AdapterError::NotFound(what) => format!("{what} not found"),
            AdapterError::IdempotencyConflict => {
                "Idempotency key already used with different parameters".to_string()
            }
            AdapterError::NotConfigured(_) => "Service is not configured for this operation".to_string(),
            AdapterError::Upstream(_) => "Failed to reach the network gateway".to_string(),
            AdapterError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl ResponseError for AdapterError {
    fn status_code(&self) -> StatusCode {
        match self {
            AdapterError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdapterError::Validation(_)
            | AdapterError::UnsupportedPaymentMethod(_)
            | AdapterError::VerificationFailed => StatusCode::BAD_REQUEST,
            AdapterError::NotFound(_) => StatusCode::NOT_FOUND,
            AdapterError::SimulationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AdapterError::IdempotencyConflict => StatusCode::CONFLICT,
            AdapterError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AdapterError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AdapterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.log();
        HttpResponse::build(self.status_code()).json(self.body())
    }
}
