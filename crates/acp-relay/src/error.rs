use thiserror::Error;

/// A request field that failed parse-and-validate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by relay, escrow and negotiation operations.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("signature error: {0}")]
    SignatureError(String),

    #[error("co-signer mismatch: expected {expected}, got {provided}")]
    CoSignerMismatch { expected: String, provided: String },

    /// No key is configured for the vendor or for a co-signer shard.
    #[error("missing signing key: {0}")]
    MissingSigningKey(String),

    #[error("Simulation failed: {0}")]
    SimulationFailed(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl RelayError {
    /// Shorthand for a [`ValidationError`] on `field`.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        RelayError::Validation(ValidationError::new(field, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_failure_message_carries_reason() {
        let err = RelayError::SimulationFailed("insufficient funds".to_string());
        assert_eq!(err.to_string(), "Simulation failed: insufficient funds");
    }

    #[test]
    fn validation_error_names_field() {
        let err = RelayError::invalid("sender", "bad checksum");
        assert_eq!(err.to_string(), "validation error: sender: bad checksum");
    }
}
