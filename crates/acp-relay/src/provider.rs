//! Network provider: dry-run and submission of signed transactions.
//!
//! - [`NetworkProvider`]: the seam the relayer talks to
//! - [`SimulationOutcome`]: a simulation interpreted into success plus reason
//! - [`GatewayProvider`]: HTTP gateway implementation (feature `full`)

use serde_json::Value;

use crate::error::RelayError;
use crate::transaction::Transaction;

/// Result of dry-running a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub success: bool,
    pub reason: Option<String>,
}

impl SimulationOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }

    /// Interpret a gateway simulation response.
    ///
    /// Success needs both the envelope `code == "successful"` and
    /// `data.result.status == "success"`; any other shape is a failure.
    pub fn from_gateway_response(body: &Value) -> Self {
        let code = body.get("code").and_then(Value::as_str).unwrap_or_default();
        let result = body.pointer("/data/result");
        let status = result
            .and_then(|r| r.get("status"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        if code == "successful" && status == "success" {
            return Self::succeeded();
        }

        let reason = result
            .and_then(|r| r.get("failReason"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                body.get("error")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
            })
            .map(str::to_string)
            .unwrap_or_else(|| match (code, status) {
                ("", "") => "malformed simulation response".to_string(),
                (code, "") => format!("gateway returned {code}"),
                (_, status) => format!("status {status}"),
            });
        Self::failed(reason)
    }
}

/// Dry-run and submission of signed transactions.
pub trait NetworkProvider: Send + Sync {
    fn simulate(
        &self,
        tx: &Transaction,
    ) -> impl std::future::Future<Output = Result<SimulationOutcome, RelayError>> + Send;

    /// Submit and return the transaction hash.
    fn submit(
        &self,
        tx: &Transaction,
    ) -> impl std::future::Future<Output = Result<String, RelayError>> + Send;
}

/// Provider talking to a gateway's REST API.
#[cfg(feature = "full")]
#[derive(Debug, Clone)]
pub struct GatewayProvider {
    http: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "full")]
impl GatewayProvider {
    pub fn new(base_url: &str) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RelayError::NetworkError(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, tx: &Transaction) -> Result<Value, RelayError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&tx.to_wire())
            .send()
            .await
            .map_err(|e| RelayError::NetworkError(format!("{path} request failed: {e}")))?;
        let status = resp.status();
        // gateway reports rejections in the JSON envelope, often with a 4xx
        resp.json::<Value>().await.map_err(|e| {
            RelayError::NetworkError(format!("{path} response parse failed ({status}): {e}"))
        })
    }
}

#[cfg(feature = "full")]
impl NetworkProvider for GatewayProvider {
    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome, RelayError> {
        let body = self.post("/transaction/simulate", tx).await?;
        Ok(SimulationOutcome::from_gateway_response(&body))
    }

    async fn submit(&self, tx: &Transaction) -> Result<String, RelayError> {
        let body = self.post("/transaction/send", tx).await?;
        tx_hash_from_send_response(&body)
    }
}

/// Extract `data.txHash` from a send response.
pub fn tx_hash_from_send_response(body: &Value) -> Result<String, RelayError> {
    if body.get("code").and_then(Value::as_str) != Some("successful") {
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown gateway error");
        return Err(RelayError::NetworkError(format!("submit rejected: {error}")));
    }
    body.pointer("/data/txHash")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RelayError::NetworkError("submit response has no txHash".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_requires_code_and_status() {
        let ok = json!({"code": "successful", "data": {"result": {"status": "success"}}});
        assert_eq!(
            SimulationOutcome::from_gateway_response(&ok),
            SimulationOutcome::succeeded()
        );

        // a free-text status alone is not enough
        let no_code = json!({"data": {"result": {"status": "success"}}});
        assert!(!SimulationOutcome::from_gateway_response(&no_code).success);
    }

    #[test]
    fn failure_reason_prefers_fail_reason() {
        let body = json!({
            "code": "successful",
            "data": {"result": {"status": "fail", "failReason": "insufficient funds"}}
        });
        assert_eq!(
            SimulationOutcome::from_gateway_response(&body),
            SimulationOutcome::failed("insufficient funds")
        );
    }

    #[test]
    fn failure_reason_falls_back_to_envelope_error() {
        let body = json!({"code": "bad_request", "error": "invalid signature", "data": null});
        assert_eq!(
            SimulationOutcome::from_gateway_response(&body).reason.as_deref(),
            Some("invalid signature")
        );
        assert_eq!(
            SimulationOutcome::from_gateway_response(&json!({})).reason.as_deref(),
            Some("malformed simulation response")
        );
    }

    #[test]
    fn send_response_yields_hash() {
        let body = json!({"code": "successful", "data": {"txHash": "abc123"}});
        assert_eq!(tx_hash_from_send_response(&body).unwrap(), "abc123");

        let rejected = json!({"code": "internal_issue", "error": "nonce too low"});
        let err = tx_hash_from_send_response(&rejected).unwrap_err();
        assert!(err.to_string().contains("nonce too low"));
    }
}
