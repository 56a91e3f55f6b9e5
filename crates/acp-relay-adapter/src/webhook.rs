use std::time::Duration;

use acp_relay::{Notifier, NotifyEvent};

/// Reject webhook URLs that would send payment events in cleartext or
/// to a malformed target. Called once at startup.
pub fn validate_webhook_urls(urls: &[String]) -> Result<(), String> {
    for raw in urls {
        let url = url::Url::parse(raw).map_err(|e| format!("invalid webhook URL {raw}: {e}"))?;
        if url.scheme() != "https" {
            return Err(format!("webhook URL must use https: {raw}"));
        }
        if url.host_str().is_none() {
            return Err(format!("webhook URL has no host: {raw}"));
        }
    }
    Ok(())
}

/// HTTP client for webhook delivery. Redirects are never followed so a
/// subscriber cannot bounce deliveries to an internal address.
pub fn webhook_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Posts each event as JSON to every configured URL.
/// With a secret, each delivery carries an `X-Webhook-Signature` header
/// holding the hex HMAC-SHA256 of the body.
pub struct WebhookNotifier {
    client: reqwest::Client,
    urls: Vec<String>,
    secret: Option<Vec<u8>>,
}

impl WebhookNotifier {
    pub fn new(urls: Vec<String>, secret: Option<Vec<u8>>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: webhook_client()?,
            urls,
            secret,
        })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    fn fire(&self, event: &NotifyEvent) {
        let body_bytes = match serde_json::to_vec(event) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize webhook payload");
                return;
            }
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                tracing::warn!(kind = %event.kind, "no async runtime, webhook dropped");
                return;
            }
        };

        let signature = self
            .secret
            .as_deref()
            .map(|secret| acp_relay::hmac::compute_hmac(secret, &body_bytes));

        for url in &self.urls {
            let client = self.client.clone();
            let url = url.clone();
            let body = body_bytes.clone();
            let signature = signature.clone();
            let kind = event.kind.clone();

            handle.spawn(async move {
                let mut req = client.post(&url).header("content-type", "application/json");
                if let Some(ref sig) = signature {
                    req = req.header("X-Webhook-Signature", sig.as_str());
                }

                match req.body(body).send().await {
                    Ok(resp) => {
                        tracing::debug!(url = %url, kind = %kind, status = %resp.status(), "webhook delivered")
                    }
                    Err(e) => tracing::warn!(url = %url, kind = %kind, error = %e, "webhook delivery failed"),
                }
            });
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: NotifyEvent) {
        if self.urls.is_empty() {
            return;
        }
        self.fire(&event);
    }
}
