//! Outbound event notifications.

use serde::Serialize;

/// An event delivered to subscribers, e.g. `payment.captured`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotifyEvent {
    #[serde(rename = "type")]
    pub kind: String,
    /// RFC 3339.
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl NotifyEvent {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }
}

/// Fire-and-forget event sink. Delivery failures never reach the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotifyEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, event: NotifyEvent) {
        tracing::trace!(kind = %event.kind, "no notifier configured, dropping event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_type_field() {
        let event = NotifyEvent::new("payment.captured", serde_json::json!({"id": "p1"}));
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "payment.captured");
        assert_eq!(v["data"]["id"], "p1");
        assert!(chrono::DateTime::parse_from_rfc3339(v["timestamp"].as_str().unwrap()).is_ok());
        NoopNotifier.notify(event);
    }
}
