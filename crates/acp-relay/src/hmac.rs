//! HMAC request signing and freshness checks for inbound requests.
//!
//! A caller signs `"{timestamp}.{body}"` with the shared secret and sends the
//! base64 MAC in the `Signature` header next to the `Timestamp` header.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::constants::TIMESTAMP_TOLERANCE_SECS;

type HmacSha256 = Hmac<Sha256>;

fn request_mac(secret: &[u8], timestamp: &str, body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    mac
}

/// Compute the base64 HMAC-SHA256 over `"{timestamp}.{body}"`.
pub fn compute_request_signature(secret: &[u8], timestamp: &str, body: &[u8]) -> String {
    BASE64.encode(request_mac(secret, timestamp, body).finalize().into_bytes())
}

/// Verify a request signature in constant time.
///
/// Undecodable base64 is compared as 32 zero bytes so that malformed input
/// still goes through the full MAC comparison.
pub fn verify_request_signature(
    secret: &[u8],
    timestamp: &str,
    body: &[u8],
    signature: &str,
) -> bool {
    let mac = request_mac(secret, timestamp, body);
    let provided = BASE64
        .decode(signature.trim())
        .unwrap_or_else(|_| vec![0u8; 32]);
    mac.verify_slice(&provided).is_ok()
}

/// Hex HMAC-SHA256 over `body`, used to sign outbound webhook payloads.
pub fn compute_hmac(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    alloy_primitives::hex::encode(mac.finalize().into_bytes())
}

/// How a request passed authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The signature and timestamp checked out.
    Verified,
    /// No secret is configured for this deployment; nothing was checked.
    Skipped,
}

/// Why a request failed authentication. Only logged; callers answer every
/// variant with the same response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingHeaders,
    ExpiredTimestamp,
    InvalidSignature,
}

impl AuthFailure {
    /// Label used for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::MissingHeaders => "missing",
            AuthFailure::ExpiredTimestamp => "expired",
            AuthFailure::InvalidSignature => "invalid",
        }
    }
}

/// Parse an RFC 3339 timestamp, or unix seconds (milliseconds when the value
/// is too large to be seconds).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let n: i64 = raw.parse().ok()?;
    if n.unsigned_abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

/// Authenticates inbound requests against an optional shared secret.
#[derive(Clone)]
pub struct RequestAuthenticator {
    secret: Option<Vec<u8>>,
    tolerance_secs: i64,
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl RequestAuthenticator {
    /// `None` disables signature checks entirely (development only).
    pub fn new(secret: Option<Vec<u8>>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance_secs: TIMESTAMP_TOLERANCE_SECS,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub fn authenticate(
        &self,
        body: &[u8],
        timestamp: Option<&str>,
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AuthOutcome, AuthFailure> {
        let Some(secret) = self.secret.as_deref() else {
            tracing::warn!("request signing secret not configured, skipping signature check");
            return Ok(AuthOutcome::Skipped);
        };

        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            return Err(AuthFailure::MissingHeaders);
        };

        let fresh = parse_timestamp(timestamp)
            .map(|ts| {
                let tolerance = Duration::seconds(self.tolerance_secs);
                ts >= now - tolerance && ts <= now + tolerance
            })
            .unwrap_or(false);
        if !fresh {
            return Err(AuthFailure::ExpiredTimestamp);
        }

        if verify_request_signature(secret, timestamp, body, signature) {
            Ok(AuthOutcome::Verified)
        } else {
            Err(AuthFailure::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test_signing_secret_456";

    fn signed(now: DateTime<Utc>, body: &[u8]) -> (String, String) {
        let ts = now.to_rfc3339();
        let sig = compute_request_signature(SECRET, &ts, body);
        (ts, sig)
    }

    #[test]
    fn signature_roundtrip() {
        let sig = compute_request_signature(SECRET, "1700000000", b"{}");
        assert!(verify_request_signature(SECRET, "1700000000", b"{}", &sig));
        assert!(!verify_request_signature(b"other", "1700000000", b"{}", &sig));
        assert!(!verify_request_signature(SECRET, "1700000001", b"{}", &sig));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        assert!(!verify_request_signature(SECRET, "1", b"{}", "%%%not-base64"));
    }

    #[test]
    fn fresh_valid_request_is_verified() {
        let auth = RequestAuthenticator::new(Some(SECRET.to_vec()));
        let now = Utc::now();
        let (ts, sig) = signed(now, b"{\"a\":1}");
        assert_eq!(
            auth.authenticate(b"{\"a\":1}", Some(&ts), Some(&sig), now),
            Ok(AuthOutcome::Verified)
        );
    }

    #[test]
    fn six_minute_old_request_is_rejected() {
        let auth = RequestAuthenticator::new(Some(SECRET.to_vec()));
        let now = Utc::now();
        let (ts, sig) = signed(now - Duration::minutes(6), b"{}");
        assert_eq!(
            auth.authenticate(b"{}", Some(&ts), Some(&sig), now),
            Err(AuthFailure::ExpiredTimestamp)
        );
    }

    #[test]
    fn fraction_past_tolerance_is_rejected() {
        let auth = RequestAuthenticator::new(Some(SECRET.to_vec()));
        let sig = compute_request_signature(SECRET, "1700000000", b"{}");
        let at = |millis| DateTime::from_timestamp_millis(millis).unwrap();

        assert_eq!(
            auth.authenticate(b"{}", Some("1700000000"), Some(&sig), at(1_700_000_300_900)),
            Err(AuthFailure::ExpiredTimestamp)
        );
        assert_eq!(
            auth.authenticate(b"{}", Some("1700000000"), Some(&sig), at(1_700_000_300_000)),
            Ok(AuthOutcome::Verified)
        );
    }

    #[test]
    fn future_skew_is_symmetric() {
        let auth = RequestAuthenticator::new(Some(SECRET.to_vec()));
        let now = Utc::now();
        let (ts, sig) = signed(now + Duration::minutes(6), b"{}");
        assert_eq!(
            auth.authenticate(b"{}", Some(&ts), Some(&sig), now),
            Err(AuthFailure::ExpiredTimestamp)
        );
        let (ts, sig) = signed(now + Duration::minutes(4), b"{}");
        assert!(auth.authenticate(b"{}", Some(&ts), Some(&sig), now).is_ok());
    }

    #[test]
    fn body_mismatch_is_rejected() {
        let auth = RequestAuthenticator::new(Some(SECRET.to_vec()));
        let now = Utc::now();
        let (ts, sig) = signed(now, b"{\"amount\":\"1\"}");
        assert_eq!(
            auth.authenticate(b"{\"amount\":\"1000\"}", Some(&ts), Some(&sig), now),
            Err(AuthFailure::InvalidSignature)
        );
    }

    #[test]
    fn missing_headers_are_rejected() {
        let auth = RequestAuthenticator::new(Some(SECRET.to_vec()));
        let now = Utc::now();
        assert_eq!(
            auth.authenticate(b"{}", None, Some("sig"), now),
            Err(AuthFailure::MissingHeaders)
        );
        assert_eq!(
            auth.authenticate(b"{}", Some("1"), None, now),
            Err(AuthFailure::MissingHeaders)
        );
    }

    #[test]
    fn unparseable_timestamp_is_expired() {
        let auth = RequestAuthenticator::new(Some(SECRET.to_vec()));
        let sig = compute_request_signature(SECRET, "yesterday", b"{}");
        assert_eq!(
            auth.authenticate(b"{}", Some("yesterday"), Some(&sig), Utc::now()),
            Err(AuthFailure::ExpiredTimestamp)
        );
    }

    #[test]
    fn no_secret_skips_and_says_so() {
        let auth = RequestAuthenticator::new(None);
        assert!(!auth.is_enabled());
        assert_eq!(
            auth.authenticate(b"{}", None, None, Utc::now()),
            Ok(AuthOutcome::Skipped)
        );
        // an empty secret counts as unset
        assert!(!RequestAuthenticator::new(Some(Vec::new())).is_enabled());
    }

    #[test]
    fn unix_timestamps_are_accepted() {
        let now = Utc::now();
        let secs = now.timestamp().to_string();
        let millis = now.timestamp_millis().to_string();
        assert_eq!(parse_timestamp(&secs).unwrap().timestamp(), now.timestamp());
        assert_eq!(parse_timestamp(&millis).unwrap().timestamp(), now.timestamp());
    }

    #[test]
    fn webhook_hmac_is_hex() {
        let sig = compute_hmac(b"secret", b"body");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
