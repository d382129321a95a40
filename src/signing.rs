//! Webhook payload signing and receiver-side verification.
//!
//! Every outbound webhook carries an HMAC-SHA256 signature over
//! `<timestamp>.<body>` (literal dot separator) computed with the shared
//! per-deployment secret. Receivers recompute the HMAC over the raw request
//! body and compare against the `x-maildog-signature` header; the
//! `x-maildog-timestamp` header bounds replay.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the hex-encoded HMAC signature.
pub const SIGNATURE_HEADER: &str = "x-maildog-signature";

/// Header carrying the Unix-seconds timestamp the signature covers.
pub const TIMESTAMP_HEADER: &str = "x-maildog-timestamp";

/// Compute the webhook signature: hex HMAC-SHA256 of `timestamp.body`.
///
/// Deterministic: identical inputs always produce identical output.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a received signature in constant time.
pub fn verify_signature(secret: &str, timestamp: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    mac.verify_slice(&signature).is_ok()
}

/// Basic timestamp freshness check for receivers.
///
/// Timestamps from the future are rejected outright.
pub fn is_timestamp_fresh(timestamp_secs: u64, now_secs: u64, max_age_secs: u64) -> bool {
    if now_secs >= timestamp_secs {
        now_secs - timestamp_secs <= max_age_secs
    } else {
        false
    }
}

/// Signature and timestamp headers pulled out of a request.
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
}

/// Extract the maildog signature headers from a header list.
pub fn parse_signature_headers<'a, I>(headers: I) -> ParsedSignature
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut signature = None;
    let mut timestamp = None;

    for (name, value) in headers {
        let key = name.to_ascii_lowercase();
        if key == SIGNATURE_HEADER {
            signature = Some(value.to_string());
        } else if key == TIMESTAMP_HEADER {
            timestamp = Some(value.to_string());
        }
    }

    ParsedSignature { signature, timestamp }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    MissingSignature,
    MissingTimestamp,
    InvalidTimestamp,
    StaleTimestamp,
    InvalidSignature,
}

/// Verify an incoming webhook request in one call.
///
/// `max_age_secs` is the receiver's replay tolerance; the sender does not
/// enforce one.
pub fn verify_webhook_request<'a, I>(
    headers: I,
    body: &[u8],
    secret: &str,
    max_age_secs: u64,
    now_secs: u64,
) -> Result<(), VerificationError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let parsed = parse_signature_headers(headers);
    let signature = parsed.signature.ok_or(VerificationError::MissingSignature)?;
    let timestamp = parsed.timestamp.ok_or(VerificationError::MissingTimestamp)?;
    let timestamp_secs = timestamp
        .parse::<u64>()
        .map_err(|_| VerificationError::InvalidTimestamp)?;

    if !is_timestamp_fresh(timestamp_secs, now_secs, max_age_secs) {
        return Err(VerificationError::StaleTimestamp);
    }

    if verify_signature(secret, &timestamp, body, &signature) {
        Ok(())
    } else {
        Err(VerificationError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_is_deterministic() {
        let a = sign("secret", "1700000000", b"{\"id\":\"e1\"}");
        let b = sign("secret", "1700000000", b"{\"id\":\"e1\"}");
        assert_eq!(a, b);
    }

    #[test]
    fn single_byte_change_alters_signature() {
        let a = sign("secret", "1700000000", b"{\"id\":\"e1\"}");
        let b = sign("secret", "1700000000", b"{\"id\":\"e2\"}");
        assert_ne!(a, b);
    }

    #[test]
    fn dot_separator_delimits_timestamp_and_body() {
        // Without the separator these two would collide.
        let a = sign("secret", "12", b"3body");
        let b = sign("secret", "123", b"body");
        assert_ne!(a, b);
    }

    #[test]
    fn verify_round_trip() {
        let body = b"payload bytes";
        let sig = sign("secret", "42", body);
        assert!(verify_signature("secret", "42", body, &sig));
        assert!(!verify_signature("other", "42", body, &sig));
        assert!(!verify_signature("secret", "43", body, &sig));
    }

    #[test]
    fn freshness_rejects_old_and_future_timestamps() {
        assert!(is_timestamp_fresh(100, 120, 300));
        assert!(!is_timestamp_fresh(100, 500, 300));
        assert!(!is_timestamp_fresh(200, 100, 300));
    }

    #[test]
    fn full_request_verification() {
        let body = br#"{"type":"sent"}"#;
        let sig = sign("secret", "1000", body);
        let headers = vec![
            ("content-type", "application/json"),
            ("X-Maildog-Timestamp", "1000"),
            ("X-Maildog-Signature", sig.as_str()),
        ];

        assert_eq!(
            verify_webhook_request(headers.iter().copied(), body, "secret", 300, 1100),
            Ok(())
        );
        assert_eq!(
            verify_webhook_request(headers.iter().copied(), body, "secret", 300, 9000),
            Err(VerificationError::StaleTimestamp)
        );
        assert_eq!(
            verify_webhook_request(headers.iter().copied(), b"tampered", "secret", 300, 1100),
            Err(VerificationError::InvalidSignature)
        );
    }
}
