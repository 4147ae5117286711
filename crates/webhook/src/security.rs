use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use crate::error::WebhookError;

type HmacSha512 = Hmac<Sha512>;
type HmacSha256 = Hmac<Sha256>;

/// Verifies the WhatsApp-gateway signature scheme: `X-Webhook-Hmac` is
/// hex(HMAC-SHA512(secret, body)); `X-Webhook-Timestamp` must be within
/// `skew_sec` of now (§4.J item 2, §6).
pub fn verify_gateway_signature(
    body: &[u8],
    secret: &str,
    hmac_header: Option<&str>,
    timestamp_header: Option<&str>,
    skew_sec: i64,
) -> Result<(), WebhookError> {
    let hmac_hex = hmac_header.ok_or(WebhookError::MissingSignature)?;
    let timestamp_raw = timestamp_header.ok_or(WebhookError::MissingSignature)?;

    let timestamp: i64 = timestamp_raw.parse().map_err(|_| WebhookError::InvalidSignature)?;
    let skew = (Utc::now().timestamp() - timestamp).abs();
    if skew > skew_sec {
        return Err(WebhookError::TimestampSkew);
    }

    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    let expected = hex::decode(hmac_hex).map_err(|_| WebhookError::InvalidSignature)?;
    mac.verify_slice(&expected).map_err(|_| WebhookError::InvalidSignature)
}

/// Verifies the generic `sha256=<hex>` signature scheme used by other
/// webhook producers in the wild (§4.J item 2).
pub fn verify_generic_signature(body: &[u8], secret: &str, signature_header: Option<&str>) -> Result<(), WebhookError> {
    let header = signature_header.ok_or(WebhookError::MissingSignature)?;
    let hex_digest = header.strip_prefix("sha256=").ok_or(WebhookError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    let expected = hex::decode(hex_digest).map_err(|_| WebhookError::InvalidSignature)?;
    mac.verify_slice(&expected).map_err(|_| WebhookError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_freshly_signed_request() {
        let body = b"{\"event\":\"message\"}";
        let secret = "topsecret";
        let signature = sign(body, secret);
        let timestamp = Utc::now().timestamp().to_string();

        assert!(verify_gateway_signature(body, secret, Some(&signature), Some(&timestamp), 300).is_ok());
    }

    #[test]
    fn rejects_a_tampered_body() {
        let secret = "topsecret";
        let signature = sign(b"original", secret);
        let timestamp = Utc::now().timestamp().to_string();

        let result = verify_gateway_signature(b"tampered", secret, Some(&signature), Some(&timestamp), 300);
        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let body = b"payload";
        let secret = "topsecret";
        let signature = sign(body, secret);
        let stale = (Utc::now().timestamp() - 3600).to_string();

        let result = verify_gateway_signature(body, secret, Some(&signature), Some(&stale), 300);
        assert!(matches!(result, Err(WebhookError::TimestampSkew)));
    }

    #[test]
    fn rejects_missing_headers() {
        let result = verify_gateway_signature(b"payload", "secret", None, None, 300);
        assert!(matches!(result, Err(WebhookError::MissingSignature)));
    }

    #[test]
    fn generic_scheme_accepts_matching_sha256() {
        let body = b"payload";
        let secret = "topsecret";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let header = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        assert!(verify_generic_signature(body, secret, Some(&header)).is_ok());
    }

    #[test]
    fn generic_scheme_rejects_missing_prefix() {
        let result = verify_generic_signature(b"payload", "secret", Some("deadbeef"));
        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
    }
}
