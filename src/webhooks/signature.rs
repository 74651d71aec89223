//! Gitea webhook signature verification using HMAC-SHA256.
//!
//! Gitea signs webhook payloads with HMAC-SHA256 over the raw body and sends
//! the result hex-encoded in the `X-Gitea-Signature` header. Unlike GitHub,
//! the header carries plain hex; some proxies re-add a `sha256=` prefix, so
//! both forms are accepted. Verification is the first step in webhook
//! processing: invalid signatures are rejected before the body is parsed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Parses a signature header into raw bytes.
///
/// Accepts plain hex (`abc123...`) and the prefixed form (`sha256=abc123...`).
/// Returns `None` for malformed input; never panics.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let trimmed = header.trim();
    let hex_sig = trimmed.strip_prefix("sha256=").unwrap_or(trimmed);
    if hex_sig.is_empty() {
        return None;
    }
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 signature of a payload with the given secret.
///
/// Used by tests to produce expected header values.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature the way Gitea sends it: plain hex.
pub fn format_signature_header(signature: &[u8]) -> String {
    hex::encode(signature)
}

/// Verifies a webhook signature against the payload and secret.
///
/// Uses the HMAC library's constant-time comparison.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let expected = match parse_signature_header(signature_header) {
        Some(sig) => sig,
        None => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
