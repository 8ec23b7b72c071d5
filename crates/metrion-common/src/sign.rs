//! Shared-secret body MAC (HMAC-SHA-256, hex-encoded).
//!
//! The agent signs the serialized payload *before* compression; the server
//! verifies against the decompressed body with the same secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the hex HMAC-SHA-256 of `body` under `secret`.
pub fn compute(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded MAC against `body` in constant time.
///
/// A malformed hex digest verifies as false rather than erroring; the caller
/// treats both the same way.
pub fn verify(secret: &str, body: &[u8], hex_mac: &str) -> bool {
    let Ok(expected) = hex::decode(hex_mac) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
