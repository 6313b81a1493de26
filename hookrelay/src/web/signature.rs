//! Webhook HMAC-SHA256 signatures.
//!
//! Senders sign the exact request body with the shared secret and put
//! `sha256=<lowercase hex digest>` in the signature header. Verification
//! must see the raw wire bytes: re-serializing the JSON first changes key
//! order and whitespace and breaks valid signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Tag preceding the hex digest in a signature header.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the raw HMAC-SHA256 of `body` keyed with `secret`.
fn digest(secret: &[u8], body: &[u8]) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.finalize().into_bytes().into()
}

/// Sign a body, returning the header value `sha256=<hex>`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(digest(secret.as_bytes(), body))
    )
}

/// Verify a signature header against the raw request body.
///
/// Returns `false` for an empty header, a missing `sha256=` prefix, a
/// malformed hex digest or a mismatch. The digest comparison is constant
/// time.
pub fn verify(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(provided_hex) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        warn!(
            header_length = signature_header.len(),
            "signature_missing_prefix"
        );
        return false;
    };

    let provided = match hex::decode(provided_hex) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(digest_length = provided_hex.len(), "signature_malformed_hex");
            return false;
        }
    };

    let expected = digest(secret.as_bytes(), body);

    // Length is public (always 32 bytes for SHA-256), only contents are secret.
    if provided.len() != expected.len() {
        warn!(
            expected_length = expected.len(),
            actual_length = provided.len(),
            "signature_length_mismatch"
        );
        return false;
    }

    let valid: bool = expected[..].ct_eq(&provided[..]).into();

    if !valid {
        warn!("signature_mismatch");
    }

    valid
}
