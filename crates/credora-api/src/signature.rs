//! Webhook signature verification
//!
//! The gateway signs the raw request body with HMAC-SHA512 under the shared
//! secret and sends the lowercase hex digest in a header.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;

type HmacSha512 = Hmac<Sha512>;

/// Hex HMAC-SHA512 of `payload` under `secret`
pub fn sign(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a provided signature against the payload.
///
/// An empty secret never verifies.
pub fn verify(secret: &str, payload: &[u8], provided: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let expected = sign(secret, payload);
    let provided = provided.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"event":"charge.success","data":{"reference":"PAY-1"}}"#;

    #[test]
    fn test_signature_is_sha512_hex() {
        let signature = sign(SECRET, BODY);
        assert_eq!(signature.len(), 128);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_accepts_matching_signature() {
        let signature = sign(SECRET, BODY);
        assert!(verify(SECRET, BODY, &signature));
        assert!(verify(SECRET, BODY, &signature.to_uppercase()));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let signature = sign(SECRET, BODY);
        let tampered = br#"{"event":"charge.success","data":{"reference":"PAY-2"}}"#;
        assert!(!verify(SECRET, tampered, &signature));
        assert!(!verify("other", BODY, &signature));
        assert!(!verify(SECRET, BODY, &signature[..64]));
        assert!(!verify(SECRET, BODY, ""));
    }

    #[test]
    fn test_empty_secret_never_verifies() {
        let signature = sign("", BODY);
        assert!(!verify("", BODY, &signature));
    }
}
