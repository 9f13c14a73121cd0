//! HMAC-SHA256 signing and verification over raw request bytes.
//!
//! Signatures are always computed over the exact bytes received on the wire,
//! never over a re-serialized payload.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

/// `"sha256=" + hex(HMAC-SHA256(secret, raw_body))`.
pub fn sign(secret: &str, raw_body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", hex_digest(secret, raw_body))
}

/// Compare a received signature header against the expected one. An optional
/// `sha256=` prefix on the received value is accepted.
pub fn verify(secret: &str, raw_body: &[u8], received: &str) -> bool {
    let received = received.strip_prefix(SIGNATURE_PREFIX).unwrap_or(received);
    let expected = hex_digest(secret, raw_body);
    constant_time_eq(received.as_bytes(), expected.as_bytes())
}

fn hex_digest(secret: &str, raw_body: &[u8]) -> String {
    // HMAC-SHA256 accepts keys of any length, so this cannot fail.
    #[allow(clippy::expect_used)]
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let secret = "my-endpoint-secret";
        let body = br#"{"x":1}"#;
        let sig = sign(secret, body);
        assert!(sig.starts_with("sha256="));
        assert!(verify(secret, body, &sig));
    }

    #[test]
    fn verify_accepts_unprefixed_value() {
        let secret = "s";
        let body = b"payload";
        let sig = sign(secret, body);
        let bare = sig.strip_prefix("sha256=").unwrap();
        assert!(verify(secret, body, bare));
    }

    #[test]
    fn flipping_one_bit_of_body_fails() {
        let secret = "s";
        let body = b"payload".to_vec();
        let sig = sign(secret, &body);
        let mut tampered = body;
        tampered[0] ^= 0x01;
        assert!(!verify(secret, &tampered, &sig));
    }

    #[test]
    fn different_secret_fails() {
        let body = b"payload";
        let sig = sign("secret-a", body);
        assert!(!verify("secret-b", body, &sig));
    }

    #[test]
    fn signature_is_sixty_four_hex_chars() {
        let sig = sign("s", b"payload");
        let hex_part = sig.strip_prefix("sha256=").unwrap();
        assert_eq!(hex_part.len(), 64);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn empty_body_still_signs() {
        let sig = sign("s", b"");
        assert!(verify("s", b"", &sig));
    }
}
