//! Webhook signature verification
//!
//! The document store signs each delivery with HMAC-SHA256 over the raw
//! request body and sends `sha256=<hex digest>` in `X-Notion-Signature`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-notion-signature";

const PREFIX: &str = "sha256=";

/// Header value for `body` signed with `secret`
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{}{}", PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a signature header against the raw body
pub fn verify(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(digest) = header.trim().strip_prefix(PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_then_verify() {
        let body = br#"{"type":"page.content_updated"}"#;
        let header = sign("whsec", body);
        assert!(header.starts_with("sha256="));
        assert_eq!(header.len(), PREFIX.len() + 64);
        assert!(verify("whsec", body, &header));
    }

    #[test]
    fn test_rejects_tampering_and_wrong_secret() {
        let body = b"payload";
        let header = sign("whsec", body);
        assert!(!verify("whsec", b"payload!", &header));
        assert!(!verify("other", body, &header));
    }

    #[test]
    fn test_rejects_malformed_headers() {
        assert!(!verify("whsec", b"x", ""));
        assert!(!verify("whsec", b"x", "md5=abcd"));
        assert!(!verify("whsec", b"x", "sha256=not-hex"));
        assert!(!verify("whsec", b"x", "sha256=abcd"));
    }
}
