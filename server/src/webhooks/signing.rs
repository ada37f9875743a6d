//! HMAC-SHA256 webhook signing (§4.6, §6).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a payload with HMAC-SHA256 and return the hex-encoded digest.
/// Called only when the subscription has a `secret` configured.
#[must_use]
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time signature comparison, for subscribers verifying
/// inbound deliveries and for this codebase's own tests.
#[must_use]
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let expected = sign_payload(secret, payload);
    expected.len() == signature.len()
        && expected
            .as_bytes()
            .iter()
            .zip(signature.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let secret = "shh";
        let payload = b"{\"event_type\":\"run.started\"}";
        let sig = sign_payload(secret, payload);
        assert!(verify_signature(secret, payload, &sig));
        assert!(!verify_signature("wrong", payload, &sig));
        assert!(!verify_signature(secret, b"tampered", &sig));
    }
}
