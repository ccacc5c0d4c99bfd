use crate::payments::error::PaymentError;
use reqwest::Client;
use std::time::Duration;

/// Builds the outbound HTTP client used for provider and store calls.
///
/// Every outbound call carries an explicit timeout; a hung upstream must
/// not hold a task indefinitely. No automatic retries here — retry policy
/// belongs to whatever orchestrates this service, not to the core.
pub fn http_client(timeout_secs: u64) -> Result<Client, PaymentError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PaymentError::Network {
            message: format!("failed to initialize HTTP client: {}", e),
        })
}

/// Constant-time byte comparison for signature checks.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Recomputes the hex HMAC-SHA256 of `payload` and compares it against the
/// presented signature in constant time.
pub fn verify_hmac_sha256_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(v) => v,
        Err(_) => return false,
    };
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());
    secure_eq(computed.as_bytes(), signature.trim().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn hmac_verification_accepts_matching_signature() {
        let payload = br#"{"order_tracking_id":"PP-1"}"#;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"secret").unwrap();
        mac.update(payload);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(verify_hmac_sha256_hex(payload, "secret", &signature));
        assert!(verify_hmac_sha256_hex(payload, "secret", &format!(" {} ", signature)));
    }

    #[test]
    fn hmac_verification_detects_invalid_signature() {
        let payload = br#"{"order_tracking_id":"PP-1"}"#;
        assert!(!verify_hmac_sha256_hex(payload, "secret", "not-a-valid-signature"));
        assert!(!verify_hmac_sha256_hex(payload, "other-secret", "deadbeef"));
    }
}
