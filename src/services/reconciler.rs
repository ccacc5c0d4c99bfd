//! Callback reconciliation: authenticate an inbound provider callback,
//! normalize it, and apply exactly one state transition to the matching
//! order record.

use crate::payments::error::PaymentError;
use crate::payments::types::CallbackOutcome;
use crate::payments::utils::verify_hmac_sha256_hex;
use crate::store::{OrderStoreClient, StoreError};
use serde_json::Value as JsonValue;
use std::env;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Header names a callback signature may arrive under, tried in order.
pub const SIGNATURE_HEADER_KEYS: [&str; 3] =
    ["x-pesapal-signature", "x-signature", "x-hook-signature"];

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("caller address not allowed")]
    Forbidden,

    #[error("invalid callback signature")]
    InvalidSignature,

    #[error("malformed callback: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PaymentError> for CallbackError {
    fn from(err: PaymentError) -> Self {
        CallbackError::Malformed(err.user_message())
    }
}

/// Origin checks for one provider's callback endpoint. Each check has an
/// explicit enable flag so both states are constructible in tests; a
/// disabled check is skipped entirely. Running with both checks disabled
/// is fail-open and a deliberate deployment decision, not an accident of
/// empty configuration.
#[derive(Debug, Clone, Default)]
pub struct CallbackAuthConfig {
    pub enforce_ip_allowlist: bool,
    pub allowed_ips: Vec<String>,
    pub verify_signature: bool,
    pub signature_secret: Option<String>,
}

impl CallbackAuthConfig {
    /// Reads `<ips_var>` (comma-separated) and `<secret_var>` from the
    /// environment. Each check is enabled exactly when its variable is
    /// non-empty.
    pub fn from_env(ips_var: &str, secret_var: &str) -> Self {
        let allowed_ips: Vec<String> = env::var(ips_var)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let signature_secret = env::var(secret_var).ok().filter(|s| !s.is_empty());

        Self {
            enforce_ip_allowlist: !allowed_ips.is_empty(),
            verify_signature: signature_secret.is_some(),
            allowed_ips,
            signature_secret,
        }
    }

    /// Runs the enabled checks. The IP match is a case-sensitive exact
    /// comparison. The signature check recomputes an HMAC-SHA256 over the
    /// raw body and compares in constant time; a missing header skips the
    /// check rather than failing it, mirroring how the providers deliver
    /// unsigned callbacks by default.
    pub fn authorize(
        &self,
        remote_ip: Option<&str>,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> Result<(), CallbackError> {
        if self.enforce_ip_allowlist {
            let allowed = remote_ip
                .map(|ip| self.allowed_ips.iter().any(|candidate| candidate == ip))
                .unwrap_or(false);
            if !allowed {
                return Err(CallbackError::Forbidden);
            }
        }

        if self.verify_signature {
            if let (Some(secret), Some(signature)) = (self.signature_secret.as_deref(), signature)
            {
                if !verify_hmac_sha256_hex(raw_body, secret, signature) {
                    return Err(CallbackError::InvalidSignature);
                }
            }
        }

        Ok(())
    }
}

/// Applies normalized callback outcomes for one provider. The shared
/// contract across providers is `CallbackOutcome`; correlation happens
/// purely through the tracking column named at construction.
pub struct Reconciler {
    provider: &'static str,
    tracking_field: &'static str,
    auth: CallbackAuthConfig,
    store: Arc<OrderStoreClient>,
}

impl Reconciler {
    pub fn new(
        provider: &'static str,
        tracking_field: &'static str,
        auth: CallbackAuthConfig,
        store: Arc<OrderStoreClient>,
    ) -> Self {
        Self {
            provider,
            tracking_field,
            auth,
            store,
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn authorize(
        &self,
        remote_ip: Option<&str>,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> Result<(), CallbackError> {
        self.auth.authorize(remote_ip, signature, raw_body)
    }

    /// Patches the matching order with the outcome status and the
    /// provider metadata. A callback for an unknown tracking id is logged
    /// and swallowed: the provider still needs its acknowledgment, and
    /// the orphaned event is an operational follow-up, not a retry
    /// trigger.
    pub async fn apply(&self, outcome: &CallbackOutcome) -> Result<(), CallbackError> {
        let mut fields = outcome.metadata.clone();
        fields.insert(
            "payment_status".to_string(),
            JsonValue::String(outcome.outcome.as_status().as_str().to_string()),
        );

        let rows = self
            .store
            .patch_order_by_tracking_id(
                self.tracking_field,
                &outcome.tracking_id,
                &JsonValue::Object(fields),
            )
            .await?;

        if rows.is_empty() {
            warn!(
                provider = %self.provider,
                tracking_id = %outcome.tracking_id,
                "callback did not match any order"
            );
        } else {
            info!(
                provider = %self.provider,
                tracking_id = %outcome.tracking_id,
                payment_status = %outcome.outcome.as_status(),
                "order reconciled from callback"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn disabled_checks_accept_any_origin() {
        let auth = CallbackAuthConfig::default();
        assert!(auth.authorize(Some("203.0.113.7"), None, b"{}").is_ok());
        assert!(auth.authorize(None, None, b"{}").is_ok());
    }

    #[test]
    fn enforced_allowlist_is_exact_match() {
        let auth = CallbackAuthConfig {
            enforce_ip_allowlist: true,
            allowed_ips: vec!["196.201.214.200".to_string(), "196.201.214.206".to_string()],
            ..Default::default()
        };
        assert!(auth.authorize(Some("196.201.214.200"), None, b"").is_ok());
        assert!(matches!(
            auth.authorize(Some("196.201.214.201"), None, b""),
            Err(CallbackError::Forbidden)
        ));
        assert!(matches!(
            auth.authorize(None, None, b""),
            Err(CallbackError::Forbidden)
        ));
    }

    #[test]
    fn enforced_empty_allowlist_fails_closed() {
        let auth = CallbackAuthConfig {
            enforce_ip_allowlist: true,
            ..Default::default()
        };
        assert!(matches!(
            auth.authorize(Some("196.201.214.200"), None, b""),
            Err(CallbackError::Forbidden)
        ));
    }

    #[test]
    fn signature_check_verifies_when_header_present() {
        let auth = CallbackAuthConfig {
            verify_signature: true,
            signature_secret: Some("topsecret".to_string()),
            ..Default::default()
        };
        let body = br#"{"order_tracking_id":"PP-1"}"#;
        let good = sign(body, "topsecret");

        assert!(auth.authorize(None, Some(&good), body).is_ok());
        assert!(matches!(
            auth.authorize(None, Some("deadbeef"), body),
            Err(CallbackError::InvalidSignature)
        ));
        // No header: the check is skipped, not failed.
        assert!(auth.authorize(None, None, body).is_ok());
    }

    #[test]
    fn signature_ignored_when_check_disabled() {
        let auth = CallbackAuthConfig {
            verify_signature: false,
            signature_secret: Some("topsecret".to_string()),
            ..Default::default()
        };
        assert!(auth.authorize(None, Some("deadbeef"), b"{}").is_ok());
    }

    #[test]
    fn checks_compose_independently() {
        let auth = CallbackAuthConfig {
            enforce_ip_allowlist: true,
            allowed_ips: vec!["10.0.0.1".to_string()],
            verify_signature: true,
            signature_secret: Some("s".to_string()),
        };
        let body = b"payload";
        let good = sign(body, "s");

        assert!(auth.authorize(Some("10.0.0.1"), Some(&good), body).is_ok());
        // IP passes, signature fails.
        assert!(matches!(
            auth.authorize(Some("10.0.0.1"), Some("bad"), body),
            Err(CallbackError::InvalidSignature)
        ));
        // Signature passes, IP fails.
        assert!(matches!(
            auth.authorize(Some("10.9.9.9"), Some(&good), body),
            Err(CallbackError::Forbidden)
        ));
    }
}
