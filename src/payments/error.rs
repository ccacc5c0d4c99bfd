use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Upstream auth error: provider={provider}, message={message}")]
    UpstreamAuth { provider: String, message: String },

    #[error("Gateway rejected request: provider={provider}, message={message}")]
    GatewayRejected {
        provider: String,
        code: Option<String>,
        message: String,
    },

    #[error("Network error: {message}")]
    Network { message: String },
}

impl PaymentError {
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        PaymentError::Validation {
            message: message.into(),
            field: field.map(|f| f.to_string()),
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::Configuration { .. } => 500,
            PaymentError::Validation { .. } => 400,
            PaymentError::UpstreamAuth { .. } => 502,
            PaymentError::GatewayRejected { .. } => 502,
            PaymentError::Network { .. } => 502,
        }
    }

    /// Message safe to return to the caller. Configuration and validation
    /// failures carry the specific reason; upstream failures stay generic
    /// and the detail goes to the logs instead.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Configuration { message } => message.clone(),
            PaymentError::Validation { message, .. } => message.clone(),
            PaymentError::UpstreamAuth { .. } => {
                "failed to authenticate with payment provider".to_string()
            }
            PaymentError::GatewayRejected { .. } => {
                "payment provider rejected the request".to_string()
            }
            PaymentError::Network { .. } => {
                "payment provider is temporarily unavailable".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_http_status_mapping_is_correct() {
        assert_eq!(
            PaymentError::Configuration {
                message: "missing credentials".to_string()
            }
            .http_status_code(),
            500
        );
        assert_eq!(
            PaymentError::validation("order_id is required", Some("order_id")).http_status_code(),
            400
        );
        assert_eq!(
            PaymentError::UpstreamAuth {
                provider: "mpesa".to_string(),
                message: "401".to_string()
            }
            .http_status_code(),
            502
        );
        assert_eq!(
            PaymentError::GatewayRejected {
                provider: "mpesa".to_string(),
                code: Some("1".to_string()),
                message: "insufficient funds".to_string()
            }
            .http_status_code(),
            502
        );
    }

    #[test]
    fn upstream_user_messages_stay_generic() {
        let err = PaymentError::GatewayRejected {
            provider: "mpesa".to_string(),
            code: Some("2001".to_string()),
            message: "The initiator information is invalid".to_string(),
        };
        assert!(!err.user_message().contains("initiator"));

        let err = PaymentError::validation("amount is required", Some("amount"));
        assert_eq!(err.user_message(), "amount is required");
    }
}
