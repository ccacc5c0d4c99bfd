//! Unified error handling for the HTTP surface.
//!
//! Initiation endpoints answer with a standardized JSON envelope; callback
//! endpoints answer the provider with plain text, since the provider only
//! acts on the status code.

use crate::payments::error::PaymentError;
use crate::services::reconciler::CallbackError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Payment(err) => StatusCode::from_u16(err.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Store(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message returned to the caller. Upstream and store diagnostics stay
    /// out of the response body; the full error is logged instead.
    fn user_message(&self) -> String {
        match self {
            ApiError::Payment(err) => err.user_message(),
            ApiError::Store(_) => "order store is temporarily unavailable".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");

        let body = Json(json!({
            "success": false,
            "error": self.user_message(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (self.status_code(), body).into_response()
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            CallbackError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden"),
            CallbackError::InvalidSignature => (StatusCode::UNAUTHORIZED, "Invalid signature"),
            CallbackError::Malformed(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            CallbackError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };
        error!(error = %self, "callback rejected");
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_errors_keep_their_status_mapping() {
        let err = ApiError::Payment(PaymentError::validation("amount is required", Some("amount")));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = ApiError::Payment(PaymentError::Configuration {
            message: "missing credentials".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = ApiError::Store(StoreError::Network {
            message: "connection refused".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn store_details_do_not_leak_to_the_caller() {
        let err = ApiError::Store(StoreError::Status {
            status: 500,
            body: "secret internal detail".to_string(),
        });
        assert!(!err.user_message().contains("secret"));
    }
}
