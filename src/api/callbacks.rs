//! Provider callback endpoints.
//!
//! Callbacks authenticate by origin (IP allowlist, optional body HMAC),
//! never by session; the raw body is kept around for the signature check
//! before any parsing happens.

use crate::api::AppState;
use crate::payments::providers::{mpesa, pesapal};
use crate::services::reconciler::{CallbackError, SIGNATURE_HEADER_KEYS};
use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderMap, Method},
};
use serde_json::Value as JsonValue;
use tracing::info;

/// Caller address as the reverse proxy reports it.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
}

fn signature_header(headers: &HeaderMap) -> Option<String> {
    SIGNATURE_HEADER_KEYS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    })
}

/// POST /webhooks/mpesa
pub async fn mpesa_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, CallbackError> {
    state.mpesa_reconciler.authorize(
        client_ip(&headers).as_deref(),
        signature_header(&headers).as_deref(),
        &body,
    )?;

    let payload: JsonValue = serde_json::from_slice(&body)
        .map_err(|_| CallbackError::Malformed("missing callback body".to_string()))?;
    let outcome = mpesa::parse_stk_callback(&payload)?;

    info!(tracking_id = %outcome.tracking_id, "mpesa callback received");
    state.mpesa_reconciler.apply(&outcome).await?;
    Ok("OK")
}

/// GET|POST /webhooks/pesapal
///
/// The redirect back from the payment page arrives as a GET with query
/// parameters; IPN delivery posts JSON or a form body.
pub async fn pesapal_callback(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, CallbackError> {
    state.pesapal_reconciler.authorize(
        client_ip(&headers).as_deref(),
        signature_header(&headers).as_deref(),
        &body,
    )?;

    let outcome = if method == Method::GET {
        pesapal::parse_callback(query.as_deref(), None)?
    } else {
        let text = String::from_utf8_lossy(&body);
        pesapal::parse_callback(None, Some(text.as_ref()))?
    };

    info!(tracking_id = %outcome.tracking_id, "pesapal callback received");
    state.pesapal_reconciler.apply(&outcome).await?;
    Ok("OK")
}
