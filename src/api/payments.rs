//! Payment initiation endpoints.

use crate::api::AppState;
use crate::error::ApiError;
use crate::payments::error::PaymentError;
use crate::payments::providers::pesapal::PesapalOrderRequest;
use crate::payments::types::{parse_amount, PaymentStatus};
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct MpesaInitiateRequest {
    pub order_id: Option<JsonValue>,
    pub phone: Option<String>,
    pub amount: Option<JsonValue>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PesapalInitiateRequest {
    pub order_id: Option<JsonValue>,
    pub amount: Option<JsonValue>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub description: String,
    pub callback_url: Option<String>,
}

/// Order ids arrive as JSON numbers or strings depending on the caller.
fn id_as_string(value: Option<&JsonValue>) -> Option<String> {
    match value {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// POST /api/payments/mpesa
pub async fn initiate_mpesa(
    State(state): State<AppState>,
    Json(request): Json<MpesaInitiateRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let (order_id, phone) = match (
        id_as_string(request.order_id.as_ref()),
        request.phone.as_deref().filter(|p| !p.trim().is_empty()),
        request.amount.as_ref(),
    ) {
        (Some(order_id), Some(phone), Some(_)) => (order_id, phone.to_string()),
        _ => {
            return Err(PaymentError::validation(
                "order_id, phone and amount are required",
                None,
            )
            .into())
        }
    };
    let amount = parse_amount(request.amount.as_ref().unwrap_or(&JsonValue::Null), "amount")?;

    let gateway = state.mpesa.as_ref().ok_or(PaymentError::Configuration {
        message: "M-Pesa credentials are not configured".to_string(),
    })?;

    info!(order_id = %order_id, "initiating mpesa stk push");
    let ack = gateway
        .initiate_stk_push(&order_id, &phone, &amount, request.description.as_deref())
        .await?;

    let rows = state
        .store
        .patch_order_by_id(
            &order_id,
            &json!({
                "payment_status": PaymentStatus::Pending.as_str(),
                "mpesa_checkout_id": &ack.checkout_request_id,
                "mpesa_merchant_request_id": &ack.merchant_request_id,
                "mpesa_phone": &ack.normalized_msisdn,
            }),
        )
        .await?;
    if rows.is_empty() {
        warn!(order_id = %order_id, "stk push initiated for an unknown order");
    }

    Ok(Json(json!({
        "success": true,
        "checkout_request_id": ack.checkout_request_id,
        "merchant_request_id": ack.merchant_request_id,
    })))
}

/// POST /api/payments/pesapal
pub async fn initiate_pesapal(
    State(state): State<AppState>,
    Json(request): Json<PesapalInitiateRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let (order_id, callback_url) = match (
        id_as_string(request.order_id.as_ref()),
        request.amount.as_ref(),
        request
            .callback_url
            .as_deref()
            .filter(|u| !u.trim().is_empty()),
    ) {
        (Some(order_id), Some(_), Some(callback_url)) => (order_id, callback_url.to_string()),
        _ => {
            return Err(PaymentError::validation(
                "order_id, amount and callback_url are required",
                None,
            )
            .into())
        }
    };
    let amount = parse_amount(request.amount.as_ref().unwrap_or(&JsonValue::Null), "amount")?;

    let gateway = state.pesapal.as_ref().ok_or(PaymentError::Configuration {
        message: "PesaPal credentials are not configured".to_string(),
    })?;

    let order = gateway.create_order(&PesapalOrderRequest {
        amount,
        description: request.description,
        email: request.email,
        phone: request.phone,
        first_name: request.first_name,
        last_name: request.last_name,
        callback_url,
    })?;

    // The tracking id goes onto the order before the caller sees the
    // redirect URL, so a callback can always be matched even if it beats
    // this response back.
    let rows = state
        .store
        .patch_order_by_id(
            &order_id,
            &json!({
                "payment_status": PaymentStatus::Pending.as_str(),
                "pesapal_tracking_id": &order.tracking_id,
            }),
        )
        .await?;
    if rows.is_empty() {
        warn!(order_id = %order_id, "pesapal order created for an unknown order");
    }

    info!(order_id = %order_id, tracking_id = %order.tracking_id, "pesapal order created");
    Ok(Json(json!({
        "success": true,
        "redirect_url": order.redirect_url,
        "order_tracking_id": order.tracking_id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_ids_accept_strings_and_numbers() {
        assert_eq!(id_as_string(Some(&json!("42"))), Some("42".to_string()));
        assert_eq!(id_as_string(Some(&json!(42))), Some("42".to_string()));
        assert_eq!(id_as_string(Some(&json!("  "))), None);
        assert_eq!(id_as_string(Some(&json!(null))), None);
        assert_eq!(id_as_string(None), None);
    }
}
