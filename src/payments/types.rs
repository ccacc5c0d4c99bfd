use crate::payments::error::PaymentError;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::str::FromStr;

/// Normalized result of a provider callback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Completed,
    Failed,
}

impl PaymentOutcome {
    pub fn as_status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Completed => PaymentStatus::Completed,
            PaymentOutcome::Failed => PaymentStatus::Failed,
        }
    }
}

/// Values the order record's `payment_status` column can take.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    PesapalInitiated,
    StkRequested,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::PesapalInitiated => "pesapal_initiated",
            PaymentStatus::StkRequested => "stk_requested",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A provider callback normalized to the shared reconciliation contract:
/// the tracking id correlating back to the order, the outcome, and the
/// provider-specific fields to persist alongside the status.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub tracking_id: String,
    pub outcome: PaymentOutcome,
    pub metadata: Map<String, JsonValue>,
}

/// Accepts an amount given either as a JSON number or a string, validates
/// that it is a positive decimal, and returns its canonical string form.
pub fn parse_amount(value: &JsonValue, field: &str) -> Result<String, PaymentError> {
    let raw = match value {
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.trim().to_string(),
        _ => {
            return Err(PaymentError::validation(
                format!("{} must be a number or numeric string", field),
                Some(field),
            ))
        }
    };

    let parsed = BigDecimal::from_str(&raw).map_err(|_| {
        PaymentError::validation(format!("invalid decimal amount: {}", raw), Some(field))
    })?;
    if parsed <= BigDecimal::from(0) {
        return Err(PaymentError::validation(
            "amount must be greater than zero",
            Some(field),
        ));
    }

    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_maps_to_status() {
        assert_eq!(PaymentOutcome::Completed.as_status(), PaymentStatus::Completed);
        assert_eq!(PaymentOutcome::Failed.as_status(), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::Pending.as_str(), "pending");
        assert_eq!(PaymentStatus::PesapalInitiated.as_str(), "pesapal_initiated");
    }

    #[test]
    fn amount_accepts_number_and_string() {
        assert_eq!(parse_amount(&json!(500), "amount").unwrap(), "500");
        assert_eq!(parse_amount(&json!("1000.50"), "amount").unwrap(), "1000.50");
    }

    #[test]
    fn amount_rejects_non_positive_and_junk() {
        assert!(parse_amount(&json!(0), "amount").is_err());
        assert!(parse_amount(&json!("-5"), "amount").is_err());
        assert!(parse_amount(&json!("abc"), "amount").is_err());
        assert!(parse_amount(&json!({"value": 5}), "amount").is_err());
    }
}
