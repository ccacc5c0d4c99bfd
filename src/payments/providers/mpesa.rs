//! M-Pesa (Safaricom Daraja) gateway client: OAuth2 client-credentials
//! token exchange plus STK Push initiation, and callback normalization.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{CallbackOutcome, PaymentOutcome};
use crate::payments::utils::http_client;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::env;
use std::str::FromStr;
use tracing::{debug, info};

pub const PROVIDER: &str = "mpesa";

/// Order column holding the provider correlation id echoed in callbacks.
pub const TRACKING_FIELD: &str = "mpesa_checkout_id";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "https://sandbox.safaricom.co.ke",
            MpesaEnvironment::Production => "https://api.safaricom.co.ke",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "sandbox",
            MpesaEnvironment::Production => "production",
        }
    }
}

impl FromStr for MpesaEnvironment {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "sandbox" => Ok(MpesaEnvironment::Sandbox),
            "production" => Ok(MpesaEnvironment::Production),
            other => Err(PaymentError::Configuration {
                message: format!("unsupported MPESA_ENVIRONMENT: {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub environment: MpesaEnvironment,
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    pub timeout_secs: u64,
}

impl MpesaConfig {
    /// Loads the M-Pesa section from the environment. Returns `Ok(None)`
    /// when the provider is entirely unconfigured; a partially configured
    /// provider is a startup error, not something to discover on the
    /// first payment.
    pub fn from_env() -> PaymentResult<Option<Self>> {
        let consumer_key = env::var("MPESA_CONSUMER_KEY").unwrap_or_default();
        let consumer_secret = env::var("MPESA_CONSUMER_SECRET").unwrap_or_default();
        let shortcode = env::var("MPESA_SHORTCODE").unwrap_or_default();
        let passkey = env::var("MPESA_PASSKEY").unwrap_or_default();

        if consumer_key.is_empty()
            && consumer_secret.is_empty()
            && shortcode.is_empty()
            && passkey.is_empty()
        {
            return Ok(None);
        }
        if consumer_key.is_empty()
            || consumer_secret.is_empty()
            || shortcode.is_empty()
            || passkey.is_empty()
        {
            return Err(PaymentError::Configuration {
                message: "MPESA_CONSUMER_KEY, MPESA_CONSUMER_SECRET, MPESA_SHORTCODE and \
                          MPESA_PASSKEY must all be set"
                    .to_string(),
            });
        }

        let environment = env::var("MPESA_ENVIRONMENT")
            .unwrap_or_else(|_| "sandbox".to_string())
            .parse::<MpesaEnvironment>()?;
        let callback_url =
            env::var("MPESA_CALLBACK_URL").map_err(|_| PaymentError::Configuration {
                message: "MPESA_CALLBACK_URL must be set".to_string(),
            })?;

        Ok(Some(Self {
            base_url: env::var("MPESA_BASE_URL")
                .unwrap_or_else(|_| environment.base_url().to_string()),
            environment,
            consumer_key,
            consumer_secret,
            shortcode,
            passkey,
            callback_url,
            timeout_secs: env::var("MPESA_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }))
    }
}

/// Rewrites a payer phone number to the `2547XXXXXXXX` form the gateway
/// requires: whitespace stripped, leading `+` dropped, a national leading
/// `0` rewritten to the country code.
pub fn normalize_msisdn(phone: &str) -> String {
    let mut msisdn: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    if let Some(rest) = msisdn.strip_prefix('+') {
        msisdn = rest.to_string();
    }
    if let Some(rest) = msisdn.strip_prefix('0') {
        msisdn = format!("254{}", rest);
    }
    msisdn
}

#[derive(Debug, Serialize)]
struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: String,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: String,
    #[serde(rename = "Amount")]
    amount: String,
    #[serde(rename = "PartyA")]
    party_a: String,
    #[serde(rename = "PartyB")]
    party_b: String,
    #[serde(rename = "PhoneNumber")]
    phone_number: String,
    #[serde(rename = "CallBackURL")]
    callback_url: String,
    #[serde(rename = "AccountReference")]
    account_reference: String,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

/// Provider acknowledgment of an accepted STK push.
#[derive(Debug, Clone)]
pub struct StkPushAck {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub normalized_msisdn: String,
}

pub struct MpesaGateway {
    config: MpesaConfig,
    client: Client,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig) -> PaymentResult<Self> {
        let client = http_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }

    pub fn environment(&self) -> MpesaEnvironment {
        self.config.environment
    }

    fn auth_endpoint(&self) -> String {
        format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        )
    }

    fn stk_endpoint(&self) -> String {
        format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url)
    }

    /// `base64(shortcode + passkey + timestamp)`.
    fn stk_password(&self, timestamp: &str) -> String {
        BASE64.encode(format!(
            "{}{}{}",
            self.config.shortcode, self.config.passkey, timestamp
        ))
    }

    /// Exchanges the consumer key/secret for a bearer token. Tokens are
    /// deliberately not cached: one fresh exchange per initiation keeps
    /// this path stateless at the cost of a round trip.
    pub async fn obtain_access_token(&self) -> PaymentResult<String> {
        let basic = BASE64.encode(format!(
            "{}:{}",
            self.config.consumer_key, self.config.consumer_secret
        ));

        let response = self
            .client
            .get(self.auth_endpoint())
            .header(header::AUTHORIZATION, format!("Basic {}", basic))
            .send()
            .await
            .map_err(|e| PaymentError::Network {
                message: format!("token request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::UpstreamAuth {
                provider: PROVIDER.to_string(),
                message: format!("token exchange returned HTTP {}: {}", status, body),
            });
        }

        let token: AccessTokenResponse =
            response.json().await.map_err(|e| PaymentError::UpstreamAuth {
                provider: PROVIDER.to_string(),
                message: format!("invalid token response: {}", e),
            })?;

        debug!("mpesa access token obtained");
        Ok(token.access_token)
    }

    /// Prompts `phone` for `amount` and returns the provider correlation
    /// ids. The caller persists them onto the order together with
    /// `payment_status = pending`.
    pub async fn initiate_stk_push(
        &self,
        order_id: &str,
        phone: &str,
        amount: &str,
        description: Option<&str>,
    ) -> PaymentResult<StkPushAck> {
        let access_token = self.obtain_access_token().await?;

        let msisdn = normalize_msisdn(phone);
        let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
        let request = StkPushRequest {
            business_short_code: self.config.shortcode.clone(),
            password: self.stk_password(&timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount: amount.to_string(),
            party_a: msisdn.clone(),
            party_b: self.config.shortcode.clone(),
            phone_number: msisdn.clone(),
            callback_url: self.config.callback_url.clone(),
            account_reference: format!("order-{}", order_id),
            transaction_desc: description
                .map(|d| d.to_string())
                .unwrap_or_else(|| format!("Payment for order {}", order_id)),
        };

        let response = self
            .client
            .post(self.stk_endpoint())
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::Network {
                message: format!("stk push request failed: {}", e),
            })?;

        let status = response.status();
        let body: JsonValue = response.json().await.unwrap_or(JsonValue::Null);

        let response_code = body
            .get("ResponseCode")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        if !status.is_success() || response_code.as_deref() != Some("0") {
            let message = ["errorMessage", "error", "ResponseDescription"]
                .iter()
                .find_map(|k| body.get(*k).and_then(|v| v.as_str()))
                .unwrap_or("STK push failed")
                .to_string();
            return Err(PaymentError::GatewayRejected {
                provider: PROVIDER.to_string(),
                code: response_code,
                message: format!("HTTP {}: {}", status, message),
            });
        }

        let merchant_request_id = body
            .get("MerchantRequestID")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let checkout_request_id = body
            .get("CheckoutRequestID")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        info!(
            order_id = %order_id,
            checkout_request_id = %checkout_request_id,
            "stk push accepted by gateway"
        );

        Ok(StkPushAck {
            merchant_request_id,
            checkout_request_id,
            normalized_msisdn: msisdn,
        })
    }
}

/// Normalizes a Safaricom STK callback. Accepts the documented
/// `Body.stkCallback` nesting as well as a top-level `stkCallback`.
/// `ResultCode == 0` (number or string) means the payer completed the
/// payment; anything else is a failure.
pub fn parse_stk_callback(payload: &JsonValue) -> PaymentResult<CallbackOutcome> {
    let stk = payload
        .get("Body")
        .and_then(|b| b.get("stkCallback"))
        .or_else(|| payload.get("stkCallback"))
        .ok_or_else(|| PaymentError::validation("missing stkCallback", None))?;

    let tracking_id = stk
        .get("CheckoutRequestID")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PaymentError::validation("missing CheckoutRequestID", None))?
        .to_string();

    let result_code = stk.get("ResultCode").cloned().unwrap_or(JsonValue::Null);
    let completed = match &result_code {
        JsonValue::Number(n) => n.as_i64() == Some(0),
        JsonValue::String(s) => s == "0",
        _ => false,
    };
    let outcome = if completed {
        PaymentOutcome::Completed
    } else {
        PaymentOutcome::Failed
    };

    let mut metadata = Map::new();
    metadata.insert("mpesa_result_code".to_string(), result_code);
    metadata.insert(
        "mpesa_result_desc".to_string(),
        stk.get("ResultDesc").cloned().unwrap_or(JsonValue::Null),
    );

    // The metadata item names are not guaranteed in order or casing, so
    // match by case-insensitive substring.
    let items = stk
        .get("CallbackMetadata")
        .and_then(|m| m.get("Item"))
        .and_then(|i| i.as_array())
        .cloned()
        .unwrap_or_default();
    for item in &items {
        let name = item
            .get("Name")
            .or_else(|| item.get("name"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_lowercase());
        let Some(name) = name else { continue };
        let value = item.get("Value").cloned().unwrap_or(JsonValue::Null);

        if name.contains("receipt") {
            metadata.insert("mpesa_receipt".to_string(), value);
        } else if name.contains("transactiondate") {
            let date = match &value {
                JsonValue::Number(n) => JsonValue::String(n.to_string()),
                other => other.clone(),
            };
            metadata.insert("mpesa_transaction_date".to_string(), date);
        } else if name.contains("amount") {
            let amount = match &value {
                JsonValue::Number(_) => value.clone(),
                JsonValue::String(s) => s
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null),
                _ => JsonValue::Null,
            };
            metadata.insert("mpesa_amount".to_string(), amount);
        }
    }

    Ok(CallbackOutcome {
        tracking_id,
        outcome,
        metadata,
    })
}
