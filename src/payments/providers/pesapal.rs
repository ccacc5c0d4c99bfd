//! PesaPal Direct Order gateway client: builds the XML order document,
//! signs the order-submission request with OAuth 1.0a, and normalizes the
//! provider's callback shapes.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::oauth1;
use crate::payments::types::{CallbackOutcome, PaymentOutcome};
use serde_json::{Map, Value as JsonValue};
use std::env;
use std::str::FromStr;
use tracing::info;

pub const PROVIDER: &str = "pesapal";

/// Order column holding the merchant reference echoed in callbacks.
pub const TRACKING_FIELD: &str = "pesapal_tracking_id";

const ORDER_PATH: &str = "/API/PostPesapalDirectOrderV4";

/// Historically-used spellings of the callback fields, tried in priority
/// order. The GET redirect uses the `pesapal_`-prefixed names; IPN posts
/// have used the others.
pub const TRACKING_ID_KEYS: [&str; 4] = [
    "order_tracking_id",
    "merchant_reference",
    "pesapal_merchant_reference",
    "orderTrackingId",
];
pub const TRANSACTION_ID_KEYS: [&str; 2] = ["transaction_id", "pesapal_transaction_tracking_id"];
pub const STATUS_KEYS: [&str; 1] = ["status"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PesapalEnvironment {
    Demo,
    Live,
}

impl PesapalEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            PesapalEnvironment::Demo => "https://demo.pesapal.com",
            PesapalEnvironment::Live => "https://www.pesapal.com",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PesapalEnvironment::Demo => "demo",
            PesapalEnvironment::Live => "live",
        }
    }
}

impl FromStr for PesapalEnvironment {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "demo" | "test" | "sandbox" => Ok(PesapalEnvironment::Demo),
            "live" | "production" => Ok(PesapalEnvironment::Live),
            other => Err(PaymentError::Configuration {
                message: format!("unsupported PESAPAL_ENVIRONMENT: {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PesapalConfig {
    pub environment: PesapalEnvironment,
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub currency: String,
}

impl PesapalConfig {
    /// Loads the PesaPal section from the environment. `Ok(None)` when the
    /// provider is entirely unconfigured; partial credentials fail fast.
    pub fn from_env() -> PaymentResult<Option<Self>> {
        let consumer_key = env::var("PESAPAL_CONSUMER_KEY").unwrap_or_default();
        let consumer_secret = env::var("PESAPAL_CONSUMER_SECRET").unwrap_or_default();

        if consumer_key.is_empty() && consumer_secret.is_empty() {
            return Ok(None);
        }
        if consumer_key.is_empty() || consumer_secret.is_empty() {
            return Err(PaymentError::Configuration {
                message: "PESAPAL_CONSUMER_KEY and PESAPAL_CONSUMER_SECRET must both be set"
                    .to_string(),
            });
        }

        let environment = env::var("PESAPAL_ENVIRONMENT")
            .unwrap_or_else(|_| "demo".to_string())
            .parse::<PesapalEnvironment>()?;

        Ok(Some(Self {
            base_url: env::var("PESAPAL_BASE_URL")
                .unwrap_or_else(|_| environment.base_url().to_string()),
            environment,
            consumer_key,
            consumer_secret,
            currency: env::var("PESAPAL_CURRENCY").unwrap_or_else(|_| "KES".to_string()),
        }))
    }
}

/// Payer and order fields embedded in the signed order document.
#[derive(Debug, Clone, Default)]
pub struct PesapalOrderRequest {
    pub amount: String,
    pub description: String,
    pub email: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub callback_url: String,
}

/// A created order: the merchant reference to persist and the signed URL
/// the payer's browser is redirected to.
#[derive(Debug, Clone)]
pub struct PesapalOrder {
    pub tracking_id: String,
    pub redirect_url: String,
}

pub struct PesapalGateway {
    config: PesapalConfig,
}

impl PesapalGateway {
    pub fn new(config: PesapalConfig) -> Self {
        Self { config }
    }

    pub fn environment(&self) -> PesapalEnvironment {
        self.config.environment
    }

    fn order_endpoint(&self) -> String {
        format!("{}{}", self.config.base_url, ORDER_PATH)
    }

    /// Merchant reference for one payment attempt. Millisecond timestamp
    /// plus a random suffix so concurrent orders cannot collide.
    pub fn generate_tracking_id() -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("PP-{}-{}", millis, &suffix[..8])
    }

    fn build_order_xml(&self, tracking_id: &str, request: &PesapalOrderRequest) -> String {
        format!(
            "<PesapalDirectOrderInfo \
             xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
             xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\">\
             <Amount>{}</Amount>\
             <Description>{}</Description>\
             <Type>MERCHANT</Type>\
             <Reference>{}</Reference>\
             <FirstName>{}</FirstName>\
             <LastName>{}</LastName>\
             <EmailAddress>{}</EmailAddress>\
             <PhoneNumber>{}</PhoneNumber>\
             <Currency>{}</Currency>\
             <CallbackUrl>{}</CallbackUrl>\
             </PesapalDirectOrderInfo>",
            xml_escape(&request.amount),
            xml_escape(&request.description),
            xml_escape(tracking_id),
            xml_escape(&request.first_name),
            xml_escape(&request.last_name),
            xml_escape(&request.email),
            xml_escape(&request.phone),
            xml_escape(&self.config.currency),
            xml_escape(&request.callback_url),
        )
    }

    /// Builds and signs the order-submission request. No network call is
    /// made here: the provider receives the order when the payer's browser
    /// follows the returned URL.
    pub fn create_order(&self, request: &PesapalOrderRequest) -> PaymentResult<PesapalOrder> {
        let tracking_id = Self::generate_tracking_id();
        self.create_order_with_reference(&tracking_id, request)
            .map(|redirect_url| PesapalOrder {
                tracking_id,
                redirect_url,
            })
    }

    /// Deterministic core of `create_order`, split out so a fixed
    /// reference can be signed repeatably.
    pub fn create_order_with_reference(
        &self,
        tracking_id: &str,
        request: &PesapalOrderRequest,
    ) -> PaymentResult<String> {
        if request.amount.is_empty() {
            return Err(PaymentError::validation("amount is required", Some("amount")));
        }
        if request.callback_url.is_empty() {
            return Err(PaymentError::validation(
                "callback_url is required",
                Some("callback_url"),
            ));
        }

        let xml = self.build_order_xml(tracking_id, request);
        let mut params = oauth1::protocol_params(
            &self.config.consumer_key,
            &oauth1::generate_nonce(),
            chrono::Utc::now().timestamp(),
        );
        params.insert("pesapal_request_data".to_string(), xml);

        let signed = oauth1::sign_request(
            "GET",
            &self.order_endpoint(),
            &params,
            &self.config.consumer_secret,
        );

        info!(tracking_id = %tracking_id, "pesapal order signed");
        Ok(signed.url)
    }
}

fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn first_json_value(payload: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match payload.get(*key) {
        Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn first_pair_value(pairs: &[(String, String)], keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        pairs
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.clone())
    })
}

fn status_outcome(status: Option<&str>) -> PaymentOutcome {
    match status.map(|s| s.to_lowercase()) {
        Some(s) if s == "completed" || s == "paid" || s == "success" => PaymentOutcome::Completed,
        _ => PaymentOutcome::Failed,
    }
}

/// Normalizes a PesaPal callback. Accepts a GET query string, a JSON
/// body, or a form-encoded body; the same field-name aliases apply to all
/// three. A present transaction id means the payment completed; otherwise
/// the explicit status field decides, defaulting to failed.
pub fn parse_callback(query: Option<&str>, body: Option<&str>) -> PaymentResult<CallbackOutcome> {
    let (tracking_id, transaction_id, status) = if let Some(query) = query {
        extract_from_pairs(query)
    } else if let Some(body) = body {
        match serde_json::from_str::<JsonValue>(body) {
            Ok(json) if json.is_object() => (
                first_json_value(&json, &TRACKING_ID_KEYS),
                first_json_value(&json, &TRANSACTION_ID_KEYS),
                first_json_value(&json, &STATUS_KEYS),
            ),
            _ => extract_from_pairs(body),
        }
    } else {
        (None, None, None)
    };

    let tracking_id =
        tracking_id.ok_or_else(|| PaymentError::validation("missing tracking id", None))?;

    let outcome = if transaction_id.is_some() {
        PaymentOutcome::Completed
    } else {
        status_outcome(status.as_deref())
    };

    let mut metadata = Map::new();
    metadata.insert(
        "pesapal_transaction_id".to_string(),
        transaction_id.map(JsonValue::String).unwrap_or(JsonValue::Null),
    );

    Ok(CallbackOutcome {
        tracking_id,
        outcome,
        metadata,
    })
}

fn extract_from_pairs(input: &str) -> (Option<String>, Option<String>, Option<String>) {
    let pairs: Vec<(String, String)> = form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    (
        first_pair_value(&pairs, &TRACKING_ID_KEYS),
        first_pair_value(&pairs, &TRANSACTION_ID_KEYS),
        first_pair_value(&pairs, &STATUS_KEYS),
    )
}
