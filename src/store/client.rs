//! HTTP client for the external order record store.
//!
//! The store speaks a PostgREST-style REST dialect: row filters go in the
//! query string (`?id=eq.42`) and `Prefer: return=representation` makes
//! mutations echo the affected rows. All calls carry the service-role
//! credential; this service never talks to the store as an end user.

use crate::config::OrderStoreConfig;
use reqwest::{header, Client, Method, RequestBuilder};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order store request failed: {message}")]
    Network { message: String },

    #[error("order store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("order store returned an unreadable response: {message}")]
    Decode { message: String },
}

pub struct OrderStoreClient {
    base_url: String,
    service_key: String,
    client: Client,
}

impl OrderStoreClient {
    pub fn new(config: &OrderStoreConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Network {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            client,
        })
    }

    fn orders_url(&self, filter: Option<(&str, &str)>) -> String {
        match filter {
            Some((field, value)) => {
                let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
                format!("{}/orders?{}=eq.{}", self.base_url, field, encoded)
            }
            None => format!("{}/orders", self.base_url),
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.service_key)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", &self.service_key),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .header("Prefer", "return=representation")
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<JsonValue> {
        let response = request.send().await.map_err(|e| StoreError::Network {
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_str(&body).map_err(|e| StoreError::Decode {
            message: e.to_string(),
        })
    }

    fn rows(value: JsonValue) -> Vec<JsonValue> {
        match value {
            JsonValue::Array(rows) => rows,
            JsonValue::Null => Vec::new(),
            other => vec![other],
        }
    }

    pub async fn get_order_by_id(&self, id: &str) -> StoreResult<Option<JsonValue>> {
        let url = format!("{}&limit=1", self.orders_url(Some(("id", id))));
        let value = self.send(self.request(Method::GET, &url)).await?;
        Ok(Self::rows(value).into_iter().next())
    }

    pub async fn create_order(&self, fields: &JsonValue) -> StoreResult<JsonValue> {
        let url = self.orders_url(None);
        let value = self
            .send(self.request(Method::POST, &url).json(fields))
            .await?;
        Self::rows(value)
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode {
                message: "store did not return the created order".to_string(),
            })
    }

    /// Patches the order with the given id; returns the affected rows
    /// (empty when no order matched).
    pub async fn patch_order_by_id(
        &self,
        id: &str,
        fields: &JsonValue,
    ) -> StoreResult<Vec<JsonValue>> {
        let url = self.orders_url(Some(("id", id)));
        let value = self
            .send(self.request(Method::PATCH, &url).json(fields))
            .await?;
        Ok(Self::rows(value))
    }

    /// Patches the order whose provider-correlation column matches
    /// `value`; returns the affected rows (empty when no order matched).
    pub async fn patch_order_by_tracking_id(
        &self,
        tracking_field: &str,
        value: &str,
        fields: &JsonValue,
    ) -> StoreResult<Vec<JsonValue>> {
        let url = self.orders_url(Some((tracking_field, value)));
        let result = self
            .send(self.request(Method::PATCH, &url).json(fields))
            .await?;
        Ok(Self::rows(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OrderStoreClient {
        OrderStoreClient::new(&OrderStoreConfig {
            base_url: "https://store.example.com/rest/v1/".to_string(),
            service_key: "service-role-key".to_string(),
            timeout_secs: 5,
        })
        .expect("client init should succeed")
    }

    #[test]
    fn filter_urls_use_postgrest_eq_syntax() {
        let client = client();
        assert_eq!(
            client.orders_url(Some(("id", "42"))),
            "https://store.example.com/rest/v1/orders?id=eq.42"
        );
        assert_eq!(
            client.orders_url(Some(("mpesa_checkout_id", "ws_CO 1+2"))),
            "https://store.example.com/rest/v1/orders?mpesa_checkout_id=eq.ws_CO+1%2B2"
        );
        assert_eq!(
            client.orders_url(None),
            "https://store.example.com/rest/v1/orders"
        );
    }

    #[test]
    fn row_extraction_tolerates_scalar_and_null_bodies() {
        assert_eq!(OrderStoreClient::rows(JsonValue::Null), Vec::<JsonValue>::new());
        assert_eq!(
            OrderStoreClient::rows(serde_json::json!([{"id": 1}])).len(),
            1
        );
        assert_eq!(
            OrderStoreClient::rows(serde_json::json!({"id": 1})).len(),
            1
        );
    }
}
