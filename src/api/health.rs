//! GET /health — liveness plus which providers are configured.

use crate::api::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value as JsonValue};

pub async fn health(State(state): State<AppState>) -> Json<JsonValue> {
    Json(json!({
        "status": "healthy",
        "providers": {
            "mpesa": state.mpesa.is_some(),
            "pesapal": state.pesapal.is_some(),
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
