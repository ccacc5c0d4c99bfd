//! HTTP surface: shared state and router assembly.

pub mod callbacks;
pub mod health;
pub mod payments;

use crate::config::AppConfig;
use crate::payments::providers::mpesa::{self, MpesaGateway};
use crate::payments::providers::pesapal::{self, PesapalGateway};
use crate::services::reconciler::Reconciler;
use crate::store::OrderStoreClient;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<OrderStoreClient>,
    pub mpesa: Option<Arc<MpesaGateway>>,
    pub pesapal: Option<Arc<PesapalGateway>>,
    pub mpesa_reconciler: Arc<Reconciler>,
    pub pesapal_reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let store = Arc::new(OrderStoreClient::new(&config.store)?);

        let mpesa_gateway = match &config.mpesa {
            Some(cfg) => Some(Arc::new(MpesaGateway::new(cfg.clone())?)),
            None => None,
        };
        let pesapal_gateway = config
            .pesapal
            .as_ref()
            .map(|cfg| Arc::new(PesapalGateway::new(cfg.clone())));

        Ok(Self {
            mpesa_reconciler: Arc::new(Reconciler::new(
                mpesa::PROVIDER,
                mpesa::TRACKING_FIELD,
                config.mpesa_callbacks.clone(),
                store.clone(),
            )),
            pesapal_reconciler: Arc::new(Reconciler::new(
                pesapal::PROVIDER,
                pesapal::TRACKING_FIELD,
                config.pesapal_callbacks.clone(),
                store.clone(),
            )),
            store,
            mpesa: mpesa_gateway,
            pesapal: pesapal_gateway,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/payments/mpesa", post(payments::initiate_mpesa))
        .route("/api/payments/pesapal", post(payments::initiate_pesapal))
        .route("/webhooks/mpesa", post(callbacks::mpesa_callback))
        .route(
            "/webhooks/pesapal",
            get(callbacks::pesapal_callback).post(callbacks::pesapal_callback),
        )
        .with_state(state)
}
