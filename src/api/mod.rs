//! Gateway HTTP API.
//!
//! Endpoints:
//! - GET  /api/health - Health and configuration check
//! - GET  /api/providers - Provider catalog
//! - POST /api/chat - Proxy a conversation to the selected provider
//! - POST /api/create-checkout-session - Start a hosted checkout
//! - GET  /api/verify-session - Verified access snapshot
//! - GET  /api/subscription-status - Same snapshot, status-poll flavor
//! - POST /api/track-message - Record one consumed message
//! - POST /api/webhook/stripe - Signature-verified event acknowledgment

mod handlers;
mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::billing::{BillingService, UsageDb};
use crate::config::Config;
use crate::provider::ProviderAdapter;

pub use types::*;

/// Application state shared across handlers.
pub struct AppState {
    pub adapter: ProviderAdapter,
    pub billing: Option<BillingService>,
    pub config: Config,
}

impl AppState {
    /// Build state with an explicit usage database (tests use in-memory).
    pub fn new(config: Config, usage: UsageDb) -> Self {
        let adapter = ProviderAdapter::new(config.api_keys.clone(), &config.chat);
        let billing = BillingService::from_config(&config, usage);
        Self {
            adapter,
            billing,
            config,
        }
    }

    /// Build state with the usage database at its default location.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let usage = UsageDb::open(Config::data_dir().join("usage.db"))?;
        Ok(Self::new(config, usage))
    }
}

/// Create the API router with custom state.
pub fn create_router_with_state(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/providers", get(handlers::list_providers))
        .route("/api/chat", post(handlers::chat))
        .route(
            "/api/create-checkout-session",
            post(handlers::create_checkout_session),
        )
        .route("/api/verify-session", get(handlers::verify_session))
        .route(
            "/api/subscription-status",
            get(handlers::subscription_status),
        )
        .route("/api/track-message", post(handlers::track_message))
        .route("/api/webhook/stripe", post(handlers::stripe_webhook))
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
