//! OpenAI-compatible HTTP surface.
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /v1/models - Models visible to the caller
//! - POST /v1/chat/completions, /v1/embeddings, /v1/rerank - JSON relay
//! - POST /v1/audio/transcriptions, /v1/audio/translations - JSON or multipart relay

mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::require_user_key;
use crate::config::Config;
use crate::relay::{ProxyTransport, Relay, RelaySettings};
use crate::routing::RoutingTable;

pub use handlers::visible_models;
pub use types::*;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub routing: RoutingTable,
    pub relay: Relay,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(routing: RoutingTable, relay: Relay, max_body_bytes: usize) -> Self {
        Self {
            routing,
            relay,
            max_body_bytes,
        }
    }

    /// Build state from a loaded config: routing table, relay client, limits.
    pub fn from_config(config: &Config, routing: RoutingTable) -> Result<Self, reqwest::Error> {
        let client = crate::http::create_relay_client(std::time::Duration::from_secs(
            config.gateway.connect_timeout_secs,
        ))?;
        let relay = Relay::new(ProxyTransport::new(client), RelaySettings::from_config(config));
        Ok(Self::new(routing, relay, config.gateway.max_body_bytes()))
    }
}

/// Create the API router with the given state.
pub fn create_router_with_state(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let v1 = Router::new()
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/chat/completions", post(handlers::relay))
        .route("/v1/embeddings", post(handlers::relay))
        .route("/v1/rerank", post(handlers::relay))
        .route("/v1/audio/transcriptions", post(handlers::relay))
        .route("/v1/audio/translations", post(handlers::relay))
        .route_layer(middleware::from_fn_with_state(
            state.routing.clone(),
            require_user_key,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .merge(v1)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
