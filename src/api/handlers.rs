//! HTTP handlers for the OpenAI-compatible API.

use super::types::*;
use super::AppState;
use crate::adapter::RequestBody;
use crate::catalog::UserKey;
use crate::error::GatewayError;
use crate::relay::RelayRequest;
use crate::routing::RoutingSnapshot;
use axum::{
    extract::{Request, State},
    response::Response,
    Extension, Json,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::Instrument;

// ============================================================================
// Health and Models handlers
// ============================================================================

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: "relaygate",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse { message: "OK" })
}

pub async fn list_models(
    Extension(snapshot): Extension<Arc<RoutingSnapshot>>,
    Extension(caller): Extension<UserKey>,
) -> Json<ModelsResponse> {
    let created = snapshot.loaded_at.timestamp();
    let data = visible_models(&snapshot, &caller)
        .into_iter()
        .map(|id| ModelInfo {
            id,
            object: "model",
            created,
            owned_by: "openai",
        })
        .collect();

    Json(ModelsResponse { object: "list", data })
}

/// Distinct public model ids the caller can route to, in config order.
pub fn visible_models(snapshot: &RoutingSnapshot, caller: &UserKey) -> Vec<String> {
    let mut seen = HashSet::new();
    snapshot
        .catalog
        .providers()
        .iter()
        .filter(|p| p.enabled && caller.allows_provider(&p.id))
        .flat_map(|p| p.models.iter().map(|m| m.public_id()))
        .filter(|id| caller.allows_model(id))
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Relay handler
// ============================================================================

/// Relay any OpenAI-style POST to a selected upstream.
pub async fn relay(
    State(state): State<AppState>,
    Extension(snapshot): Extension<Arc<RoutingSnapshot>>,
    Extension(caller): Extension<UserKey>,
    req: Request,
) -> Result<Response, GatewayError> {
    let method = req.method().clone();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let allow_form = req.uri().path().starts_with("/v1/audio/");

    let span = tracing::info_span!(
        "relay",
        request_id = %uuid::Uuid::new_v4(),
        caller = %caller.name,
        path = %req.uri().path(),
        model = tracing::field::Empty,
    );

    // The body read counts against the same deadline as the attempts.
    let relay = &state.relay;
    relay
        .with_deadline(async move {
            let body = RequestBody::from_request(req, allow_form).await?;
            let request = RelayRequest {
                method,
                path_and_query: &path_and_query,
                body,
            };
            relay.relay(&snapshot, &caller, request).await
        })
        .instrument(span)
        .await
}
