//! Caller authentication and user key generation.

use crate::error::GatewayError;
use crate::routing::RoutingTable;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Resolve the bearer credential to a user key.
///
/// On success the request carries the [`UserKey`](crate::catalog::UserKey)
/// and the routing snapshot it was resolved against, so the handler routes
/// with the same snapshot even if a reload lands mid-request.
pub async fn require_user_key(
    State(table): State<RoutingTable>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let secret = extract_bearer(req.headers())?;
    let snapshot = table.snapshot();
    let user_key = snapshot
        .catalog
        .user_key(&secret)
        .cloned()
        .ok_or_else(|| GatewayError::Unauthorized("Invalid key".to_string()))?;

    tracing::debug!(caller = %user_key.name, "Authenticated");
    req.extensions_mut().insert(user_key);
    req.extensions_mut().insert(snapshot);
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<String, GatewayError> {
    let raw = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| GatewayError::Unauthorized("Missing key".to_string()))?
        .to_str()
        .map_err(|_| GatewayError::Unauthorized("Invalid authorization format".to_string()))?
        .trim();
    let token = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::Unauthorized("Invalid authorization format".to_string()))?;
    Ok(token.to_string())
}

/// Generate a fresh user key: `sk-` followed by 64 hex characters.
pub fn generate_user_key() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes)?;
    Ok(format!("sk-{}", hex_encode(&bytes)))
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}
