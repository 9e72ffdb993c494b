//! Rewrites an inbound request into the shape a selected channel expects.

mod body;

pub use body::{FormPart, RequestBody};

use crate::catalog::ProviderKind;
use crate::routing::Channel;
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

/// An outbound request ready for the transport.
#[derive(Debug)]
pub struct AdaptedRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

/// Adapt `body` for `channel`.
///
/// `path_and_query` is the inbound path, e.g. `/v1/chat/completions?x=1`.
/// The caller's body is left untouched so later attempts start clean.
pub fn adapt(
    body: &RequestBody,
    channel: &Channel,
    path_and_query: &str,
) -> Result<AdaptedRequest, InvalidHeaderValue> {
    let mut body = body.clone();
    adapt_body(&mut body, channel);

    let url = upstream_url(channel, path_and_query);

    let mut headers = HeaderMap::new();
    if !body.is_form() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    match &channel.provider.kind {
        ProviderKind::Azure { .. } => {
            let mut value = HeaderValue::from_str(&channel.api_key.value)?;
            value.set_sensitive(true);
            headers.insert("api-key", value);
        }
        ProviderKind::Standard => {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", channel.api_key.value))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
    }

    Ok(AdaptedRequest { url, headers, body })
}

/// Apply the per-model body rewrites in place.
pub fn adapt_body(body: &mut RequestBody, channel: &Channel) {
    let model = channel.provider.model.as_str();
    body.set_str("model", model);

    if model.contains("gemini") {
        body.remove("frequency_penalty");
    }

    if channel.provider.reasoning {
        normalize_reasoning_effort(body);
    }
}

fn normalize_reasoning_effort(body: &mut RequestBody) {
    if let Some(Value::Object(thinking)) = body.get_value("thinkingConfig") {
        if thinking.get("includeThoughts").and_then(Value::as_bool) == Some(true) {
            let budget = thinking.get("thinkingBudget").and_then(Value::as_f64).unwrap_or(0.0);
            body.set_str("reasoning_effort", effort_for_budget(budget));
        }
    }
    body.remove("thinkingConfig");

    if !body.contains("reasoning_effort") {
        body.set_str("reasoning_effort", "none");
    }
}

fn effort_for_budget(budget: f64) -> &'static str {
    if budget > 10000.0 {
        "high"
    } else if budget > 5000.0 {
        "medium"
    } else if budget > 0.0 {
        "low"
    } else {
        "none"
    }
}

/// Resolve the upstream URL by swapping the inbound `/v1` prefix for the
/// provider's base.
pub fn upstream_url(channel: &Channel, path_and_query: &str) -> String {
    let rest = path_and_query.strip_prefix("/v1").unwrap_or(path_and_query);
    let base = channel.provider.base_url.trim_end_matches('/');

    match &channel.provider.kind {
        ProviderKind::Standard => format!("{}{}", base, rest),
        ProviderKind::Azure { api_version } => {
            let (path, query) = match rest.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (rest, None),
            };
            let mut url = format!(
                "{}/openai/deployments/{}{}?api-version={}",
                base, channel.provider.model, path, api_version
            );
            if let Some(query) = query.filter(|q| !q.is_empty()) {
                url.push('&');
                url.push_str(query);
            }
            url
        }
    }
}
