//! Provider health check: probe every upstream key with a tiny chat request.

use crate::adapter::{adapt, RequestBody};
use crate::catalog::{Catalog, ModelMapping, Provider};
use crate::config::Config;
use crate::relay::ProxyTransport;
use crate::routing::{Channel, ChannelKey, ChannelProvider};
use axum::http::Method;
use serde_json::json;
use std::fmt::Write;
use std::time::Instant;

const PROBE_PATH: &str = "/v1/chat/completions";
const PROBE_PROMPT: &str = "Say 1 only";

/// One row of the check report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRow {
    pub provider: String,
    pub model: String,
    pub status: String,
    pub elapsed_ms: Option<u64>,
}

/// Probe every key of every configured provider that names a test model.
///
/// Disabled providers are probed too. Providers without a test model, without
/// keys, or rejected by validation get a single explanatory row.
pub async fn run_checks(
    config: &Config,
    catalog: &Catalog,
    transport: &ProxyTransport,
) -> Vec<ProbeRow> {
    let mut rows = Vec::new();

    for raw in &config.providers {
        let Some(test_model) = raw.test_model.as_deref().filter(|m| !m.trim().is_empty()) else {
            rows.push(note_row(&raw.name, "No test model found", "N/A"));
            continue;
        };
        if raw.keys.iter().all(|k| k.trim().is_empty()) {
            rows.push(note_row(&raw.name, test_model, "No keys found"));
            continue;
        }
        let Some(provider) = catalog.providers().iter().find(|p| p.id == raw.id) else {
            rows.push(note_row(&raw.name, test_model, "Invalid provider config"));
            continue;
        };

        for index in 0..provider.keys.len() {
            rows.push(probe_key(provider, index, test_model, transport).await);
        }
    }

    rows
}

async fn probe_key(
    provider: &Provider,
    index: usize,
    test_model: &str,
    transport: &ProxyTransport,
) -> ProbeRow {
    let channel = probe_channel(provider, index, test_model);
    let body = match json!({
        "model": test_model,
        "messages": [{"role": "user", "content": PROBE_PROMPT}],
    }) {
        serde_json::Value::Object(map) => RequestBody::Json(map),
        _ => RequestBody::Json(serde_json::Map::new()),
    };
    let name = format!("{} ({})", provider.name, index);

    let adapted = match adapt(&body, &channel, PROBE_PATH) {
        Ok(adapted) => adapted,
        Err(e) => return note_row(&name, test_model, &format!("Invalid key: {}", e)),
    };

    let started = Instant::now();
    let status = match transport.send(Method::POST, adapted).await {
        Ok(reply) => reply.status().to_string(),
        Err(e) => {
            tracing::debug!("Probe of {} failed: {}", name, e);
            "Unreachable".to_string()
        }
    };

    ProbeRow {
        provider: name,
        model: test_model.to_string(),
        status,
        elapsed_ms: Some(started.elapsed().as_millis() as u64),
    }
}

fn probe_channel(provider: &Provider, index: usize, test_model: &str) -> Channel {
    let mapping = provider
        .mapping_for(test_model)
        .cloned()
        .unwrap_or_else(|| ModelMapping::Simple(test_model.to_string()));
    Channel {
        provider: ChannelProvider {
            id: provider.id.clone(),
            name: provider.name.clone(),
            model: test_model.to_string(),
            base_url: provider.base_url.clone(),
            kind: provider.kind.clone(),
            priority: provider.priority,
            reasoning: mapping.is_reasoning(),
        },
        api_key: ChannelKey {
            index,
            value: provider.keys[index].clone(),
        },
    }
}

fn note_row(provider: &str, model: &str, status: &str) -> ProbeRow {
    ProbeRow {
        provider: provider.to_string(),
        model: model.to_string(),
        status: status.to_string(),
        elapsed_ms: None,
    }
}

/// Render rows as a plain aligned table.
pub fn render_table(rows: &[ProbeRow]) -> String {
    let headers = ["Provider", "Model", "Status", "Response Time (ms)"];
    let cells: Vec<[String; 4]> = rows
        .iter()
        .map(|row| {
            [
                row.provider.clone(),
                row.model.clone(),
                row.status.clone(),
                row.elapsed_ms.map(|ms| ms.to_string()).unwrap_or_else(|| "N/A".to_string()),
            ]
        })
        .collect();

    let mut widths = headers.map(|h| h.chars().count());
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut line = |values: [&str; 4]| {
        let padded: Vec<String> = values
            .iter()
            .zip(widths)
            .map(|(value, width)| format!("{:<width$}", value, width = width))
            .collect();
        let _ = writeln!(out, "{}", padded.join("  ").trim_end());
    };

    line(headers);
    line(widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str));
    for row in &cells {
        line(row.each_ref().map(String::as_str));
    }
    out
}
