//! The retry/failover loop.
//!
//! One inbound request becomes up to `max_attempts` upstream attempts, each
//! through a freshly selected channel. Attempts run strictly one after
//! another; the exclusion sets live only inside a single call to
//! [`Relay::relay`].

mod transport;

pub use transport::{sanitize_response_headers, ProxyTransport, UpstreamReply};

use crate::adapter::{adapt, RequestBody};
use crate::catalog::UserKey;
use crate::config::{
    Config, LogVerbosity, DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::error::GatewayError;
use crate::logger::{format_attempt, format_outcome, AttemptLine};
use crate::routing::{
    ChannelSelector, Exclusions, FailureScope, OsRandom, RandomSource, RoutingSnapshot, SelectMiss,
};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    pub max_attempts: u32,
    /// Ceiling for the whole relay, all attempts included.
    pub deadline: Duration,
    pub verbosity: LogVerbosity,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            deadline: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            verbosity: LogVerbosity::default(),
        }
    }
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.gateway.attempt_budget(),
            deadline: Duration::from_secs(config.gateway.request_timeout_secs),
            verbosity: config.app.log_verbosity,
        }
    }
}

/// One inbound request to relay.
pub struct RelayRequest<'a> {
    pub method: Method,
    pub path_and_query: &'a str,
    pub body: RequestBody,
}

#[derive(Clone)]
pub struct Relay {
    transport: ProxyTransport,
    settings: RelaySettings,
    rng: Arc<dyn RandomSource>,
}

impl Relay {
    pub fn new(transport: ProxyTransport, settings: RelaySettings) -> Self {
        Self {
            transport,
            settings,
            rng: Arc::new(OsRandom),
        }
    }

    /// Swap the random source used for channel selection.
    pub fn with_rng(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Relay `request` for `caller`, bounded by the configured deadline.
    ///
    /// The deadline covers every attempt up to the moment upstream response
    /// headers arrive; the body then streams through. Callers that also read
    /// the inbound body should bound that read with [`Relay::with_deadline`].
    pub async fn relay(
        &self,
        snapshot: &RoutingSnapshot,
        caller: &UserKey,
        request: RelayRequest<'_>,
    ) -> Result<Response, GatewayError> {
        self.with_deadline(self.run(snapshot, caller, request)).await
    }

    /// Run `fut` under the relay deadline, mapping expiry to
    /// [`GatewayError::Timeout`].
    pub async fn with_deadline<F>(&self, fut: F) -> Result<Response, GatewayError>
    where
        F: Future<Output = Result<Response, GatewayError>>,
    {
        let deadline = self.settings.deadline;
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Request timed out after {:?}", deadline);
                Err(GatewayError::Timeout)
            }
        }
    }

    async fn run(
        &self,
        snapshot: &RoutingSnapshot,
        caller: &UserKey,
        request: RelayRequest<'_>,
    ) -> Result<Response, GatewayError> {
        let model = preflight(&request.body, caller)?;
        tracing::Span::current().record("model", model.as_str());

        let selector = ChannelSelector::new(&snapshot.index, self.rng.as_ref());
        let max_attempts = self.settings.max_attempts.max(1);
        let mut exclusions = Exclusions::default();

        for attempt in 1..=max_attempts {
            let channel = selector
                .select_with_fallback(&model, &exclusions, caller)
                .map_err(|miss| selection_error(miss, &model, caller))?;

            let adapted = match adapt(&request.body, &channel, request.path_and_query) {
                Ok(adapted) => adapted,
                Err(e) => {
                    tracing::warn!(
                        provider = %channel.provider.id,
                        "Key #{} cannot be sent as a header: {}",
                        channel.api_key.index,
                        e
                    );
                    exclusions = exclusions.record(&channel, FailureScope::Provider);
                    continue;
                }
            };

            let line = AttemptLine {
                attempt,
                max_attempts,
                channel: &channel,
                url: &adapted.url,
            };
            tracing::info!("{}", format_attempt(&line, self.settings.verbosity));

            let started = Instant::now();
            let verbosity = self.settings.verbosity;
            match self.transport.send(request.method.clone(), adapted).await {
                Ok(reply) if reply.status() == StatusCode::OK => {
                    let outcome = format_outcome(Some(200), elapsed_ms(started), verbosity);
                    tracing::debug!("{}", outcome);
                    return Ok(reply.into_response());
                }
                Ok(reply) => {
                    let status = reply.status();
                    let outcome =
                        format_outcome(Some(status.as_u16()), elapsed_ms(started), verbosity);
                    let detail = reply.failure_detail().await;
                    tracing::warn!(
                        provider = %channel.provider.id,
                        key = channel.api_key.index,
                        "{} {}",
                        outcome,
                        detail
                    );
                    exclusions = exclusions.record(&channel, classify_status(status));
                }
                Err(e) => {
                    let outcome = format_outcome(None, elapsed_ms(started), verbosity);
                    tracing::warn!(
                        provider = %channel.provider.id,
                        key = channel.api_key.index,
                        "{} {}",
                        outcome,
                        e
                    );
                    exclusions = exclusions.record(&channel, FailureScope::Provider);
                }
            }
        }

        tracing::error!(
            keys_excluded = exclusions.key_count(),
            providers_excluded = exclusions.provider_count(),
            "All {} attempts failed for model {}",
            max_attempts,
            model
        );
        Err(GatewayError::AllAttemptsFailed)
    }
}

/// Checks made once before the loop: a model is present and the caller may
/// use it.
fn preflight(body: &RequestBody, caller: &UserKey) -> Result<String, GatewayError> {
    let model = body
        .get_str("model")
        .filter(|m| !m.trim().is_empty())
        .ok_or(GatewayError::ModelRequired)?;

    match &caller.allowed_models {
        Some(list) if list.is_empty() => Err(GatewayError::NoModelsAllowed),
        Some(list) if !list.contains(&model) => Err(GatewayError::ModelNotAllowed(model)),
        _ => Ok(model),
    }
}

/// How much of a channel a non-200 status rules out.
///
/// 400 and 429 are blamed on the key; everything else on the provider.
pub fn classify_status(status: StatusCode) -> FailureScope {
    match status.as_u16() {
        400 | 429 => FailureScope::Key,
        _ => FailureScope::Provider,
    }
}

fn selection_error(miss: SelectMiss, model: &str, caller: &UserKey) -> GatewayError {
    match miss {
        SelectMiss::UnknownModel if caller.forbids_all_providers() => {
            GatewayError::NoProvidersAllowed
        }
        SelectMiss::UnknownModel => GatewayError::ModelNotFound(model.to_string()),
        SelectMiss::NoProvidersAllowed => GatewayError::NoProvidersAllowed,
        SelectMiss::ModelNotAllowed => match &caller.allowed_models {
            Some(list) if list.is_empty() => GatewayError::NoModelsAllowed,
            _ => GatewayError::ModelNotAllowed(model.to_string()),
        },
        SelectMiss::Exhausted => GatewayError::AllAttemptsFailed,
        SelectMiss::MappingMissing { provider } => {
            GatewayError::Internal(format!(
                "provider '{}' is indexed for '{}' but has no mapping",
                provider, model
            ))
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
