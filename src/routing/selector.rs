use super::index::ModelIndex;
use super::random::{shuffle, uniform_index, RandomSource};
use crate::catalog::{Provider, ProviderKind, UserKey};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

/// Provider half of a channel, with the model already resolved to its
/// destination id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelProvider {
    pub id: String,
    pub name: String,
    pub model: String,
    pub base_url: String,
    pub kind: ProviderKind,
    pub priority: i64,
    pub reasoning: bool,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ChannelKey {
    /// Position in the provider's key list, for diagnostics only.
    pub index: usize,
    pub value: String,
}

impl std::fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelKey")
            .field("index", &self.index)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// One (provider, key) pair chosen for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub provider: ChannelProvider,
    pub api_key: ChannelKey,
}

/// How much of a channel a failed attempt rules out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    Key,
    Provider,
}

/// Keys and providers already judged failed during one request.
///
/// Values are never mutated in place: each failed attempt produces the next
/// snapshot through [`Exclusions::record`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusions {
    keys: HashSet<String>,
    providers: HashSet<String>,
}

impl Exclusions {
    pub fn record(&self, channel: &Channel, scope: FailureScope) -> Self {
        let mut next = self.clone();
        next.keys.insert(channel.api_key.value.clone());
        if scope == FailureScope::Provider {
            next.providers.insert(channel.provider.id.clone());
        }
        next
    }

    pub fn excludes_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn excludes_provider(&self, provider_id: &str) -> bool {
        self.providers.contains(provider_id)
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    fn keys_only(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            providers: HashSet::new(),
        }
    }
}

/// Why no channel could be selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectMiss {
    /// No enabled provider serves the model, or none the caller may use.
    UnknownModel,
    /// The caller's provider allowlist is present and empty.
    NoProvidersAllowed,
    /// The caller's model allowlist does not contain the model.
    ModelNotAllowed,
    /// Candidates exist but every one is excluded.
    Exhausted,
    /// An indexed provider has no mapping for the model.
    MappingMissing { provider: String },
}

pub struct ChannelSelector<'a> {
    index: &'a ModelIndex,
    rng: &'a dyn RandomSource,
}

impl<'a> ChannelSelector<'a> {
    pub fn new(index: &'a ModelIndex, rng: &'a dyn RandomSource) -> Self {
        Self { index, rng }
    }

    /// Pick one channel for `model_id`.
    ///
    /// Providers are tried highest priority first, shuffled within a priority
    /// level; the key is drawn uniformly from the first provider that still has
    /// one available.
    pub fn select(
        &self,
        model_id: &str,
        exclusions: &Exclusions,
        caller: &UserKey,
    ) -> Result<Channel, SelectMiss> {
        let candidates = self.index.providers_for(model_id).ok_or(SelectMiss::UnknownModel)?;

        if caller.forbids_all_providers() {
            return Err(SelectMiss::NoProvidersAllowed);
        }
        if !caller.allows_model(model_id) {
            return Err(SelectMiss::ModelNotAllowed);
        }

        let allowed: Vec<&Arc<Provider>> = candidates
            .iter()
            .filter(|p| caller.allows_provider(&p.id))
            .collect();
        if allowed.is_empty() {
            return Err(SelectMiss::UnknownModel);
        }

        let mut remaining: Vec<&Arc<Provider>> = allowed
            .into_iter()
            .filter(|p| !exclusions.excludes_provider(&p.id))
            .collect();
        if remaining.is_empty() {
            return Err(SelectMiss::Exhausted);
        }

        remaining.sort_by_key(|p| Reverse(p.priority));
        for group in remaining.chunk_by_mut(|a, b| a.priority == b.priority) {
            shuffle(self.rng, group);
        }

        let (provider, available) = remaining
            .iter()
            .find_map(|provider| {
                let available: Vec<usize> = provider
                    .keys
                    .iter()
                    .enumerate()
                    .filter(|(_, key)| !exclusions.excludes_key(key))
                    .map(|(i, _)| i)
                    .collect();
                (!available.is_empty()).then_some((*provider, available))
            })
            .ok_or(SelectMiss::Exhausted)?;

        let key_index = available[uniform_index(self.rng, available.len())];

        let mapping = provider.mapping_for(model_id).ok_or_else(|| SelectMiss::MappingMissing {
            provider: provider.id.clone(),
        })?;

        Ok(Channel {
            provider: ChannelProvider {
                id: provider.id.clone(),
                name: provider.name.clone(),
                model: mapping.destination().to_string(),
                base_url: provider.base_url.clone(),
                kind: provider.kind.clone(),
                priority: provider.priority,
                reasoning: mapping.is_reasoning(),
            },
            api_key: ChannelKey {
                index: key_index,
                value: provider.keys[key_index].clone(),
            },
        })
    }

    /// Select, relaxing exclusions when every candidate has already failed.
    ///
    /// Tiers: keys and providers excluded, then keys only, then nothing.
    /// Allowlists are never relaxed.
    pub fn select_with_fallback(
        &self,
        model_id: &str,
        exclusions: &Exclusions,
        caller: &UserKey,
    ) -> Result<Channel, SelectMiss> {
        match self.select(model_id, exclusions, caller) {
            Err(SelectMiss::Exhausted) => {}
            other => return other,
        }
        match self.select(model_id, &exclusions.keys_only(), caller) {
            Err(SelectMiss::Exhausted) => {}
            other => return other,
        }
        self.select(model_id, &Exclusions::default(), caller)
    }
}
