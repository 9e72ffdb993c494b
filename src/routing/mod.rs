//! Provider/model routing: the model index, channel selection, and the
//! process-wide table holding the current routing snapshot.

mod index;
mod random;
mod selector;

pub use index::ModelIndex;
pub use random::{shuffle, uniform_index, OsRandom, RandomSource};
pub use selector::{
    Channel, ChannelKey, ChannelProvider, ChannelSelector, Exclusions, FailureScope, SelectMiss,
};

#[cfg(test)]
pub(crate) use random::tests::ScriptedRandom;

use crate::catalog::Catalog;
use crate::config::{Config, ConfigError};
use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};

/// Everything a request needs to route, derived from one config load.
#[derive(Debug)]
pub struct RoutingSnapshot {
    pub catalog: Catalog,
    pub index: ModelIndex,
    pub loaded_at: DateTime<Utc>,
}

impl RoutingSnapshot {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let catalog = Catalog::from_config(config)?;
        let index = ModelIndex::build(catalog.providers());
        Ok(Self {
            catalog,
            index,
            loaded_at: Utc::now(),
        })
    }
}

/// Shared handle to the current snapshot.
///
/// Readers clone the inner `Arc` and keep it for the whole request; a reload
/// swaps in a complete new snapshot and never touches one already handed out.
#[derive(Clone)]
pub struct RoutingTable {
    current: Arc<RwLock<Arc<RoutingSnapshot>>>,
}

impl RoutingTable {
    pub fn new(snapshot: RoutingSnapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, snapshot: RoutingSnapshot) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// Rebuild from `config`, keeping the current snapshot if validation fails.
    pub fn reload(&self, config: &Config) -> Result<(), ConfigError> {
        let snapshot = RoutingSnapshot::from_config(config)?;
        tracing::info!(
            providers = snapshot.catalog.providers().len(),
            models = snapshot.index.len(),
            user_keys = snapshot.catalog.user_key_count(),
            "Routing table reloaded"
        );
        self.replace(snapshot);
        Ok(())
    }
}
