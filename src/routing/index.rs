use crate::catalog::Provider;
use std::collections::HashMap;
use std::sync::Arc;

/// Lookup from public model id to the enabled providers serving it.
///
/// Built once per config load and read-only afterwards.
#[derive(Debug, Default)]
pub struct ModelIndex {
    by_model: HashMap<String, Vec<Arc<Provider>>>,
}

impl ModelIndex {
    /// Index every enabled provider's public model ids, in encounter order.
    pub fn build(providers: &[Provider]) -> Self {
        let mut by_model: HashMap<String, Vec<Arc<Provider>>> = HashMap::new();

        for provider in providers.iter().filter(|p| p.enabled) {
            let provider = Arc::new(provider.clone());
            for mapping in &provider.models {
                let entry = by_model.entry(mapping.public_id().to_string()).or_default();
                // A provider listing the same public id twice is indexed once.
                if !entry.iter().any(|p| Arc::ptr_eq(p, &provider)) {
                    entry.push(Arc::clone(&provider));
                }
            }
        }

        Self { by_model }
    }

    pub fn providers_for(&self, model_id: &str) -> Option<&[Arc<Provider>]> {
        self.by_model
            .get(model_id)
            .map(Vec::as_slice)
            .filter(|providers| !providers.is_empty())
    }

    pub fn len(&self) -> usize {
        self.by_model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_model.is_empty()
    }
}
