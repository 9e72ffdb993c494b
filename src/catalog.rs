//! Validated routing data built from the raw configuration.
//!
//! Shape checks run once here so the request path never has to re-inspect
//! optional fields: a provider that reaches the catalog always has keys, a
//! usable base URL, and an API version when it is an Azure deployment.

use crate::config::{Config, ConfigError, ModelMappingConfig, ProviderConfig, UserKeyConfig};
use std::collections::{HashMap, HashSet};

/// How requests to a provider are addressed and authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI-compatible endpoint with bearer auth.
    Standard,
    /// Azure OpenAI deployment with `api-key` auth.
    Azure { api_version: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelMapping {
    Simple(String),
    Mapped {
        request: Option<String>,
        destination: String,
        reasoning: bool,
    },
}

impl ModelMapping {
    /// The id callers use to ask for this model.
    pub fn public_id(&self) -> &str {
        match self {
            Self::Simple(id) => id,
            Self::Mapped { request, destination, .. } => request.as_deref().unwrap_or(destination),
        }
    }

    /// The id sent upstream.
    pub fn destination(&self) -> &str {
        match self {
            Self::Simple(id) => id,
            Self::Mapped { destination, .. } => destination,
        }
    }

    pub fn is_reasoning(&self) -> bool {
        matches!(self, Self::Mapped { reasoning: true, .. })
    }
}

impl From<&ModelMappingConfig> for ModelMapping {
    fn from(raw: &ModelMappingConfig) -> Self {
        match raw {
            ModelMappingConfig::Simple(id) => Self::Simple(id.clone()),
            ModelMappingConfig::Mapped { request, destination, reasoning } => Self::Mapped {
                request: request.clone().filter(|r| !r.trim().is_empty()),
                destination: destination.clone(),
                reasoning: *reasoning,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    /// Config key, referenced by user key allowlists.
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub models: Vec<ModelMapping>,
    pub keys: Vec<String>,
    pub enabled: bool,
    pub priority: i64,
    pub kind: ProviderKind,
    pub test_model: Option<String>,
}

impl Provider {
    /// Find the mapping serving `model_id`, preferring a public id match over
    /// a destination match.
    pub fn mapping_for(&self, model_id: &str) -> Option<&ModelMapping> {
        self.models
            .iter()
            .find(|m| m.public_id() == model_id)
            .or_else(|| self.models.iter().find(|m| m.destination() == model_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserKey {
    pub name: String,
    pub key: String,
    pub allowed_providers: Option<Vec<String>>,
    pub allowed_models: Option<Vec<String>>,
}

impl UserKey {
    /// True when the key carries a provider allowlist that admits nothing.
    pub fn forbids_all_providers(&self) -> bool {
        matches!(&self.allowed_providers, Some(list) if list.is_empty())
    }

    pub fn allows_provider(&self, provider_id: &str) -> bool {
        match &self.allowed_providers {
            None => true,
            Some(list) => list.iter().any(|p| p == provider_id),
        }
    }

    pub fn allows_model(&self, model_id: &str) -> bool {
        match &self.allowed_models {
            None => true,
            Some(list) => list.iter().any(|m| m == model_id),
        }
    }
}

impl From<&UserKeyConfig> for UserKey {
    fn from(raw: &UserKeyConfig) -> Self {
        Self {
            name: raw.name.clone(),
            key: raw.key.clone(),
            allowed_providers: raw.allowed_providers.clone(),
            allowed_models: raw.allowed_models.clone(),
        }
    }
}

/// Providers and user keys that passed validation.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    providers: Vec<Provider>,
    user_keys: HashMap<String, UserKey>,
}

impl Catalog {
    /// Validate a config into a catalog.
    ///
    /// Conflicts between entries are fatal; a provider whose own shape is
    /// unusable is dropped with a warning.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        check_provider_ids_unique(&config.providers)?;
        check_upstream_keys_unique(&config.providers)?;

        let known_ids: HashSet<&str> = config.providers.iter().map(|p| p.id.as_str()).collect();
        let mut user_keys = HashMap::with_capacity(config.user_keys.len());
        for raw in &config.user_keys {
            if let Some(allowed) = &raw.allowed_providers {
                if let Some(unknown) = allowed.iter().find(|id| !known_ids.contains(id.as_str())) {
                    return Err(ConfigError::Invalid(format!(
                        "user key '{}' allows unknown provider '{}'",
                        raw.name, unknown
                    )));
                }
            }
            if raw.key.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "user key '{}' has an empty key",
                    raw.name
                )));
            }
            if user_keys.insert(raw.key.clone(), UserKey::from(raw)).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "user key '{}' duplicates another user key",
                    raw.name
                )));
            }
        }

        let providers = config
            .providers
            .iter()
            .filter_map(|raw| match validate_provider(raw) {
                Ok(provider) => Some(provider),
                Err(reason) => {
                    tracing::warn!(provider = %raw.id, "Ignoring provider: {}", reason);
                    None
                }
            })
            .collect();

        Ok(Self { providers, user_keys })
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn user_key(&self, secret: &str) -> Option<&UserKey> {
        self.user_keys.get(secret)
    }

    pub fn user_key_count(&self) -> usize {
        self.user_keys.len()
    }
}

fn check_provider_ids_unique(providers: &[ProviderConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for provider in providers {
        if !seen.insert(provider.id.as_str()) {
            return Err(ConfigError::Invalid(format!("duplicate provider id '{}'", provider.id)));
        }
    }
    Ok(())
}

fn check_upstream_keys_unique(providers: &[ProviderConfig]) -> Result<(), ConfigError> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for provider in providers {
        for key in &provider.keys {
            if let Some(owner) = owners.insert(key.as_str(), provider.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' reuses an upstream key already configured on '{}'",
                    provider.id, owner
                )));
            }
        }
    }
    Ok(())
}

fn validate_provider(raw: &ProviderConfig) -> Result<Provider, String> {
    if raw.id.trim().is_empty() {
        return Err("provider id is empty".to_string());
    }

    let base_url = raw.base_url.trim().trim_end_matches('/');
    match reqwest::Url::parse(base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => return Err(format!("unsupported base_url scheme '{}'", url.scheme())),
        Err(e) => return Err(format!("invalid base_url '{}': {}", raw.base_url, e)),
    }

    let keys: Vec<String> = raw
        .keys
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        return Err("no upstream keys configured".to_string());
    }

    let kind = if raw.azure {
        match raw.azure_api_version.as_deref().map(str::trim) {
            Some(version) if !version.is_empty() => ProviderKind::Azure {
                api_version: version.to_string(),
            },
            _ => return Err("azure provider is missing azure_api_version".to_string()),
        }
    } else {
        ProviderKind::Standard
    };

    Ok(Provider {
        id: raw.id.clone(),
        name: raw.name.clone(),
        base_url: base_url.to_string(),
        models: raw.models.iter().map(ModelMapping::from).collect(),
        keys,
        enabled: raw.enabled,
        priority: raw.priority,
        kind,
        test_model: raw.test_model.clone(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn provider_config(id: &str, keys: &[&str], models: &[&str]) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            name: id.to_uppercase(),
            base_url: format!("https://{}.example/v1", id),
            models: models
                .iter()
                .map(|m| ModelMappingConfig::Simple(m.to_string()))
                .collect(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            enabled: true,
            priority: 0,
            azure: false,
            azure_api_version: None,
            test_model: None,
        }
    }

    pub(crate) fn user_key_config(key: &str) -> UserKeyConfig {
        UserKeyConfig {
            name: format!("user-{}", key),
            key: key.to_string(),
            allowed_providers: None,
            allowed_models: None,
        }
    }

    #[test]
    fn mapping_accessors_resolve_public_and_destination_ids() {
        let simple = ModelMapping::Simple("gpt-4o".to_string());
        assert_eq!(simple.public_id(), "gpt-4o");
        assert_eq!(simple.destination(), "gpt-4o");
        assert!(!simple.is_reasoning());

        let cast = ModelMapping::Mapped {
            request: Some("gpt-x".to_string()),
            destination: "gpt-4o-mini".to_string(),
            reasoning: false,
        };
        assert_eq!(cast.public_id(), "gpt-x");
        assert_eq!(cast.destination(), "gpt-4o-mini");

        let bare = ModelMapping::from(&ModelMappingConfig::Mapped {
            request: Some("  ".to_string()),
            destination: "o3".to_string(),
            reasoning: true,
        });
        assert_eq!(bare.public_id(), "o3");
        assert!(bare.is_reasoning());
    }

    #[test]
    fn mapping_lookup_prefers_public_id() {
        let mut raw = provider_config("p", &["k"], &[]);
        raw.models = vec![
            ModelMappingConfig::Mapped {
                request: Some("a".to_string()),
                destination: "b".to_string(),
                reasoning: false,
            },
            ModelMappingConfig::Simple("b-direct".to_string()),
        ];
        let provider = validate_provider(&raw).unwrap();

        assert_eq!(provider.mapping_for("a").unwrap().destination(), "b");
        assert_eq!(provider.mapping_for("b").unwrap().destination(), "b");
        assert!(provider.mapping_for("missing").is_none());
    }

    #[test]
    fn azure_provider_without_version_is_ignored() {
        let mut azure = provider_config("azure", &["k1"], &["gpt4"]);
        azure.azure = true;
        let config = Config {
            providers: vec![azure, provider_config("openai", &["k2"], &["gpt4"])],
            ..Config::default()
        };

        let catalog = Catalog::from_config(&config).unwrap();

        assert_eq!(catalog.providers().len(), 1);
        assert_eq!(catalog.providers()[0].id, "openai");
    }

    #[test]
    fn azure_provider_carries_api_version() {
        let mut azure = provider_config("azure", &["k1"], &["gpt4"]);
        azure.azure = true;
        azure.azure_api_version = Some("2024-10-21".to_string());
        azure.base_url = "https://x.openai.azure.com/".to_string();

        let provider = validate_provider(&azure).unwrap();

        assert_eq!(
            provider.kind,
            ProviderKind::Azure { api_version: "2024-10-21".to_string() }
        );
        assert_eq!(provider.base_url, "https://x.openai.azure.com");
    }

    #[test]
    fn provider_without_keys_or_with_bad_url_is_ignored() {
        let mut bad_url = provider_config("bad", &["k1"], &["m"]);
        bad_url.base_url = "not a url".to_string();
        let config = Config {
            providers: vec![provider_config("empty", &[], &["m"]), bad_url],
            ..Config::default()
        };

        let catalog = Catalog::from_config(&config).unwrap();

        assert!(catalog.providers().is_empty());
    }

    #[test]
    fn duplicate_upstream_keys_are_rejected() {
        let config = Config {
            providers: vec![
                provider_config("a", &["shared"], &["m"]),
                provider_config("b", &["shared"], &["m"]),
            ],
            ..Config::default()
        };

        let err = Catalog::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("reuses an upstream key"));
    }

    #[test]
    fn duplicate_user_keys_are_rejected() {
        let config = Config {
            user_keys: vec![user_key_config("sk-1"), user_key_config("sk-1")],
            ..Config::default()
        };

        assert!(matches!(Catalog::from_config(&config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn allowlist_naming_unknown_provider_is_rejected() {
        let mut key = user_key_config("sk-1");
        key.allowed_providers = Some(vec!["ghost".to_string()]);
        let config = Config {
            user_keys: vec![key],
            providers: vec![provider_config("real", &["k"], &["m"])],
            ..Config::default()
        };

        let err = Catalog::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn user_key_allowlists() {
        let mut key = UserKey::from(&user_key_config("sk"));
        assert!(key.allows_provider("anything"));
        assert!(key.allows_model("anything"));
        assert!(!key.forbids_all_providers());

        key.allowed_providers = Some(vec![]);
        key.allowed_models = Some(vec!["gpt-4o".to_string()]);
        assert!(key.forbids_all_providers());
        assert!(!key.allows_provider("openai"));
        assert!(key.allows_model("gpt-4o"));
        assert!(!key.allows_model("gpt-x"));
    }

    #[test]
    fn catalog_resolves_user_keys_by_secret() {
        let config = Config {
            user_keys: vec![user_key_config("sk-a"), user_key_config("sk-b")],
            ..Config::default()
        };

        let catalog = Catalog::from_config(&config).unwrap();

        assert_eq!(catalog.user_key_count(), 2);
        assert_eq!(catalog.user_key("sk-b").unwrap().name, "user-sk-b");
        assert!(catalog.user_key("sk-c").is_none());
    }
}
