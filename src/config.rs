//! Configuration management for relaygate.
//!
//! Loads gateway settings, user keys and upstream providers from
//! `~/.config/relaygate/config.toml` with environment overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// Gateway defaults (single source of truth)
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_BODY_MB: usize = 32;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default, alias = "userKeys")]
    pub user_keys: Vec<UserKeyConfig>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_verbosity")]
    pub log_verbosity: LogVerbosity,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogVerbosity {
    Minimal,
    #[default]
    Compact,
    Verbose,
}

/// A credential issued by this gateway to a caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserKeyConfig {
    pub name: String,
    pub key: String,
    /// Provider ids this key may route to. Absent means all, empty means none.
    #[serde(default, alias = "allowedProviders", skip_serializing_if = "Option::is_none")]
    pub allowed_providers: Option<Vec<String>>,
    /// Model ids this key may request. Absent means all, empty means none.
    #[serde(default, alias = "allowedModels", skip_serializing_if = "Option::is_none")]
    pub allowed_models: Option<Vec<String>>,
}

/// An upstream provider entry as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    #[serde(alias = "baseURL")]
    pub base_url: String,
    #[serde(default)]
    pub models: Vec<ModelMappingConfig>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub azure: bool,
    #[serde(default, alias = "azureAPIVersion", skip_serializing_if = "Option::is_none")]
    pub azure_api_version: Option<String>,
    #[serde(default, alias = "testModel", skip_serializing_if = "Option::is_none")]
    pub test_model: Option<String>,
}

/// Either a bare model id or a request/destination pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ModelMappingConfig {
    Simple(String),
    Mapped {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request: Option<String>,
        destination: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        reasoning: bool,
    },
}

// Default value functions
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { DEFAULT_PORT }
fn default_max_attempts() -> u32 { DEFAULT_MAX_ATTEMPTS }
fn default_request_timeout_secs() -> u64 { DEFAULT_REQUEST_TIMEOUT_SECS }
fn default_connect_timeout_secs() -> u64 { DEFAULT_CONNECT_TIMEOUT_SECS }
fn default_max_body_mb() -> usize { DEFAULT_MAX_BODY_MB }
fn default_filter() -> String { "info".to_string() }
fn default_verbosity() -> LogVerbosity { LogVerbosity::Compact }
fn default_true() -> bool { true }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_body_mb: default_max_body_mb(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_filter(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_verbosity: default_verbosity(),
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relaygate")
            .join("config.toml")
    }

    /// Load config from a specific path.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var("RELAYGATE_HOST") {
            if !host.trim().is_empty() {
                self.gateway.host = host;
            }
        }
        if let Ok(val) = std::env::var("RELAYGATE_PORT") {
            if let Ok(port) = val.parse() {
                self.gateway.port = port;
            }
        }
        if let Ok(val) = std::env::var("RELAYGATE_MAX_ATTEMPTS") {
            if let Ok(attempts) = val.parse() {
                self.gateway.max_attempts = attempts;
            }
        }
        if let Ok(val) = std::env::var("RELAYGATE_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.gateway.request_timeout_secs = secs;
            }
        }
        self
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, content).map_err(ConfigError::Io)
    }
}

impl GatewayConfig {
    /// Attempt budget for one relay request, never below one.
    pub fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_providers_and_user_keys_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, r#"
[gateway]
port = 9090

[[user_keys]]
name = "alice"
key = "sk-alice"
allowed_providers = ["openai"]

[[providers]]
id = "openai"
name = "OpenAI"
base_url = "https://api.openai.com/v1"
keys = ["k1", "k2"]
priority = 5
models = [
    "gpt-4o",
    { request = "gpt-x", destination = "gpt-4o-mini" },
    { destination = "o3", reasoning = true },
]
"#).unwrap();

        let config = Config::load_from(config_path).unwrap();

        assert_eq!(config.gateway.port, 9090);
        assert_eq!(config.gateway.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.user_keys.len(), 1);
        assert_eq!(config.user_keys[0].allowed_providers, Some(vec!["openai".to_string()]));
        assert_eq!(config.user_keys[0].allowed_models, None);

        let provider = &config.providers[0];
        assert_eq!(provider.priority, 5);
        assert!(provider.enabled);
        assert!(!provider.azure);
        assert_eq!(provider.models[0], ModelMappingConfig::Simple("gpt-4o".to_string()));
        assert_eq!(
            provider.models[1],
            ModelMappingConfig::Mapped {
                request: Some("gpt-x".to_string()),
                destination: "gpt-4o-mini".to_string(),
                reasoning: false,
            }
        );
        assert_eq!(
            provider.models[2],
            ModelMappingConfig::Mapped {
                request: None,
                destination: "o3".to_string(),
                reasoning: true,
            }
        );
    }

    #[test]
    fn accepts_camel_case_provider_fields() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, r#"
[[userKeys]]
name = "bob"
key = "sk-bob"
allowedModels = []

[[providers]]
id = "azure"
name = "Azure"
baseURL = "https://x.openai.azure.com"
azure = true
azureAPIVersion = "2024-10-21"
testModel = "gpt4"
keys = ["k"]
models = ["gpt4"]
"#).unwrap();

        let config = Config::load_from(config_path).unwrap();

        assert_eq!(config.user_keys[0].allowed_models, Some(vec![]));
        let provider = &config.providers[0];
        assert_eq!(provider.base_url, "https://x.openai.azure.com");
        assert_eq!(provider.azure_api_version.as_deref(), Some("2024-10-21"));
        assert_eq!(provider.test_model.as_deref(), Some("gpt4"));
    }

    #[test]
    fn returns_defaults_when_file_missing() {
        let config = Config::load_from(PathBuf::from("/nonexistent/path/config.toml")).unwrap();

        assert_eq!(config.gateway.port, DEFAULT_PORT);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.request_timeout_secs, 300);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.providers.is_empty());
        assert!(config.user_keys.is_empty());
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[[providers]]\nid = ").unwrap();

        let err = Config::load_from(config_path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_take_precedence_over_file() {
        std::env::remove_var("RELAYGATE_MAX_ATTEMPTS");

        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, r#"
[gateway]
max_attempts = 5
"#).unwrap();

        let config_from_file = Config::load_from(config_path.clone()).unwrap();
        assert_eq!(config_from_file.gateway.max_attempts, 5);

        std::env::set_var("RELAYGATE_MAX_ATTEMPTS", "7");
        let config = Config::load_from(config_path).unwrap().with_env_overrides();

        assert_eq!(config.gateway.max_attempts, 7);

        std::env::remove_var("RELAYGATE_MAX_ATTEMPTS");
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("config.toml");

        let config = Config {
            gateway: GatewayConfig { port: 3000, ..GatewayConfig::default() },
            providers: vec![ProviderConfig {
                id: "p".to_string(),
                name: "P".to_string(),
                base_url: "https://p.example/v1".to_string(),
                models: vec![ModelMappingConfig::Mapped {
                    request: Some("alias".to_string()),
                    destination: "real".to_string(),
                    reasoning: false,
                }],
                keys: vec!["k".to_string()],
                enabled: true,
                priority: 0,
                azure: false,
                azure_api_version: None,
                test_model: None,
            }],
            ..Config::default()
        };

        config.save_to(config_path.clone()).unwrap();

        let loaded = Config::load_from(config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn parses_all_log_verbosity_levels() {
        let dir = tempfile::tempdir().unwrap();

        for (value, expected) in [
            ("minimal", LogVerbosity::Minimal),
            ("compact", LogVerbosity::Compact),
            ("verbose", LogVerbosity::Verbose),
        ] {
            let config_path = dir.path().join(format!("config_{}.toml", value));
            fs::write(&config_path, format!(r#"
[app]
log_verbosity = "{}"
"#, value)).unwrap();

            let config = Config::load_from(config_path).unwrap();
            assert_eq!(config.app.log_verbosity, expected);
        }
    }

    #[test]
    fn attempt_budget_is_at_least_one() {
        let gateway = GatewayConfig { max_attempts: 0, ..GatewayConfig::default() };
        assert_eq!(gateway.attempt_budget(), 1);
        assert_eq!(GatewayConfig::default().max_body_bytes(), 32 * 1024 * 1024);
    }
}
