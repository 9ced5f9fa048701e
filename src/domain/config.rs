//! # Configuration
//!
//! Manages the loading and parsing of the application's configuration file (`config.yaml`).
//! Defines the structs for the chat service, provider credentials, routing policy and session limits.
//! Values are read once at startup and never change afterwards.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::domain::types::{Layer, Provider};

/// Main application configuration structure.
/// Matches the layout of `data/config.yaml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub services: ServicesConfig,
    #[serde(default)]
    pub providers: BTreeMap<Provider, ProviderSettings>,
    #[serde(default)]
    pub cli: CliConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for various connected services.
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub matrix: MatrixConfig,
}

/// Specific configuration for the Matrix service.
#[derive(Debug, Deserialize, Clone)]
pub struct MatrixConfig {
    pub username: String,
    pub password: String,
    pub homeserver: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>, // e.g. "ANTHROPIC_API_KEY"
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub cli_target_dir: Option<String>,
}

impl ProviderSettings {
    /// Inline key first, then the named environment variable. Empty values count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Some(key.clone());
        }
        self.api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct CliConfig {
    #[serde(default)]
    pub target_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PrefixEntry {
    pub prefix: String,
    pub provider: Provider,
    #[serde(default)]
    pub layer: Option<Layer>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    #[serde(default = "default_provider")]
    pub default_provider: Provider,
    #[serde(default = "default_layer")]
    pub default_layer: Layer,
    #[serde(default)]
    pub default_cli_provider: Option<Provider>,
    #[serde(default)]
    pub use_ai_intent_classification: bool,
    #[serde(default)]
    pub fallback_on_failure: bool,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default)]
    pub response_language: Option<String>,
    #[serde(default)]
    pub prefixes: Vec<PrefixEntry>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_layer: default_layer(),
            default_cli_provider: None,
            use_ai_intent_classification: false,
            fallback_on_failure: false,
            history_turns: default_history_turns(),
            response_language: None,
            prefixes: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_max_session_messages")]
    pub max_session_messages: usize,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_seconds: i64,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_session_messages: default_max_session_messages(),
            session_timeout_seconds: default_session_timeout(),
            storage_dir: default_storage_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    #[serde(default = "default_api_timeout")]
    pub api: u64,
    #[serde(default = "default_cli_timeout")]
    pub cli: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            api: default_api_timeout(),
            cli: default_cli_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn for_layer(&self, layer: Layer) -> std::time::Duration {
        let secs = match layer {
            Layer::Api => self.api,
            Layer::Cli => self.cli,
        };
        std::time::Duration::from_secs(secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

fn default_cache_size() -> usize {
    1000
}
fn default_provider() -> Provider {
    Provider::Claude
}
fn default_layer() -> Layer {
    Layer::Api
}
fn default_history_turns() -> usize {
    20
}
fn default_max_session_messages() -> usize {
    50
}
fn default_session_timeout() -> i64 {
    86400
}
fn default_storage_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_api_timeout() -> u64 {
    60
}
fn default_cli_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_file() -> String {
    "switchyard.log".to_string()
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(content).context("Failed to parse config.yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_size == 0 {
            bail!("cache_size must be greater than zero");
        }
        if self.session.max_session_messages == 0 {
            bail!("session.max_session_messages must be greater than zero");
        }
        if self.session.session_timeout_seconds <= 0 {
            bail!("session.session_timeout_seconds must be greater than zero");
        }
        if self.timeouts.api == 0 || self.timeouts.cli == 0 {
            bail!("timeouts must be greater than zero");
        }
        for entry in &self.routing.prefixes {
            if entry.prefix.trim().is_empty() {
                bail!("routing.prefixes contains an empty prefix");
            }
        }
        Ok(())
    }

    pub fn provider(&self, provider: Provider) -> ProviderSettings {
        self.providers.get(&provider).cloned().unwrap_or_default()
    }

    /// CLI working directory for a provider: its own setting, else the shared one.
    pub fn cli_target_dir(&self, provider: Provider) -> Option<String> {
        self.providers
            .get(&provider)
            .and_then(|p| p.cli_target_dir.clone())
            .or_else(|| self.cli.target_dir.clone())
            .filter(|d| !d.trim().is_empty())
    }

    /// Configuration keys that are satisfied, as `"<provider>.api_key"` and
    /// `"<provider>.cli_target_dir"`. Executors declare the keys they need against this set.
    pub fn config_keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        for provider in Provider::ALL {
            if self.provider(provider).resolve_api_key().is_some() {
                keys.insert(format!("{}.api_key", provider));
            }
            if self.cli_target_dir(provider).is_some() {
                keys.insert(format!("{}.cli_target_dir", provider));
            }
        }
        keys
    }

    /// Instruction prepended to prompts when a reply language is configured.
    pub fn language_instruction(&self) -> Option<String> {
        let code = self
            .routing
            .response_language
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())?;
        let name = match code {
            "zh-CN" => "中文（简体）",
            "zh-TW" => "中文（繁體）",
            "en-US" => "English",
            "en-GB" => "English (UK)",
            "ja-JP" => "日本語",
            "ko-KR" => "한국어",
            "fr-FR" => "Français",
            "de-DE" => "Deutsch",
            "es-ES" => "Español",
            "ru-RU" => "Русский",
            "pt-BR" => "Português (Brasil)",
            "it-IT" => "Italiano",
            other => other,
        };
        Some(format!("Please respond in {}.", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
services:
  matrix:
    username: bot
    password: secret
    homeserver: https://matrix.example.org
"#;

    #[test]
    fn test_defaults() {
        let config = AppConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.cache_size, 1000);
        assert_eq!(config.session.max_session_messages, 50);
        assert_eq!(config.session.session_timeout_seconds, 86400);
        assert_eq!(config.routing.default_provider, Provider::Claude);
        assert_eq!(config.routing.default_layer, Layer::Api);
        assert!(!config.routing.fallback_on_failure);
        assert_eq!(config.timeouts.for_layer(Layer::Cli).as_secs(), 600);
        assert!(config.config_keys().is_empty());
        assert!(config.language_instruction().is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = format!(
            "{}{}",
            MINIMAL,
            r#"
providers:
  claude:
    api_key: sk-test
    cli_target_dir: /srv/project
  gemini:
    api_key: ""
cli:
  target_dir: /srv/shared
routing:
  default_provider: gemini
  default_layer: cli
  response_language: zh-CN
  prefixes:
    - prefix: "@sonnet"
      provider: claude
      layer: api
"#
        );
        let config = AppConfig::parse(&yaml).unwrap();
        let keys = config.config_keys();
        assert!(keys.contains("claude.api_key"));
        assert!(!keys.contains("gemini.api_key"));
        assert!(keys.contains("gemini.cli_target_dir"));
        assert_eq!(
            config.cli_target_dir(Provider::Claude).as_deref(),
            Some("/srv/project")
        );
        assert_eq!(config.routing.prefixes.len(), 1);
        assert_eq!(
            config.language_instruction().as_deref(),
            Some("Please respond in 中文（简体）.")
        );
    }

    #[test]
    fn test_rejects_zero_cache() {
        let yaml = format!("{}cache_size: 0\n", MINIMAL);
        assert!(AppConfig::parse(&yaml).is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let yaml = format!("{}routing:\n  default_provider: mistral\n", MINIMAL);
        assert!(AppConfig::parse(&yaml).is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config = AppConfig::parse(include_str!("../../data/config.example.yaml")).unwrap();
        assert_eq!(config.routing.prefixes.len(), 2);
        assert_eq!(config.routing.prefixes[0].layer, None);
        assert_eq!(config.routing.prefixes[1].layer, Some(Layer::Cli));
        assert_eq!(config.cli_target_dir(Provider::Gemini).as_deref(), Some("~/projects/current"));
    }
}
