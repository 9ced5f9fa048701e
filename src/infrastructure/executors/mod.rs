//! # Executors
//!
//! Concrete backends bound to (provider, layer) pairs, and the startup routine that
//! registers them with their metadata.

pub mod api;
pub mod cli;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::application::registry::ExecutorRegistry;
use crate::domain::config::AppConfig;
use crate::domain::types::{ExecutorMetadata, Layer, Provider};
use crate::strings::logs;

pub use api::ApiExecutor;
pub use cli::CliExecutor;

const API_CAPABILITIES: &[&str] = &["general_qa", "text_generation", "analysis"];
const CLI_CAPABILITIES: &[&str] = &["code_analysis", "file_operations", "command_execution"];

/// Metadata for the built-in API executors.
pub fn api_metadata(provider: Provider) -> ExecutorMetadata {
    let (name, priority, prefixes): (&str, i32, &[&str]) = match provider {
        Provider::Claude => ("Claude API", 3, &["@claude", "@claude-api"]),
        Provider::Gemini => ("Gemini API", 2, &["@gemini", "@gemini-api"]),
        Provider::OpenAI => ("OpenAI API", 1, &["@openai", "@gpt"]),
    };
    ExecutorMetadata::new(name, provider, Layer::Api, priority)
        .with_capabilities(API_CAPABILITIES)
        .with_prefixes(prefixes)
        .requires(format!("{}.api_key", provider))
}

/// Metadata for the built-in CLI executors. OpenAI has none.
pub fn cli_metadata(provider: Provider) -> Option<ExecutorMetadata> {
    let (name, priority, prefixes): (&str, i32, &[&str]) = match provider {
        Provider::Claude => ("Claude Code CLI", 2, &["@claude-cli", "@code"]),
        Provider::Gemini => ("Gemini CLI", 1, &["@gemini-cli"]),
        Provider::OpenAI => return None,
    };
    Some(
        ExecutorMetadata::new(name, provider, Layer::Cli, priority)
            .with_capabilities(CLI_CAPABILITIES)
            .with_prefixes(prefixes)
            .requires(format!("{}.cli_target_dir", provider)),
    )
}

/// Registers every built-in executor. Pairs whose configuration is missing are kept but
/// marked unavailable, so degradation can report them.
pub fn build_registry(config: &AppConfig) -> Result<ExecutorRegistry> {
    let mut registry = ExecutorRegistry::new(config.config_keys());

    for provider in Provider::ALL {
        let executor = Arc::new(ApiExecutor::new(provider, config.provider(provider)));
        registry.register(provider, Layer::Api, executor, api_metadata(provider))?;
    }

    for provider in Provider::ALL {
        let Some(metadata) = cli_metadata(provider) else {
            continue;
        };
        let dir = config.cli_target_dir(provider).unwrap_or_default();
        let executor = Arc::new(CliExecutor::new(provider, &dir));
        registry.register(provider, Layer::Cli, executor, metadata)?;
    }

    let total = Provider::ALL
        .iter()
        .flat_map(|p| [(*p, Layer::Api), (*p, Layer::Cli)])
        .filter(|(p, l)| registry.metadata(*p, *l).is_some())
        .count();
    let available = Provider::ALL
        .iter()
        .flat_map(|p| [(*p, Layer::Api), (*p, Layer::Cli)])
        .filter(|(p, l)| registry.is_available(*p, *l))
        .count();
    info!("{}", logs::executors_registered(available, total));

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_registry_marks_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            r#"
services:
  matrix:
    username: bot
    password: pw
    homeserver: https://hs
providers:
  gemini:
    api_key: g-key
cli:
  target_dir: {}
"#,
            dir.path().display()
        );
        let config = AppConfig::parse(&yaml).unwrap();
        let registry = build_registry(&config).unwrap();

        assert!(registry.is_available(Provider::Gemini, Layer::Api));
        assert!(!registry.is_available(Provider::Claude, Layer::Api));
        assert!(!registry.is_available(Provider::OpenAI, Layer::Api));
        assert!(registry.is_available(Provider::Claude, Layer::Cli));
        assert!(registry.is_available(Provider::Gemini, Layer::Cli));
        assert!(registry.metadata(Provider::OpenAI, Layer::Cli).is_none());

        let cli: Vec<String> = registry
            .list_by_layer(Layer::Cli)
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(cli, vec!["Claude Code CLI", "Gemini CLI"]);
        assert!(
            registry
                .unavailable_reason(Provider::Claude, Layer::Api)
                .unwrap()
                .contains("claude.api_key")
        );
    }

    #[test]
    fn test_cli_missing_directory_unavailable() {
        let yaml = r#"
services:
  matrix:
    username: bot
    password: pw
    homeserver: https://hs
cli:
  target_dir: /definitely/not/here
"#;
        let config = AppConfig::parse(yaml).unwrap();
        let registry = build_registry(&config).unwrap();
        assert!(!registry.is_available(Provider::Claude, Layer::Cli));
        assert!(registry.unavailable_reason(Provider::Claude, Layer::Cli).is_some());
    }
}
