//! # Model Providers
//!
//! Request/response mapping for each hosted API:
//! - Anthropic (Claude) messages API
//! - Gemini generateContent
//! - OpenAI-compatible chat completions

mod anthropic;
mod gemini;
mod openai;

use crate::domain::config::ProviderSettings;
use crate::domain::types::{ErrorKind, Provider};
use crate::infrastructure::llm::{Context, Error, Response};
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;

/// Configuration for a provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key
    pub api_key: String,
    /// Base URL (for non-default endpoints)
    pub base_url: Option<String>,
    /// Default model
    pub default_model: String,
}

impl ProviderConfig {
    pub fn from_settings(provider: Provider, settings: &ProviderSettings) -> Result<Self, Error> {
        let api_key = settings.resolve_api_key().ok_or_else(|| {
            Error::new(
                provider,
                ErrorKind::AuthFailure,
                "No API key provided - set api_key or api_key_env",
            )
        })?;

        Ok(Self {
            api_key,
            base_url: settings.endpoint.clone().filter(|e| !e.trim().is_empty()),
            default_model: settings.model.clone().unwrap_or_default(),
        })
    }

    fn model_or(&self, context: &Context, fallback: &str) -> String {
        context.model.clone().unwrap_or_else(|| {
            if self.default_model.is_empty() {
                fallback.to_string()
            } else {
                self.default_model.clone()
            }
        })
    }
}

/// HTTP client reused across requests. Per-call deadlines are enforced by the router.
fn http_client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new())
    })
}

/// Pulls `error.message` out of a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Execute a chat request with the specified provider
pub async fn chat(
    provider: Provider,
    config: ProviderConfig,
    context: Context,
) -> Result<Response, Error> {
    match provider {
        Provider::Claude => anthropic::chat(config, context).await,
        Provider::Gemini => gemini::chat(config, context).await,
        Provider::OpenAI => openai::chat(config, context).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings_requires_key() {
        let settings = ProviderSettings::default();
        let err = ProviderConfig::from_settings(Provider::Gemini, &settings).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthFailure);

        let settings = ProviderSettings {
            api_key: Some("k".into()),
            model: Some("m-1".into()),
            endpoint: Some("  ".into()),
            ..Default::default()
        };
        let config = ProviderConfig::from_settings(Provider::Gemini, &settings).unwrap();
        assert_eq!(config.api_key, "k");
        assert_eq!(config.base_url, None);
        assert_eq!(config.model_or(&Context::new(), "x"), "m-1");
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"error":{"type":"x","message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(error_message("gateway down\n"), "gateway down");
    }
}
