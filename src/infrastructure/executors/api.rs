//! API-layer executor: one hosted model behind the `llm` HTTP wrapper.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::config::ProviderSettings;
use crate::domain::traits::Executor;
use crate::domain::types::{ExecutionRequest, ExecutionResult, Layer, Provider};
use crate::infrastructure::llm::providers::{self, ProviderConfig};
use crate::infrastructure::llm::{Context, Message};

pub struct ApiExecutor {
    provider: Provider,
    settings: ProviderSettings,
}

impl ApiExecutor {
    pub fn new(provider: Provider, settings: ProviderSettings) -> Self {
        Self { provider, settings }
    }

    /// Maps a request onto a model context: replayed history, then the prompt.
    /// `max_tokens` and `temperature` params are honoured when present.
    pub fn build_context(request: &ExecutionRequest) -> Context {
        let mut context = Context::new();
        for entry in request.history.iter().flatten() {
            context = context.add_message(Message::from(entry));
        }
        context = context.add_user_message(request.prompt.clone());

        if let Some(tokens) = request.params.get("max_tokens").and_then(|v| v.as_u64()) {
            context = context.with_max_tokens(tokens.min(u32::MAX as u64) as u32);
        }
        if let Some(temp) = request.params.get("temperature").and_then(|v| v.as_f64()) {
            context = context.with_temperature(temp as f32);
        }
        context
    }
}

#[async_trait]
impl Executor for ApiExecutor {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let config = match ProviderConfig::from_settings(self.provider, &self.settings) {
            Ok(config) => config,
            Err(e) => return ExecutionResult::failed(self.provider, Layer::Api, e.kind, e.message),
        };

        let context = Self::build_context(&request);
        debug!(
            "Calling {} API with {} message(s)",
            self.provider,
            context.messages.len()
        );

        match providers::chat(self.provider, config, context).await {
            Ok(response) => ExecutionResult::ok(self.provider, Layer::Api, response.content),
            Err(e) => {
                warn!("{} API call failed: {}", self.provider, e);
                ExecutionResult::failed(self.provider, Layer::Api, e.kind, e.message)
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.settings.resolve_api_key().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ErrorKind, HistoryEntry, Role};
    use crate::infrastructure::llm::MessageRole;

    #[test]
    fn test_build_context() {
        let request = ExecutionRequest::prompt("and now?")
            .with_history(vec![
                HistoryEntry::new(Role::User, "hi"),
                HistoryEntry::new(Role::Assistant, "hello"),
            ])
            .with_param("max_tokens", serde_json::json!(200))
            .with_param("temperature", serde_json::json!(0.1));
        let context = ApiExecutor::build_context(&request);

        let roles: Vec<MessageRole> = context.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]
        );
        assert_eq!(context.messages[2].content, "and now?");
        assert_eq!(context.max_tokens, Some(200));
        assert!(context.temperature.is_some());
    }

    #[tokio::test]
    async fn test_missing_key_reports_auth_failure() {
        let executor = ApiExecutor::new(Provider::OpenAI, ProviderSettings::default());
        assert!(!executor.is_ready());

        let result = executor.execute(ExecutionRequest::prompt("hi")).await;
        assert!(!result.success);
        assert_eq!(result.error, Some(ErrorKind::AuthFailure));
        assert_eq!(result.layer_used, Layer::Api);
    }
}
