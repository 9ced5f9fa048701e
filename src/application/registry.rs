//! # Executor Registry
//!
//! Maps each (provider, layer) pair to at most one executor and its metadata.
//! Availability is computed once at registration: every `required_config` key must be
//! satisfied and the executor's own readiness probe must pass. The registry is built at
//! startup and shared read-only afterwards.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::domain::error::{ConfigurationError, RegistryError};
use crate::domain::types::{ExecutorHandle, ExecutorMetadata, Layer, Provider};

struct Entry {
    metadata: ExecutorMetadata,
    handle: ExecutorHandle,
    unavailable: Option<String>,
}

pub struct ExecutorRegistry {
    satisfied: BTreeSet<String>,
    /// Registration order.
    entries: Vec<Entry>,
}

impl ExecutorRegistry {
    /// `satisfied` holds the configuration keys present at startup.
    pub fn new(satisfied: BTreeSet<String>) -> Self {
        Self {
            satisfied,
            entries: Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        provider: Provider,
        layer: Layer,
        handle: ExecutorHandle,
        mut metadata: ExecutorMetadata,
    ) -> Result<(), RegistryError> {
        if self.find(provider, layer).is_some() {
            return Err(RegistryError::DuplicateRegistration { provider, layer });
        }
        metadata.provider = provider;
        metadata.layer = layer;

        let missing: Vec<String> = metadata
            .required_config
            .iter()
            .filter(|key| !self.satisfied.contains(*key))
            .cloned()
            .collect();

        let unavailable = if !missing.is_empty() {
            let err = ConfigurationError {
                executor: metadata.name.clone(),
                missing,
            };
            warn!("Executor {}/{} unavailable: {}", provider, layer, err);
            Some(err.to_string())
        } else if !handle.is_ready() {
            warn!(
                "Executor {}/{} unavailable: readiness check failed",
                provider, layer
            );
            Some(format!("{} is not ready", metadata.name))
        } else {
            info!(
                "Registered executor {}/{} ({}, priority {})",
                provider, layer, metadata.name, metadata.priority
            );
            None
        };

        self.entries.push(Entry {
            metadata,
            handle,
            unavailable,
        });
        Ok(())
    }

    pub fn resolve(&self, provider: Provider, layer: Layer) -> Result<ExecutorHandle, RegistryError> {
        self.find(provider, layer)
            .map(|e| e.handle.clone())
            .ok_or(RegistryError::NotRegistered { provider, layer })
    }

    pub fn is_available(&self, provider: Provider, layer: Layer) -> bool {
        self.find(provider, layer)
            .is_some_and(|e| e.unavailable.is_none())
    }

    pub fn unavailable_reason(&self, provider: Provider, layer: Layer) -> Option<String> {
        match self.find(provider, layer) {
            Some(entry) => entry.unavailable.clone(),
            None => Some(RegistryError::NotRegistered { provider, layer }.to_string()),
        }
    }

    pub fn metadata(&self, provider: Provider, layer: Layer) -> Option<&ExecutorMetadata> {
        self.find(provider, layer).map(|e| &e.metadata)
    }

    /// Registered executors of `layer`, highest priority first, ties in registration order.
    pub fn list_by_layer(&self, layer: Layer) -> Vec<ExecutorMetadata> {
        let mut list: Vec<ExecutorMetadata> = self
            .entries
            .iter()
            .filter(|e| e.metadata.layer == layer)
            .map(|e| e.metadata.clone())
            .collect();
        list.sort_by(|a, b| b.priority.cmp(&a.priority));
        list
    }

    /// Display name for a pair, falling back to `provider-layer`.
    pub fn display_name(&self, provider: Provider, layer: Layer) -> String {
        self.metadata(provider, layer)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| format!("{}-{}", provider, layer))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, provider: Provider, layer: Layer) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.metadata.provider == provider && e.metadata.layer == layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{StaticExecutor, meta};
    use std::sync::Arc;

    fn handle(provider: Provider, layer: Layer) -> ExecutorHandle {
        Arc::new(StaticExecutor::ok(provider, layer, "ok"))
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ExecutorRegistry::new(BTreeSet::new());
        registry
            .register(
                Provider::Claude,
                Layer::Api,
                handle(Provider::Claude, Layer::Api),
                meta(Provider::Claude, Layer::Api, 1),
            )
            .unwrap();
        let err = registry
            .register(
                Provider::Claude,
                Layer::Api,
                handle(Provider::Claude, Layer::Api),
                meta(Provider::Claude, Layer::Api, 5),
            )
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateRegistration {
                provider: Provider::Claude,
                layer: Layer::Api
            }
        );
        assert_eq!(registry.list_by_layer(Layer::Api).len(), 1);
    }

    #[test]
    fn test_resolve_not_registered() {
        let registry = ExecutorRegistry::new(BTreeSet::new());
        assert!(matches!(
            registry.resolve(Provider::Gemini, Layer::Cli),
            Err(RegistryError::NotRegistered { .. })
        ));
        assert!(!registry.is_available(Provider::Gemini, Layer::Cli));
    }

    #[test]
    fn test_missing_config_marks_unavailable() {
        let satisfied: BTreeSet<String> = ["claude.api_key".to_string()].into();
        let mut registry = ExecutorRegistry::new(satisfied);
        registry
            .register(
                Provider::Claude,
                Layer::Api,
                handle(Provider::Claude, Layer::Api),
                meta(Provider::Claude, Layer::Api, 3).requires("claude.api_key"),
            )
            .unwrap();
        registry
            .register(
                Provider::OpenAI,
                Layer::Api,
                handle(Provider::OpenAI, Layer::Api),
                meta(Provider::OpenAI, Layer::Api, 1).requires("openai.api_key"),
            )
            .unwrap();

        assert!(registry.is_available(Provider::Claude, Layer::Api));
        assert!(!registry.is_available(Provider::OpenAI, Layer::Api));
        // Still resolvable, just not available.
        assert!(registry.resolve(Provider::OpenAI, Layer::Api).is_ok());
        assert!(
            registry
                .unavailable_reason(Provider::OpenAI, Layer::Api)
                .unwrap()
                .contains("openai.api_key")
        );
    }

    #[test]
    fn test_readiness_checked_once() {
        let mut registry = ExecutorRegistry::new(BTreeSet::new());
        let executor = Arc::new(StaticExecutor::ok(Provider::Gemini, Layer::Cli, "ok").not_ready());
        registry
            .register(
                Provider::Gemini,
                Layer::Cli,
                executor,
                meta(Provider::Gemini, Layer::Cli, 1),
            )
            .unwrap();
        assert!(!registry.is_available(Provider::Gemini, Layer::Cli));
    }

    #[test]
    fn test_list_by_layer_ordering() {
        let mut registry = ExecutorRegistry::new(BTreeSet::new());
        for (provider, priority) in [
            (Provider::OpenAI, 1),
            (Provider::Gemini, 2),
            (Provider::Claude, 2),
        ] {
            registry
                .register(
                    provider,
                    Layer::Api,
                    handle(provider, Layer::Api),
                    meta(provider, Layer::Api, priority),
                )
                .unwrap();
        }
        registry
            .register(
                Provider::Claude,
                Layer::Cli,
                handle(Provider::Claude, Layer::Cli),
                meta(Provider::Claude, Layer::Cli, 9),
            )
            .unwrap();

        let order: Vec<Provider> = registry
            .list_by_layer(Layer::Api)
            .into_iter()
            .map(|m| m.provider)
            .collect();
        // Equal priority keeps registration order.
        assert_eq!(order, vec![Provider::Gemini, Provider::Claude, Provider::OpenAI]);
        assert_eq!(registry.list_by_layer(Layer::Cli).len(), 1);
    }
}
