//! # Smart Router
//!
//! Picks the (provider, layer) executor for an inbound prompt and runs it.
//!
//! The primary candidate comes from an explicit `@prefix`, or from the intent classifier
//! plus the configured default provider for the chosen layer. When the primary candidate is
//! unavailable the router walks a fixed degradation sequence:
//! 1. same provider, other layer;
//! 2. other providers, same layer, by descending priority;
//! 3. other providers, other layer, by descending priority.
//!
//! Selection only consults registry availability. A failed call is reported as is, unless
//! `fallback_on_failure` is enabled, in which case the next available candidate of the same
//! sequence is tried.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::application::intent::IntentClassifier;
use crate::application::parsing::CommandParser;
use crate::application::registry::ExecutorRegistry;
use crate::application::session::SessionManager;
use crate::domain::config::{AppConfig, TimeoutConfig};
use crate::domain::error::RouterError;
use crate::domain::types::{
    ErrorKind, ExecutionRequest, ExecutionResult, InboundEvent, Layer, ParsedCommand, Provider,
    RouteDecision,
};
use crate::strings::{logs, prompts};

/// Request param telling a CLI executor that `session_hint` is a newly minted id.
pub const PARAM_FRESH_SESSION: &str = "fresh_session";

#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    pub default_provider: Provider,
    pub default_layer: Layer,
    pub default_cli_provider: Option<Provider>,
    pub fallback_on_failure: bool,
    pub history_turns: usize,
    pub language_instruction: Option<String>,
}

impl RoutingPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_provider: config.routing.default_provider,
            default_layer: config.routing.default_layer,
            default_cli_provider: config.routing.default_cli_provider,
            fallback_on_failure: config.routing.fallback_on_failure,
            history_turns: config.routing.history_turns,
            language_instruction: config.language_instruction(),
        }
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            default_provider: Provider::Claude,
            default_layer: Layer::Api,
            default_cli_provider: None,
            fallback_on_failure: false,
            history_turns: 20,
            language_instruction: None,
        }
    }
}

pub struct SmartRouter {
    registry: Arc<ExecutorRegistry>,
    sessions: Arc<SessionManager>,
    parser: CommandParser,
    classifier: IntentClassifier,
    policy: RoutingPolicy,
    timeouts: TimeoutConfig,
}

impl SmartRouter {
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        sessions: Arc<SessionManager>,
        parser: CommandParser,
        classifier: IntentClassifier,
        policy: RoutingPolicy,
        timeouts: TimeoutConfig,
    ) -> Self {
        info!(
            "SmartRouter initialized: default={}/{}, cli default={}, ai intent={}, fallback on failure={}",
            policy.default_provider,
            policy.default_layer,
            policy
                .default_cli_provider
                .map(|p| p.to_string())
                .unwrap_or_else(|| "auto-detect".to_string()),
            classifier.uses_ai(),
            policy.fallback_on_failure
        );
        Self {
            registry,
            sessions,
            parser,
            classifier,
            policy,
            timeouts,
        }
    }

    /// Wires parser, classifier and policy from configuration. The AI classifier uses the
    /// highest-priority available API executor; without one it falls back to keywords.
    pub fn from_config(
        config: &AppConfig,
        registry: Arc<ExecutorRegistry>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        let classifier = if config.routing.use_ai_intent_classification {
            let delegate = registry
                .list_by_layer(Layer::Api)
                .into_iter()
                .find(|m| registry.is_available(m.provider, m.layer))
                .and_then(|m| registry.resolve(m.provider, m.layer).ok());
            match delegate {
                Some(handle) => IntentClassifier::ai(
                    handle,
                    config.timeouts.for_layer(Layer::Api),
                    config.cache_size,
                ),
                None => {
                    warn!("[ROUTING] No API executor for intent classification, using keywords");
                    IntentClassifier::keywords()
                }
            }
        } else {
            IntentClassifier::keywords()
        };

        Self::new(
            registry,
            sessions,
            CommandParser::new(&config.routing.prefixes),
            classifier,
            RoutingPolicy::from_config(config),
            config.timeouts.clone(),
        )
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Candidates for `primary` in degradation order, starting with `primary` itself.
    /// Other providers are taken from the registry, highest priority first.
    pub fn degradation_sequence(
        registry: &ExecutorRegistry,
        primary: (Provider, Layer),
    ) -> Vec<(Provider, Layer)> {
        let (provider, layer) = primary;
        let other = layer.other();
        let mut sequence = vec![primary, (provider, other)];
        for step_layer in [layer, other] {
            for meta in registry.list_by_layer(step_layer) {
                let candidate = (meta.provider, meta.layer);
                if meta.provider != provider && !sequence.contains(&candidate) {
                    sequence.push(candidate);
                }
            }
        }
        sequence
    }

    /// Default provider for a layer. For the CLI layer: the configured CLI default, else
    /// the highest-priority available CLI executor, else the general default.
    pub fn default_provider_for(&self, layer: Layer) -> Provider {
        match layer {
            Layer::Api => self.policy.default_provider,
            Layer::Cli => self.policy.default_cli_provider.unwrap_or_else(|| {
                self.registry
                    .list_by_layer(Layer::Cli)
                    .into_iter()
                    .find(|m| self.registry.is_available(m.provider, m.layer))
                    .map(|m| {
                        debug!("[ROUTING] Auto-detected CLI provider {}", m.provider);
                        m.provider
                    })
                    .unwrap_or(self.policy.default_provider)
            }),
        }
    }

    /// Resolves the primary candidate for `parsed`. A prefix naming only a provider still
    /// runs the classifier for the layer.
    pub async fn primary_candidate(&self, parsed: &ParsedCommand) -> (Provider, Layer) {
        let layer = match parsed.layer {
            Some(layer) => layer,
            None => match self.classifier.classify(&parsed.remaining_text).await {
                Layer::Cli => Layer::Cli,
                Layer::Api => self.policy.default_layer,
            },
        };
        let provider = parsed
            .provider
            .unwrap_or_else(|| self.default_provider_for(layer));
        (provider, layer)
    }

    /// Chooses an executor without invoking it.
    pub async fn decide(&self, parsed: &ParsedCommand) -> Result<RouteDecision, RouterError> {
        let primary = self.primary_candidate(parsed).await;
        if parsed.is_explicit() {
            info!("[ROUTING] Explicit prefix → {}/{}", primary.0, primary.1);
        } else {
            info!("[ROUTING] Intent → {}/{}", primary.0, primary.1);
        }
        self.select(primary)
    }

    /// First available candidate of the degradation sequence for `primary`.
    pub fn select(&self, primary: (Provider, Layer)) -> Result<RouteDecision, RouterError> {
        let sequence = Self::degradation_sequence(&self.registry, primary);
        let mut attempted = Vec::with_capacity(sequence.len());
        for candidate in sequence {
            attempted.push(candidate);
            let (provider, layer) = candidate;
            if !self.registry.is_available(provider, layer) {
                debug!(
                    "[ROUTING] {}/{} unavailable: {}",
                    provider,
                    layer,
                    self.registry
                        .unavailable_reason(provider, layer)
                        .unwrap_or_default()
                );
                continue;
            }
            let executor = self.registry.resolve(provider, layer)?;
            let degraded = candidate != primary;
            if degraded {
                warn!(
                    "{}",
                    logs::route_degraded(primary.0, primary.1, provider, layer)
                );
            } else {
                info!("[ROUTING] Using {}/{}", provider, layer);
            }
            return Ok(RouteDecision {
                provider,
                layer,
                executor,
                degraded,
                attempted,
                result: None,
            });
        }
        warn!("[ROUTING] No executor available for {}/{}", primary.0, primary.1);
        Err(RouterError::NoExecutorAvailable { attempted })
    }

    /// Routes one prompt event: decide, gather context, execute, record the exchange.
    pub async fn route(&self, event: &InboundEvent) -> Result<RouteDecision, RouterError> {
        let parsed = self.parser.parse(&event.raw_text);
        let mut decision = self.decide(&parsed).await?;
        let primary = decision
            .attempted
            .first()
            .copied()
            .unwrap_or((decision.provider, decision.layer));

        let prompt = match event.quoted_text.as_deref().filter(|q| !q.trim().is_empty()) {
            Some(quoted) => prompts::with_quote(quoted, &parsed.remaining_text),
            None => parsed.remaining_text.clone(),
        };

        let mut result = self.invoke(&decision, &event.user_id, &prompt).await;

        if !result.success && self.policy.fallback_on_failure {
            let sequence = Self::degradation_sequence(&self.registry, primary);
            let start = sequence
                .iter()
                .position(|c| *c == (decision.provider, decision.layer))
                .map_or(sequence.len(), |i| i + 1);
            for candidate in sequence.into_iter().skip(start) {
                decision.attempted.push(candidate);
                let (provider, layer) = candidate;
                if !self.registry.is_available(provider, layer) {
                    continue;
                }
                warn!(
                    "[ROUTING] {}/{} failed ({}), trying {}/{}",
                    decision.provider,
                    decision.layer,
                    result.display_text(),
                    provider,
                    layer
                );
                decision.provider = provider;
                decision.layer = layer;
                decision.executor = self.registry.resolve(provider, layer)?;
                decision.degraded = true;
                result = self.invoke(&decision, &event.user_id, &prompt).await;
                if result.success {
                    break;
                }
            }
        }

        result.provider_used = decision.provider;
        result.layer_used = decision.layer;

        if result.success
            && let Err(e) = self
                .sessions
                .record_exchange(&event.user_id, &prompt, &result.text)
                .await
        {
            warn!("Failed to record exchange for {}: {:#}", event.user_id, e);
        }

        decision.result = Some(result);
        Ok(decision)
    }

    /// Gathers layer-specific context and runs the executor under the layer timeout.
    /// Expiry stops waiting and yields a `Timeout` result.
    async fn invoke(&self, decision: &RouteDecision, user_id: &str, prompt: &str) -> ExecutionResult {
        let text = match &self.policy.language_instruction {
            Some(instruction) => format!("{}\n\n{}", instruction, prompt),
            None => prompt.to_string(),
        };
        let mut request = ExecutionRequest::prompt(text);
        let mut minted: Option<String> = None;

        match decision.layer {
            Layer::Api => {
                let history = match self.sessions.get_or_create(user_id).await {
                    Ok(session) => SessionManager::format_history(&session, self.policy.history_turns),
                    Err(e) => {
                        warn!("Session unavailable for {}: {:#}", user_id, e);
                        Vec::new()
                    }
                };
                request = request.with_history(history);
            }
            Layer::Cli => {
                match self
                    .sessions
                    .get_native_session(user_id, decision.provider)
                    .await
                {
                    Some(id) => request = request.with_session_hint(id),
                    None => {
                        let id = uuid::Uuid::new_v4().to_string();
                        request = request
                            .with_session_hint(id.clone())
                            .with_param(PARAM_FRESH_SESSION, serde_json::Value::Bool(true));
                        minted = Some(id);
                    }
                }
            }
        }

        let timeout = self.timeouts.for_layer(decision.layer);
        let result = match tokio::time::timeout(timeout, decision.executor.execute(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "[ROUTING] {}/{} timed out after {}s",
                    decision.provider,
                    decision.layer,
                    timeout.as_secs()
                );
                ExecutionResult::failed(
                    decision.provider,
                    decision.layer,
                    ErrorKind::Timeout,
                    format!("no reply within {}s", timeout.as_secs()),
                )
            }
        };

        if result.success
            && let Some(id) = minted
            && let Err(e) = self
                .sessions
                .set_native_session(user_id, decision.provider, &id)
                .await
        {
            warn!("Failed to store native session for {}: {:#}", user_id, e);
        }
        result
    }
}
