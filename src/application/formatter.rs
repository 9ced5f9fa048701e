//! # Response Formatting
//!
//! Renders routing outcomes as the single reply sent back to the chat.

use crate::application::registry::ExecutorRegistry;
use crate::domain::types::RouteDecision;
use crate::strings::messages;

pub fn format_decision(registry: &ExecutorRegistry, decision: &RouteDecision) -> String {
    let used = registry.display_name(decision.provider, decision.layer);
    let mut out = String::new();

    if decision.degraded
        && let Some((provider, layer)) = decision.attempted.first()
    {
        let requested = registry.display_name(*provider, *layer);
        out.push_str(&messages::degraded_notice(&requested, &used));
        out.push_str("\n\n");
    }

    match &decision.result {
        Some(result) if result.success => {
            out.push_str(&messages::answered_by(&used, &result.text));
        }
        Some(result) => {
            out.push_str(&messages::answered_by(
                &used,
                &messages::execution_failed(&result.display_text()),
            ));
        }
        None => out.push_str(&messages::routed_to(&used)),
    }
    out
}

pub fn format_error(error: &str) -> String {
    messages::execution_failed(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{StaticExecutor, meta};
    use crate::domain::types::{ErrorKind, ExecutionResult, Layer, Provider};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn registry() -> ExecutorRegistry {
        let mut registry = ExecutorRegistry::new(BTreeSet::new());
        let mut m = meta(Provider::Gemini, Layer::Api, 1);
        m.name = "Gemini API".into();
        registry
            .register(
                Provider::Gemini,
                Layer::Api,
                Arc::new(StaticExecutor::ok(Provider::Gemini, Layer::Api, "")),
                m,
            )
            .unwrap();
        registry
    }

    fn decision(result: ExecutionResult, degraded: bool) -> RouteDecision {
        RouteDecision {
            provider: Provider::Gemini,
            layer: Layer::Api,
            executor: Arc::new(StaticExecutor::ok(Provider::Gemini, Layer::Api, "")),
            degraded,
            attempted: vec![(Provider::Claude, Layer::Cli), (Provider::Gemini, Layer::Api)],
            result: Some(result),
        }
    }

    #[test]
    fn test_success_reply() {
        let registry = registry();
        let d = decision(ExecutionResult::ok(Provider::Gemini, Layer::Api, "42"), false);
        assert_eq!(format_decision(&registry, &d), "**[Gemini API]**\n\n42");
    }

    #[test]
    fn test_degraded_failure_reply() {
        let registry = registry();
        let d = decision(
            ExecutionResult::failed(Provider::Gemini, Layer::Api, ErrorKind::AuthFailure, ""),
            true,
        );
        let reply = format_decision(&registry, &d);
        assert!(reply.starts_with("ℹ️ claude-cli is unavailable, answered by Gemini API."));
        assert!(reply.contains("❌ **Error**: authentication failed"));
    }
}
