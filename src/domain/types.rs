//! # Domain Types
//!
//! Common data structures and enums used across the routing core: providers and layers,
//! inbound events, parsed commands, executor metadata and execution outcomes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::error::UnknownName;
use crate::domain::traits::Executor;

/// An AI backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Gemini,
    OpenAI,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Claude, Provider::Gemini, Provider::OpenAI];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Gemini => "gemini",
            Provider::OpenAI => "openai",
        }
    }
}

impl FromStr for Provider {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Provider::Claude),
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" | "gpt" => Ok(Provider::OpenAI),
            _ => Err(UnknownName {
                what: "provider",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution mode: a stateless network call or a local tool with its own session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Api,
    Cli,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Api => "api",
            Layer::Cli => "cli",
        }
    }

    pub fn other(&self) -> Layer {
        match self {
            Layer::Api => Layer::Cli,
            Layer::Cli => Layer::Api,
        }
    }
}

impl FromStr for Layer {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "api" => Ok(Layer::Api),
            "cli" => Ok(Layer::Cli),
            _ => Err(UnknownName {
                what: "layer",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message as delivered by the chat transport. Identity is `event_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub event_id: String,
    pub user_id: String,
    pub chat_id: String,
    pub is_group: bool,
    pub raw_text: String,
    pub quoted_text: Option<String>,
}

/// Result of prefix parsing. Unset provider/layer means "let the router decide".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub provider: Option<Provider>,
    pub layer: Option<Layer>,
    pub remaining_text: String,
}

impl ParsedCommand {
    pub fn unspecified(text: impl Into<String>) -> Self {
        Self {
            provider: None,
            layer: None,
            remaining_text: text.into(),
        }
    }

    pub fn is_explicit(&self) -> bool {
        self.provider.is_some() || self.layer.is_some()
    }
}

/// Session-control commands answered without touching an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    New,
    Info,
    History,
    Help,
}

/// Classified inbound text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Session(SessionCommand),
    Prompt(ParsedCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of context handed to an API-layer executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
}

impl HistoryEntry {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Static description of an executor, registered once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorMetadata {
    pub name: String,
    pub provider: Provider,
    pub layer: Layer,
    pub capabilities: BTreeSet<String>,
    pub command_prefixes: Vec<String>,
    /// Higher is preferred.
    pub priority: i32,
    pub required_config: BTreeSet<String>,
}

impl ExecutorMetadata {
    pub fn new(name: impl Into<String>, provider: Provider, layer: Layer, priority: i32) -> Self {
        Self {
            name: name.into(),
            provider,
            layer,
            capabilities: BTreeSet::new(),
            command_prefixes: Vec::new(),
            priority,
            required_config: BTreeSet::new(),
        }
    }

    pub fn with_capabilities(mut self, caps: &[&str]) -> Self {
        self.capabilities = caps.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.command_prefixes = prefixes.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn requires(mut self, key: impl Into<String>) -> Self {
        self.required_config.insert(key.into());
        self
    }
}

/// Shared reference to a registered executor.
pub type ExecutorHandle = Arc<dyn Executor>;

/// Input handed to an executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub prompt: String,
    /// Replayed conversation, API layer only.
    pub history: Option<Vec<HistoryEntry>>,
    /// Provider-native session id, CLI layer only.
    pub session_hint: Option<String>,
    pub params: BTreeMap<String, serde_json::Value>,
}

impl ExecutionRequest {
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            prompt: text.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_session_hint(mut self, id: impl Into<String>) -> Self {
        self.session_hint = Some(id.into());
        self
    }

    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn param_bool(&self, key: &str) -> bool {
        self.params
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Per-call failure classes reported by executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Timeout,
    AuthFailure,
    RateLimited,
    Unreachable,
    Malformed,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Timeout => "execution timed out",
            ErrorKind::AuthFailure => "authentication failed",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::Unreachable => "backend unreachable",
            ErrorKind::Malformed => "malformed response",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

/// Outcome of one executor call. Never retried against the same executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub text: String,
    pub error: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub provider_used: Provider,
    pub layer_used: Layer,
}

impl ExecutionResult {
    pub fn ok(provider: Provider, layer: Layer, text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
            error: None,
            error_message: None,
            provider_used: provider,
            layer_used: layer,
        }
    }

    pub fn failed(provider: Provider, layer: Layer, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            text: String::new(),
            error: Some(kind),
            error_message: Some(message.into()),
            provider_used: provider,
            layer_used: layer,
        }
    }

    /// Text to show the user: the answer, or the failure description.
    pub fn display_text(&self) -> String {
        if self.success {
            return self.text.clone();
        }
        match (&self.error_message, self.error) {
            (Some(msg), _) if !msg.is_empty() => msg.clone(),
            (_, Some(kind)) => kind.to_string(),
            _ => ErrorKind::Unknown.to_string(),
        }
    }
}

/// The router's choice for one inbound event.
#[derive(Clone)]
pub struct RouteDecision {
    pub provider: Provider,
    pub layer: Layer,
    pub executor: ExecutorHandle,
    pub degraded: bool,
    /// Candidates evaluated in order, ending with the selected one.
    pub attempted: Vec<(Provider, Layer)>,
    pub result: Option<ExecutionResult>,
}

impl fmt::Debug for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDecision")
            .field("provider", &self.provider)
            .field("layer", &self.layer)
            .field("degraded", &self.degraded)
            .field("attempted", &self.attempted)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}
