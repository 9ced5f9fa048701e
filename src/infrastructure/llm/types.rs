//! Simple types for the HTTP model wrapper

use crate::domain::types::{ErrorKind, HistoryEntry, Provider, Role};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// A chat message
#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&HistoryEntry> for Message {
    fn from(entry: &HistoryEntry) -> Self {
        match entry.role {
            Role::User => Message::user(entry.text.clone()),
            Role::Assistant => Message::assistant(entry.text.clone()),
        }
    }
}

/// Context for a model request
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(text)],
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn add_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn add_user_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }
}

/// Response from a model
#[derive(Debug, Clone)]
pub struct Response {
    pub content: String,
    pub model: String,
}

/// Error type. `kind` feeds straight into `ExecutionResult`.
#[derive(Debug)]
pub struct Error {
    pub provider: Provider,
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(provider: Provider, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    /// Classifies a transport error from `reqwest`.
    pub fn transport(provider: Provider, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() || err.is_request() {
            ErrorKind::Unreachable
        } else if err.is_decode() {
            ErrorKind::Malformed
        } else {
            ErrorKind::Unknown
        };
        Self::new(provider, kind, format!("HTTP request failed: {}", err))
    }

    /// Classifies a non-success HTTP status.
    pub fn status(provider: Provider, status: u16, message: impl Into<String>) -> Self {
        Self::new(provider, kind_for_status(status), message)
    }
}

pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::AuthFailure,
        429 => ErrorKind::RateLimited,
        408 | 504 => ErrorKind::Timeout,
        502 | 503 => ErrorKind::Unreachable,
        _ => ErrorKind::Unknown,
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.provider, self.message)
    }
}

impl std::error::Error for Error {}
