//! # Errors
//!
//! Routing and registry failures. Per-call executor outcomes are not errors here; they travel
//! as `ErrorKind` inside `ExecutionResult`.

use thiserror::Error;

use crate::domain::types::{Layer, Provider};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("executor already registered for {provider}/{layer}")]
    DuplicateRegistration { provider: Provider, layer: Layer },

    #[error("no executor registered for {provider}/{layer}")]
    NotRegistered { provider: Provider, layer: Layer },
}

/// Missing configuration for an executor. Recorded, never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{executor} is missing required configuration: {}", missing.join(", "))]
pub struct ConfigurationError {
    pub executor: String,
    pub missing: Vec<String>,
}

/// An unrecognised provider or layer name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {what} '{value}'")]
pub struct UnknownName {
    pub what: &'static str,
    pub value: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("no executor available (tried {})", format_attempted(attempted))]
    NoExecutorAvailable { attempted: Vec<(Provider, Layer)> },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn format_attempted(attempted: &[(Provider, Layer)]) -> String {
    if attempted.is_empty() {
        return "nothing".to_string();
    }
    attempted
        .iter()
        .map(|(p, l)| format!("{}-{}", p, l))
        .collect::<Vec<_>>()
        .join(", ")
}
