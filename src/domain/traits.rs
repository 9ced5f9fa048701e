//! # Domain Traits
//!
//! Abstract interfaces for core system components (Chat, Executors).
//! Allows for pluggable implementations in the Infrastructure layer.

use async_trait::async_trait;

use crate::domain::types::{ExecutionRequest, ExecutionResult};

/// Abstract interface for a Chat Provider (e.g., Matrix, Console)
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a message to the room
    async fn send_message(&self, content: &str) -> Result<String, String>;

    /// Send a typing indicator
    async fn typing(&self, active: bool) -> Result<(), String>;

    /// Get the current room ID
    fn room_id(&self) -> String;
}

/// The callable unit bound to one (provider, layer) pair.
///
/// Implementations never panic or return early on backend failures; every outcome is
/// reported through `ExecutionResult` with an `ErrorKind`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult;

    /// Local readiness probe (binary present, target directory exists).
    /// Evaluated once when the executor is registered.
    fn is_ready(&self) -> bool {
        true
    }
}
