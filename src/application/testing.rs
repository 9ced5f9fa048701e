//! Test doubles shared by the application tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::traits::Executor;
use crate::domain::types::{
    ErrorKind, ExecutionRequest, ExecutionResult, ExecutorMetadata, Layer, Provider,
};

/// Executor returning a scripted result and recording every request.
pub struct StaticExecutor {
    result: ExecutionResult,
    ready: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl StaticExecutor {
    pub fn ok(provider: Provider, layer: Layer, text: &str) -> Self {
        Self::with_result(ExecutionResult::ok(provider, layer, text))
    }

    pub fn failing(provider: Provider, layer: Layer, kind: ErrorKind) -> Self {
        Self::with_result(ExecutionResult::failed(provider, layer, kind, kind.to_string()))
    }

    pub fn with_result(result: ExecutionResult) -> Self {
        Self {
            result,
            ready: true,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ExecutionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for StaticExecutor {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

pub fn meta(provider: Provider, layer: Layer, priority: i32) -> ExecutorMetadata {
    ExecutorMetadata::new(format!("{}-{}", provider, layer), provider, layer, priority)
}
