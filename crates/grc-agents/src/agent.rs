//! The agent contract

use async_trait::async_trait;
use grc_common::{AgentKind, CoreResult, Task, TaskResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::watch;

/// Lifecycle state of a registered agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Known to the registry, not started
    Registered,
    /// Running connectivity probes and capability registration
    Initializing,
    /// Ready for work
    Idle,
    /// At least one task in flight
    Running,
    /// Too many consecutive failures; needs admin reset
    Failed,
    /// Shut down
    Stopped,
}

/// Static configuration of one agent instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent id
    pub agent_id: String,
    /// Agent kind
    pub kind: AgentKind,
    /// Capability tags matched against task types
    pub capabilities: HashSet<String>,
    /// In-flight ceiling for this agent
    pub max_concurrent_tasks: usize,
    /// Scheduling weight among agents of the same kind
    pub priority: u8,
}

impl AgentConfig {
    /// Build a config with defaults
    pub fn new(agent_id: &str, kind: AgentKind) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            kind,
            capabilities: HashSet::new(),
            max_concurrent_tasks: 1,
            priority: 5,
        }
    }

    /// Add capability tags
    pub fn with_capabilities(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.capabilities = tags.into_iter().collect();
        self
    }

    /// Set the in-flight ceiling
    pub fn with_max_concurrent(mut self, max_concurrent_tasks: usize) -> Self {
        self.max_concurrent_tasks = max_concurrent_tasks.max(1);
        self
    }
}

/// Cooperative cancellation signal carried into task execution
///
/// Long operations observe the signal at poll points and stop cleanly;
/// the scheduler enforces hard deadlines externally.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            // A dropped handle means the run is being abandoned; treat it
            // as cancellation so waiters do not hang
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Scheduler-side handle that triggers cancellation
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a linked cancellation handle/signal pair
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// A logical actor consuming tasks and producing results
///
/// Implementations classify their own failures: errors are caught and
/// returned as `TaskResult { success: false, error_kind, .. }`, never
/// propagated as panics.
#[async_trait]
pub trait Agent: Send + Sync {
    /// This agent's static configuration
    fn config(&self) -> &AgentConfig;

    /// Probe dependencies and register capabilities
    async fn initialize(&self) -> CoreResult<()>;

    /// Execute one task, observing the cancellation signal at poll points
    async fn execute(&self, task: &Task, cancel: &CancelSignal) -> TaskResult;

    /// Release resources before the agent stops
    async fn shutdown(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_signal_observed() {
        let (handle, signal) = cancel_pair();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());
        // Resolves immediately once cancelled
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn test_dropped_handle_unblocks_waiters() {
        let (handle, signal) = cancel_pair();
        drop(handle);
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancelled_wakes_concurrent_waiter() {
        let (handle, signal) = cancel_pair();
        let waiter = tokio::spawn(async move { signal.cancelled().await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        handle.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(100), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
    }
}
