//! Task vocabulary shared by the scheduler and agents

use crate::error::ErrorKind;
use crate::types::{clamp_priority, AgentKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Where a task should run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTarget {
    /// Any agent of this kind
    Kind(AgentKind),
    /// One specific agent instance
    Instance(String),
}

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Queued, not yet picked by the dispatch loop
    Pending,
    /// Claimed for an agent, about to start
    Scheduled,
    /// Executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully, no retries left or not retryable
    Failed,
    /// Cancelled before completion
    Cancelled,
    /// Failed transiently, waiting for its backoff delay
    Retrying,
}

/// A unit of agent work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id
    pub task_id: String,
    /// Owning organization
    pub organization_id: String,
    /// Task type routed on by agents
    pub task_type: String,
    /// Where to run
    pub agent_target: AgentTarget,
    /// 1..=10, higher dispatches first
    pub priority: u8,
    /// Task input
    pub payload: Value,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Hard wall-clock deadline
    pub deadline: Option<DateTime<Utc>>,
    /// Retries left after the current attempt
    pub retries_remaining: u32,
    /// Attempts made so far
    pub attempt: u32,
    /// Correlates the task's audit trail
    pub correlation_id: String,
    /// Submission time
    pub submitted_at: DateTime<Utc>,
    /// Current lifecycle state
    pub state: TaskState,
}

impl Task {
    /// Build a task for submission
    pub fn new(
        organization_id: &str,
        task_type: &str,
        agent_target: AgentTarget,
        payload: Value,
        priority: u8,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            task_type: task_type.to_string(),
            agent_target,
            priority: clamp_priority(priority),
            payload,
            timeout_ms: None,
            deadline: None,
            retries_remaining: 0,
            attempt: 0,
            correlation_id: Uuid::new_v4().to_string(),
            submitted_at: Utc::now(),
            state: TaskState::Pending,
        }
    }

    /// Set the per-attempt timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the hard deadline
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the retry budget
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries_remaining = retries;
        self
    }
}

/// Immutable outcome of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// The finished task
    pub task_id: String,
    /// Whether the task succeeded
    pub success: bool,
    /// Agent output
    pub output: Value,
    /// Failure classification when unsuccessful
    pub error_kind: Option<ErrorKind>,
    /// Failure message when unsuccessful
    pub error_msg: Option<String>,
    /// Wall-clock execution time in milliseconds
    pub processing_time_ms: u64,
    /// Evidence items produced during execution
    pub evidence_refs: Vec<String>,
}

impl TaskResult {
    /// A successful result
    pub fn ok(task_id: &str, output: Value) -> Self {
        Self {
            task_id: task_id.to_string(),
            success: true,
            output,
            error_kind: None,
            error_msg: None,
            processing_time_ms: 0,
            evidence_refs: Vec::new(),
        }
    }

    /// A failed result classified with an error kind
    pub fn fail(task_id: &str, kind: ErrorKind, message: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            success: false,
            output: Value::Null,
            error_kind: Some(kind),
            error_msg: Some(message.to_string()),
            processing_time_ms: 0,
            evidence_refs: Vec::new(),
        }
    }

    /// Attach produced evidence ids
    pub fn with_evidence(mut self, evidence_refs: Vec<String>) -> Self {
        self.evidence_refs = evidence_refs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_priority_clamped() {
        let task = Task::new(
            "org-1",
            "evidence_collection",
            AgentTarget::Kind(AgentKind::EvidenceCollector),
            json!({}),
            42,
        );
        assert_eq!(task.priority, 10);
        assert_eq!(task.state, TaskState::Pending);
    }

    #[test]
    fn test_result_constructors() {
        let ok = TaskResult::ok("t-1", json!({"count": 3}));
        assert!(ok.success);
        assert!(ok.error_kind.is_none());

        let fail = TaskResult::fail("t-1", ErrorKind::Transient, "connection reset");
        assert!(!fail.success);
        assert_eq!(fail.error_kind, Some(ErrorKind::Transient));
        assert!(fail.error_kind.unwrap().is_retryable());
    }
}
