//! The dispatch loop and execution engine

use crate::queue::QueueBank;
use chrono::Utc;
use dashmap::DashMap;
use grc_agents::{cancel_pair, AgentRegistry, CancelHandle};
use grc_audit::{ActorKind, AuditEvent, AuditLog, AuditOutcome, EventCategory};
use grc_common::{
    AgentTarget, AtomicCounter, CoreConfig, CoreResult, ErrorKind, Task, TaskResult, TaskState,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};

/// Externally visible state of a task
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    /// Task id
    pub task_id: String,
    /// Owning organization
    pub organization_id: String,
    /// Task type
    pub task_type: String,
    /// Lifecycle state
    pub state: TaskState,
    /// Priority 1..=10
    pub priority: u8,
    /// Attempts made
    pub attempt: u32,
    /// Retries left
    pub retries_remaining: u32,
    /// Correlation id shared with audit events
    pub correlation_id: String,
    /// Final result once terminal
    pub result: Option<TaskResult>,
}

struct RunningTask {
    cancel: CancelHandle,
    agent_id: String,
}

/// Scheduler counters
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerMetrics {
    /// Tasks accepted by submit
    pub submitted: u64,
    /// Tasks finished successfully
    pub completed: u64,
    /// Tasks finished in failure
    pub failed: u64,
    /// Tasks cancelled
    pub cancelled: u64,
    /// Retry attempts scheduled
    pub retried: u64,
    /// Tasks currently queued
    pub queued: usize,
    /// Tasks currently executing
    pub running: usize,
}

/// Priority scheduler driving agents through tasks
pub struct TaskScheduler {
    registry: Arc<AgentRegistry>,
    audit: Arc<AuditLog>,
    queues: QueueBank,
    org_permits: DashMap<String, Arc<Semaphore>>,
    running: DashMap<String, RunningTask>,
    snapshots: DashMap<String, TaskSnapshot>,
    results: DashMap<String, (TaskResult, Instant)>,
    retry_queue: Mutex<Vec<(Instant, Task)>>,
    default_timeout: Duration,
    retry_base: Duration,
    retry_max_delay: Duration,
    global_cap: usize,
    result_retention: Duration,
    dispatch_interval: Duration,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    submitted: AtomicCounter,
    completed: AtomicCounter,
    failed: AtomicCounter,
    cancelled: AtomicCounter,
    retried: AtomicCounter,
}

impl TaskScheduler {
    /// Wire a scheduler from injected collaborators
    pub fn new(registry: Arc<AgentRegistry>, audit: Arc<AuditLog>, config: &CoreConfig) -> Self {
        Self {
            registry,
            audit,
            queues: QueueBank::new(config.task_queue_capacity),
            org_permits: DashMap::new(),
            running: DashMap::new(),
            snapshots: DashMap::new(),
            results: DashMap::new(),
            retry_queue: Mutex::new(Vec::new()),
            default_timeout: Duration::from_secs(config.default_task_timeout_seconds),
            retry_base: Duration::from_secs(config.retry_base_delay_seconds),
            retry_max_delay: Duration::from_secs(config.retry_max_delay_seconds),
            global_cap: config.global_concurrency_cap.max(1),
            result_retention: Duration::from_secs(config.result_retention_seconds),
            dispatch_interval: Duration::from_millis(20),
            shutdown: Mutex::new(None),
            submitted: AtomicCounter::new(0),
            completed: AtomicCounter::new(0),
            failed: AtomicCounter::new(0),
            cancelled: AtomicCounter::new(0),
            retried: AtomicCounter::new(0),
        }
    }

    /// Submit a task for dispatch
    pub fn submit(&self, mut task: Task) -> CoreResult<String> {
        task.state = TaskState::Pending;
        let task_id = task.task_id.clone();

        self.queues.for_org(&task.organization_id).push(task.clone())?;
        self.snapshots.insert(task_id.clone(), snapshot_of(&task, None));
        self.submitted.inc();

        self.audit.append(
            AuditEvent::new(
                EventCategory::AgentActivity,
                "task.submitted",
                AuditOutcome::Success,
                "scheduler",
                ActorKind::System,
                &task.organization_id,
                "submit",
            )
            .with_resource(&task_id)
            .with_correlation(&task.correlation_id)
            .with_details(json!({
                "task_type": task.task_type,
                "priority": task.priority,
                "retries": task.retries_remaining,
            })),
        );

        tracing::debug!(task_id = %task_id, priority = task.priority, "task submitted");
        Ok(task_id)
    }

    /// Snapshot of a task's state and result
    pub fn get_task(&self, task_id: &str) -> Option<TaskSnapshot> {
        let mut snapshot = self.snapshots.get(task_id)?.clone();
        if let Some(result) = self.results.get(task_id) {
            snapshot.result = Some(result.0.clone());
        }
        Some(snapshot)
    }

    /// Cancel a queued or running task; returns whether anything happened
    pub fn cancel_task(&self, task_id: &str) -> bool {
        // Running: signal the execution context, it settles as Cancelled
        if let Some(running) = self.running.get(task_id) {
            running.cancel.cancel();
            tracing::info!(task_id, "cancellation requested");
            return true;
        }
        // Queued: remove before it ever starts
        let Some(snapshot) = self.snapshots.get(task_id).map(|s| s.clone()) else {
            return false;
        };
        if let Some(task) = self.queues.for_org(&snapshot.organization_id).remove(task_id) {
            self.settle_cancelled(&task, None);
            return true;
        }
        // Awaiting a retry backoff
        let waiting = {
            let mut retry_queue = self.retry_queue.lock();
            let mut removed = None;
            retry_queue.retain(|(_, task)| {
                if task.task_id == task_id {
                    removed = Some(task.clone());
                    false
                } else {
                    true
                }
            });
            removed
        };
        if let Some(task) = waiting {
            self.settle_cancelled(&task, None);
            return true;
        }
        false
    }

    /// Start the dispatch loop
    pub fn start(self: &Arc<Self>) {
        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock() = Some(tx);
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.dispatch_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => scheduler.dispatch_tick(),
                    _ = rx.changed() => break,
                }
            }
            tracing::info!("scheduler dispatch loop stopped");
        });
    }

    /// Stop the dispatch loop; running tasks settle on their own
    pub fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(true);
        }
    }

    /// One cooperative tick: requeue due retries, dispatch, prune results
    pub fn dispatch_tick(self: &Arc<Self>) {
        self.requeue_due_retries();
        for organization_id in self.queues.organizations() {
            self.dispatch_org(&organization_id);
        }
        self.prune_results();
    }

    /// Scheduler counters
    pub fn metrics(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            submitted: self.submitted.get(),
            completed: self.completed.get(),
            failed: self.failed.get(),
            cancelled: self.cancelled.get(),
            retried: self.retried.get(),
            queued: self.queues.total_len(),
            running: self.running.len(),
        }
    }

    fn requeue_due_retries(&self) {
        let now = Instant::now();
        let due: Vec<Task> = {
            let mut retry_queue = self.retry_queue.lock();
            let mut due = Vec::new();
            retry_queue.retain(|(when, task)| {
                if *when <= now {
                    due.push(task.clone());
                    false
                } else {
                    true
                }
            });
            due
        };
        for mut task in due {
            task.state = TaskState::Pending;
            self.update_snapshot(&task, None);
            self.queues.for_org(&task.organization_id).requeue(task);
        }
    }

    fn dispatch_org(self: &Arc<Self>, organization_id: &str) {
        let queue = self.queues.for_org(organization_id);
        loop {
            let Some(task) = queue.pop_where(|task| self.target_available(task)) else {
                break;
            };

            let semaphore = self
                .org_permits
                .entry(organization_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.global_cap)))
                .clone();
            let Ok(permit) = semaphore.try_acquire_owned() else {
                queue.requeue(task);
                break;
            };

            let agent_id = match &task.agent_target {
                AgentTarget::Instance(agent_id) => agent_id.clone(),
                AgentTarget::Kind(kind) => {
                    match self.registry.available_for(*kind).first() {
                        Some(agent) => agent.agent_id.clone(),
                        None => {
                            queue.requeue(task);
                            break;
                        }
                    }
                }
            };

            // A race with another dispatch decision can still lose the
            // slot; put the task back and try again next tick
            if self.registry.begin_task(&agent_id).is_err() {
                queue.requeue(task);
                break;
            }

            self.spawn_execution(task, agent_id, permit);
        }
    }

    fn target_available(&self, task: &Task) -> bool {
        match &task.agent_target {
            AgentTarget::Kind(kind) => !self.registry.available_for(*kind).is_empty(),
            AgentTarget::Instance(agent_id) => self
                .registry
                .health(agent_id)
                .map(|health| {
                    matches!(
                        health.state,
                        grc_agents::AgentState::Idle | grc_agents::AgentState::Running
                    ) && health.in_flight < health.max_concurrent_tasks
                })
                .unwrap_or(false),
        }
    }

    fn spawn_execution(
        self: &Arc<Self>,
        mut task: Task,
        agent_id: String,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        task.state = TaskState::Scheduled;
        self.update_snapshot(&task, None);

        let (handle, signal) = cancel_pair();
        self.running.insert(
            task.task_id.clone(),
            RunningTask {
                cancel: handle,
                agent_id: agent_id.clone(),
            },
        );

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            task.state = TaskState::Running;
            task.attempt += 1;
            scheduler.update_snapshot(&task, None);

            let started = Instant::now();
            let outcome = scheduler.run_attempt(&task, &agent_id, &signal).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            scheduler.running.remove(&task.task_id);
            scheduler.settle(task, &agent_id, outcome, elapsed_ms);
        });
    }

    async fn run_attempt(
        &self,
        task: &Task,
        agent_id: &str,
        signal: &grc_agents::CancelSignal,
    ) -> AttemptOutcome {
        let executor = match self.registry.executor(agent_id) {
            Ok(executor) => executor,
            Err(err) => {
                return AttemptOutcome::Finished(TaskResult::fail(
                    &task.task_id,
                    ErrorKind::Transient,
                    &err.to_string(),
                ))
            }
        };

        // Attempt budget: per-attempt timeout, clipped by the hard
        // deadline when one is closer
        let mut budget = task
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        if let Some(deadline) = task.deadline {
            let until_deadline = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            budget = budget.min(until_deadline);
        }

        let cancel_watch = signal.clone();
        tokio::select! {
            result = executor.execute(task, signal) => AttemptOutcome::Finished(result),
            _ = tokio::time::sleep(budget) => AttemptOutcome::TimedOut,
            _ = cancel_watch.cancelled() => AttemptOutcome::Cancelled,
        }
    }

    fn settle(
        self: &Arc<Self>,
        mut task: Task,
        agent_id: &str,
        outcome: AttemptOutcome,
        elapsed_ms: u64,
    ) {
        match outcome {
            AttemptOutcome::Cancelled => {
                self.registry.finish_cancelled(agent_id);
                self.settle_cancelled(&task, Some(elapsed_ms));
            }
            AttemptOutcome::TimedOut => {
                self.registry.finish_task(agent_id, false);
                let result = TaskResult {
                    processing_time_ms: elapsed_ms,
                    ..TaskResult::fail(&task.task_id, ErrorKind::Timeout, "attempt deadline exceeded")
                };
                self.settle_failure(task, result);
            }
            AttemptOutcome::Finished(mut result) => {
                result.processing_time_ms = elapsed_ms;
                self.registry.finish_task(agent_id, result.success);
                if result.success {
                    task.state = TaskState::Completed;
                    self.update_snapshot(&task, None);
                    self.audit_attempt(&task, "task.completed_success", AuditOutcome::Success);
                    self.results
                        .insert(task.task_id.clone(), (result, Instant::now()));
                    self.completed.inc();
                } else {
                    self.settle_failure(task, result);
                }
            }
        }
    }

    fn settle_failure(self: &Arc<Self>, mut task: Task, result: TaskResult) {
        let kind = result.error_kind.unwrap_or(ErrorKind::Permanent);
        let event_type = match kind {
            ErrorKind::Timeout => "task.completed_timeout",
            _ => "task.completed_error",
        };
        self.audit_attempt(&task, event_type, AuditOutcome::Failure);

        if kind.is_retryable() && task.retries_remaining > 0 {
            task.retries_remaining -= 1;
            task.state = TaskState::Retrying;
            self.update_snapshot(&task, None);
            self.retried.inc();

            // base × 2^(attempt-1), capped
            let exponent = task.attempt.saturating_sub(1).min(16);
            let delay = self
                .retry_base
                .saturating_mul(1u32 << exponent)
                .min(self.retry_max_delay);
            tracing::debug!(
                task_id = %task.task_id,
                attempt = task.attempt,
                delay_ms = delay.as_millis() as u64,
                "task scheduled for retry"
            );
            self.retry_queue.lock().push((Instant::now() + delay, task));
        } else {
            task.state = TaskState::Failed;
            self.update_snapshot(&task, None);
            self.results
                .insert(task.task_id.clone(), (result, Instant::now()));
            self.failed.inc();
            tracing::warn!(task_id = %task.task_id, kind = ?kind, "task failed");
        }
    }

    fn settle_cancelled(&self, task: &Task, elapsed_ms: Option<u64>) {
        let mut task = task.clone();
        task.state = TaskState::Cancelled;
        self.update_snapshot(&task, None);
        let result = TaskResult {
            task_id: task.task_id.clone(),
            success: false,
            output: serde_json::Value::Null,
            error_kind: None,
            error_msg: Some("cancelled".into()),
            processing_time_ms: elapsed_ms.unwrap_or(0),
            evidence_refs: Vec::new(),
        };
        self.results
            .insert(task.task_id.clone(), (result, Instant::now()));
        self.cancelled.inc();
        self.audit_attempt(&task, "task.completed_cancelled", AuditOutcome::Partial);
    }

    fn audit_attempt(&self, task: &Task, event_type: &str, outcome: AuditOutcome) {
        self.audit.append(
            AuditEvent::new(
                EventCategory::AgentActivity,
                event_type,
                outcome,
                "scheduler",
                ActorKind::System,
                &task.organization_id,
                "execute",
            )
            .with_resource(&task.task_id)
            .with_correlation(&task.correlation_id)
            .with_details(json!({
                "attempt": task.attempt,
                "retries_remaining": task.retries_remaining,
            })),
        );
    }

    fn update_snapshot(&self, task: &Task, result: Option<TaskResult>) {
        self.snapshots
            .insert(task.task_id.clone(), snapshot_of(task, result));
    }

    // Terminal tasks leave the scheduler entirely once their result
    // retention window passes
    fn prune_results(&self) {
        let retention = self.result_retention;
        let mut expired = Vec::new();
        self.results.retain(|task_id, (_, stored_at)| {
            if stored_at.elapsed() < retention {
                true
            } else {
                expired.push(task_id.clone());
                false
            }
        });
        for task_id in expired {
            self.snapshots.remove(&task_id);
        }
    }
}

enum AttemptOutcome {
    Finished(TaskResult),
    TimedOut,
    Cancelled,
}

fn snapshot_of(task: &Task, result: Option<TaskResult>) -> TaskSnapshot {
    TaskSnapshot {
        task_id: task.task_id.clone(),
        organization_id: task.organization_id.clone(),
        task_type: task.task_type.clone(),
        state: task.state,
        priority: task.priority,
        attempt: task.attempt,
        retries_remaining: task.retries_remaining,
        correlation_id: task.correlation_id.clone(),
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use grc_agents::{Agent, AgentConfig, CancelSignal};
    use grc_common::{AgentKind, CoreResult};
    use grc_integrity::Sealer;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingAgent {
        config: AgentConfig,
        delay_ms: Vec<u64>,
        calls: AtomicU32,
        started_order: Mutex<Vec<String>>,
    }

    impl RecordingAgent {
        fn new(id: &str, max_concurrent: usize, delay_ms: Vec<u64>) -> Arc<Self> {
            Arc::new(Self {
                config: AgentConfig::new(id, AgentKind::EvidenceCollector)
                    .with_max_concurrent(max_concurrent),
                delay_ms,
                calls: AtomicU32::new(0),
                started_order: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Agent for RecordingAgent {
        fn config(&self) -> &AgentConfig {
            &self.config
        }

        async fn initialize(&self) -> CoreResult<()> {
            Ok(())
        }

        async fn execute(&self, task: &Task, cancel: &CancelSignal) -> TaskResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.started_order.lock().push(task.task_id.clone());
            let delay = self.delay_ms.get(call).copied().unwrap_or(1);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                _ = cancel.cancelled() => {
                    return TaskResult::fail(&task.task_id, ErrorKind::Transient, "observed cancel");
                }
            }
            TaskResult::ok(&task.task_id, json!({"attempt_delay_ms": delay}))
        }
    }

    fn test_config() -> CoreConfig {
        CoreConfig {
            retry_base_delay_seconds: 0,
            default_task_timeout_seconds: 5,
            ..CoreConfig::default()
        }
    }

    async fn build(agent: Arc<dyn Agent>) -> (Arc<TaskScheduler>, Arc<AgentRegistry>, Arc<AuditLog>) {
        let registry = Arc::new(AgentRegistry::new(5));
        let agent_id = agent.config().agent_id.clone();
        registry.register(agent).unwrap();
        registry.start(&agent_id).await.unwrap();

        let audit = Arc::new(AuditLog::new(Arc::new(Sealer::new(b"k")), 2555));
        let scheduler = Arc::new(TaskScheduler::new(registry.clone(), audit.clone(), &test_config()));
        (scheduler, registry, audit)
    }

    fn collector_task(org: &str, priority: u8) -> Task {
        Task::new(
            org,
            "collect",
            AgentTarget::Kind(AgentKind::EvidenceCollector),
            json!({}),
            priority,
        )
    }

    async fn wait_for_state(
        scheduler: &TaskScheduler,
        task_id: &str,
        state: TaskState,
    ) -> TaskSnapshot {
        for _ in 0..500 {
            if let Some(snapshot) = scheduler.get_task(task_id) {
                if snapshot.state == state {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "task {} never reached {:?}, last: {:?}",
            task_id,
            state,
            scheduler.get_task(task_id)
        );
    }

    #[tokio::test]
    async fn test_submit_and_complete() {
        let agent = RecordingAgent::new("a1", 1, vec![1]);
        let (scheduler, _, _) = build(agent).await;
        scheduler.start();

        let task_id = scheduler.submit(collector_task("org-1", 5)).unwrap();
        let snapshot = wait_for_state(&scheduler, &task_id, TaskState::Completed).await;
        assert!(snapshot.result.unwrap().success);
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_priority_preemption_within_agent() {
        let agent = RecordingAgent::new("g", 1, vec![30, 30]);
        let (scheduler, _, _) = build(agent.clone()).await;

        // Submit both before any tick so they contend for the same slot
        let low = scheduler.submit(collector_task("org-1", 3)).unwrap();
        let high = scheduler.submit(collector_task("org-1", 9)).unwrap();
        scheduler.start();

        wait_for_state(&scheduler, &high, TaskState::Completed).await;
        wait_for_state(&scheduler, &low, TaskState::Completed).await;

        let order = agent.started_order.lock().clone();
        assert_eq!(order, vec![high, low]);
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_timeout_then_retry_succeeds() {
        // First two attempts block past the timeout, third is quick
        let agent = RecordingAgent::new("a1", 1, vec![300, 300, 10]);
        let (scheduler, _, audit) = build(agent).await;
        scheduler.start();

        let task = collector_task("org-1", 5)
            .with_timeout_ms(100)
            .with_retries(2);
        let correlation_id = task.correlation_id.clone();
        let task_id = scheduler.submit(task).unwrap();

        let snapshot = wait_for_state(&scheduler, &task_id, TaskState::Completed).await;
        assert_eq!(snapshot.attempt, 3);
        assert!(snapshot.result.unwrap().success);

        // Two timeout attempts and one success, same correlation id
        let events = audit.query(&grc_audit::AuditQuery::for_org("org-1"));
        let attempts: Vec<_> = events
            .iter()
            .filter(|e| e.event_type.starts_with("task.completed"))
            .collect();
        assert_eq!(attempts.len(), 3);
        assert!(attempts
            .iter()
            .all(|e| e.correlation_id.as_deref() == Some(correlation_id.as_str())));
        assert_eq!(
            attempts
                .iter()
                .filter(|e| e.event_type == "task.completed_timeout")
                .count(),
            2
        );
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_retries_exhausted_fails() {
        let agent = RecordingAgent::new("a1", 1, vec![300, 300, 300]);
        let (scheduler, _, _) = build(agent).await;
        scheduler.start();

        let task = collector_task("org-1", 5)
            .with_timeout_ms(50)
            .with_retries(1);
        let task_id = scheduler.submit(task).unwrap();

        let snapshot = wait_for_state(&scheduler, &task_id, TaskState::Failed).await;
        assert_eq!(snapshot.attempt, 2);
        let result = snapshot.result.unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_cancel_queued_task() {
        let agent = RecordingAgent::new("a1", 1, vec![1]);
        let (scheduler, _, _) = build(agent).await;
        // No dispatch loop running: task stays queued

        let task_id = scheduler.submit(collector_task("org-1", 5)).unwrap();
        assert!(scheduler.cancel_task(&task_id));
        assert_eq!(
            scheduler.get_task(&task_id).unwrap().state,
            TaskState::Cancelled
        );
    }

    #[tokio::test]
    async fn test_cancel_running_task() {
        let agent = RecordingAgent::new("a1", 1, vec![10_000]);
        let (scheduler, registry, _) = build(agent).await;
        scheduler.start();

        let task_id = scheduler.submit(collector_task("org-1", 5)).unwrap();
        wait_for_state(&scheduler, &task_id, TaskState::Running).await;

        assert!(scheduler.cancel_task(&task_id));
        wait_for_state(&scheduler, &task_id, TaskState::Cancelled).await;
        // Slot released, agent back to idle
        for _ in 0..100 {
            if registry.health("a1").unwrap().in_flight == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(registry.health("a1").unwrap().in_flight, 0);
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_concurrency_cap_respected() {
        let agent = RecordingAgent::new("a1", 2, vec![50, 50, 50, 50]);
        let (scheduler, registry, _) = build(agent).await;
        scheduler.start();

        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(scheduler.submit(collector_task("org-1", 5)).unwrap());
        }

        // While tasks run, in-flight never exceeds the cap
        let mut max_in_flight = 0;
        for _ in 0..100 {
            max_in_flight = max_in_flight.max(registry.health("a1").unwrap().in_flight);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(max_in_flight <= 2, "in_flight peaked at {}", max_in_flight);

        for id in &ids {
            wait_for_state(&scheduler, id, TaskState::Completed).await;
        }
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_no_agent_leaves_task_queued() {
        let registry = Arc::new(AgentRegistry::new(5));
        let audit = Arc::new(AuditLog::new(Arc::new(Sealer::new(b"k")), 2555));
        let scheduler = Arc::new(TaskScheduler::new(registry, audit, &test_config()));
        scheduler.start();

        let task_id = scheduler.submit(collector_task("org-1", 5)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            scheduler.get_task(&task_id).unwrap().state,
            TaskState::Pending
        );
        assert_eq!(scheduler.metrics().queued, 1);
        scheduler.stop();
    }
}
