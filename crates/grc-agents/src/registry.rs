//! Agent registry
//!
//! Owns every agent handle and is the single writer of lifecycle state.
//! Health snapshots from here are the scheduler's routing input.

use crate::agent::{Agent, AgentState};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use grc_common::{AgentKind, AgentRef, CoreError, CoreResult};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Health snapshot of one agent
#[derive(Debug, Clone, Serialize)]
pub struct AgentHealth {
    /// Agent id
    pub agent_id: String,
    /// Agent kind
    pub kind: AgentKind,
    /// Lifecycle state
    pub state: AgentState,
    /// Tasks currently executing
    pub in_flight: usize,
    /// In-flight ceiling
    pub max_concurrent_tasks: usize,
    /// Seconds since the agent went Idle for the first time
    pub uptime_seconds: i64,
    /// Completed task count
    pub tasks_completed: u64,
    /// Failed task count
    pub tasks_failed: u64,
    /// Consecutive failures since the last success
    pub consecutive_failures: u32,
}

struct AgentHandle {
    agent: Arc<dyn Agent>,
    state: RwLock<AgentState>,
    in_flight: AtomicUsize,
    tasks_completed: AtomicUsize,
    tasks_failed: AtomicUsize,
    consecutive_failures: AtomicU32,
    started_at: RwLock<Option<DateTime<Utc>>>,
}

/// Registry of agent instances
pub struct AgentRegistry {
    agents: DashMap<String, AgentHandle>,
    failure_threshold: u32,
}

impl AgentRegistry {
    /// Create a registry; agents fail after `failure_threshold`
    /// consecutive task failures
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            agents: DashMap::new(),
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Register an agent instance
    pub fn register(&self, agent: Arc<dyn Agent>) -> CoreResult<()> {
        let agent_id = agent.config().agent_id.clone();
        if self.agents.contains_key(&agent_id) {
            return Err(CoreError::Permanent(format!(
                "agent {} already registered",
                agent_id
            )));
        }
        tracing::info!(agent_id = %agent_id, kind = ?agent.config().kind, "agent registered");
        self.agents.insert(
            agent_id,
            AgentHandle {
                agent,
                state: RwLock::new(AgentState::Registered),
                in_flight: AtomicUsize::new(0),
                tasks_completed: AtomicUsize::new(0),
                tasks_failed: AtomicUsize::new(0),
                consecutive_failures: AtomicU32::new(0),
                started_at: RwLock::new(None),
            },
        );
        Ok(())
    }

    /// Remove an agent from the registry
    pub fn deregister(&self, agent_id: &str) -> CoreResult<()> {
        self.agents
            .remove(agent_id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("agent {}", agent_id)))
    }

    /// Initialize an agent and bring it to `Idle`
    pub async fn start(&self, agent_id: &str) -> CoreResult<()> {
        let agent = {
            let handle = self.handle(agent_id)?;
            let mut state = handle.state.write();
            match *state {
                AgentState::Registered | AgentState::Failed | AgentState::Stopped => {
                    *state = AgentState::Initializing;
                }
                other => {
                    return Err(CoreError::Permanent(format!(
                        "agent {} cannot start from {:?}",
                        agent_id, other
                    )))
                }
            }
            handle.agent.clone()
        };

        match agent.initialize().await {
            Ok(()) => {
                let handle = self.handle(agent_id)?;
                *handle.state.write() = AgentState::Idle;
                *handle.started_at.write() = Some(Utc::now());
                handle.consecutive_failures.store(0, Ordering::Relaxed);
                tracing::info!(agent_id, "agent initialized");
                Ok(())
            }
            Err(err) => {
                let handle = self.handle(agent_id)?;
                *handle.state.write() = AgentState::Failed;
                tracing::warn!(agent_id, error = %err, "agent initialization failed");
                Err(err)
            }
        }
    }

    /// Shut an agent down
    pub async fn stop(&self, agent_id: &str) -> CoreResult<()> {
        let agent = {
            let handle = self.handle(agent_id)?;
            *handle.state.write() = AgentState::Stopped;
            handle.agent.clone()
        };
        agent.shutdown().await?;
        tracing::info!(agent_id, "agent stopped");
        Ok(())
    }

    /// Admin reset of a failed agent back through initialization
    pub async fn reset(&self, agent_id: &str) -> CoreResult<()> {
        {
            let handle = self.handle(agent_id)?;
            let state = *handle.state.read();
            if state != AgentState::Failed {
                return Err(CoreError::Permanent(format!(
                    "agent {} is {:?}, reset applies to failed agents",
                    agent_id, state
                )));
            }
        }
        self.start(agent_id).await
    }

    /// The executor for a given agent id
    pub fn executor(&self, agent_id: &str) -> CoreResult<Arc<dyn Agent>> {
        Ok(self.handle(agent_id)?.agent.clone())
    }

    /// Claim a task slot; the agent must be Idle/Running with capacity
    pub fn begin_task(&self, agent_id: &str) -> CoreResult<()> {
        let handle = self.handle(agent_id)?;
        let state = *handle.state.read();
        if !matches!(state, AgentState::Idle | AgentState::Running) {
            return Err(CoreError::Transient(format!(
                "agent {} not ready ({:?})",
                agent_id, state
            )));
        }
        let max = handle.agent.config().max_concurrent_tasks;
        let previous = handle.in_flight.fetch_add(1, Ordering::AcqRel);
        if previous >= max {
            handle.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(CoreError::Backpressure(format!(
                "agent {} at capacity",
                agent_id
            )));
        }
        *handle.state.write() = AgentState::Running;
        Ok(())
    }

    /// Release a task slot and record the outcome
    pub fn finish_task(&self, agent_id: &str, success: bool) {
        let Ok(handle) = self.handle(agent_id) else {
            return;
        };
        let remaining = handle.in_flight.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);

        if success {
            handle.tasks_completed.fetch_add(1, Ordering::Relaxed);
            handle.consecutive_failures.store(0, Ordering::Relaxed);
        } else {
            handle.tasks_failed.fetch_add(1, Ordering::Relaxed);
            let failures = handle.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
            if failures >= self.failure_threshold {
                *handle.state.write() = AgentState::Failed;
                tracing::warn!(agent_id, failures, "agent marked failed");
                return;
            }
        }

        let mut state = handle.state.write();
        if *state == AgentState::Running && remaining == 0 {
            *state = AgentState::Idle;
        }
    }

    /// Release a task slot for a cancelled task
    ///
    /// Cancellation is not an agent failure; counters stay untouched.
    pub fn finish_cancelled(&self, agent_id: &str) {
        let Ok(handle) = self.handle(agent_id) else {
            return;
        };
        let remaining = handle.in_flight.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        let mut state = handle.state.write();
        if *state == AgentState::Running && remaining == 0 {
            *state = AgentState::Idle;
        }
    }

    /// Health snapshot for one agent
    pub fn health(&self, agent_id: &str) -> CoreResult<AgentHealth> {
        let handle = self.handle(agent_id)?;
        let config = handle.agent.config();
        let health = AgentHealth {
            agent_id: config.agent_id.clone(),
            kind: config.kind,
            state: *handle.state.read(),
            in_flight: handle.in_flight.load(Ordering::Acquire),
            max_concurrent_tasks: config.max_concurrent_tasks,
            uptime_seconds: handle
                .started_at
                .read()
                .map(|at| (Utc::now() - at).num_seconds())
                .unwrap_or(0),
            tasks_completed: handle.tasks_completed.load(Ordering::Relaxed) as u64,
            tasks_failed: handle.tasks_failed.load(Ordering::Relaxed) as u64,
            consecutive_failures: handle.consecutive_failures.load(Ordering::Relaxed),
        };
        Ok(health)
    }

    /// Health snapshots, optionally filtered by kind
    pub fn list(&self, kind: Option<AgentKind>) -> Vec<AgentHealth> {
        self.agents
            .iter()
            .filter(|entry| kind.map(|k| entry.agent.config().kind == k).unwrap_or(true))
            .filter_map(|entry| self.health(entry.key()).ok())
            .collect()
    }

    /// Agent ids able to accept the given target right now
    pub fn available_for(&self, target_kind: AgentKind) -> Vec<AgentRef> {
        self.agents
            .iter()
            .filter(|entry| {
                let config = entry.agent.config();
                if config.kind != target_kind {
                    return false;
                }
                let state = *entry.state.read();
                matches!(state, AgentState::Idle | AgentState::Running)
                    && entry.in_flight.load(Ordering::Acquire) < config.max_concurrent_tasks
            })
            .map(|entry| AgentRef::new(entry.key(), entry.agent.config().kind))
            .collect()
    }

    fn handle(&self, agent_id: &str) -> CoreResult<dashmap::mapref::one::Ref<'_, String, AgentHandle>> {
        self.agents
            .get(agent_id)
            .ok_or_else(|| CoreError::NotFound(format!("agent {}", agent_id)))
    }
}
