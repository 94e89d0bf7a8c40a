//! Bounded priority queues, one per organization
//!
//! Higher priority pops first; equal priorities pop in submission order.
//! The submission path is the only writer, the dispatch loop the only
//! consumer; a full queue rejects with `Backpressure`.

use dashmap::DashMap;
use grc_common::{CoreError, CoreResult, Task};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

struct QueuedTask {
    priority: u8,
    seq: u64,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins, then earlier submission
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// One organization's pending tasks
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<QueuedTask>>,
    capacity: usize,
    seq: AtomicU64,
}

impl TaskQueue {
    /// Create a queue bounded to `capacity` tasks
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            capacity: capacity.max(1),
            seq: AtomicU64::new(0),
        }
    }

    /// Enqueue a task; rejects with `Backpressure` when full
    pub fn push(&self, task: Task) -> CoreResult<()> {
        let mut heap = self.heap.lock();
        if heap.len() >= self.capacity {
            return Err(CoreError::Backpressure(format!(
                "task queue full ({} tasks)",
                heap.len()
            )));
        }
        heap.push(QueuedTask {
            priority: task.priority,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            task,
        });
        Ok(())
    }

    /// Return a popped task to the queue, bypassing the capacity bound
    ///
    /// Used by the dispatch loop when a pop could not be placed; the task
    /// was already admitted once, so it must not be dropped.
    pub(crate) fn requeue(&self, task: Task) {
        self.heap.lock().push(QueuedTask {
            priority: task.priority,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            task,
        });
    }

    /// Pop the best task satisfying `accept`, skipping those that do not
    ///
    /// Skipped tasks keep their submission order.
    pub fn pop_where(&self, accept: impl Fn(&Task) -> bool) -> Option<Task> {
        let mut heap = self.heap.lock();
        let mut skipped = Vec::new();
        let mut found = None;
        while let Some(candidate) = heap.pop() {
            if accept(&candidate.task) {
                found = Some(candidate.task);
                break;
            }
            skipped.push(candidate);
        }
        for entry in skipped {
            heap.push(entry);
        }
        found
    }

    /// Remove a task by id; returns it if it was queued
    pub fn remove(&self, task_id: &str) -> Option<Task> {
        self.pop_where(|task| task.task_id == task_id)
    }

    /// Queued task count
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}

/// Per-organization queue registry
pub struct QueueBank {
    queues: DashMap<String, Arc<TaskQueue>>,
    capacity: usize,
}

impl QueueBank {
    /// Create a bank; each organization's queue is bounded to `capacity`
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
        }
    }

    /// Queue for an organization, created on first use
    pub fn for_org(&self, organization_id: &str) -> Arc<TaskQueue> {
        self.queues
            .entry(organization_id.to_string())
            .or_insert_with(|| Arc::new(TaskQueue::new(self.capacity)))
            .clone()
    }

    /// All organizations with queues
    pub fn organizations(&self) -> Vec<String> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Total queued tasks across organizations
    pub fn total_len(&self) -> usize {
        self.queues.iter().map(|entry| entry.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grc_common::{AgentKind, AgentTarget};
    use serde_json::json;

    fn task(org: &str, priority: u8) -> Task {
        Task::new(
            org,
            "scan",
            AgentTarget::Kind(AgentKind::SecurityScanner),
            json!({}),
            priority,
        )
    }

    #[test]
    fn test_priority_order() {
        let queue = TaskQueue::new(10);
        queue.push(task("org", 3)).unwrap();
        queue.push(task("org", 9)).unwrap();
        queue.push(task("org", 5)).unwrap();

        let priorities: Vec<u8> = std::iter::from_fn(|| queue.pop_where(|_| true))
            .map(|t| t.priority)
            .collect();
        assert_eq!(priorities, vec![9, 5, 3]);
    }

    #[test]
    fn test_fifo_within_priority() {
        let queue = TaskQueue::new(10);
        let first = task("org", 5);
        let second = task("org", 5);
        let first_id = first.task_id.clone();
        queue.push(first).unwrap();
        queue.push(second).unwrap();

        assert_eq!(queue.pop_where(|_| true).unwrap().task_id, first_id);
    }

    #[test]
    fn test_backpressure_on_full() {
        let queue = TaskQueue::new(2);
        queue.push(task("org", 1)).unwrap();
        queue.push(task("org", 1)).unwrap();
        assert!(matches!(
            queue.push(task("org", 1)),
            Err(CoreError::Backpressure(_))
        ));
    }

    #[test]
    fn test_pop_where_preserves_skipped() {
        let queue = TaskQueue::new(10);
        queue.push(task("org", 9)).unwrap();
        let wanted = task("org", 1);
        let wanted_id = wanted.task_id.clone();
        queue.push(wanted).unwrap();

        let popped = queue.pop_where(|t| t.priority == 1).unwrap();
        assert_eq!(popped.task_id, wanted_id);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_where(|_| true).unwrap().priority, 9);
    }

    #[test]
    fn test_remove_by_id() {
        let queue = TaskQueue::new(10);
        let target = task("org", 5);
        let target_id = target.task_id.clone();
        queue.push(task("org", 5)).unwrap();
        queue.push(target).unwrap();

        assert!(queue.remove(&target_id).is_some());
        assert!(queue.remove(&target_id).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_bank_isolates_orgs() {
        let bank = QueueBank::new(10);
        bank.for_org("org-a").push(task("org-a", 5)).unwrap();
        bank.for_org("org-b").push(task("org-b", 5)).unwrap();
        assert_eq!(bank.for_org("org-a").len(), 1);
        assert_eq!(bank.total_len(), 2);
        assert_eq!(bank.organizations().len(), 2);
    }
}
