//! GRC Task Scheduler
//!
//! Bounded per-organization priority queues feed a single cooperative
//! dispatch loop. Execution runs on the tokio worker pool under per-agent
//! slots and a per-organization concurrency cap; timeouts count as
//! transient failures and transient failures retry with exponential
//! backoff.

#![warn(missing_docs)]

pub mod queue;
pub mod scheduler;

pub use queue::{QueueBank, TaskQueue};
pub use scheduler::{SchedulerMetrics, TaskScheduler, TaskSnapshot};
