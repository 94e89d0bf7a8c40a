//! GRC Audit Log
//!
//! Append-only structured events, integrity-hashed at write time and
//! sharded per organization. Writes within a shard are serialised; total
//! order is per-shard only. Registered monitors observe every write but
//! cannot mutate the log.

#![warn(missing_docs)]

pub mod event;
pub mod log;
pub mod monitor;
pub mod report;
pub mod sanitize;

pub use event::{ActorKind, AuditEvent, AuditLevel, AuditOutcome, AuditQuery, EventCategory};
pub use log::AuditLog;
pub use monitor::{AuditMonitor, FailedAuthMonitor, HighRiskMonitor};
pub use report::AuditReport;
