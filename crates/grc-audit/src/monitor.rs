//! Real-time monitor fan-out
//!
//! Monitors observe every append. They keep their own state and must not
//! write back into the log from `on_event` (re-entrancy would deadlock the
//! shard).

use crate::event::{AuditEvent, AuditOutcome, EventCategory};
use dashmap::DashMap;
use grc_common::AtomicCounter;
use parking_lot::RwLock;

/// Observer notified on every audit append
pub trait AuditMonitor: Send + Sync {
    /// Monitor name for registration logs
    fn name(&self) -> &str;
    /// Called after an event is appended
    fn on_event(&self, event: &AuditEvent);
}

/// Counts failed authentications per actor and raises an alert past a
/// threshold
pub struct FailedAuthMonitor {
    threshold: u64,
    counts: DashMap<String, u64>,
    alerts: RwLock<Vec<String>>,
}

impl FailedAuthMonitor {
    /// Alert once an actor accumulates `threshold` failures
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            counts: DashMap::new(),
            alerts: RwLock::new(Vec::new()),
        }
    }

    /// Current failure count for an actor
    pub fn failures(&self, actor_id: &str) -> u64 {
        self.counts.get(actor_id).map(|c| *c).unwrap_or(0)
    }

    /// Actors that crossed the threshold
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.read().clone()
    }
}

impl AuditMonitor for FailedAuthMonitor {
    fn name(&self) -> &str {
        "failed-auth"
    }

    fn on_event(&self, event: &AuditEvent) {
        if event.category != EventCategory::Authentication {
            return;
        }
        if !matches!(event.outcome, AuditOutcome::Failure | AuditOutcome::Blocked) {
            return;
        }
        let mut count = self.counts.entry(event.actor_id.clone()).or_insert(0);
        *count += 1;
        if *count == self.threshold {
            tracing::warn!(
                actor = %event.actor_id,
                failures = *count,
                "repeated authentication failures"
            );
            self.alerts.write().push(event.actor_id.clone());
        }
    }
}

/// Tracks high-risk events for alerting dashboards
pub struct HighRiskMonitor {
    min_risk_score: u8,
    seen: AtomicCounter,
    recent: RwLock<Vec<String>>,
}

impl HighRiskMonitor {
    /// Track events with `risk_score >= min_risk_score`
    pub fn new(min_risk_score: u8) -> Self {
        Self {
            min_risk_score,
            seen: AtomicCounter::new(0),
            recent: RwLock::new(Vec::new()),
        }
    }

    /// Number of high-risk events observed
    pub fn count(&self) -> u64 {
        self.seen.get()
    }

    /// Ids of recent high-risk events (bounded)
    pub fn recent(&self) -> Vec<String> {
        self.recent.read().clone()
    }
}

impl AuditMonitor for HighRiskMonitor {
    fn name(&self) -> &str {
        "high-risk"
    }

    fn on_event(&self, event: &AuditEvent) {
        if event.risk_score < self.min_risk_score {
            return;
        }
        self.seen.inc();
        let mut recent = self.recent.write();
        recent.push(event.event_id.clone());
        if recent.len() > 100 {
            recent.remove(0);
        }
        tracing::warn!(
            event_id = %event.event_id,
            risk_score = event.risk_score,
            event_type = %event.event_type,
            "high-risk audit event"
        );
    }
}
