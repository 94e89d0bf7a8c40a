//! Audit summary reports

use crate::event::{AuditOutcome, AuditQuery};
use crate::log::AuditLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Aggregate statistics over one organization's audit window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// Organization the report covers
    pub organization_id: String,
    /// Window start
    pub from: DateTime<Utc>,
    /// Window end
    pub to: DateTime<Utc>,
    /// Events in the window
    pub total_events: u64,
    /// Event counts per category
    pub by_category: BTreeMap<String, u64>,
    /// Event counts per outcome
    pub by_outcome: BTreeMap<String, u64>,
    /// Share of failure/blocked/error outcomes
    pub failure_rate: f64,
    /// Events with risk score >= 80
    pub high_risk_count: u64,
    /// Distinct actors seen
    pub unique_actors: u64,
    /// Report creation time
    pub generated_at: DateTime<Utc>,
}

impl AuditLog {
    /// Summarise one organization's events within a time window
    pub fn generate_report(
        &self,
        organization_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AuditReport {
        let events = self.query(&AuditQuery {
            from: Some(from),
            to: Some(to),
            ..AuditQuery::for_org(organization_id)
        });

        let mut by_category: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_outcome: BTreeMap<String, u64> = BTreeMap::new();
        let mut actors: HashSet<&str> = HashSet::new();
        let mut failures = 0u64;
        let mut high_risk = 0u64;

        for event in &events {
            *by_category
                .entry(format!("{:?}", event.category).to_lowercase())
                .or_insert(0) += 1;
            *by_outcome
                .entry(format!("{:?}", event.outcome).to_lowercase())
                .or_insert(0) += 1;
            actors.insert(event.actor_id.as_str());
            if matches!(
                event.outcome,
                AuditOutcome::Failure | AuditOutcome::Blocked | AuditOutcome::Error
            ) {
                failures += 1;
            }
            if event.risk_score >= 80 {
                high_risk += 1;
            }
        }

        let total = events.len() as u64;
        AuditReport {
            organization_id: organization_id.to_string(),
            from,
            to,
            total_events: total,
            by_category,
            by_outcome,
            failure_rate: if total > 0 {
                failures as f64 / total as f64
            } else {
                0.0
            },
            high_risk_count: high_risk,
            unique_actors: actors.len() as u64,
            generated_at: Utc::now(),
        }
    }
}
