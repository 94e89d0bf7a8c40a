//! Audit event shape and query filter

use chrono::{DateTime, Utc};
use grc_common::Framework;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Event severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    /// Routine activity
    Info,
    /// Unusual but handled
    Warning,
    /// Operation failed
    Error,
    /// Security-relevant failure
    Critical,
}

/// Functional category of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Login, token issuance
    Authentication,
    /// Access-control decisions
    Authorization,
    /// Reads and writes of stored data
    DataAccess,
    /// Configuration changes
    Configuration,
    /// Agent task activity
    AgentActivity,
    /// Compliance state changes
    Compliance,
    /// Integrity and encryption failures
    Security,
    /// Platform lifecycle
    System,
}

/// Outcome of the audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Completed as requested
    Success,
    /// Did not complete
    Failure,
    /// Some of the work completed
    Partial,
    /// Denied by policy
    Blocked,
    /// Unexpected error
    Error,
}

/// What kind of principal performed the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// Human operator
    User,
    /// Platform agent
    Agent,
    /// Internal subsystem
    System,
    /// External API caller
    Api,
}

/// A single structured audit event
///
/// Immutable once appended; `integrity_hash` covers every field except
/// itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id
    pub event_id: String,
    /// Write timestamp
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: AuditLevel,
    /// Functional category
    pub category: EventCategory,
    /// Dotted event name, e.g. `task.completed`
    pub event_type: String,
    /// Action outcome
    pub outcome: AuditOutcome,
    /// Acting principal id
    pub actor_id: String,
    /// Acting principal kind
    pub actor_kind: ActorKind,
    /// Owning organization
    pub organization_id: String,
    /// Id of the touched resource, if any
    pub resource_ref: Option<String>,
    /// Verb describing the action
    pub action: String,
    /// Sanitised structured detail
    pub details: Value,
    /// Source address when known
    pub ip: Option<String>,
    /// Session id when known
    pub session: Option<String>,
    /// Correlates events of one logical operation
    pub correlation_id: Option<String>,
    /// 0..100 risk estimate
    pub risk_score: u8,
    /// Frameworks this event is relevant to
    pub frameworks: Vec<Framework>,
    /// Whether the event surfaces on customer-facing audit views
    pub customer_visible: bool,
    /// Per-event retention override in days
    pub retention_period_days: Option<u32>,
    /// HMAC over the canonical event record
    pub integrity_hash: String,
}

impl AuditEvent {
    /// Start a new event; hash is filled in by the log on append
    pub fn new(
        category: EventCategory,
        event_type: &str,
        outcome: AuditOutcome,
        actor_id: &str,
        actor_kind: ActorKind,
        organization_id: &str,
        action: &str,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level: AuditLevel::Info,
            category,
            event_type: event_type.to_string(),
            outcome,
            actor_id: actor_id.to_string(),
            actor_kind,
            organization_id: organization_id.to_string(),
            resource_ref: None,
            action: action.to_string(),
            details: Value::Null,
            ip: None,
            session: None,
            correlation_id: None,
            risk_score: 0,
            frameworks: Vec::new(),
            customer_visible: false,
            retention_period_days: None,
            integrity_hash: String::new(),
        }
    }

    /// Set severity level
    pub fn with_level(mut self, level: AuditLevel) -> Self {
        self.level = level;
        self
    }

    /// Reference the touched resource
    pub fn with_resource(mut self, resource_ref: &str) -> Self {
        self.resource_ref = Some(resource_ref.to_string());
        self
    }

    /// Attach structured detail (sanitised on append)
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Set the risk estimate, clamped to 0..=100
    pub fn with_risk_score(mut self, score: u8) -> Self {
        self.risk_score = score.min(100);
        self
    }

    /// Tag with a correlation id
    pub fn with_correlation(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }

    /// Mark relevant frameworks
    pub fn with_frameworks(mut self, frameworks: Vec<Framework>) -> Self {
        self.frameworks = frameworks;
        self
    }

    /// Expose on customer-facing audit views
    pub fn customer_visible(mut self) -> Self {
        self.customer_visible = true;
        self
    }

    /// Override the retention window for this event
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_period_days = Some(days);
        self
    }

    /// The record covered by the integrity hash (everything but the hash)
    pub fn record_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(ref mut map) = value {
            map.remove("integrity_hash");
        }
        value
    }
}

/// Query filter over the audit log
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Organization shard to read
    pub organization_id: String,
    /// Inclusive lower time bound
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper time bound
    pub to: Option<DateTime<Utc>>,
    /// Restrict to one category
    pub category: Option<EventCategory>,
    /// Restrict to one actor
    pub actor_id: Option<String>,
    /// Restrict to one resource
    pub resource_ref: Option<String>,
    /// Restrict to one outcome
    pub outcome: Option<AuditOutcome>,
    /// Minimum risk score
    pub min_risk_score: Option<u8>,
    /// Maximum results (0 = unbounded)
    pub limit: usize,
}

impl AuditQuery {
    /// Query all events of one organization
    pub fn for_org(organization_id: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(from) = self.from {
            if event.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.timestamp > to {
                return false;
            }
        }
        if let Some(category) = self.category {
            if event.category != category {
                return false;
            }
        }
        if let Some(ref actor) = self.actor_id {
            if &event.actor_id != actor {
                return false;
            }
        }
        if let Some(ref resource) = self.resource_ref {
            if event.resource_ref.as_deref() != Some(resource.as_str()) {
                return false;
            }
        }
        if let Some(outcome) = self.outcome {
            if event.outcome != outcome {
                return false;
            }
        }
        if let Some(min) = self.min_risk_score {
            if event.risk_score < min {
                return false;
            }
        }
        true
    }
}
