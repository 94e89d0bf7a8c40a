//! Data-share protocol between agents
//!
//! A share request names target agent kinds and a payload. Public and
//! internal data auto-approve; confidential and secret data materialise
//! immediately but stay unreadable to the targets until an authorised
//! approver grants the share. Every state change lands in the audit log.

use crate::access::AccessManager;
use crate::entry::ContextEntry;
use crate::store::ContextStore;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use grc_audit::{ActorKind, AuditEvent, AuditLog, AuditOutcome, EventCategory};
use grc_common::{AgentKind, AgentRef, ContextType, CoreError, CoreResult, Scope, Sensitivity};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Lifecycle of a share request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareStatus {
    /// Waiting for an approver
    Pending,
    /// Approved and readable by targets
    Approved,
    /// Denied by an approver
    Denied,
    /// Timed out before approval
    Expired,
}

/// A request to share data with specific agent kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataShareRequest {
    /// Request id
    pub request_id: String,
    /// Who is sharing
    pub requesting_agent: AgentRef,
    /// Kinds that should gain read access
    pub target_agents: Vec<AgentKind>,
    /// Data family of the shared payload
    pub context_type: ContextType,
    /// Sensitivity of the payload
    pub sensitivity: Sensitivity,
    /// Owning organization
    pub organization_id: String,
    /// Optional workflow binding
    pub workflow_id: Option<String>,
    /// Why the share is needed
    pub justification: String,
    /// Entry lifetime once materialised
    pub expires_in_hours: i64,
    /// Current status
    pub status: ShareStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Agents that approved
    pub approved_by: Vec<AgentRef>,
    /// Agents that denied
    pub denied_by: Vec<AgentRef>,
    /// Materialised context entry
    pub entry_id: Option<String>,
}

/// Result of submitting or resolving a share request
#[derive(Debug, Clone)]
pub struct ShareOutcome {
    /// The request id
    pub request_id: String,
    /// Status after the operation
    pub status: ShareStatus,
    /// Materialised entry, readable once approved
    pub entry_id: Option<String>,
}

/// Brokers pending and approved data shares
pub struct ShareBroker {
    requests: DashMap<String, DataShareRequest>,
    store: Arc<ContextStore>,
    access: Arc<AccessManager>,
    audit: Arc<AuditLog>,
    approver_kinds: Vec<AgentKind>,
}

impl ShareBroker {
    /// Create a broker; `approver_kinds` may resolve pending requests
    pub fn new(
        store: Arc<ContextStore>,
        access: Arc<AccessManager>,
        audit: Arc<AuditLog>,
        approver_kinds: Vec<AgentKind>,
    ) -> Self {
        Self {
            requests: DashMap::new(),
            store,
            access,
            audit,
            approver_kinds,
        }
    }

    /// Submit a share request
    ///
    /// The payload materialises as a context entry immediately; for
    /// public/internal data the request auto-approves, otherwise targets
    /// stay blocked until approval.
    #[allow(clippy::too_many_arguments)]
    pub async fn request_share(
        &self,
        requesting_agent: AgentRef,
        target_agents: Vec<AgentKind>,
        context_type: ContextType,
        data: Value,
        sensitivity: Sensitivity,
        organization_id: &str,
        justification: &str,
        expires_in_hours: i64,
    ) -> CoreResult<ShareOutcome> {
        let mut entry = ContextEntry::new(
            context_type,
            Scope::AgentType,
            sensitivity,
            data,
            requesting_agent.clone(),
            organization_id,
        )
        .with_ttl(Duration::hours(expires_in_hours))
        .with_allowed_agents(target_agents.iter().copied());
        entry.allowed_agents.insert(requesting_agent.kind);

        let entry_id = self.store.put(entry).await?;

        let auto_approved = !sensitivity.requires_approval();
        let status = if auto_approved {
            ShareStatus::Approved
        } else {
            ShareStatus::Pending
        };

        let request = DataShareRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            requesting_agent: requesting_agent.clone(),
            target_agents: target_agents.clone(),
            context_type,
            sensitivity,
            organization_id: organization_id.to_string(),
            workflow_id: None,
            justification: justification.to_string(),
            expires_in_hours,
            status,
            created_at: Utc::now(),
            approved_by: Vec::new(),
            denied_by: Vec::new(),
            entry_id: Some(entry_id.clone()),
        };
        let request_id = request.request_id.clone();
        self.requests.insert(request_id.clone(), request);

        self.audit_transition(
            &request_id,
            organization_id,
            &requesting_agent.agent_id,
            "share.requested",
            if auto_approved {
                AuditOutcome::Success
            } else {
                AuditOutcome::Partial
            },
            json!({
                "targets": target_agents,
                "sensitivity": sensitivity,
                "auto_approved": auto_approved,
                "justification": justification,
            }),
        );

        tracing::info!(
            request_id = %request_id,
            sensitivity = ?sensitivity,
            auto_approved,
            "data share requested"
        );

        Ok(ShareOutcome {
            request_id,
            status,
            entry_id: Some(entry_id),
        })
    }

    /// Approve a pending request
    ///
    /// The approver must be a configured approver kind; human approvals
    /// arrive through the platform API under an operator [`AgentRef`] of
    /// an approver kind.
    pub async fn approve(&self, request_id: &str, approver: AgentRef) -> CoreResult<ShareOutcome> {
        let mut request = self
            .requests
            .get_mut(request_id)
            .ok_or_else(|| CoreError::NotFound(format!("share request {}", request_id)))?;

        if request.status != ShareStatus::Pending {
            return Err(CoreError::Permanent(format!(
                "share request {} is not pending",
                request_id
            )));
        }
        if !self.approver_kinds.contains(&approver.kind) {
            self.audit_transition(
                request_id,
                &request.organization_id,
                &approver.agent_id,
                "share.approve",
                AuditOutcome::Blocked,
                json!({"reason": "not an approver kind"}),
            );
            return Err(CoreError::AccessDenied(
                "agent kind is not an authorised approver".into(),
            ));
        }

        request.status = ShareStatus::Approved;
        request.approved_by.push(approver.clone());

        let entry_id = request
            .entry_id
            .clone()
            .ok_or_else(|| CoreError::Permanent("share request has no entry".into()))?;
        let mut granted: Vec<AgentKind> = request.target_agents.clone();
        granted.push(request.requesting_agent.kind);
        self.access.grant(&entry_id, granted);

        self.audit_transition(
            request_id,
            &request.organization_id,
            &approver.agent_id,
            "share.approve",
            AuditOutcome::Success,
            json!({"entry_id": entry_id}),
        );

        Ok(ShareOutcome {
            request_id: request_id.to_string(),
            status: ShareStatus::Approved,
            entry_id: Some(entry_id),
        })
    }

    /// Deny a pending request
    pub async fn deny(&self, request_id: &str, denier: AgentRef) -> CoreResult<ShareOutcome> {
        let mut request = self
            .requests
            .get_mut(request_id)
            .ok_or_else(|| CoreError::NotFound(format!("share request {}", request_id)))?;
        if request.status != ShareStatus::Pending {
            return Err(CoreError::Permanent(format!(
                "share request {} is not pending",
                request_id
            )));
        }
        if !self.approver_kinds.contains(&denier.kind) {
            return Err(CoreError::AccessDenied(
                "agent kind is not an authorised approver".into(),
            ));
        }

        request.status = ShareStatus::Denied;
        request.denied_by.push(denier.clone());

        self.audit_transition(
            request_id,
            &request.organization_id,
            &denier.agent_id,
            "share.deny",
            AuditOutcome::Blocked,
            json!({}),
        );

        Ok(ShareOutcome {
            request_id: request_id.to_string(),
            status: ShareStatus::Denied,
            entry_id: request.entry_id.clone(),
        })
    }

    /// Expire pending requests older than their window; returns count
    pub fn expire_pending(&self) -> usize {
        let now = Utc::now();
        let mut expired = 0;
        for mut request in self.requests.iter_mut() {
            if request.status == ShareStatus::Pending
                && request.created_at + Duration::hours(request.expires_in_hours) < now
            {
                request.status = ShareStatus::Expired;
                expired += 1;
                self.audit_transition(
                    &request.request_id.clone(),
                    &request.organization_id.clone(),
                    "system",
                    "share.expired",
                    AuditOutcome::Failure,
                    json!({}),
                );
            }
        }
        expired
    }

    /// Fetch a request by id
    pub fn get_request(&self, request_id: &str) -> Option<DataShareRequest> {
        self.requests.get(request_id).map(|r| r.clone())
    }

    /// Requests awaiting approval in an organization
    pub fn pending_requests(&self, organization_id: &str) -> Vec<DataShareRequest> {
        self.requests
            .iter()
            .filter(|r| r.status == ShareStatus::Pending && r.organization_id == organization_id)
            .map(|r| r.clone())
            .collect()
    }

    fn audit_transition(
        &self,
        request_id: &str,
        organization_id: &str,
        actor_id: &str,
        event_type: &str,
        outcome: AuditOutcome,
        details: Value,
    ) {
        self.audit.append(
            AuditEvent::new(
                EventCategory::DataAccess,
                event_type,
                outcome,
                actor_id,
                ActorKind::Agent,
                organization_id,
                "share",
            )
            .with_resource(request_id)
            .with_details(details),
        );
    }
}
