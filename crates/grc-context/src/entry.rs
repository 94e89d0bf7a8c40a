//! Context entry and query shapes

use chrono::{DateTime, Duration, Utc};
use grc_common::{AgentKind, AgentRef, ContextType, Scope, Sensitivity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// A scoped, typed, optionally encrypted data item shared between agents
///
/// Owned exclusively by the [`crate::ContextStore`]; agents hold entry ids
/// and read-only clones, never references into the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Store-assigned id
    pub entry_id: String,
    /// Data family
    pub context_type: ContextType,
    /// Sharing scope
    pub scope: Scope,
    /// Sensitivity tier
    pub sensitivity: Sensitivity,
    /// Payload; ciphertext envelope when `encrypted`
    pub data: Value,
    /// Creating agent
    pub created_by: AgentRef,
    /// Owning organization
    pub organization_id: String,
    /// Workflow binding for `Scope::Workflow` entries
    pub workflow_id: Option<String>,
    /// Kinds allowed to read under `Scope::AgentType`
    pub allowed_agents: HashSet<AgentKind>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry; entries past this are unreadable and swept
    pub expires_at: Option<DateTime<Utc>>,
    /// Last successful read
    pub last_accessed: Option<DateTime<Utc>>,
    /// Monotonically non-decreasing read counter
    pub access_count: u64,
    /// Entry version, bumped on re-put of the same logical entry
    pub version: u32,
    /// Lineage pointer for versioned entries
    pub parent_entry_id: Option<String>,
    /// Free-form filter tags
    pub tags: HashSet<String>,
    /// Whether `data` is an encrypted envelope
    pub encrypted: bool,
    /// Key ring id used for encryption
    pub key_id: Option<String>,
}

impl ContextEntry {
    /// Build an entry pending storage; the store assigns the id
    pub fn new(
        context_type: ContextType,
        scope: Scope,
        sensitivity: Sensitivity,
        data: Value,
        created_by: AgentRef,
        organization_id: &str,
    ) -> Self {
        Self {
            entry_id: String::new(),
            context_type,
            scope,
            sensitivity,
            data,
            created_by,
            organization_id: organization_id.to_string(),
            workflow_id: None,
            allowed_agents: HashSet::new(),
            created_at: Utc::now(),
            expires_at: None,
            last_accessed: None,
            access_count: 0,
            version: 1,
            parent_entry_id: None,
            tags: HashSet::new(),
            encrypted: false,
            key_id: None,
        }
    }

    /// Restrict to the given kinds (used with `Scope::AgentType`)
    pub fn with_allowed_agents(mut self, kinds: impl IntoIterator<Item = AgentKind>) -> Self {
        self.allowed_agents = kinds.into_iter().collect();
        self
    }

    /// Expire after the given duration
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(Utc::now() + ttl);
        self
    }

    /// Add filter tags
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Bind to a workflow
    pub fn with_workflow(mut self, workflow_id: &str) -> Self {
        self.workflow_id = Some(workflow_id.to_string());
        self
    }

    /// Record lineage from a previous version of this logical entry
    pub fn with_parent(mut self, parent_entry_id: &str, parent_version: u32) -> Self {
        self.parent_entry_id = Some(parent_entry_id.to_string());
        self.version = parent_version + 1;
        self
    }

    /// Whether the entry is past its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| at < Utc::now()).unwrap_or(false)
    }

    /// Backing-store key for this entry
    pub fn storage_key(&self) -> String {
        format!("context:{}:{}", self.organization_id, self.entry_id)
    }
}

/// Query over the context store
#[derive(Debug, Clone)]
pub struct ContextQuery {
    /// Organization to search (required)
    pub organization_id: String,
    /// Restrict to these families; empty = all
    pub context_types: Vec<ContextType>,
    /// Restrict to entries created by these kinds; empty = all
    pub created_by_kinds: Vec<AgentKind>,
    /// Restrict to a workflow
    pub workflow_id: Option<String>,
    /// Entries must carry all of these tags
    pub tags: HashSet<String>,
    /// Created at or after
    pub from: Option<DateTime<Utc>>,
    /// Created at or before
    pub to: Option<DateTime<Utc>>,
    /// Maximum entry age
    pub max_age: Option<Duration>,
    /// Result bound; clamped to 1..=1000
    pub limit: usize,
}

impl ContextQuery {
    /// Query everything visible in one organization
    pub fn for_org(organization_id: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            context_types: Vec::new(),
            created_by_kinds: Vec::new(),
            workflow_id: None,
            tags: HashSet::new(),
            from: None,
            to: None,
            max_age: None,
            limit: 100,
        }
    }

    /// Restrict to one context type
    pub fn with_type(mut self, context_type: ContextType) -> Self {
        self.context_types = vec![context_type];
        self
    }

    /// Effective result bound
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            100
        } else {
            self.limit.min(1000)
        }
    }

    pub(crate) fn matches(&self, entry: &ContextEntry) -> bool {
        if entry.organization_id != self.organization_id {
            return false;
        }
        if !self.context_types.is_empty() && !self.context_types.contains(&entry.context_type) {
            return false;
        }
        if !self.created_by_kinds.is_empty()
            && !self.created_by_kinds.contains(&entry.created_by.kind)
        {
            return false;
        }
        if let Some(ref workflow_id) = self.workflow_id {
            if entry.workflow_id.as_deref() != Some(workflow_id.as_str()) {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().all(|tag| entry.tags.contains(tag)) {
            return false;
        }
        if let Some(from) = self.from {
            if entry.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.created_at > to {
                return false;
            }
        }
        if let Some(max_age) = self.max_age {
            if entry.created_at < Utc::now() - max_age {
                return false;
            }
        }
        true
    }
}
