//! Evidence item shape

use chrono::{DateTime, Utc};
use grc_common::{EvidenceStatus, EvidenceType, Framework};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One step in an item's provenance chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Who acted
    pub actor: String,
    /// What happened (collected, verified, rejected, expired)
    pub action: String,
    /// When
    pub at: DateTime<Utc>,
}

/// A single evidence artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Store-assigned id
    pub evidence_id: String,
    /// Producing agent id
    pub source: String,
    /// Artifact kind
    pub evidence_type: EvidenceType,
    /// Artifact content
    pub content: Value,
    /// Producer-supplied confidence, clamped to [0, 1]
    pub confidence_score: f64,
    /// Trust contribution toward the organization's posture
    pub trust_points: u32,
    /// Framework the artifact supports
    pub framework: Framework,
    /// Control the artifact supports
    pub control_id: String,
    /// Owning organization
    pub organization_id: String,
    /// Collection time
    pub collected_at: DateTime<Utc>,
    /// Optional expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Verification status
    pub status: EvidenceStatus,
    /// HMAC over canonical content + identity metadata
    pub integrity_hash: String,
    /// Append-only history of actions on this item
    pub provenance_chain: Vec<ProvenanceRecord>,
}

impl EvidenceItem {
    /// Build an item pending storage; the store assigns id and hash
    pub fn new(
        source: &str,
        evidence_type: EvidenceType,
        content: Value,
        confidence_score: f64,
        framework: Framework,
        control_id: &str,
        organization_id: &str,
    ) -> Self {
        Self {
            evidence_id: String::new(),
            source: source.to_string(),
            evidence_type,
            content,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            trust_points: 1,
            framework,
            control_id: control_id.to_string(),
            organization_id: organization_id.to_string(),
            collected_at: Utc::now(),
            expires_at: None,
            status: EvidenceStatus::Pending,
            integrity_hash: String::new(),
            provenance_chain: Vec::new(),
        }
    }

    /// Set an expiry timestamp
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the trust contribution
    pub fn with_trust_points(mut self, trust_points: u32) -> Self {
        self.trust_points = trust_points;
        self
    }

    /// The record covered by the integrity hash
    ///
    /// Identity metadata only: the producing agent, timestamps, status and
    /// provenance stay out so independently collected copies of the same
    /// artifact deduplicate to one item.
    pub fn hashed_record(&self) -> Value {
        json!({
            "organization_id": self.organization_id,
            "framework": self.framework,
            "control_id": self.control_id,
            "evidence_type": self.evidence_type,
            "content": self.content,
        })
    }
}

/// Filter for evidence queries
#[derive(Debug, Clone, Default)]
pub struct EvidenceFilter {
    /// Organization to search (required)
    pub organization_id: String,
    /// Restrict to one framework
    pub framework: Option<Framework>,
    /// Restrict to one control
    pub control_id: Option<String>,
    /// Restrict to one artifact kind
    pub evidence_type: Option<EvidenceType>,
    /// Restrict to one status
    pub status: Option<EvidenceStatus>,
    /// Collected at or after
    pub from: Option<DateTime<Utc>>,
    /// Collected at or before
    pub to: Option<DateTime<Utc>>,
    /// Maximum results (0 = unbounded)
    pub limit: usize,
}

impl EvidenceFilter {
    /// Filter over one organization
    pub fn for_org(organization_id: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn matches(&self, item: &EvidenceItem) -> bool {
        if item.organization_id != self.organization_id {
            return false;
        }
        if let Some(framework) = self.framework {
            if item.framework != framework {
                return false;
            }
        }
        if let Some(ref control_id) = self.control_id {
            if &item.control_id != control_id {
                return false;
            }
        }
        if let Some(evidence_type) = self.evidence_type {
            if item.evidence_type != evidence_type {
                return false;
            }
        }
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        if let Some(from) = self.from {
            if item.collected_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if item.collected_at > to {
                return false;
            }
        }
        true
    }
}
