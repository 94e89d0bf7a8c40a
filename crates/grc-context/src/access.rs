//! Access control for context entries
//!
//! Policy rows are injected at startup and hot-swappable; every decision
//! lands in the audit log, and confidential/secret reads log regardless
//! of outcome. Decisions are cached per policy version so the hot path
//! stays off the lock.

use crate::entry::ContextEntry;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use grc_audit::{ActorKind, AuditEvent, AuditLevel, AuditLog, AuditOutcome, EventCategory};
use grc_common::{AgentKind, AgentRef, Scope, Sensitivity};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-sensitivity policy row
#[derive(Debug, Clone)]
pub struct SensitivityPolicy {
    /// Kinds allowed to read this tier
    pub allowed_kinds: Vec<AgentKind>,
    /// Whether a share approval must exist for non-creator reads
    pub requires_approval: bool,
    /// Whether entries of this tier must be stored encrypted
    pub requires_encryption: bool,
}

/// The injected policy table
#[derive(Debug, Clone)]
pub struct AccessPolicyTable {
    rows: HashMap<Sensitivity, SensitivityPolicy>,
}

impl Default for AccessPolicyTable {
    fn default() -> Self {
        let mut rows = HashMap::new();
        rows.insert(
            Sensitivity::Public,
            SensitivityPolicy {
                allowed_kinds: AgentKind::all(),
                requires_approval: false,
                requires_encryption: false,
            },
        );
        rows.insert(
            Sensitivity::Internal,
            SensitivityPolicy {
                allowed_kinds: AgentKind::all(),
                requires_approval: false,
                requires_encryption: false,
            },
        );
        rows.insert(
            Sensitivity::Confidential,
            SensitivityPolicy {
                allowed_kinds: vec![
                    AgentKind::RiskAssessor,
                    AgentKind::PolicyAnalyzer,
                    AgentKind::QuestionnaireProcessor,
                    AgentKind::CryptoVerifier,
                ],
                requires_approval: true,
                requires_encryption: true,
            },
        );
        rows.insert(
            Sensitivity::Secret,
            SensitivityPolicy {
                allowed_kinds: AgentKind::all()
                    .into_iter()
                    .filter(|kind| kind.is_keyed())
                    .collect(),
                requires_approval: true,
                requires_encryption: true,
            },
        );
        Self { rows }
    }
}

impl AccessPolicyTable {
    /// Policy row for a tier
    pub fn row(&self, sensitivity: Sensitivity) -> Option<&SensitivityPolicy> {
        self.rows.get(&sensitivity)
    }

    /// Replace a row (startup injection)
    pub fn set_row(&mut self, sensitivity: Sensitivity, policy: SensitivityPolicy) {
        self.rows.insert(sensitivity, policy);
    }
}

/// Outcome of an access check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    /// Whether the read may proceed
    pub allowed: bool,
    /// Human-readable reason, also written to the audit log
    pub reason: String,
}

impl AccessDecision {
    fn allow(reason: &str) -> Self {
        Self {
            allowed: true,
            reason: reason.to_string(),
        }
    }

    fn deny(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
        }
    }
}

/// Evaluates agent → entry access requests against the policy table
pub struct AccessManager {
    table: ArcSwap<AccessPolicyTable>,
    // Approval grants per entry, populated by the share broker
    grants: DashMap<String, HashSet<AgentKind>>,
    // Bumped on table swap or grant change to invalidate cached decisions
    version: AtomicU64,
    decisions: moka::sync::Cache<String, AccessDecision>,
    audit: Arc<AuditLog>,
}

impl AccessManager {
    /// Create a manager over the injected table
    pub fn new(table: AccessPolicyTable, audit: Arc<AuditLog>) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
            grants: DashMap::new(),
            version: AtomicU64::new(1),
            decisions: moka::sync::Cache::builder()
                .max_capacity(65_536)
                .time_to_live(Duration::from_secs(60))
                .build(),
            audit,
        }
    }

    /// Swap in a new policy table
    pub fn reload(&self, table: AccessPolicyTable) {
        self.table.store(Arc::new(table));
        self.version.fetch_add(1, Ordering::Release);
        tracing::info!("access policy table reloaded");
    }

    /// Whether the table demands encryption at rest for this tier
    pub fn encryption_required(&self, sensitivity: Sensitivity) -> bool {
        self.table
            .load()
            .row(sensitivity)
            .map(|row| row.requires_encryption)
            .unwrap_or(true)
    }

    /// Record a share approval for the given kinds on an entry
    pub fn grant(&self, entry_id: &str, kinds: impl IntoIterator<Item = AgentKind>) {
        self.grants
            .entry(entry_id.to_string())
            .or_default()
            .extend(kinds);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Whether an approval grant exists for this kind on this entry
    pub fn has_grant(&self, entry_id: &str, kind: AgentKind) -> bool {
        self.grants
            .get(entry_id)
            .map(|kinds| kinds.contains(&kind))
            .unwrap_or(false)
    }

    /// Decide whether `requester` may read `entry`
    pub fn can_access(
        &self,
        requester: &AgentRef,
        entry: &ContextEntry,
        organization_id: &str,
    ) -> AccessDecision {
        let version = self.version.load(Ordering::Acquire);
        let cache_key = format!(
            "{}|{}|{}|{}",
            requester.agent_id, entry.entry_id, entry.version, version
        );
        if let Some(decision) = self.decisions.get(&cache_key) {
            return decision;
        }

        let decision = self.evaluate(requester, entry, organization_id);
        self.record(requester, entry, &decision);
        self.decisions.insert(cache_key, decision.clone());
        decision
    }

    fn evaluate(
        &self,
        requester: &AgentRef,
        entry: &ContextEntry,
        organization_id: &str,
    ) -> AccessDecision {
        if entry.is_expired() {
            return AccessDecision::deny("entry expired");
        }
        if entry.organization_id != organization_id {
            return AccessDecision::deny("organization mismatch");
        }
        // Private entries are readable by their creator and nobody else;
        // every other scope goes through the sensitivity policy below,
        // creator included
        if entry.scope == Scope::Private {
            if entry.created_by.agent_id == requester.agent_id {
                return AccessDecision::allow("creator");
            }
            return AccessDecision::deny("scope is private");
        }
        if entry.scope == Scope::AgentType && !entry.allowed_agents.contains(&requester.kind) {
            return AccessDecision::deny("agent kind not in allowed set");
        }

        let table = self.table.load();
        let Some(policy) = table.row(entry.sensitivity).cloned() else {
            return AccessDecision::deny("no policy for sensitivity tier");
        };
        if !policy.allowed_kinds.contains(&requester.kind) {
            return AccessDecision::deny("sensitivity tier forbids agent kind");
        }
        if policy.requires_approval && !self.has_grant(&entry.entry_id, requester.kind) {
            return AccessDecision::deny("approval required");
        }

        AccessDecision::allow("policy satisfied")
    }

    // Sensitive reads are logged regardless of outcome; others only when
    // denied or allowed, same event either way.
    fn record(&self, requester: &AgentRef, entry: &ContextEntry, decision: &AccessDecision) {
        let outcome = if decision.allowed {
            AuditOutcome::Success
        } else {
            AuditOutcome::Blocked
        };
        let sensitive = entry.sensitivity.requires_approval();
        let level = if !decision.allowed && sensitive {
            AuditLevel::Warning
        } else {
            AuditLevel::Info
        };
        let risk = match (decision.allowed, sensitive) {
            (false, true) => 60,
            (false, false) => 30,
            (true, true) => 20,
            (true, false) => 0,
        };

        self.audit.append(
            AuditEvent::new(
                EventCategory::Authorization,
                "context.access",
                outcome,
                &requester.agent_id,
                ActorKind::Agent,
                &entry.organization_id,
                "read",
            )
            .with_level(level)
            .with_resource(&entry.entry_id)
            .with_risk_score(risk)
            .with_details(json!({
                "reason": decision.reason,
                "sensitivity": entry.sensitivity,
                "scope": entry.scope,
                "agent_kind": requester.kind,
            })),
        );

        if sensitive {
            tracing::info!(
                agent = %requester.agent_id,
                entry = %entry.entry_id,
                allowed = decision.allowed,
                reason = %decision.reason,
                "sensitive context access"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grc_common::ContextType;
    use grc_integrity::Sealer;
    use serde_json::json;

    fn manager() -> AccessManager {
        let audit = Arc::new(AuditLog::new(Arc::new(Sealer::new(b"k")), 2555));
        AccessManager::new(AccessPolicyTable::default(), audit)
    }

    fn entry(scope: Scope, sensitivity: Sensitivity) -> ContextEntry {
        let mut entry = ContextEntry::new(
            ContextType::Compliance,
            scope,
            sensitivity,
            json!({"x": 1}),
            AgentRef::new("creator-1", AgentKind::EvidenceCollector),
            "org-1",
        );
        entry.entry_id = "e-1".into();
        entry
    }

    #[test]
    fn test_private_scope_only_creator() {
        let mgr = manager();
        let entry = entry(Scope::Private, Sensitivity::Internal);

        let creator = AgentRef::new("creator-1", AgentKind::EvidenceCollector);
        assert!(mgr.can_access(&creator, &entry, "org-1").allowed);

        let other = AgentRef::new("other-1", AgentKind::RiskAssessor);
        let decision = mgr.can_access(&other, &entry, "org-1");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "scope is private");
    }

    #[test]
    fn test_org_mismatch_denied() {
        let mgr = manager();
        let entry = entry(Scope::Global, Sensitivity::Public);
        let agent = AgentRef::new("a", AgentKind::Monitor);
        assert!(!mgr.can_access(&agent, &entry, "org-2").allowed);
    }

    #[test]
    fn test_confidential_requires_approval() {
        let mgr = manager();
        let mut e = entry(Scope::AgentType, Sensitivity::Confidential);
        e.allowed_agents = [AgentKind::RiskAssessor].into_iter().collect();

        let assessor = AgentRef::new("assessor-1", AgentKind::RiskAssessor);
        let decision = mgr.can_access(&assessor, &e, "org-1");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "approval required");

        mgr.grant(&e.entry_id, [AgentKind::RiskAssessor]);
        assert!(mgr.can_access(&assessor, &e, "org-1").allowed);
    }

    #[test]
    fn test_secret_restricted_to_keyed_kinds() {
        let mgr = manager();
        let mut e = entry(Scope::Organization, Sensitivity::Secret);
        e.entry_id = "secret-1".into();
        mgr.grant("secret-1", AgentKind::all());

        let scanner = AgentRef::new("scanner-1", AgentKind::SecurityScanner);
        assert!(!mgr.can_access(&scanner, &e, "org-1").allowed);

        let verifier = AgentRef::new("verifier-1", AgentKind::CryptoVerifier);
        assert!(mgr.can_access(&verifier, &e, "org-1").allowed);
    }

    #[test]
    fn test_creator_not_exempt_from_sensitivity_tier() {
        let mgr = manager();
        let mut e = ContextEntry::new(
            ContextType::Security,
            Scope::Organization,
            Sensitivity::Confidential,
            json!({"finding": "exposed bucket"}),
            AgentRef::new("scanner-1", AgentKind::SecurityScanner),
            "org-1",
        );
        e.entry_id = "conf-1".into();

        // SecurityScanner is outside the confidential tier's allowed
        // kinds, so even the creator cannot read a non-private entry back
        let creator = AgentRef::new("scanner-1", AgentKind::SecurityScanner);
        let decision = mgr.can_access(&creator, &e, "org-1");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "sensitivity tier forbids agent kind");

        // A grant does not help a kind the tier excludes
        mgr.grant("conf-1", [AgentKind::SecurityScanner]);
        assert!(!mgr.can_access(&creator, &e, "org-1").allowed);
    }

    #[test]
    fn test_creator_within_tier_still_needs_approval() {
        let mgr = manager();
        let mut e = ContextEntry::new(
            ContextType::Risk,
            Scope::Organization,
            Sensitivity::Confidential,
            json!({"score": 72}),
            AgentRef::new("assessor-1", AgentKind::RiskAssessor),
            "org-1",
        );
        e.entry_id = "conf-2".into();

        let creator = AgentRef::new("assessor-1", AgentKind::RiskAssessor);
        let decision = mgr.can_access(&creator, &e, "org-1");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "approval required");

        mgr.grant("conf-2", [AgentKind::RiskAssessor]);
        assert!(mgr.can_access(&creator, &e, "org-1").allowed);
    }

    #[test]
    fn test_expired_entry_denied_even_for_creator() {
        let mgr = manager();
        let mut e = entry(Scope::Global, Sensitivity::Public);
        e.expires_at = Some(chrono::Utc::now() - chrono::Duration::minutes(5));
        let creator = AgentRef::new("creator-1", AgentKind::EvidenceCollector);
        assert!(!mgr.can_access(&creator, &e, "org-1").allowed);
    }

    #[test]
    fn test_decisions_audited() {
        let audit = Arc::new(AuditLog::new(Arc::new(Sealer::new(b"k")), 2555));
        let mgr = AccessManager::new(AccessPolicyTable::default(), audit.clone());
        let e = entry(Scope::Private, Sensitivity::Internal);
        let other = AgentRef::new("other-1", AgentKind::RiskAssessor);
        mgr.can_access(&other, &e, "org-1");

        let events = audit.query(&grc_audit::AuditQuery::for_org("org-1"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "context.access");
        assert_eq!(events[0].outcome, AuditOutcome::Blocked);
    }

    #[test]
    fn test_grant_invalidates_cached_decision() {
        let mgr = manager();
        let mut e = entry(Scope::AgentType, Sensitivity::Confidential);
        e.allowed_agents = [AgentKind::PolicyAnalyzer].into_iter().collect();
        let analyst = AgentRef::new("analyst-1", AgentKind::PolicyAnalyzer);

        assert!(!mgr.can_access(&analyst, &e, "org-1").allowed);
        mgr.grant(&e.entry_id, [AgentKind::PolicyAnalyzer]);
        // Version bump means the cached denial is not replayed
        assert!(mgr.can_access(&analyst, &e, "org-1").allowed);
    }
}
