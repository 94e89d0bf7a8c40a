//! Platform wiring and external API

use chrono::{DateTime, Utc};
use grc_agents::{Agent, AgentRegistry};
use grc_audit::{ActorKind, AuditEvent, AuditLog, AuditOutcome, EventCategory, FailedAuthMonitor, HighRiskMonitor};
use grc_common::{
    AgentKind, AgentRef, AgentTarget, ContextType, CoreConfig, CoreResult, Framework,
    Sensitivity, Task,
};
use grc_context::{
    AccessManager, AccessPolicyTable, ContextEntry, ContextQuery, ContextStore, KvStore, MemoryKv,
    ShareBroker, ShareOutcome,
};
use grc_etl::{ScheduleManager, TransformRegistry, ValidationRegistry};
use grc_evidence::{EvidenceFilter, EvidenceItem, EvidenceStore, StoredEvidence};
use grc_integrity::{Cipher, Sealer};
use grc_scheduler::{TaskScheduler, TaskSnapshot};
use grc_scoring::{ControlCatalog, FrameworkScore, ScoringEngine};
use serde_json::{json, Value};
use std::sync::Arc;

/// The assembled compliance automation core
pub struct GrcPlatform {
    config: CoreConfig,
    sealer: Arc<Sealer>,
    audit: Arc<AuditLog>,
    access: Arc<AccessManager>,
    context: Arc<ContextStore>,
    shares: Arc<ShareBroker>,
    evidence: Arc<EvidenceStore>,
    registry: Arc<AgentRegistry>,
    scheduler: Arc<TaskScheduler>,
    transforms: Arc<TransformRegistry>,
    validations: Arc<ValidationRegistry>,
    etl_schedule: Arc<ScheduleManager>,
    catalog: Arc<ControlCatalog>,
    scoring: Arc<ScoringEngine>,
}

impl GrcPlatform {
    /// Assemble the core over the in-memory backing store
    pub fn new(config: CoreConfig) -> Self {
        Self::with_kv(config, Arc::new(MemoryKv::new()))
    }

    /// Assemble the core over an injected backing store
    pub fn with_kv(config: CoreConfig, kv: Arc<dyn KvStore>) -> Self {
        let sealer = Arc::new(Sealer::new(&config.integrity_key));
        let cipher = Arc::new(Cipher::new(&config.encryption_key_ring));
        let audit = Arc::new(AuditLog::new(sealer.clone(), config.audit_retention_days));
        audit.register_monitor(Arc::new(FailedAuthMonitor::new(5)));
        audit.register_monitor(Arc::new(HighRiskMonitor::new(80)));

        let access = Arc::new(AccessManager::new(AccessPolicyTable::default(), audit.clone()));
        let context = Arc::new(ContextStore::new(
            kv,
            access.clone(),
            cipher.clone(),
            audit.clone(),
            &config,
        ));
        let shares = Arc::new(ShareBroker::new(
            context.clone(),
            access.clone(),
            audit.clone(),
            vec![AgentKind::CryptoVerifier, AgentKind::PolicyAnalyzer],
        ));
        let evidence = Arc::new(EvidenceStore::new(sealer.clone()));
        let registry = Arc::new(AgentRegistry::new(config.agent_failure_threshold));
        let scheduler = Arc::new(TaskScheduler::new(registry.clone(), audit.clone(), &config));
        let catalog = Arc::new(ControlCatalog::with_defaults());
        let scoring = Arc::new(ScoringEngine::new(catalog.clone(), evidence.clone()));

        Self {
            config,
            sealer,
            audit,
            access,
            context,
            shares,
            evidence,
            registry,
            scheduler,
            transforms: Arc::new(TransformRegistry::new()),
            validations: Arc::new(ValidationRegistry::new()),
            etl_schedule: Arc::new(ScheduleManager::new()),
            catalog,
            scoring,
        }
    }

    /// Start background loops: dispatch, context cleanup, ETL schedule
    pub fn start(&self) {
        self.scheduler.start();
        self.context.start();
        self.etl_schedule.start();
        self.audit.append(AuditEvent::new(
            EventCategory::System,
            "platform.started",
            AuditOutcome::Success,
            "platform",
            ActorKind::System,
            "platform",
            "start",
        ));
        tracing::info!("platform started");
    }

    /// Stop background loops; in-flight work settles on its own
    pub fn stop(&self) {
        self.etl_schedule.stop();
        self.context.stop();
        self.scheduler.stop();
        self.audit.append(AuditEvent::new(
            EventCategory::System,
            "platform.stopped",
            AuditOutcome::Success,
            "platform",
            ActorKind::System,
            "platform",
            "stop",
        ));
    }

    // ---- task API ----

    /// Register an agent and bring it to `Idle`
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> CoreResult<()> {
        let agent_id = agent.config().agent_id.clone();
        self.registry.register(agent)?;
        self.registry.start(&agent_id).await
    }

    /// Submit a task; platform defaults fill priority, timeout and retries
    pub fn submit_task(
        &self,
        organization_id: &str,
        agent_target: AgentTarget,
        task_type: &str,
        payload: Value,
        priority: Option<u8>,
        timeout_ms: Option<u64>,
        deadline: Option<DateTime<Utc>>,
    ) -> CoreResult<String> {
        let mut task = Task::new(
            organization_id,
            task_type,
            agent_target,
            payload,
            priority.unwrap_or(5),
        )
        .with_retries(self.config.retry_max_attempts);
        task.timeout_ms =
            Some(timeout_ms.unwrap_or(self.config.default_task_timeout_seconds * 1000));
        task.deadline = deadline;
        self.scheduler.submit(task)
    }

    /// Task state snapshot
    pub fn get_task(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.scheduler.get_task(task_id)
    }

    /// Cancel a queued or running task
    pub fn cancel_task(&self, task_id: &str) -> bool {
        self.scheduler.cancel_task(task_id)
    }

    // ---- evidence API ----

    /// Store an evidence item; idempotent on canonical content
    pub fn put_evidence(&self, item: EvidenceItem) -> StoredEvidence {
        let organization_id = item.organization_id.clone();
        let source = item.source.clone();
        let framework = item.framework;
        let stored = self.evidence.store(item);

        self.audit.append(
            AuditEvent::new(
                EventCategory::Compliance,
                "evidence.put",
                AuditOutcome::Success,
                &source,
                ActorKind::Agent,
                &organization_id,
                "store",
            )
            .with_resource(&stored.evidence_id)
            .with_frameworks(vec![framework])
            .with_details(json!({ "deduplicated": stored.deduplicated }))
            .customer_visible(),
        );
        stored
    }

    /// Fetch an evidence item
    pub fn get_evidence(&self, evidence_id: &str) -> CoreResult<EvidenceItem> {
        self.evidence.get(evidence_id)
    }

    /// Query evidence items
    pub fn query_evidence(&self, filter: &EvidenceFilter) -> Vec<EvidenceItem> {
        self.evidence.query(filter)
    }

    // ---- context API ----

    /// Store a context entry
    pub async fn put_context(&self, entry: ContextEntry) -> CoreResult<String> {
        self.context.put(entry).await
    }

    /// Fetch a context entry under access control
    pub async fn get_context(
        &self,
        entry_id: &str,
        organization_id: &str,
        requester: &AgentRef,
    ) -> CoreResult<Option<ContextEntry>> {
        self.context.get(entry_id, organization_id, requester).await
    }

    /// Query visible context entries
    pub async fn query_context(
        &self,
        query: &ContextQuery,
        requester: &AgentRef,
    ) -> CoreResult<Vec<ContextEntry>> {
        self.context.query(query, requester).await
    }

    /// Submit a data-share request
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
        self.shares
            .request_share(
                requesting_agent,
                target_agents,
                context_type,
                data,
                sensitivity,
                organization_id,
                justification,
                expires_in_hours,
            )
            .await
    }

    /// Approve a pending share; human operators approve through here too
    pub async fn approve_share(
        &self,
        request_id: &str,
        approver: AgentRef,
    ) -> CoreResult<ShareOutcome> {
        self.shares.approve(request_id, approver).await
    }

    // ---- scoring API ----

    /// Score one framework for one organization
    pub fn score(&self, organization_id: &str, framework: Framework) -> FrameworkScore {
        let score = self.scoring.score_framework(organization_id, framework);
        self.audit.append(
            AuditEvent::new(
                EventCategory::Compliance,
                "compliance.scored",
                AuditOutcome::Success,
                "scoring-engine",
                ActorKind::System,
                organization_id,
                "score",
            )
            .with_frameworks(vec![framework])
            .with_details(json!({
                "overall_score": score.overall_score,
                "risk_score": score.risk_score,
            }))
            .customer_visible(),
        );
        score
    }

    // ---- component access ----

    /// Effective configuration
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Integrity sealer
    pub fn sealer(&self) -> &Arc<Sealer> {
        &self.sealer
    }

    /// Audit log
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Access manager
    pub fn access(&self) -> &Arc<AccessManager> {
        &self.access
    }

    /// Context store
    pub fn context(&self) -> &Arc<ContextStore> {
        &self.context
    }

    /// Share broker
    pub fn shares(&self) -> &Arc<ShareBroker> {
        &self.shares
    }

    /// Evidence store
    pub fn evidence(&self) -> &Arc<EvidenceStore> {
        &self.evidence
    }

    /// Agent registry
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Task scheduler
    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    /// Transformation registry for ETL pipelines
    pub fn transforms(&self) -> &Arc<TransformRegistry> {
        &self.transforms
    }

    /// Validation rule registry for ETL pipelines
    pub fn validations(&self) -> &Arc<ValidationRegistry> {
        &self.validations
    }

    /// ETL schedule manager
    pub fn etl_schedule(&self) -> &Arc<ScheduleManager> {
        &self.etl_schedule
    }

    /// Framework control catalog
    pub fn catalog(&self) -> &Arc<ControlCatalog> {
        &self.catalog
    }
}
