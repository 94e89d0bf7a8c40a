//! The context store

use crate::access::AccessManager;
use crate::cache::ContextCache;
use crate::embedding::Embedder;
use crate::entry::{ContextEntry, ContextQuery};
use crate::kv::KvStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use grc_audit::{ActorKind, AuditEvent, AuditLevel, AuditLog, AuditOutcome, EventCategory};
use grc_common::{AgentRef, AtomicCounter, ContextType, CoreConfig, CoreError, CoreResult};
use grc_integrity::{Cipher, EncryptedPayload};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Snapshot of store counters
#[derive(Debug, Clone, Serialize)]
pub struct ContextMetrics {
    /// Entries resident in the local cache
    pub cached_entries: usize,
    /// Cache hits
    pub cache_hits: u64,
    /// Cache misses
    pub cache_misses: u64,
    /// Cache evictions
    pub cache_evictions: u64,
    /// Successful puts
    pub puts: u64,
    /// Successful gets
    pub gets: u64,
    /// Queries served
    pub queries: u64,
    /// Expired entries removed by sweeps
    pub swept: u64,
}

/// Keyed, access-controlled, optionally encrypted context fabric
pub struct ContextStore {
    kv: Arc<dyn KvStore>,
    cache: ContextCache,
    access: Arc<AccessManager>,
    cipher: Arc<Cipher>,
    audit: Arc<AuditLog>,
    embedder: Embedder,
    embeddings: DashMap<String, EmbeddingRecord>,
    encryption_enabled: bool,
    default_ttl: Duration,
    cleanup_interval: Duration,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    puts: AtomicCounter,
    gets: AtomicCounter,
    queries: AtomicCounter,
    swept: AtomicCounter,
}

struct EmbeddingRecord {
    organization_id: String,
    expires_at: Option<DateTime<Utc>>,
    vector: Vec<f32>,
}

impl ContextStore {
    /// Wire a store from injected collaborators
    pub fn new(
        kv: Arc<dyn KvStore>,
        access: Arc<AccessManager>,
        cipher: Arc<Cipher>,
        audit: Arc<AuditLog>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            kv,
            cache: ContextCache::new(config.cache_max_entries),
            access,
            cipher,
            audit,
            embedder: Embedder::new(),
            embeddings: DashMap::new(),
            encryption_enabled: config.encryption_enabled,
            default_ttl: Duration::from_secs(config.cache_ttl_seconds),
            cleanup_interval: Duration::from_secs(config.context_cleanup_interval_seconds),
            shutdown: Mutex::new(None),
            puts: AtomicCounter::new(0),
            gets: AtomicCounter::new(0),
            queries: AtomicCounter::new(0),
            swept: AtomicCounter::new(0),
        }
    }

    /// Access manager used by this store
    pub fn access(&self) -> &Arc<AccessManager> {
        &self.access
    }

    /// Store an entry, encrypting when policy demands it
    pub async fn put(&self, mut entry: ContextEntry) -> CoreResult<String> {
        if entry.entry_id.is_empty() {
            entry.entry_id = uuid::Uuid::new_v4().to_string();
        }

        // Embeddings index the plaintext; compute before encryption
        if matches!(entry.context_type, ContextType::Learning | ContextType::Policy) {
            self.embeddings.insert(
                entry.entry_id.clone(),
                EmbeddingRecord {
                    organization_id: entry.organization_id.clone(),
                    expires_at: entry.expires_at,
                    vector: self.embedder.embed(&entry.data),
                },
            );
        }

        if self.access.encryption_required(entry.sensitivity) {
            if !self.encryption_enabled {
                self.audit_security_failure(&entry, "encryption required but disabled");
                return Err(CoreError::Encryption(
                    "encryption required for this sensitivity tier".into(),
                ));
            }
            let payload = self.cipher.encrypt(&entry.data).map_err(|err| {
                self.audit_security_failure(&entry, "payload encryption failed");
                CoreError::from(err)
            })?;
            entry.key_id = Some(payload.key_id.clone());
            entry.data = serde_json::to_value(&payload)
                .map_err(|err| CoreError::Encryption(err.to_string()))?;
            entry.encrypted = true;
        }

        let ttl = entry
            .expires_at
            .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
            .or(Some(self.default_ttl));

        let serialized = serde_json::to_string(&entry)
            .map_err(|err| CoreError::Permanent(format!("entry serialization: {}", err)))?;
        self.kv.set(&entry.storage_key(), serialized, ttl).await?;
        self.index_entry(&entry, ttl).await?;
        self.cache.insert(entry.clone());
        self.puts.inc();

        self.audit.append(
            AuditEvent::new(
                EventCategory::DataAccess,
                "context.put",
                AuditOutcome::Success,
                &entry.created_by.agent_id,
                ActorKind::Agent,
                &entry.organization_id,
                "write",
            )
            .with_resource(&entry.entry_id)
            .with_details(json!({
                "context_type": entry.context_type,
                "scope": entry.scope,
                "sensitivity": entry.sensitivity,
                "encrypted": entry.encrypted,
                "version": entry.version,
            })),
        );

        tracing::debug!(
            entry_id = %entry.entry_id,
            context_type = ?entry.context_type,
            encrypted = entry.encrypted,
            "context entry stored"
        );
        Ok(entry.entry_id)
    }

    /// Fetch an entry; `Ok(None)` for missing or expired, `AccessDenied`
    /// when policy blocks the read
    pub async fn get(
        &self,
        entry_id: &str,
        organization_id: &str,
        requester: &AgentRef,
    ) -> CoreResult<Option<ContextEntry>> {
        let Some(mut entry) = self.load(entry_id, organization_id).await? else {
            return Ok(None);
        };
        if entry.is_expired() {
            return Ok(None);
        }

        let decision = self.access.can_access(requester, &entry, organization_id);
        if !decision.allowed {
            return Err(CoreError::AccessDenied(decision.reason));
        }

        // Counters update lazily: re-persist with remaining TTL, version
        // untouched
        entry.access_count += 1;
        entry.last_accessed = Some(Utc::now());
        let ttl = entry
            .expires_at
            .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
            .or(Some(self.default_ttl));
        if let Ok(serialized) = serde_json::to_string(&entry) {
            self.kv.set(&entry.storage_key(), serialized, ttl).await?;
        }
        self.cache.insert(entry.clone());
        self.gets.inc();

        self.decrypt_view(entry).map(Some)
    }

    /// Find near-duplicate learning/policy entries by content similarity
    pub async fn find_similar(
        &self,
        probe: &Value,
        organization_id: &str,
        requester: &AgentRef,
        threshold: f32,
    ) -> CoreResult<Vec<(ContextEntry, f32)>> {
        let probe_vector = self.embedder.embed(probe);
        let mut candidates: Vec<(String, f32)> = self
            .embeddings
            .iter()
            .filter(|record| record.organization_id == organization_id)
            .map(|record| (record.key().clone(), Embedder::cosine(&probe_vector, &record.vector)))
            .filter(|(_, similarity)| *similarity >= threshold)
            .collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut results = Vec::new();
        for (entry_id, similarity) in candidates {
            match self.get(&entry_id, organization_id, requester).await {
                Ok(Some(entry)) => results.push((entry, similarity)),
                Ok(None) => {}
                Err(CoreError::AccessDenied(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(results)
    }

    /// Query visible entries, newest first
    pub async fn query(
        &self,
        query: &ContextQuery,
        requester: &AgentRef,
    ) -> CoreResult<Vec<ContextEntry>> {
        let candidate_ids = self.candidate_ids(query).await?;

        let mut entries = Vec::new();
        for entry_id in candidate_ids {
            // Stale index members are expected; skip quietly
            let Some(entry) = self.load(&entry_id, &query.organization_id).await? else {
                continue;
            };
            if entry.is_expired() || !query.matches(&entry) {
                continue;
            }
            if !self
                .access
                .can_access(requester, &entry, &query.organization_id)
                .allowed
            {
                continue;
            }
            entries.push(self.decrypt_view(entry)?);
        }

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(query.effective_limit());
        self.queries.inc();
        Ok(entries)
    }

    /// Remove expired entries from the backing store, cache and embedding
    /// index; returns how many were swept
    pub async fn cleanup_expired(&self) -> CoreResult<usize> {
        let purged = self.kv.purge_expired().await?;
        let cached = self.cache.remove_expired();
        let now = Utc::now();
        self.embeddings
            .retain(|_, record| record.expires_at.map(|at| at > now).unwrap_or(true));
        let swept = purged + cached;
        self.swept.add(swept as u64);
        if swept > 0 {
            tracing::debug!(swept, "expired context entries removed");
        }
        Ok(swept)
    }

    /// Start the periodic cleanup loop
    pub fn start(self: &Arc<Self>) {
        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock() = Some(tx);
        let store = Arc::clone(self);
        let interval = store.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = store.cleanup_expired().await {
                            tracing::warn!(error = %err, "context cleanup sweep failed");
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
            tracing::info!("context cleanup loop stopped");
        });
    }

    /// Stop the cleanup loop
    pub fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(true);
        }
    }

    /// Counter snapshot
    pub fn metrics(&self) -> ContextMetrics {
        let (hits, misses, evictions) = self.cache.stats();
        ContextMetrics {
            cached_entries: self.cache.len(),
            cache_hits: hits,
            cache_misses: misses,
            cache_evictions: evictions,
            puts: self.puts.get(),
            gets: self.gets.get(),
            queries: self.queries.get(),
            swept: self.swept.get(),
        }
    }

    async fn load(
        &self,
        entry_id: &str,
        organization_id: &str,
    ) -> CoreResult<Option<ContextEntry>> {
        if let Some(entry) = self.cache.get(entry_id) {
            if entry.organization_id == organization_id {
                return Ok(Some(entry));
            }
        }
        let key = format!("context:{}:{}", organization_id, entry_id);
        let Some(serialized) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        let entry: ContextEntry = serde_json::from_str(&serialized)
            .map_err(|err| CoreError::Integrity(format!("stored entry corrupt: {}", err)))?;
        Ok(Some(entry))
    }

    async fn candidate_ids(&self, query: &ContextQuery) -> CoreResult<Vec<String>> {
        let org = &query.organization_id;
        let mut ids = Vec::new();

        if !query.tags.is_empty() {
            for tag in &query.tags {
                ids.extend(
                    self.kv
                        .set_members(&format!("idx:tag:{}:{}", tag, org))
                        .await?,
                );
            }
        } else {
            let types = if query.context_types.is_empty() {
                ContextType::all()
            } else {
                query.context_types.clone()
            };
            for context_type in types {
                ids.extend(
                    self.kv
                        .set_members(&format!("idx:context_type:{}:{}", context_type.as_key(), org))
                        .await?,
                );
            }
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn index_entry(&self, entry: &ContextEntry, ttl: Option<Duration>) -> CoreResult<()> {
        let org = &entry.organization_id;
        self.kv
            .set_add(
                &format!("idx:context_type:{}:{}", entry.context_type.as_key(), org),
                &entry.entry_id,
                ttl,
            )
            .await?;
        self.kv
            .set_add(
                &format!("idx:agent:{}:{}", entry.created_by.kind.as_key(), org),
                &entry.entry_id,
                ttl,
            )
            .await?;
        for tag in &entry.tags {
            self.kv
                .set_add(&format!("idx:tag:{}:{}", tag, org), &entry.entry_id, ttl)
                .await?;
        }
        Ok(())
    }

    // Returned views carry plaintext; ciphertext never leaves on error
    fn decrypt_view(&self, mut entry: ContextEntry) -> CoreResult<ContextEntry> {
        if !entry.encrypted {
            return Ok(entry);
        }
        let payload: EncryptedPayload = serde_json::from_value(entry.data.clone())
            .map_err(|_| CoreError::Encryption("stored envelope corrupt".into()))?;
        let plaintext = self.cipher.decrypt(&payload).map_err(|err| {
            self.audit_security_failure(&entry, "payload decryption failed");
            CoreError::from(err)
        })?;
        entry.data = plaintext;
        entry.encrypted = false;
        entry.key_id = None;
        Ok(entry)
    }

    fn audit_security_failure(&self, entry: &ContextEntry, reason: &str) {
        self.audit.append(
            AuditEvent::new(
                EventCategory::Security,
                "context.crypto_failure",
                AuditOutcome::Error,
                &entry.created_by.agent_id,
                ActorKind::Agent,
                &entry.organization_id,
                "encrypt",
            )
            .with_level(AuditLevel::Critical)
            .with_resource(&entry.entry_id)
            .with_risk_score(90)
            .with_details(json!({ "reason": reason })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessPolicyTable;
    use crate::kv::MemoryKv;
    use grc_common::{AgentKind, Scope, Sensitivity};
    use grc_integrity::Sealer;

    fn build_store() -> (Arc<ContextStore>, Arc<AuditLog>) {
        let config = CoreConfig::default();
        let audit = Arc::new(AuditLog::new(Arc::new(Sealer::new(b"k")), 2555));
        let access = Arc::new(AccessManager::new(AccessPolicyTable::default(), audit.clone()));
        let cipher = Arc::new(Cipher::new(&config.encryption_key_ring));
        let store = Arc::new(ContextStore::new(
            Arc::new(MemoryKv::new()),
            access,
            cipher,
            audit.clone(),
            &config,
        ));
        (store, audit)
    }

    fn collector() -> AgentRef {
        AgentRef::new("collector-1", AgentKind::EvidenceCollector)
    }

    fn internal_entry(data: Value) -> ContextEntry {
        ContextEntry::new(
            ContextType::Compliance,
            Scope::Organization,
            Sensitivity::Internal,
            data,
            collector(),
            "org-1",
        )
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (store, _) = build_store();
        let entry_id = store
            .put(internal_entry(json!({"framework": "soc2", "state": "in_audit"})))
            .await
            .unwrap();

        let fetched = store
            .get(&entry_id, "org-1", &collector())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.data["framework"], "soc2");
        assert!(!fetched.encrypted);
        assert_eq!(fetched.access_count, 1);
    }

    #[tokio::test]
    async fn test_confidential_entries_encrypted_at_rest() {
        let (store, _) = build_store();
        let entry = ContextEntry::new(
            ContextType::Risk,
            Scope::AgentType,
            Sensitivity::Confidential,
            json!({"finding": "open s3 bucket"}),
            AgentRef::new("assessor-1", AgentKind::RiskAssessor),
            "org-1",
        )
        .with_allowed_agents([AgentKind::RiskAssessor]);
        let entry_id = store.put(entry).await.unwrap();

        // At rest: ciphertext envelope, no plaintext
        let raw = store
            .kv
            .get(&format!("context:org-1:{}", entry_id))
            .await
            .unwrap()
            .unwrap();
        assert!(!raw.contains("open s3 bucket"));
        let stored: ContextEntry = serde_json::from_str(&raw).unwrap();
        assert!(stored.encrypted);
        assert!(stored.key_id.is_some());

        // Confidential reads need an approval grant, creator included
        let reader = AgentRef::new("assessor-1", AgentKind::RiskAssessor);
        assert!(matches!(
            store.get(&entry_id, "org-1", &reader).await,
            Err(CoreError::AccessDenied(_))
        ));

        // Granted read comes back decrypted
        store.access().grant(&entry_id, [AgentKind::RiskAssessor]);
        let fetched = store.get(&entry_id, "org-1", &reader).await.unwrap().unwrap();
        assert_eq!(fetched.data["finding"], "open s3 bucket");
    }

    #[tokio::test]
    async fn test_access_denied_surfaces() {
        let (store, _) = build_store();
        let entry = ContextEntry::new(
            ContextType::Workflow,
            Scope::Private,
            Sensitivity::Internal,
            json!({"step": 3}),
            collector(),
            "org-1",
        );
        let entry_id = store.put(entry).await.unwrap();

        let outsider = AgentRef::new("outsider-1", AgentKind::Monitor);
        let result = store.get(&entry_id, "org-1", &outsider).await;
        assert!(matches!(result, Err(CoreError::AccessDenied(_))));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_none() {
        let (store, _) = build_store();
        let mut entry = internal_entry(json!({"v": 1}));
        entry.expires_at = Some(Utc::now() - chrono::Duration::seconds(5));
        let entry_id = store.put(entry).await.unwrap();

        let fetched = store.get(&entry_id, "org-1", &collector()).await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn test_query_by_type_and_tag() {
        let (store, _) = build_store();
        store
            .put(internal_entry(json!({"n": 1})).with_tags(["aws".to_string()]))
            .await
            .unwrap();
        store.put(internal_entry(json!({"n": 2}))).await.unwrap();
        let mut risk = internal_entry(json!({"n": 3}));
        risk.context_type = ContextType::Risk;
        store.put(risk).await.unwrap();

        let compliance = store
            .query(
                &ContextQuery::for_org("org-1").with_type(ContextType::Compliance),
                &collector(),
            )
            .await
            .unwrap();
        assert_eq!(compliance.len(), 2);

        let mut tagged_query = ContextQuery::for_org("org-1");
        tagged_query.tags = ["aws".to_string()].into_iter().collect();
        let tagged = store.query(&tagged_query, &collector()).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].data["n"], 1);
    }

    #[tokio::test]
    async fn test_query_skips_denied_entries() {
        let (store, _) = build_store();
        store.put(internal_entry(json!({"open": true}))).await.unwrap();
        let private = ContextEntry::new(
            ContextType::Compliance,
            Scope::Private,
            Sensitivity::Internal,
            json!({"private": true}),
            AgentRef::new("someone-else", AgentKind::RiskAssessor),
            "org-1",
        );
        store.put(private).await.unwrap();

        let visible = store
            .query(&ContextQuery::for_org("org-1"), &collector())
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].data["open"], true);
    }

    #[tokio::test]
    async fn test_find_similar_learning_entries() {
        let (store, _) = build_store();
        let mut learning = internal_entry(json!({
            "question": "Do you encrypt data at rest?",
            "answer": "Yes, AES-256 everywhere"
        }));
        learning.context_type = ContextType::Learning;
        store.put(learning).await.unwrap();

        let matches = store
            .find_similar(
                &json!({
                    "question": "Do you encrypt data at rest?",
                    "answer": "Yes, AES-256 everywhere"
                }),
                "org-1",
                &collector(),
                0.9,
            )
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].1 > 0.99);

        let unrelated = store
            .find_similar(&json!({"invoice": 99}), "org-1", &collector(), 0.9)
            .await
            .unwrap();
        assert!(unrelated.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_sweeps_expired() {
        let (store, _) = build_store();
        let mut entry = internal_entry(json!({"v": 1}));
        entry.expires_at = Some(Utc::now() + chrono::Duration::milliseconds(30));
        store.put(entry).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let swept = store.cleanup_expired().await.unwrap();
        assert!(swept >= 1);
        assert_eq!(store.metrics().swept, swept as u64);
    }

    #[tokio::test]
    async fn test_put_audited() {
        let (store, audit) = build_store();
        store.put(internal_entry(json!({"v": 1}))).await.unwrap();
        let events = audit.query(&grc_audit::AuditQuery::for_org("org-1"));
        assert!(events.iter().any(|e| e.event_type == "context.put"));
    }
}
