//! Evidence store with hash-keyed dedup

use crate::item::{EvidenceFilter, EvidenceItem, ProvenanceRecord};
use chrono::Utc;
use dashmap::DashMap;
use grc_common::{AtomicCounter, CoreError, CoreResult, EvidenceStatus};
use grc_integrity::Sealer;
use std::collections::HashSet;
use std::sync::Arc;

/// Result of a store call
#[derive(Debug, Clone)]
pub struct StoredEvidence {
    /// Id of the stored (or pre-existing) item
    pub evidence_id: String,
    /// True when the content collapsed onto an existing item
    pub deduplicated: bool,
}

/// Evidence items keyed by integrity hash
///
/// `store` is idempotent on hash collision: concurrent writes of the same
/// canonical content collapse to one winner and every caller observes the
/// same id.
pub struct EvidenceStore {
    by_hash: DashMap<String, EvidenceItem>,
    id_to_hash: DashMap<String, String>,
    org_index: DashMap<String, HashSet<String>>,
    sealer: Arc<Sealer>,
    stored: AtomicCounter,
    deduplicated: AtomicCounter,
}

impl EvidenceStore {
    /// Create a store sealing with the given sealer
    pub fn new(sealer: Arc<Sealer>) -> Self {
        Self {
            by_hash: DashMap::new(),
            id_to_hash: DashMap::new(),
            org_index: DashMap::new(),
            sealer,
            stored: AtomicCounter::new(0),
            deduplicated: AtomicCounter::new(0),
        }
    }

    /// Store an item; returns the surviving id and whether it deduplicated
    pub fn store(&self, mut item: EvidenceItem) -> StoredEvidence {
        item.confidence_score = item.confidence_score.clamp(0.0, 1.0);
        let hash = self.sealer.seal(&item.hashed_record());

        // Entry API keeps the insert atomic: the first writer wins, later
        // writers of the same hash observe the winner's id. Trust points
        // accumulate once per unique artifact.
        let mut deduplicated = true;
        let entry = self.by_hash.entry(hash.clone()).or_insert_with(|| {
            deduplicated = false;
            item.evidence_id = uuid::Uuid::new_v4().to_string();
            item.integrity_hash = hash.clone();
            item.provenance_chain.push(ProvenanceRecord {
                actor: item.source.clone(),
                action: "collected".into(),
                at: Utc::now(),
            });
            item
        });
        let evidence_id = entry.evidence_id.clone();
        let organization_id = entry.organization_id.clone();
        drop(entry);

        if deduplicated {
            self.deduplicated.inc();
            tracing::debug!(%evidence_id, "evidence deduplicated on hash");
        } else {
            self.id_to_hash.insert(evidence_id.clone(), hash.clone());
            self.org_index
                .entry(organization_id)
                .or_default()
                .insert(hash);
            self.stored.inc();
        }

        StoredEvidence {
            evidence_id,
            deduplicated,
        }
    }

    /// Fetch an item by id
    pub fn get(&self, evidence_id: &str) -> CoreResult<EvidenceItem> {
        let hash = self
            .id_to_hash
            .get(evidence_id)
            .ok_or_else(|| CoreError::NotFound(format!("evidence {}", evidence_id)))?;
        self.by_hash
            .get(hash.value())
            .map(|item| item.clone())
            .ok_or_else(|| CoreError::NotFound(format!("evidence {}", evidence_id)))
    }

    /// Query items; newest first
    pub fn query(&self, filter: &EvidenceFilter) -> Vec<EvidenceItem> {
        let Some(hashes) = self.org_index.get(&filter.organization_id) else {
            return Vec::new();
        };
        let mut items: Vec<EvidenceItem> = hashes
            .iter()
            .filter_map(|hash| self.by_hash.get(hash))
            .map(|item| item.clone())
            .filter(|item| filter.matches(item))
            .collect();
        items.sort_by(|a, b| b.collected_at.cmp(&a.collected_at));
        if filter.limit > 0 {
            items.truncate(filter.limit);
        }
        items
    }

    /// Re-verify an item against its stored hash
    pub fn verify(&self, evidence_id: &str) -> CoreResult<bool> {
        let item = self.get(evidence_id)?;
        Ok(self.sealer.verify(&item.hashed_record(), &item.integrity_hash))
    }

    /// Transition an item's verification status, appending provenance
    pub fn set_status(
        &self,
        evidence_id: &str,
        status: EvidenceStatus,
        actor: &str,
    ) -> CoreResult<()> {
        let hash = self
            .id_to_hash
            .get(evidence_id)
            .ok_or_else(|| CoreError::NotFound(format!("evidence {}", evidence_id)))?;
        let mut item = self
            .by_hash
            .get_mut(hash.value())
            .ok_or_else(|| CoreError::NotFound(format!("evidence {}", evidence_id)))?;
        item.status = status;
        item.provenance_chain.push(ProvenanceRecord {
            actor: actor.to_string(),
            action: format!("{:?}", status).to_lowercase(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Mark overdue items expired; returns how many flipped
    pub fn expire_sweep(&self) -> usize {
        let now = Utc::now();
        let mut flipped = 0usize;
        for mut entry in self.by_hash.iter_mut() {
            if entry.status == EvidenceStatus::Expired {
                continue;
            }
            if let Some(expires_at) = entry.expires_at {
                if expires_at < now {
                    entry.status = EvidenceStatus::Expired;
                    entry.provenance_chain.push(ProvenanceRecord {
                        actor: "system".into(),
                        action: "expired".into(),
                        at: now,
                    });
                    flipped += 1;
                }
            }
        }
        if flipped > 0 {
            tracing::info!(flipped, "evidence expiry sweep complete");
        }
        flipped
    }

    /// Total trust points an organization has accumulated
    pub fn trust_points(&self, organization_id: &str) -> u64 {
        self.org_index
            .get(organization_id)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|hash| self.by_hash.get(hash))
                    .map(|item| item.trust_points as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Unique items stored
    pub fn count(&self) -> u64 {
        self.stored.get()
    }

    /// Store calls that collapsed onto an existing item
    pub fn dedup_count(&self) -> u64 {
        self.deduplicated.get()
    }
}
