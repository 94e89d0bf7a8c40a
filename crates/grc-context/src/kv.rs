//! Backing key-value store abstraction
//!
//! The context fabric persists through this trait so a Redis-backed
//! implementation can replace [`MemoryKv`] without touching the store.
//! Index sets carry their own TTLs, extended to the longest-living entry
//! they reference; stale members are tolerated and filtered on read.

use async_trait::async_trait;
use dashmap::DashMap;
use grc_common::CoreResult;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Async keyed storage with TTLs and set values
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a string value
    async fn get(&self, key: &str) -> CoreResult<Option<String>>;

    /// Store a string value with an optional TTL
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CoreResult<()>;

    /// Delete a value; returns whether it existed
    async fn delete(&self, key: &str) -> CoreResult<bool>;

    /// Add a member to a set, extending the set's TTL if the new one is
    /// longer
    async fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> CoreResult<()>;

    /// Remove a member from a set
    async fn set_remove(&self, key: &str, member: &str) -> CoreResult<()>;

    /// All members of a set
    async fn set_members(&self, key: &str) -> CoreResult<Vec<String>>;

    /// Drop expired values; returns how many were removed
    async fn purge_expired(&self) -> CoreResult<usize>;
}

struct Expiring<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Expiring<T> {
    fn live(&self) -> bool {
        self.expires_at.map(|at| at > Instant::now()).unwrap_or(true)
    }
}

/// In-process KV store used by tests and single-node deployments
#[derive(Default)]
pub struct MemoryKv {
    strings: DashMap<String, Expiring<String>>,
    sets: DashMap<String, Expiring<HashSet<String>>>,
}

impl MemoryKv {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self
            .strings
            .get(key)
            .filter(|entry| entry.live())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CoreResult<()> {
        self.strings.insert(
            key.to_string(),
            Expiring {
                value,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CoreResult<bool> {
        Ok(self.strings.remove(key).is_some())
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> CoreResult<()> {
        let mut entry = self.sets.entry(key.to_string()).or_insert_with(|| Expiring {
            value: HashSet::new(),
            expires_at: None,
        });
        entry.value.insert(member.to_string());
        // Longest-living referenced entry wins
        let candidate = ttl.map(|ttl| Instant::now() + ttl);
        entry.expires_at = match (entry.expires_at, candidate) {
            (Some(current), Some(new)) => Some(current.max(new)),
            _ => None,
        };
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> CoreResult<()> {
        if let Some(mut entry) = self.sets.get_mut(key) {
            entry.value.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .sets
            .get(key)
            .filter(|entry| entry.live())
            .map(|entry| entry.value.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn purge_expired(&self) -> CoreResult<usize> {
        let before = self.strings.len() + self.sets.len();
        self.strings.retain(|_, entry| entry.live());
        self.sets.retain(|_, entry| entry.live());
        Ok(before - (self.strings.len() + self.sets.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let kv = MemoryKv::new();
        kv.set("context:org:e1", "payload".into(), None).await.unwrap();
        assert_eq!(kv.get("context:org:e1").await.unwrap().as_deref(), Some("payload"));
        assert!(kv.delete("context:org:e1").await.unwrap());
        assert_eq!(kv.get("context:org:e1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let kv = MemoryKv::new();
        kv.set("k", "v".into(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(kv.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
        assert_eq!(kv.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_membership() {
        let kv = MemoryKv::new();
        kv.set_add("idx:tag:aws:org", "e1", None).await.unwrap();
        kv.set_add("idx:tag:aws:org", "e2", None).await.unwrap();
        let mut members = kv.set_members("idx:tag:aws:org").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["e1", "e2"]);

        kv.set_remove("idx:tag:aws:org", "e1").await.unwrap();
        assert_eq!(kv.set_members("idx:tag:aws:org").await.unwrap(), vec!["e2"]);
    }

    #[tokio::test]
    async fn test_set_ttl_extends_to_longest() {
        let kv = MemoryKv::new();
        kv.set_add("idx", "short", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        kv.set_add("idx", "long", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Set survives because the longest referenced TTL wins
        assert_eq!(kv.set_members("idx").await.unwrap().len(), 2);
    }
}
