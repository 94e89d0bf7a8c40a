//! Platform configuration
//!
//! Every knob is overridable from the environment; defaults match the
//! documented platform behavior. Key material is random per-process when
//! not provided, which keeps test setups self-contained.

use rand::RngCore;

/// A named 256-bit encryption key
#[derive(Clone)]
pub struct EncryptionKey {
    /// Registry id, referenced by stored ciphertexts
    pub key_id: String,
    /// Raw key bytes
    pub key: [u8; 32],
}

/// Core configuration knobs
#[derive(Clone)]
pub struct CoreConfig {
    /// Per-agent in-flight task ceiling
    pub max_concurrent_tasks_per_agent: usize,
    /// Per-organization in-flight task ceiling
    pub global_concurrency_cap: usize,
    /// Applied when a task carries no timeout
    pub default_task_timeout_seconds: u64,
    /// Retries after the first attempt
    pub retry_max_attempts: u32,
    /// Base for exponential backoff
    pub retry_base_delay_seconds: u64,
    /// Backoff ceiling
    pub retry_max_delay_seconds: u64,
    /// Context cache capacity
    pub cache_max_entries: usize,
    /// Default TTL for cached context entries
    pub cache_ttl_seconds: u64,
    /// Expired-context sweep interval
    pub context_cleanup_interval_seconds: u64,
    /// Default audit retention
    pub audit_retention_days: u32,
    /// ETL batch size when the pipeline does not set one
    pub batch_default_size: usize,
    /// Per-batch processing deadline
    pub batch_timeout_milliseconds: u64,
    /// Master switch for context encryption
    pub encryption_enabled: bool,
    /// HMAC key for integrity seals
    pub integrity_key: Vec<u8>,
    /// AEAD key ring; first entry is the current write key
    pub encryption_key_ring: Vec<EncryptionKey>,
    /// Bound on queued tasks per organization
    pub task_queue_capacity: usize,
    /// Consecutive task failures before an agent is marked failed
    pub agent_failure_threshold: u32,
    /// How long completed task results are kept
    pub result_retention_seconds: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let mut integrity_key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut integrity_key);
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);

        Self {
            max_concurrent_tasks_per_agent: 5,
            global_concurrency_cap: 32,
            default_task_timeout_seconds: 300,
            retry_max_attempts: 3,
            retry_base_delay_seconds: 2,
            retry_max_delay_seconds: 300,
            cache_max_entries: 1000,
            cache_ttl_seconds: 3600,
            context_cleanup_interval_seconds: 300,
            audit_retention_days: 365 * 7,
            batch_default_size: 100,
            batch_timeout_milliseconds: 5000,
            encryption_enabled: true,
            integrity_key,
            encryption_key_ring: vec![EncryptionKey {
                key_id: "key-1".into(),
                key,
            }],
            task_queue_capacity: 10_000,
            agent_failure_threshold: 5,
            result_retention_seconds: 3600,
        }
    }
}

impl CoreConfig {
    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        read_usize("MAX_CONCURRENT_TASKS_PER_AGENT", &mut cfg.max_concurrent_tasks_per_agent);
        read_usize("GLOBAL_CONCURRENCY_CAP", &mut cfg.global_concurrency_cap);
        read_u64("DEFAULT_TASK_TIMEOUT_SECONDS", &mut cfg.default_task_timeout_seconds);
        read_u32("RETRY_MAX_ATTEMPTS", &mut cfg.retry_max_attempts);
        read_u64("RETRY_BASE_DELAY_SECONDS", &mut cfg.retry_base_delay_seconds);
        read_usize("CACHE_MAX_ENTRIES", &mut cfg.cache_max_entries);
        read_u64("CACHE_TTL_SECONDS", &mut cfg.cache_ttl_seconds);
        read_u64("CONTEXT_CLEANUP_INTERVAL_SECONDS", &mut cfg.context_cleanup_interval_seconds);
        read_u32("AUDIT_RETENTION_DAYS", &mut cfg.audit_retention_days);
        read_usize("BATCH_DEFAULT_SIZE", &mut cfg.batch_default_size);
        read_u64("BATCH_TIMEOUT_MILLISECONDS", &mut cfg.batch_timeout_milliseconds);

        if let Ok(v) = std::env::var("ENCRYPTION_ENABLED") {
            cfg.encryption_enabled = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("INTEGRITY_KEY") {
            cfg.integrity_key = v.into_bytes();
        }
        if let Ok(v) = std::env::var("ENCRYPTION_KEY_RING") {
            // "key_id:hex32;key_id:hex32", first entry is current
            let ring: Vec<EncryptionKey> = v
                .split(';')
                .filter_map(|pair| {
                    let (id, hex_key) = pair.split_once(':')?;
                    let bytes = hex::decode(hex_key).ok()?;
                    let key: [u8; 32] = bytes.try_into().ok()?;
                    Some(EncryptionKey { key_id: id.to_string(), key })
                })
                .collect();
            if !ring.is_empty() {
                cfg.encryption_key_ring = ring;
            }
        }
        cfg
    }
}

// Key material must never land in logs.
impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("max_concurrent_tasks_per_agent", &self.max_concurrent_tasks_per_agent)
            .field("global_concurrency_cap", &self.global_concurrency_cap)
            .field("default_task_timeout_seconds", &self.default_task_timeout_seconds)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("audit_retention_days", &self.audit_retention_days)
            .field("encryption_enabled", &self.encryption_enabled)
            .field("integrity_key", &"<redacted>")
            .field("encryption_key_ring", &format!("<{} keys>", self.encryption_key_ring.len()))
            .finish_non_exhaustive()
    }
}

fn read_usize(name: &str, target: &mut usize) {
    if let Some(v) = std::env::var(name).ok().and_then(|v| v.parse().ok()) {
        *target = v;
    }
}

fn read_u64(name: &str, target: &mut u64) {
    if let Some(v) = std::env::var(name).ok().and_then(|v| v.parse().ok()) {
        *target = v;
    }
}

fn read_u32(name: &str, target: &mut u32) {
    if let Some(v) = std::env::var(name).ok().and_then(|v| v.parse().ok()) {
        *target = v;
    }
}
