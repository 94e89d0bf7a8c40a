//! External capability interfaces
//!
//! The core orchestrates AI models and cloud scanners without knowing
//! their internals: agents consume these traits, adapters implement them.
//! Scanner credentials are injected through the context store as `secret`
//! entries owned by the scanning agent kind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grc_common::{CoreResult, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Opaque AI model access
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Free-form completion
    async fn complete(&self, prompt: &str, options: &Value) -> CoreResult<String>;

    /// Label classification
    async fn classify(&self, input: &str, options: &Value) -> CoreResult<Vec<String>>;
}

/// Normalised shape of a scanned cloud resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedResource {
    /// Provider-scoped resource id
    pub id: String,
    /// Display name
    pub name: String,
    /// Resource type, e.g. `s3_bucket`
    pub resource_type: String,
    /// Region the resource lives in
    pub region: String,
    /// Cloud provider name
    pub provider: String,
    /// Resource tags
    pub tags: HashMap<String, String>,
    /// Creation time when known
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time when known
    pub last_modified: Option<DateTime<Utc>>,
    /// Normalised compliance verdict
    pub compliance_status: String,
    /// Raw findings
    pub findings: Vec<Value>,
    /// Risk grade of the worst finding
    pub risk_level: Severity,
}

/// Opaque cloud scanning capability
#[async_trait]
pub trait ScannerPlugin: Send + Sync {
    /// Provider this plugin scans
    fn provider(&self) -> &str;

    /// Enumerate resources within `scope` using injected credentials
    async fn scan(&self, credentials: &Value, scope: &Value) -> CoreResult<Vec<ScannedResource>>;
}
