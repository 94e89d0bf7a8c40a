//! Extractor and loader contracts

use async_trait::async_trait;
use grc_common::CoreResult;
use serde_json::Value;

/// Emits a bounded sequence of records from a source
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Stage name for run reporting
    fn name(&self) -> &str;

    /// Pull records; `ctx` carries run parameters
    async fn extract(&self, ctx: &Value) -> CoreResult<Vec<Value>>;
}

/// Outcome of a load stage
#[derive(Debug, Clone)]
pub struct LoadSummary {
    /// Records written by the loader
    pub loaded: usize,
}

/// Writes validated records to a sink
#[async_trait]
pub trait Loader: Send + Sync {
    /// Stage name for run reporting
    fn name(&self) -> &str;

    /// Write records
    async fn load(&self, records: &[Value]) -> CoreResult<LoadSummary>;
}
