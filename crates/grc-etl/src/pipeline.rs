//! Pipeline definition and run engine

use crate::stages::{Extractor, Loader};
use crate::transform::{TransformFn, TransformRegistry};
use crate::validate::{ValidationFn, ValidationRegistry, ValidationResult};
use chrono::{DateTime, Utc};
use grc_common::{CoreError, CoreResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Terminal and in-flight run states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Executing
    Running,
    /// Finished; failed records, if any, are counted in the run
    Success,
    /// A stage raised an error
    Failed,
}

/// One execution of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run id
    pub run_id: String,
    /// Pipeline id
    pub pipeline_id: String,
    /// Run state
    pub state: RunState,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Completion time
    pub completed_at: Option<DateTime<Utc>>,
    /// Records extracted
    pub records_processed: usize,
    /// Records that passed validation and loaded
    pub records_success: usize,
    /// Records rejected by validation
    pub records_failed: usize,
    /// Stage error for failed runs
    pub error: Option<String>,
    /// Aggregated validation outcome
    pub validation: Option<ValidationResult>,
}

/// Handler invoked when a run fails at any stage
pub type ErrorHandler = Arc<dyn Fn(&str, &CoreError) + Send + Sync>;

/// A configured extract → transform → validate → load chain
pub struct EtlPipeline {
    pipeline_id: String,
    name: String,
    extractors: Vec<Arc<dyn Extractor>>,
    transformations: Vec<(String, TransformFn)>,
    validations: Vec<(String, Value, ValidationFn)>,
    loaders: Vec<Arc<dyn Loader>>,
    error_handlers: Vec<ErrorHandler>,
    abort_on_invalid: bool,
    running: AtomicBool,
    last_run: RwLock<Option<PipelineRun>>,
    runs_total: AtomicU64,
    runs_succeeded: AtomicU64,
}

/// Builder resolving stage names against the registries
pub struct PipelineBuilder<'a> {
    transform_registry: &'a TransformRegistry,
    validation_registry: &'a ValidationRegistry,
    pipeline_id: String,
    name: String,
    extractors: Vec<Arc<dyn Extractor>>,
    transformations: Vec<(String, TransformFn)>,
    validations: Vec<(String, Value, ValidationFn)>,
    loaders: Vec<Arc<dyn Loader>>,
    error_handlers: Vec<ErrorHandler>,
    abort_on_invalid: bool,
}

impl<'a> PipelineBuilder<'a> {
    /// Add an extractor stage
    pub fn add_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Reference a registered transformation by name
    pub fn add_transformation(mut self, name: &str) -> CoreResult<Self> {
        let transform = self.transform_registry.resolve(name)?;
        self.transformations.push((name.to_string(), transform));
        Ok(self)
    }

    /// Reference a registered validation rule by name with parameters
    pub fn add_validation(mut self, name: &str, params: Value) -> CoreResult<Self> {
        let rule = self.validation_registry.resolve(name)?;
        self.validations.push((name.to_string(), params, rule));
        Ok(self)
    }

    /// Add a loader stage
    pub fn add_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Register an error handler
    pub fn add_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handlers.push(handler);
        self
    }

    /// Abort the run instead of dropping invalid records
    pub fn abort_on_invalid(mut self) -> Self {
        self.abort_on_invalid = true;
        self
    }

    /// Finish construction
    pub fn build(self) -> EtlPipeline {
        EtlPipeline {
            pipeline_id: self.pipeline_id,
            name: self.name,
            extractors: self.extractors,
            transformations: self.transformations,
            validations: self.validations,
            loaders: self.loaders,
            error_handlers: self.error_handlers,
            abort_on_invalid: self.abort_on_invalid,
            running: AtomicBool::new(false),
            last_run: RwLock::new(None),
            runs_total: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
        }
    }
}

impl EtlPipeline {
    /// Start building a pipeline against the given registries
    pub fn builder<'a>(
        pipeline_id: &str,
        name: &str,
        transform_registry: &'a TransformRegistry,
        validation_registry: &'a ValidationRegistry,
    ) -> PipelineBuilder<'a> {
        PipelineBuilder {
            transform_registry,
            validation_registry,
            pipeline_id: pipeline_id.to_string(),
            name: name.to_string(),
            extractors: Vec::new(),
            transformations: Vec::new(),
            validations: Vec::new(),
            loaders: Vec::new(),
            error_handlers: Vec::new(),
            abort_on_invalid: false,
        }
    }

    /// Pipeline id
    pub fn id(&self) -> &str {
        &self.pipeline_id
    }

    /// Pipeline display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute the chain once; a second concurrent call fails
    /// `AlreadyRunning`
    pub async fn run(&self, ctx: &Value) -> CoreResult<PipelineRun> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CoreError::AlreadyRunning(self.pipeline_id.clone()));
        }

        let mut run = PipelineRun {
            run_id: Uuid::new_v4().to_string(),
            pipeline_id: self.pipeline_id.clone(),
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            records_processed: 0,
            records_success: 0,
            records_failed: 0,
            error: None,
            validation: None,
        };
        tracing::info!(pipeline = %self.pipeline_id, run = %run.run_id, "pipeline run started");
        self.runs_total.fetch_add(1, Ordering::Relaxed);

        let outcome = self.execute(ctx, &mut run).await;
        run.completed_at = Some(Utc::now());
        match outcome {
            Ok(()) => {
                run.state = RunState::Success;
                self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                run.state = RunState::Failed;
                run.error = Some(err.to_string());
                for handler in &self.error_handlers {
                    handler(&self.pipeline_id, &err);
                }
                tracing::warn!(pipeline = %self.pipeline_id, error = %err, "pipeline run failed");
            }
        }

        *self.last_run.write() = Some(run.clone());
        self.running.store(false, Ordering::Release);
        Ok(run)
    }

    async fn execute(&self, ctx: &Value, run: &mut PipelineRun) -> CoreResult<()> {
        // Extract
        let mut records = Vec::new();
        for extractor in &self.extractors {
            let mut extracted = extractor.extract(ctx).await?;
            tracing::debug!(
                stage = extractor.name(),
                count = extracted.len(),
                "extraction complete"
            );
            records.append(&mut extracted);
        }
        run.records_processed = records.len();

        // Transform
        for (name, transform) in &self.transformations {
            records = transform(records)
                .map_err(|err| CoreError::Permanent(format!("transformation {}: {}", name, err)))?;
        }
        // Transformations may drop records (dedup); processed counts the
        // post-transform batch that validation judges
        run.records_processed = records.len();

        // Validate
        let mut validation = ValidationResult::passing(records.len());
        for (_, params, rule) in &self.validations {
            validation.merge(rule(&records, params));
        }
        let failed = validation.failed_indices();
        run.records_failed = failed.len();
        run.validation = Some(validation.clone());

        if self.abort_on_invalid && !failed.is_empty() {
            return Err(CoreError::ValidationFailed(format!(
                "{} records rejected",
                failed.len()
            )));
        }

        let valid_records: Vec<Value> = records
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !failed.contains(index))
            .map(|(_, record)| record)
            .collect();
        run.records_success = valid_records.len();

        // Load
        for loader in &self.loaders {
            let summary = loader.load(&valid_records).await?;
            tracing::debug!(stage = loader.name(), loaded = summary.loaded, "load complete");
        }

        Ok(())
    }

    /// Most recent run, if any
    pub fn last_run(&self) -> Option<PipelineRun> {
        self.last_run.read().clone()
    }

    /// Fraction of runs that finished `Success`
    pub fn success_rate(&self) -> f64 {
        let total = self.runs_total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.runs_succeeded.load(Ordering::Relaxed) as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::LoadSummary;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    struct VecExtractor {
        records: Vec<Value>,
        fail: bool,
    }

    #[async_trait]
    impl Extractor for VecExtractor {
        fn name(&self) -> &str {
            "vec"
        }

        async fn extract(&self, _ctx: &Value) -> CoreResult<Vec<Value>> {
            if self.fail {
                return Err(CoreError::Transient("source unreachable".into()));
            }
            Ok(self.records.clone())
        }
    }

    #[derive(Default)]
    struct CapturingLoader {
        received: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Loader for CapturingLoader {
        fn name(&self) -> &str {
            "capture"
        }

        async fn load(&self, records: &[Value]) -> CoreResult<LoadSummary> {
            self.received.lock().extend(records.iter().cloned());
            Ok(LoadSummary {
                loaded: records.len(),
            })
        }
    }

    fn hundred_records_with_seven_bad() -> Vec<Value> {
        (0..100)
            .map(|i| {
                if i % 15 == 0 {
                    // 0, 15, 30, 45, 60, 75, 90 -> 7 records without name
                    json!({ "id": i })
                } else {
                    json!({ "id": i, "name": format!("resource-{}", i) })
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_validation_failures_counted_not_fatal() {
        let transforms = TransformRegistry::new();
        let validations = ValidationRegistry::new();
        let loader = Arc::new(CapturingLoader::default());

        let pipeline = EtlPipeline::builder("p1", "asset sync", &transforms, &validations)
            .add_extractor(Arc::new(VecExtractor {
                records: hundred_records_with_seven_bad(),
                fail: false,
            }))
            .add_validation("required_fields", json!({"fields": ["name"]}))
            .unwrap()
            .add_loader(loader.clone())
            .build();

        let run = pipeline.run(&json!({})).await.unwrap();
        assert_eq!(run.state, RunState::Success);
        assert_eq!(run.records_processed, 100);
        assert_eq!(run.records_failed, 7);
        assert_eq!(run.records_success, 93);
        assert_eq!(run.validation.as_ref().unwrap().errors.len(), 7);
        assert_eq!(loader.received.lock().len(), 93);
    }

    #[tokio::test]
    async fn test_single_flight() {
        let transforms = TransformRegistry::new();
        let validations = ValidationRegistry::new();
        let pipeline = Arc::new(
            EtlPipeline::builder("p1", "slow", &transforms, &validations)
                .add_extractor(Arc::new(VecExtractor {
                    records: vec![json!({"id": 1})],
                    fail: false,
                }))
                .build(),
        );

        // Simulate an in-flight run by holding the flag
        pipeline.running.store(true, Ordering::Release);
        let second = pipeline.run(&json!({})).await;
        assert!(matches!(second, Err(CoreError::AlreadyRunning(_))));
        pipeline.running.store(false, Ordering::Release);

        // Released flag allows the next run
        assert!(pipeline.run(&json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_extractor_error_fails_run_and_calls_handlers() {
        let transforms = TransformRegistry::new();
        let validations = ValidationRegistry::new();
        let handled: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let handled_ref = handled.clone();

        let pipeline = EtlPipeline::builder("p1", "failing", &transforms, &validations)
            .add_extractor(Arc::new(VecExtractor {
                records: vec![],
                fail: true,
            }))
            .add_error_handler(Arc::new(move |pipeline_id, err| {
                handled_ref.lock().push(format!("{}: {}", pipeline_id, err));
            }))
            .build();

        let run = pipeline.run(&json!({})).await.unwrap();
        assert_eq!(run.state, RunState::Failed);
        assert!(run.error.is_some());
        assert_eq!(handled.lock().len(), 1);
        assert_eq!(pipeline.success_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_transformations_applied_in_order() {
        let transforms = TransformRegistry::new();
        let validations = ValidationRegistry::new();
        let loader = Arc::new(CapturingLoader::default());

        let pipeline = EtlPipeline::builder("p1", "cleanup", &transforms, &validations)
            .add_extractor(Arc::new(VecExtractor {
                records: vec![
                    json!({"name": "  acme  corp "}),
                    json!({"name": "acme corp"}),
                ],
                fail: false,
            }))
            .add_transformation("clean_text")
            .unwrap()
            .add_transformation("remove_duplicates")
            .unwrap()
            .add_loader(loader.clone())
            .build();

        let run = pipeline.run(&json!({})).await.unwrap();
        // clean_text makes the two records identical, dedup drops one
        assert_eq!(run.records_success, 1);
        assert_eq!(loader.received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_abort_on_invalid() {
        let transforms = TransformRegistry::new();
        let validations = ValidationRegistry::new();

        let pipeline = EtlPipeline::builder("p1", "strict", &transforms, &validations)
            .add_extractor(Arc::new(VecExtractor {
                records: vec![json!({"id": 1})],
                fail: false,
            }))
            .add_validation("required_fields", json!({"fields": ["name"]}))
            .unwrap()
            .abort_on_invalid()
            .build();

        let run = pipeline.run(&json!({})).await.unwrap();
        assert_eq!(run.state, RunState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_stage_name_is_startup_error() {
        let transforms = TransformRegistry::new();
        let validations = ValidationRegistry::new();
        let result =
            EtlPipeline::builder("p1", "bad", &transforms, &validations).add_transformation("nope");
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
