//! GRC ETL Runtime
//!
//! Pipelines chain extractors, named transformations, named validation
//! rules and loaders over JSON records. Stage registries resolve names at
//! pipeline construction, so an unknown name is a startup error rather
//! than a runtime one. Runs are single-flight per pipeline; the schedule
//! manager re-dispatches due pipelines every tick and retries failures
//! with a fixed delay.

#![warn(missing_docs)]

pub mod batch;
pub mod pipeline;
pub mod schedule;
pub mod stages;
pub mod transform;
pub mod validate;

pub use batch::{BatchProcessor, BatchReport};
pub use pipeline::{EtlPipeline, PipelineBuilder, PipelineRun, RunState};
pub use schedule::{ScheduleManager, ScheduleSpec};
pub use stages::{Extractor, LoadSummary, Loader};
pub use transform::TransformRegistry;
pub use validate::{ValidationError, ValidationRegistry, ValidationResult};
