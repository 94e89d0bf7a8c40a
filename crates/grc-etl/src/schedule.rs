//! Pipeline scheduling
//!
//! A background loop checks due pipelines every tick (60 seconds in
//! production). A failed run retries after a fixed delay up to
//! `max_retries`; the retry counter resets on success.

use crate::pipeline::{EtlPipeline, RunState};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use dashmap::DashMap;
use grc_common::{CoreError, CoreResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// When a pipeline should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// Every N minutes
    EveryMinutes(u32),
    /// Every N hours
    EveryHours(u32),
    /// Once a day at HH:MM UTC
    DailyAt {
        /// Hour 0..=23
        hour: u8,
        /// Minute 0..=59
        minute: u8,
    },
}

impl ScheduleSpec {
    /// Next run time strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ScheduleSpec::EveryMinutes(minutes) => {
                after + ChronoDuration::minutes(*minutes as i64)
            }
            ScheduleSpec::EveryHours(hours) => after + ChronoDuration::hours(*hours as i64),
            ScheduleSpec::DailyAt { hour, minute } => {
                let today = after
                    .with_hour(*hour as u32)
                    .and_then(|t| t.with_minute(*minute as u32))
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0))
                    .unwrap_or(after);
                if today > after {
                    today
                } else {
                    today + ChronoDuration::days(1)
                }
            }
        }
    }
}

struct ScheduledPipeline {
    pipeline: Arc<EtlPipeline>,
    spec: ScheduleSpec,
    next_run: DateTime<Utc>,
    retry_count: u32,
    max_retries: u32,
    retry_delay: ChronoDuration,
    enabled: bool,
}

/// Registers pipelines and dispatches them when due
pub struct ScheduleManager {
    scheduled: DashMap<String, ScheduledPipeline>,
    tick_interval: Duration,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl ScheduleManager {
    /// Create a manager with the production 60-second tick
    pub fn new() -> Self {
        Self::with_tick_interval(Duration::from_secs(60))
    }

    /// Create a manager with a custom tick (tests)
    pub fn with_tick_interval(tick_interval: Duration) -> Self {
        Self {
            scheduled: DashMap::new(),
            tick_interval,
            shutdown: Mutex::new(None),
        }
    }

    /// Register a pipeline on a schedule
    pub fn schedule(
        &self,
        pipeline: Arc<EtlPipeline>,
        spec: ScheduleSpec,
        max_retries: u32,
        retry_delay_seconds: u64,
    ) {
        let pipeline_id = pipeline.id().to_string();
        tracing::info!(pipeline = %pipeline_id, spec = ?spec, "pipeline scheduled");
        self.scheduled.insert(
            pipeline_id,
            ScheduledPipeline {
                pipeline,
                spec,
                next_run: spec.next_after(Utc::now()),
                retry_count: 0,
                max_retries,
                retry_delay: ChronoDuration::seconds(retry_delay_seconds as i64),
                enabled: true,
            },
        );
    }

    /// Remove a pipeline from the schedule; returns whether it existed
    pub fn unschedule(&self, pipeline_id: &str) -> bool {
        self.scheduled.remove(pipeline_id).is_some()
    }

    /// Enable or disable a schedule without removing it
    pub fn set_enabled(&self, pipeline_id: &str, enabled: bool) -> CoreResult<()> {
        let mut entry = self
            .scheduled
            .get_mut(pipeline_id)
            .ok_or_else(|| CoreError::NotFound(format!("schedule {}", pipeline_id)))?;
        entry.enabled = enabled;
        Ok(())
    }

    /// Next run time for a scheduled pipeline
    pub fn next_run(&self, pipeline_id: &str) -> Option<DateTime<Utc>> {
        self.scheduled.get(pipeline_id).map(|entry| entry.next_run)
    }

    /// Run every due pipeline once; returns how many were dispatched
    ///
    /// Called by the background loop each tick; public so tests and
    /// embedders can drive the schedule directly.
    pub async fn tick(&self) -> usize {
        let now = Utc::now();
        let due: Vec<(String, Arc<EtlPipeline>)> = self
            .scheduled
            .iter()
            .filter(|entry| entry.enabled && entry.next_run <= now)
            .map(|entry| (entry.key().clone(), entry.pipeline.clone()))
            .collect();

        let mut dispatched = 0;
        for (pipeline_id, pipeline) in due {
            dispatched += 1;
            let outcome = pipeline.run(&json!({"scheduled": true})).await;

            let Some(mut entry) = self.scheduled.get_mut(&pipeline_id) else {
                continue;
            };
            match outcome {
                Ok(run) if run.state == RunState::Success => {
                    entry.retry_count = 0;
                    entry.next_run = entry.spec.next_after(now);
                }
                // A concurrent manual run holds the single-flight slot;
                // check again next tick without burning a retry
                Err(CoreError::AlreadyRunning(_)) => {}
                _ => {
                    entry.retry_count += 1;
                    if entry.retry_count <= entry.max_retries {
                        entry.next_run = now + entry.retry_delay;
                        tracing::warn!(
                            pipeline = %pipeline_id,
                            retry = entry.retry_count,
                            "scheduled run failed, retrying"
                        );
                    } else {
                        entry.retry_count = 0;
                        entry.next_run = entry.spec.next_after(now);
                        tracing::warn!(
                            pipeline = %pipeline_id,
                            "scheduled run exhausted retries, waiting for next window"
                        );
                    }
                }
            }
        }
        dispatched
    }

    /// Start the background loop
    pub fn start(self: &Arc<Self>) {
        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock() = Some(tx);
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.tick().await;
                    }
                    _ = rx.changed() => break,
                }
            }
            tracing::info!("schedule loop stopped");
        });
    }

    /// Stop the background loop
    pub fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(true);
        }
    }
}

impl Default for ScheduleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{Extractor, LoadSummary, Loader};
    use crate::transform::TransformRegistry;
    use crate::validate::ValidationRegistry;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingExtractor {
        runs: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Extractor for CountingExtractor {
        fn name(&self) -> &str {
            "counting"
        }

        async fn extract(&self, _ctx: &Value) -> CoreResult<Vec<Value>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(CoreError::Transient("flaky source".into()));
            }
            Ok(vec![json!({"id": 1})])
        }
    }

    struct NullLoader;

    #[async_trait]
    impl Loader for NullLoader {
        fn name(&self) -> &str {
            "null"
        }

        async fn load(&self, records: &[Value]) -> CoreResult<LoadSummary> {
            Ok(LoadSummary {
                loaded: records.len(),
            })
        }
    }

    fn pipeline(runs: Arc<AtomicUsize>, fail: Arc<AtomicBool>) -> Arc<EtlPipeline> {
        let transforms = TransformRegistry::new();
        let validations = ValidationRegistry::new();
        Arc::new(
            EtlPipeline::builder("p1", "scheduled", &transforms, &validations)
                .add_extractor(Arc::new(CountingExtractor { runs, fail }))
                .add_loader(Arc::new(NullLoader))
                .build(),
        )
    }

    #[test]
    fn test_daily_at_next_run() {
        let spec = ScheduleSpec::DailyAt { hour: 2, minute: 30 };
        let after = Utc::now();
        let next = spec.next_after(after);
        assert!(next > after);
        assert_eq!(next.hour(), 2);
        assert_eq!(next.minute(), 30);
        assert!(next - after <= ChronoDuration::days(1));
    }

    #[tokio::test]
    async fn test_due_pipeline_dispatched_and_rescheduled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(false));
        let manager = ScheduleManager::with_tick_interval(Duration::from_millis(10));
        manager.schedule(pipeline(runs.clone(), fail), ScheduleSpec::EveryMinutes(5), 3, 60);

        // Not due yet
        assert_eq!(manager.tick().await, 0);

        // Force due
        manager.scheduled.get_mut("p1").unwrap().next_run = Utc::now() - ChronoDuration::seconds(1);
        assert_eq!(manager.tick().await, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Rescheduled into the future
        assert!(manager.next_run("p1").unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_failure_retries_with_fixed_delay_and_resets() {
        let runs = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(true));
        let manager = ScheduleManager::with_tick_interval(Duration::from_millis(10));
        manager.schedule(
            pipeline(runs.clone(), fail.clone()),
            ScheduleSpec::EveryHours(1),
            3,
            30,
        );

        manager.scheduled.get_mut("p1").unwrap().next_run = Utc::now() - ChronoDuration::seconds(1);
        manager.tick().await;

        // Failed: retry scheduled at ~30s, not the 1h window
        let next = manager.next_run("p1").unwrap();
        assert!(next - Utc::now() < ChronoDuration::minutes(5));
        assert_eq!(manager.scheduled.get("p1").unwrap().retry_count, 1);

        // Success resets the retry counter
        fail.store(false, Ordering::SeqCst);
        manager.scheduled.get_mut("p1").unwrap().next_run = Utc::now() - ChronoDuration::seconds(1);
        manager.tick().await;
        assert_eq!(manager.scheduled.get("p1").unwrap().retry_count, 0);
        assert!(manager.next_run("p1").unwrap() - Utc::now() > ChronoDuration::minutes(50));
    }

    #[tokio::test]
    async fn test_retries_exhausted_waits_for_next_window() {
        let runs = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(true));
        let manager = ScheduleManager::with_tick_interval(Duration::from_millis(10));
        manager.schedule(pipeline(runs.clone(), fail), ScheduleSpec::EveryHours(1), 1, 1);

        for _ in 0..2 {
            manager.scheduled.get_mut("p1").unwrap().next_run =
                Utc::now() - ChronoDuration::seconds(1);
            manager.tick().await;
        }
        // Two failures with max_retries=1: counter reset, next regular window
        assert_eq!(manager.scheduled.get("p1").unwrap().retry_count, 0);
        assert!(manager.next_run("p1").unwrap() - Utc::now() > ChronoDuration::minutes(50));
    }

    #[tokio::test]
    async fn test_disabled_schedule_skipped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(false));
        let manager = ScheduleManager::with_tick_interval(Duration::from_millis(10));
        manager.schedule(pipeline(runs.clone(), fail), ScheduleSpec::EveryMinutes(1), 0, 1);
        manager.set_enabled("p1", false).unwrap();

        manager.scheduled.get_mut("p1").unwrap().next_run = Utc::now() - ChronoDuration::seconds(1);
        assert_eq!(manager.tick().await, 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
