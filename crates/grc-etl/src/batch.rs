//! Batched parallel record processing
//!
//! Records group into fixed-size batches processed by a bounded worker
//! pool. A failed or timed-out batch marks every record in it failed; no
//! per-item rollback is assumed.

use grc_common::CoreResult;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Outcome of a batched run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Records submitted
    pub total_records: usize,
    /// Batches formed
    pub batches: usize,
    /// Records in batches that completed
    pub records_success: usize,
    /// Records in batches that failed or timed out
    pub records_failed: usize,
    /// Batches that failed or timed out
    pub failed_batches: usize,
}

/// Fixed-size batching over a bounded worker pool
pub struct BatchProcessor {
    batch_size: usize,
    max_workers: usize,
    batch_timeout: Duration,
}

impl BatchProcessor {
    /// Create a processor
    pub fn new(batch_size: usize, max_workers: usize, batch_timeout: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_workers: max_workers.max(1),
            batch_timeout,
        }
    }

    /// Process all records through `worker`, one call per batch
    pub async fn process<W, Fut>(&self, records: Vec<Value>, worker: W) -> BatchReport
    where
        W: Fn(Vec<Value>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = CoreResult<()>> + Send + 'static,
    {
        let total_records = records.len();
        let batches: Vec<Vec<Value>> = records
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let batch_count = batches.len();

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let timeout = self.batch_timeout;
        let mut handles = Vec::with_capacity(batch_count);

        for batch in batches {
            let semaphore = semaphore.clone();
            let worker = worker.clone();
            let size = batch.len();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                let outcome = tokio::time::timeout(timeout, worker(batch)).await;
                match outcome {
                    Ok(Ok(())) => (size, true),
                    Ok(Err(_)) | Err(_) => (size, false),
                }
            }));
        }

        let mut report = BatchReport {
            total_records,
            batches: batch_count,
            records_success: 0,
            records_failed: 0,
            failed_batches: 0,
        };
        for handle in handles {
            match handle.await {
                Ok((size, true)) => report.records_success += size,
                Ok((size, false)) => {
                    report.records_failed += size;
                    report.failed_batches += 1;
                }
                Err(_) => report.failed_batches += 1,
            }
        }

        tracing::debug!(
            total = report.total_records,
            failed = report.records_failed,
            "batch processing complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grc_common::CoreError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn records(count: usize) -> Vec<Value> {
        (0..count).map(|i| json!({ "id": i })).collect()
    }

    #[tokio::test]
    async fn test_all_batches_succeed() {
        let processor = BatchProcessor::new(10, 4, Duration::from_secs(1));
        let report = processor.process(records(35), |_batch| async { Ok(()) }).await;
        assert_eq!(report.batches, 4);
        assert_eq!(report.records_success, 35);
        assert_eq!(report.records_failed, 0);
    }

    #[tokio::test]
    async fn test_partial_batch_failure_fails_whole_batch() {
        let processor = BatchProcessor::new(10, 4, Duration::from_secs(1));
        let report = processor
            .process(records(30), |batch| async move {
                // The batch containing id 10 fails entirely
                if batch.iter().any(|r| r["id"] == 10) {
                    return Err(CoreError::Transient("sink rejected".into()));
                }
                Ok(())
            })
            .await;
        assert_eq!(report.records_failed, 10);
        assert_eq!(report.records_success, 20);
        assert_eq!(report.failed_batches, 1);
    }

    #[tokio::test]
    async fn test_batch_timeout_counts_as_failure() {
        let processor = BatchProcessor::new(5, 2, Duration::from_millis(30));
        let report = processor
            .process(records(5), |_batch| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;
        assert_eq!(report.records_failed, 5);
        assert_eq!(report.failed_batches, 1);
    }

    #[tokio::test]
    async fn test_worker_pool_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let processor = BatchProcessor::new(1, 3, Duration::from_secs(1));

        let in_flight_ref = in_flight.clone();
        let peak_ref = peak.clone();
        processor
            .process(records(12), move |_batch| {
                let in_flight = in_flight_ref.clone();
                let peak = peak_ref.clone();
                async move {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
