//! Queue and result-backend integration tests.
//!
//! These exercise the Redis-backed delivery list and job records end to end
//! and require a running Redis instance configured via REDIS_URL.
//! Run with: cargo test --test integration_test -- --ignored

use ct_inference::models::job::{CaseRef, JobKind, JobStatus};
use ct_inference::models::report::PlaneReport;
use ct_inference::services::inference::{InferenceBackend, InferenceError};
use ct_inference::services::paths::PathResolver;
use ct_inference::services::queue::{Claim, JobQueue};
use ct_inference::services::storage::{ObjectStore, StorageError};
use ct_inference::services::worker::{JobRunner, StageTimeouts, Worker};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn queue() -> JobQueue {
    dotenvy::dotenv().ok();
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());
    JobQueue::new(&redis_url, 3600).expect("Failed to initialize job queue")
}

#[tokio::test]
#[ignore]
async fn job_lifecycle_through_the_queue() {
    let queue = queue();
    let case = CaseRef::new("u1", "c1");

    // Submit: record is visible as pending immediately.
    let job_id = queue
        .enqueue(JobKind::Segmentation, &case)
        .await
        .expect("Failed to enqueue");
    assert_eq!(
        queue.fetch_status(job_id).await.unwrap(),
        Some(JobStatus::Pending)
    );

    // Dequeue and claim.
    let envelope = queue
        .dequeue()
        .await
        .expect("Failed to dequeue")
        .expect("No job in queue");
    assert_eq!(envelope.job_id, job_id);
    assert_eq!(envelope.kind, JobKind::Segmentation);
    assert_eq!(envelope.case, case);

    assert_eq!(queue.claim(job_id).await.unwrap(), Claim::Claimed);
    assert_eq!(
        queue.fetch_status(job_id).await.unwrap(),
        Some(JobStatus::Running)
    );

    // Terminal write with the result payload.
    let result = serde_json::json!("doctor/u1/ct/c1/models/custom");
    queue
        .complete(job_id, &result)
        .await
        .expect("Failed to complete");

    let record = queue
        .fetch_record(job_id)
        .await
        .expect("Failed to fetch record")
        .expect("Record not found");
    assert_eq!(record.status, JobStatus::Succeeded);
    assert_eq!(record.result, Some(result));
    assert_eq!(record.error, None);

    // Terminal states are final: no further transition is accepted, and a
    // redelivered envelope is dropped instead of re-claimed.
    assert!(queue.fail(job_id, "late failure").await.is_err());
    assert_eq!(
        queue.claim(job_id).await.unwrap(),
        Claim::AlreadyTerminal(JobStatus::Succeeded)
    );

    queue.ack(&envelope).await.expect("Failed to ack");
}

#[tokio::test]
#[ignore]
async fn failed_jobs_carry_only_the_failure_description() {
    let queue = queue();
    let case = CaseRef::new("u1", "c1");

    let job_id = queue.enqueue(JobKind::Plane, &case).await.unwrap();
    let envelope = queue.dequeue().await.unwrap().expect("No job in queue");
    queue.claim(job_id).await.unwrap();

    queue
        .fail(job_id, "compute failed: CUDA out of memory")
        .await
        .unwrap();

    let record = queue.fetch_record(job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(
        record.error.as_deref(),
        Some("compute failed: CUDA out of memory")
    );
    assert_eq!(record.result, None);

    queue.ack(&envelope).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn concurrent_submissions_yield_distinct_ids() {
    let queue = queue();
    let case = CaseRef::new("u9", "c9");

    let submissions = (0..8).map(|_| queue.enqueue(JobKind::Segmentation, &case));
    let ids: Vec<_> = futures::future::join_all(submissions)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("All submissions should succeed");

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());

    // Drain what we submitted so repeated runs start clean.
    for _ in 0..ids.len() {
        if let Some(envelope) = queue.dequeue().await.unwrap() {
            queue.ack(&envelope).await.unwrap();
        }
    }
}

#[tokio::test]
#[ignore]
async fn crashed_worker_envelopes_are_requeued() {
    let queue = queue();
    let case = CaseRef::new("u3", "c3");

    let job_id = queue.enqueue(JobKind::Segmentation, &case).await.unwrap();

    // Simulate a crash: the envelope is dequeued onto the processing list
    // and the worker dies before acking. The record is stuck non-terminal.
    let envelope = queue.dequeue().await.unwrap().expect("No job in queue");
    assert_eq!(envelope.job_id, job_id);
    assert_eq!(
        queue.fetch_status(job_id).await.unwrap(),
        Some(JobStatus::Pending)
    );

    // Startup recovery moves it back onto the queue for redelivery.
    let requeued = queue.recover().await.expect("Failed to recover");
    assert!(requeued >= 1);

    let mut redelivered = false;
    while let Some(envelope) = queue.dequeue().await.unwrap() {
        if envelope.job_id == job_id {
            redelivered = true;
        }
        queue.ack(&envelope).await.unwrap();
    }
    assert!(redelivered, "crashed job was not redelivered");
}

/// Store whose reads always miss; enough to drive a job to a fetch failure.
struct EmptyStore;

impl ObjectStore for EmptyStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        Err(StorageError::ObjectNotFound(key.to_string()))
    }

    async fn put(&self, _key: &str, _data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

struct NoModel;

impl InferenceBackend for NoModel {
    async fn segment(
        &self,
        _input: &Path,
        _output_dir: &Path,
    ) -> Result<Vec<PathBuf>, InferenceError> {
        unreachable!("fetch fails before compute")
    }

    async fn locate_planes(&self, _input: &Path) -> Result<PlaneReport, InferenceError> {
        unreachable!("fetch fails before compute")
    }
}

#[tokio::test]
#[ignore]
async fn queue_depth_gauge_is_sampled_after_each_processed_job() {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    let queue = Arc::new(queue());
    let job_id = queue
        .enqueue(JobKind::Segmentation, &CaseRef::new("u4", "c4"))
        .await
        .unwrap();

    let runner = JobRunner::new(
        EmptyStore,
        NoModel,
        PathResolver::new(
            "doctor/{uid}/ct/{cid}/models/images",
            "doctor/{uid}/ct/{cid}/models/custom",
        )
        .unwrap(),
        std::env::temp_dir().join("ct-inference-gauge-test"),
        StageTimeouts {
            fetch: Duration::from_secs(5),
            compute: Duration::from_secs(5),
            upload: Duration::from_secs(5),
        },
    );
    let worker = Worker::new(queue.clone(), runner, Duration::from_millis(10));

    assert!(worker.process_next().await.expect("Failed to process"));

    // The fetch miss terminates the job; the gauge is refreshed as part of
    // handling it, not just on idle polls.
    let record = queue.fetch_record(job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error.unwrap().contains("object not found"));

    let rendered = handle.render();
    assert!(rendered.contains("inference_queue_depth"));
    assert!(rendered.contains("inference_jobs_failed_total"));
}

#[tokio::test]
#[ignore]
async fn unknown_job_ids_have_no_record() {
    let queue = queue();
    let missing = uuid::Uuid::new_v4();

    assert!(queue.fetch_status(missing).await.unwrap().is_none());
    assert!(queue.fetch_record(missing).await.unwrap().is_none());
}
