use serde_json::json;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use uuid::Uuid;

use crate::models::job::{CaseRef, JobKind};
use crate::services::inference::{InferenceBackend, InferenceError};
use crate::services::paths::{ArtifactKind, PathResolver};
use crate::services::queue::{Claim, JobEnvelope, JobQueue, QueueError};
use crate::services::storage::{ObjectStore, StorageError};

/// Per-stage deadlines. A stage that outlives its deadline fails the job with
/// a timeout cause instead of stalling the worker indefinitely.
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    pub fetch: Duration,
    pub compute: Duration,
    pub upload: Duration,
}

/// Executes one job through the fetch -> compute -> upload staging protocol.
///
/// All object keys are recomputed from the job arguments, and the local
/// staging layout is keyed by job id, so re-running a redelivered job is
/// overwrite-safe end to end. A failure in any stage fails the job: compute
/// against a missing input, or a success whose artifacts never landed in the
/// store, are both reported as failures rather than silently completed.
pub struct JobRunner<S, B> {
    store: S,
    backend: B,
    paths: PathResolver,
    staging_dir: PathBuf,
    timeouts: StageTimeouts,
}

impl<S: ObjectStore, B: InferenceBackend> JobRunner<S, B> {
    pub fn new(
        store: S,
        backend: B,
        paths: PathResolver,
        staging_dir: impl Into<PathBuf>,
        timeouts: StageTimeouts,
    ) -> Self {
        Self {
            store,
            backend,
            paths,
            staging_dir: staging_dir.into(),
            timeouts,
        }
    }

    /// Run one claimed job to completion, returning the per-kind result
    /// payload or the failure that terminates it.
    pub async fn execute(
        &self,
        job_id: Uuid,
        kind: JobKind,
        case: &CaseRef,
    ) -> Result<serde_json::Value, JobFailure> {
        let job_dir = self.staging_dir.join(job_id.to_string());
        let outcome = match kind {
            JobKind::Segmentation => self.run_segmentation(case, &job_dir).await,
            JobKind::Plane => self.run_plane(case, &job_dir).await,
        };
        tokio::fs::remove_dir_all(&job_dir).await.ok();
        outcome
    }

    async fn run_segmentation(
        &self,
        case: &CaseRef,
        job_dir: &Path,
    ) -> Result<serde_json::Value, JobFailure> {
        let input = self.fetch_input_volume(case, job_dir).await?;

        let output_dir = job_dir.join("out");
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(JobFailure::Staging)?;

        let mesh_files = stage("compute", self.timeouts.compute, async {
            self.backend.segment(&input, &output_dir).await
        })
        .await?
        .map_err(JobFailure::Compute)?;
        tracing::debug!(case_id = %case.case_id, files = mesh_files.len(), "segmentation produced mesh files");

        for file in &mesh_files {
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| JobFailure::Staging(non_utf8_name(file)))?;
            let key = self.paths.mesh_key(case, file_name);
            let data = tokio::fs::read(file).await.map_err(JobFailure::Staging)?;

            stage("upload", self.timeouts.upload, self.store.put_bytes(&key, &data))
                .await?
                .map_err(|source| JobFailure::Upload { key, source })?;
        }

        Ok(json!(self.paths.output_prefix(case)))
    }

    async fn run_plane(
        &self,
        case: &CaseRef,
        job_dir: &Path,
    ) -> Result<serde_json::Value, JobFailure> {
        let input = self.fetch_input_volume(case, job_dir).await?;

        let report = stage("compute", self.timeouts.compute, async {
            self.backend.locate_planes(&input).await
        })
        .await?
        .map_err(JobFailure::Compute)?;

        let report_key = self.paths.key(case, ArtifactKind::PlaneReport);
        stage("upload", self.timeouts.upload, self.store.put_json(&report_key, &report))
            .await?
            .map_err(|source| JobFailure::Upload {
                key: report_key.clone(),
                source,
            })?;

        Ok(json!({ "path": report_key, "report": report }))
    }

    /// Download the case's input volume into the job's staging directory.
    /// The local filename is fixed, so redelivery overwrites cleanly.
    async fn fetch_input_volume(
        &self,
        case: &CaseRef,
        job_dir: &Path,
    ) -> Result<PathBuf, JobFailure> {
        let key = self.paths.key(case, ArtifactKind::InputVolume);

        let data = stage("fetch", self.timeouts.fetch, self.store.get(&key))
            .await?
            .map_err(|source| JobFailure::Fetch { key: key.clone(), source })?;

        tokio::fs::create_dir_all(job_dir)
            .await
            .map_err(JobFailure::Staging)?;
        let local = job_dir.join("ct.nii.gz");
        tokio::fs::write(&local, &data)
            .await
            .map_err(JobFailure::Staging)?;

        tracing::info!(key = %key, local = %local.display(), bytes = data.len(), "staged input volume");
        Ok(local)
    }
}

/// Run one stage under its deadline. The outer error is the deadline expiry;
/// the inner result is the stage's own outcome.
async fn stage<T, E>(
    name: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<Result<T, E>, JobFailure> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| JobFailure::Timeout {
            stage: name,
            timeout_secs: limit.as_secs(),
        })
}

fn non_utf8_name(path: &Path) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("mesh file {} has a non-UTF-8 name", path.display()),
    )
}

/// Cause of a terminal job failure, captured as the record's failure text.
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    #[error("fetch of {key} failed: {source}")]
    Fetch { key: String, source: StorageError },

    #[error("compute failed: {0}")]
    Compute(InferenceError),

    #[error("upload of {key} failed: {source}")]
    Upload { key: String, source: StorageError },

    #[error("{stage} stage timed out after {timeout_secs}s")]
    Timeout {
        stage: &'static str,
        timeout_secs: u64,
    },

    #[error("local staging failed: {0}")]
    Staging(std::io::Error),
}

/// The worker execution loop: pulls one job at a time from the queue, runs it
/// through the staging protocol, and writes the terminal state back. Scaling
/// comes from running more worker processes against the same queue.
pub struct Worker<S, B> {
    queue: Arc<JobQueue>,
    runner: JobRunner<S, B>,
    poll_interval: Duration,
}

impl<S: ObjectStore, B: InferenceBackend> Worker<S, B> {
    pub fn new(queue: Arc<JobQueue>, runner: JobRunner<S, B>, poll_interval: Duration) -> Self {
        Self {
            queue,
            runner,
            poll_interval,
        }
    }

    /// Run indefinitely, sleeping between polls when the queue is empty.
    pub async fn run(&self) {
        loop {
            match self.process_next().await {
                Ok(true) => {
                    tracing::debug!("job processed, checking for next job");
                }
                Ok(false) => {
                    self.refresh_queue_depth().await;
                    sleep(self.poll_interval).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "error processing job, will retry");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Process the next job from the queue.
    /// Returns Ok(true) if a job was handled, Ok(false) if none was available.
    pub async fn process_next(&self) -> Result<bool, QueueError> {
        let envelope = match self.queue.dequeue().await? {
            Some(e) => e,
            None => return Ok(false),
        };

        self.process(&envelope).await?;
        self.queue.ack(&envelope).await?;
        self.refresh_queue_depth().await;
        Ok(true)
    }

    /// Sample the queue depth gauge; called after every processed job and on
    /// idle polls so the reading stays current under sustained load.
    async fn refresh_queue_depth(&self) {
        if let Ok(depth) = self.queue.queue_depth().await {
            metrics::gauge!("inference_queue_depth").set(depth as f64);
        }
    }

    async fn process(&self, envelope: &JobEnvelope) -> Result<(), QueueError> {
        let JobEnvelope { job_id, kind, case } = envelope;

        tracing::info!(
            job_id = %job_id,
            kind = %kind,
            user_id = %case.user_id,
            case_id = %case.case_id,
            "processing inference job"
        );

        match self.queue.claim(*job_id).await? {
            Claim::Claimed => {}
            Claim::AlreadyTerminal(status) => {
                tracing::info!(job_id = %job_id, status = %status, "redelivered finished job, dropping");
                return Ok(());
            }
        }

        let started = Instant::now();
        match self.runner.execute(*job_id, *kind, case).await {
            Ok(result) => {
                self.queue.complete(*job_id, &result).await?;

                metrics::counter!("inference_jobs_succeeded_total", "kind" => kind.to_string())
                    .increment(1);
                metrics::histogram!("inference_job_duration_seconds", "kind" => kind.to_string())
                    .record(started.elapsed().as_secs_f64());

                tracing::info!(
                    job_id = %job_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "job completed successfully"
                );
            }
            Err(failure) => {
                let detail = failure.to_string();
                self.queue.fail(*job_id, &detail).await?;

                metrics::counter!("inference_jobs_failed_total", "kind" => kind.to_string())
                    .increment(1);

                tracing::error!(job_id = %job_id, error = %detail, "job failed");
            }
        }

        Ok(())
    }
}
