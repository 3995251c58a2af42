use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{CaseRef, JobKind, JobRecord, JobStatus};

const QUEUE_KEY: &str = "ct_inference:jobs";
const PROCESSING_KEY: &str = "ct_inference:processing";

fn record_key(job_id: Uuid) -> String {
    format!("ct_inference:job:{job_id}")
}

/// Job payload serialized onto the Redis delivery list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub case: CaseRef,
}

/// Outcome of claiming a dequeued job.
///
/// Delivery is at-least-once, so a job that already reached a terminal state
/// may be redelivered after a worker crash; such a job is dropped, never re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    AlreadyTerminal(JobStatus),
}

/// Redis-backed task queue and result backend.
///
/// Delivery is a list push/pop pair with a processing list (at-least-once);
/// each job additionally owns a hash that is the single source of truth for
/// its status and result. Terminal writes are guarded so a finished record is
/// never overwritten, and carry a TTL delegating retention to Redis.
pub struct JobQueue {
    client: redis::Client,
    result_ttl_secs: u64,
}

impl JobQueue {
    pub fn new(redis_url: &str, result_ttl_secs: u64) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            result_ttl_secs,
        })
    }

    /// Create a pending job record and push its envelope onto the queue.
    /// The record write is ordered before the push, so a submitted job is
    /// always visible as `pending` to status queries.
    pub async fn enqueue(&self, kind: JobKind, case: &CaseRef) -> Result<Uuid, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;

        let job_id = Uuid::new_v4();
        let envelope = JobEnvelope {
            job_id,
            kind,
            case: case.clone(),
        };
        let payload = serde_json::to_string(&envelope).map_err(QueueError::Serialize)?;

        let fields = [
            ("kind", kind.to_string()),
            ("user_id", case.user_id.clone()),
            ("case_id", case.case_id.clone()),
            ("status", JobStatus::Pending.to_string()),
            ("submitted_at", Utc::now().to_rfc3339()),
        ];

        redis::pipe()
            .atomic()
            .hset_multiple(record_key(job_id), &fields)
            .ignore()
            .lpush(QUEUE_KEY, &payload)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;

        Ok(job_id)
    }

    /// Pop the next job for processing (non-blocking, moved to the processing
    /// list so a crashed worker leaves evidence for redelivery).
    pub async fn dequeue(&self) -> Result<Option<JobEnvelope>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;

        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let envelope: JobEnvelope =
                    serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(envelope))
            }
            None => Ok(None),
        }
    }

    /// Move envelopes stranded on the processing list by a crashed worker
    /// back onto the queue, returning how many were requeued. Run at worker
    /// startup, before polling. A requeued job that already reached a
    /// terminal state is dropped by the claim guard, never re-run; a
    /// non-terminal one is redelivered, which at-least-once delivery permits.
    pub async fn recover(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;

        let mut requeued = 0;
        loop {
            let entry: Option<String> = conn
                .rpoplpush(PROCESSING_KEY, QUEUE_KEY)
                .await
                .map_err(QueueError::Redis)?;
            if entry.is_none() {
                break;
            }
            requeued += 1;
        }
        Ok(requeued)
    }

    /// Remove a delivered envelope from the processing list.
    pub async fn ack(&self, envelope: &JobEnvelope) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;

        let payload = serde_json::to_string(envelope).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Transition a dequeued job to `running`. A redelivered job that already
    /// reached a terminal state reports `AlreadyTerminal` instead.
    pub async fn claim(&self, job_id: Uuid) -> Result<Claim, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;

        let current = self.read_status(&mut conn, job_id).await?;
        if current.is_terminal() {
            return Ok(Claim::AlreadyTerminal(current));
        }
        if !current.can_transition_to(JobStatus::Running) {
            return Err(QueueError::InvalidTransition {
                job_id,
                from: current,
                to: JobStatus::Running,
            });
        }

        conn.hset::<_, _, _, ()>(
            record_key(job_id),
            "status",
            JobStatus::Running.to_string(),
        )
        .await
        .map_err(QueueError::Redis)?;
        Ok(Claim::Claimed)
    }

    /// Terminal write: mark the job succeeded with its result payload.
    pub async fn complete(
        &self,
        job_id: Uuid,
        result: &serde_json::Value,
    ) -> Result<(), QueueError> {
        let result = serde_json::to_string(result).map_err(QueueError::Serialize)?;
        self.finish(job_id, JobStatus::Succeeded, "result", &result)
            .await
    }

    /// Terminal write: mark the job failed with a human-readable description.
    pub async fn fail(&self, job_id: Uuid, error: &str) -> Result<(), QueueError> {
        self.finish(job_id, JobStatus::Failed, "error", error).await
    }

    async fn finish(
        &self,
        job_id: Uuid,
        status: JobStatus,
        detail_field: &str,
        detail: &str,
    ) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;

        let current = self.read_status(&mut conn, job_id).await?;
        if !current.can_transition_to(status) {
            return Err(QueueError::InvalidTransition {
                job_id,
                from: current,
                to: status,
            });
        }

        let key = record_key(job_id);
        redis::pipe()
            .atomic()
            .hset(&key, "status", status.to_string())
            .ignore()
            .hset(&key, detail_field, detail)
            .ignore()
            .expire(&key, self.result_ttl_secs as i64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Current status of a job, or None for an unknown id.
    pub async fn fetch_status(&self, job_id: Uuid) -> Result<Option<JobStatus>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;

        let raw: Option<String> = conn
            .hget(record_key(job_id), "status")
            .await
            .map_err(QueueError::Redis)?;

        raw.map(|s| parse_field::<JobStatus>(job_id, "status", &s))
            .transpose()
    }

    /// Full job record, or None for an unknown id. This is a pure read; it
    /// never mutates job state.
    pub async fn fetch_record(&self, job_id: Uuid) -> Result<Option<JobRecord>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;

        let fields: HashMap<String, String> = conn
            .hgetall(record_key(job_id))
            .await
            .map_err(QueueError::Redis)?;
        if fields.is_empty() {
            return Ok(None);
        }

        let status = parse_field::<JobStatus>(job_id, "status", require(job_id, &fields, "status")?)?;
        let kind = parse_field::<JobKind>(job_id, "kind", require(job_id, &fields, "kind")?)?;
        let submitted_at = DateTime::parse_from_rfc3339(require(job_id, &fields, "submitted_at")?)
            .map_err(|e| QueueError::Corrupt {
                job_id,
                detail: format!("submitted_at: {e}"),
            })?
            .with_timezone(&Utc);
        let result = fields
            .get("result")
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(QueueError::Serialize)?;

        Ok(Some(JobRecord {
            id: job_id,
            kind,
            case: CaseRef::new(
                require(job_id, &fields, "user_id")?,
                require(job_id, &fields, "case_id")?,
            ),
            status,
            submitted_at,
            result,
            error: fields.get("error").cloned(),
        }))
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Get the current queue depth (pending jobs).
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn read_status(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job_id: Uuid,
    ) -> Result<JobStatus, QueueError> {
        let raw: Option<String> = conn
            .hget(record_key(job_id), "status")
            .await
            .map_err(QueueError::Redis)?;
        match raw {
            Some(s) => parse_field::<JobStatus>(job_id, "status", &s),
            None => Err(QueueError::UnknownJob(job_id)),
        }
    }
}

fn require<'a>(
    job_id: Uuid,
    fields: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, QueueError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| QueueError::Corrupt {
            job_id,
            detail: format!("missing field {name}"),
        })
}

fn parse_field<T: FromStr>(job_id: Uuid, name: &str, raw: &str) -> Result<T, QueueError> {
    raw.parse().map_err(|_| QueueError::Corrupt {
        job_id,
        detail: format!("unrecognized {name} value {raw:?}"),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unknown job {0}")]
    UnknownJob(Uuid),

    #[error("job {job_id}: illegal status transition {from} -> {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {job_id}: corrupt record ({detail})")]
    Corrupt { job_id: Uuid, detail: String },
}
