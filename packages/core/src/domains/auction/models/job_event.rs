//! Append-only audit log of Job state transitions.
//!
//! Not named in spec.md, but the natural counterpart of the teacher's job
//! queue event log: every guarded transition that actually applies appends
//! one row here, in the same transaction, so "why is this job stuck in
//! `pending_acceptance`" is answerable from history instead of by
//! reconstructing it from `updated_at` alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::common::{Id, JobId};
use crate::domains::auction::models::JobStatus;

pub struct JobEventMarker;
pub type JobEventId = Id<JobEventMarker>;

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: JobEventId,
    pub job_id: JobId,
    pub from_status: Option<JobStatus>,
    pub to_status: JobStatus,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl JobEvent {
    pub async fn record<'c>(
        job_id: JobId,
        from_status: Option<JobStatus>,
        to_status: JobStatus,
        reason: Option<&str>,
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO job_events (id, job_id, from_status, to_status, reason, occurred_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(JobEventId::new())
        .bind(job_id)
        .bind(from_status)
        .bind(to_status)
        .bind(reason)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn list_for_job(job_id: JobId, db: &sqlx::PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM job_events WHERE job_id = $1 ORDER BY occurred_at ASC",
        )
        .bind(job_id)
        .fetch_all(db)
        .await
    }
}
