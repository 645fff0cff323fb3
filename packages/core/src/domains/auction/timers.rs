//! Timer Service: durable, at-least-once delivery of dated auction events.
//!
//! Grounded on the kernel's background-job infrastructure (claim via
//! `FOR UPDATE SKIP LOCKED`, lease-based running state) but closed over a
//! small tagged payload instead of an arbitrary deserialized command, per
//! the state-machine-over-dynamic-dispatch preference for this engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;

use crate::common::{Id, JobId, TimerEntryId};
use crate::kernel::ServerKernel;

/// What a fired timer should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "timer_kind", rename_all = "snake_case")]
pub enum TimerKind {
    CloseBidding,
    AcceptanceTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "timer_state", rename_all = "snake_case")]
pub enum TimerState {
    #[default]
    Scheduled,
    /// Claimed by a worker and currently within its lease. A lease that
    /// expires without the entry moving to `Done` is assumed to belong to a
    /// crashed worker and becomes re-claimable.
    Fired,
    /// Terminal: the claiming worker finished dispatching it successfully.
    /// Excluded from both `claim_due` branches, so a retired entry never
    /// re-fires.
    Done,
    Cancelled,
}

/// The decoded meaning of a timer's payload, dispatched straight to the two
/// [`crate::domains::auction::engine::AuctionEngine`] handlers that care.
#[derive(Debug, Clone, Copy)]
pub enum TimerFire {
    CloseBidding { job_id: JobId },
    AcceptanceTimeout { job_id: JobId, attempt: i32 },
}

#[derive(FromRow, Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct TimerEntry {
    #[builder(default = TimerEntryId::new())]
    pub id: TimerEntryId,

    /// Stable, deterministic identifier: `"<kind>:<job_id>[:<attempt>]"`.
    /// Scheduling the same logical event twice upserts this row instead of
    /// creating a duplicate.
    pub external_id: String,
    pub kind: TimerKind,
    pub payload: serde_json::Value,
    pub fire_at: DateTime<Utc>,

    #[builder(default)]
    pub state: TimerState,

    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,
    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

fn external_id_for_close_bidding(job_id: JobId) -> String {
    format!("close_bidding:{job_id}")
}

fn external_id_for_acceptance_timeout(job_id: JobId, attempt: i32) -> String {
    format!("acceptance_timeout:{job_id}:{attempt}")
}

impl TimerEntry {
    /// Schedules (or re-schedules, via upsert on `external_id`) a
    /// CLOSE_BIDDING timer. If `fire_at` is already due, the row is still
    /// persisted — the next worker poll fires it immediately, satisfying
    /// "fire immediately if `fireAt <= now`" without special-casing here.
    pub async fn schedule_close_bidding(
        job_id: JobId,
        fire_at: DateTime<Utc>,
        kernel: &ServerKernel,
    ) -> Result<Self, sqlx::Error> {
        Self::upsert(
            external_id_for_close_bidding(job_id),
            TimerKind::CloseBidding,
            serde_json::json!({ "job_id": job_id }),
            fire_at,
            kernel,
        )
        .await
    }

    pub async fn schedule_acceptance_timeout(
        job_id: JobId,
        attempt: i32,
        fire_at: DateTime<Utc>,
        kernel: &ServerKernel,
    ) -> Result<Self, sqlx::Error> {
        Self::upsert(
            external_id_for_acceptance_timeout(job_id, attempt),
            TimerKind::AcceptanceTimeout,
            serde_json::json!({ "job_id": job_id, "attempt": attempt }),
            fire_at,
            kernel,
        )
        .await
    }

    async fn upsert(
        external_id: String,
        kind: TimerKind,
        payload: serde_json::Value,
        fire_at: DateTime<Utc>,
        kernel: &ServerKernel,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO timer_entries (id, external_id, kind, payload, fire_at, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'scheduled', NOW(), NOW())
            ON CONFLICT (external_id) DO UPDATE SET
                fire_at = EXCLUDED.fire_at,
                payload = EXCLUDED.payload,
                state = 'scheduled',
                worker_id = NULL,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE timer_entries.state IN ('scheduled', 'done', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(Id::new())
        .bind(&external_id)
        .bind(kind)
        .bind(payload)
        .bind(fire_at)
        .fetch_one(&kernel.db_pool)
        .await
    }

    /// Cancels a still-scheduled timer. A no-op (returns `false`) if it has
    /// already fired.
    pub async fn cancel(external_id: &str, kernel: &ServerKernel) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE timer_entries SET state = 'cancelled', updated_at = NOW() WHERE external_id = $1 AND state = 'scheduled'",
        )
        .bind(external_id)
        .execute(&kernel.db_pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn cancel_close_bidding(job_id: JobId, kernel: &ServerKernel) -> Result<bool, sqlx::Error> {
        Self::cancel(&external_id_for_close_bidding(job_id), kernel).await
    }

    pub async fn cancel_acceptance_timeout(
        job_id: JobId,
        attempt: i32,
        kernel: &ServerKernel,
    ) -> Result<bool, sqlx::Error> {
        Self::cancel(&external_id_for_acceptance_timeout(job_id, attempt), kernel).await
    }

    /// Retires a successfully dispatched entry to the terminal `done` state,
    /// guarded on still belonging to the caller's lease so a worker that's
    /// lost its lease (and had the entry reclaimed by someone else) can't
    /// clobber the reclaiming worker's result.
    pub async fn mark_done(&self, worker_id: &str, kernel: &ServerKernel) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE timer_entries SET state = 'done', updated_at = NOW() \
             WHERE id = $1 AND state = 'fired' AND worker_id = $2",
        )
        .bind(self.id)
        .bind(worker_id)
        .execute(&kernel.db_pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Atomically claims due, scheduled timers (and recovers ones whose
    /// lease expired under a crashed worker — a fire that completed is
    /// retired to `done` and is never matched here), the same `FOR UPDATE
    /// SKIP LOCKED` shape the rest of this codebase's job queue uses.
    pub async fn claim_due(
        limit: i64,
        worker_id: &str,
        lease: chrono::Duration,
        kernel: &ServerKernel,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            WITH due AS (
                SELECT id FROM timer_entries
                WHERE (state = 'scheduled' AND fire_at <= NOW())
                   OR (state = 'fired' AND lease_expires_at < NOW())
                ORDER BY fire_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE timer_entries
            SET state = 'fired',
                worker_id = $2,
                lease_expires_at = NOW() + ($3 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM due)
            RETURNING *
            "#,
        )
        .bind(limit)
        .bind(worker_id)
        .bind(lease.num_milliseconds().to_string())
        .fetch_all(&kernel.db_pool)
        .await
    }

    /// Decodes a claimed row's payload into the closed set of things a
    /// handler can be asked to do. Missing/unparseable payloads are logged
    /// and discarded rather than panicking a worker.
    pub fn decode(&self) -> Option<TimerFire> {
        match self.kind {
            TimerKind::CloseBidding => {
                let job_id: JobId = self.payload.get("job_id")?.as_str()?.parse().ok()?;
                Some(TimerFire::CloseBidding { job_id })
            }
            TimerKind::AcceptanceTimeout => {
                let job_id: JobId = self.payload.get("job_id")?.as_str()?.parse().ok()?;
                let attempt = self.payload.get("attempt")?.as_i64()? as i32;
                Some(TimerFire::AcceptanceTimeout { job_id, attempt })
            }
        }
    }
}
