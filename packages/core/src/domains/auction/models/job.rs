//! Job model: the per-booking auction's bidding/acceptance lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;

use crate::common::{BookingId, JobId, OperatorId};

/// Tagged states of the auction lifecycle. Terminal states are `Assigned`,
/// `NoBidsReceived`, `Cancelled`, `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    OpenForBidding,
    BiddingClosed,
    PendingAcceptance,
    Assigned,
    NoBidsReceived,
    Cancelled,
    Completed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Assigned
                | JobStatus::NoBidsReceived
                | JobStatus::Cancelled
                | JobStatus::Completed
        )
    }
}

/// Why a job ended up in `NoBidsReceived`, recorded for the admin escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "escalation_reason", rename_all = "snake_case")]
pub enum EscalationReason {
    NoBidsSubmitted,
    AllOperatorsRejected,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = JobId::new())]
    pub id: JobId,

    pub booking_id: BookingId,

    #[builder(default)]
    pub status: JobStatus,

    pub bidding_opens_at: DateTime<Utc>,
    pub bidding_closes_at: DateTime<Utc>,
    pub duration_hours: i32,

    #[builder(default, setter(strip_option))]
    pub assigned_operator_id: Option<OperatorId>,
    #[builder(default, setter(strip_option))]
    pub winning_bid_id: Option<crate::common::BidId>,
    #[builder(default, setter(strip_option))]
    pub platform_margin: Option<Decimal>,

    #[builder(default, setter(strip_option))]
    pub current_offered_bid_id: Option<crate::common::BidId>,
    #[builder(default, setter(strip_option))]
    pub acceptance_opens_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub acceptance_closes_at: Option<DateTime<Utc>>,
    #[builder(default = 0)]
    pub acceptance_attempt_count: i32,

    #[builder(default, setter(strip_option))]
    pub escalation_reason: Option<EscalationReason>,

    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Idempotent creation on a `BookingPaid` event: a row already existing
    /// for `booking_id` means this is a duplicate delivery, so the existing
    /// job is returned instead of inserting a second one.
    pub async fn create_for_booking(
        booking_id: BookingId,
        bidding_closes_at: DateTime<Utc>,
        duration_hours: i32,
        db: &sqlx::PgPool,
    ) -> Result<(Self, bool), sqlx::Error> {
        let now = Utc::now();
        let job = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO jobs (id, booking_id, status, bidding_opens_at, bidding_closes_at, duration_hours, created_at, updated_at)
            VALUES ($1, $2, 'open_for_bidding', $3, $4, $5, $6, $6)
            ON CONFLICT (booking_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(JobId::new())
        .bind(booking_id)
        .bind(now)
        .bind(bidding_closes_at)
        .bind(duration_hours)
        .bind(now)
        .fetch_optional(db)
        .await?;

        match job {
            Some(job) => Ok((job, true)),
            // Lost the race against a concurrent insert for the same booking,
            // or this is a duplicate `BookingPaid` delivery.
            None => {
                let existing = Self::find_by_booking_id(booking_id, db)
                    .await?
                    .expect("row must exist after ON CONFLICT DO NOTHING");
                Ok((existing, false))
            }
        }
    }

    pub async fn find_by_id(id: JobId, db: &sqlx::PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_booking_id(
        booking_id: BookingId,
        db: &sqlx::PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM jobs WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_optional(db)
            .await
    }

    /// Guarded transition: only succeeds (returns `true`) if the job is
    /// still `open_for_bidding`. A zero-row update means this call is a
    /// duplicate (e.g. a re-fired CLOSE_BIDDING timer) and is a silent no-op.
    pub async fn try_mark_bidding_closed<'c>(
        &self,
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'bidding_closed', updated_at = NOW()
            WHERE id = $1 AND status = 'open_for_bidding'
            "#,
        )
        .bind(self.id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Moves from `bidding_closed`/`pending_acceptance` into a fresh offer,
    /// guarded on both the expected prior status and the expected prior
    /// `acceptance_attempt_count` — this is what keeps `acceptance_attempt_count`
    /// monotonic under concurrent cascade/timeout races.
    pub async fn try_offer_to<'c>(
        &self,
        from_status: JobStatus,
        bid_id: crate::common::BidId,
        acceptance_opens_at: DateTime<Utc>,
        acceptance_closes_at: DateTime<Utc>,
        expected_prior_attempt: i32,
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<bool, sqlx::Error> {
        let from: &str = match from_status {
            JobStatus::BiddingClosed => "bidding_closed",
            JobStatus::PendingAcceptance => "pending_acceptance",
            _ => return Ok(false),
        };

        let result = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = 'pending_acceptance',
                current_offered_bid_id = $1,
                acceptance_opens_at = $2,
                acceptance_closes_at = $3,
                acceptance_attempt_count = $4 + 1,
                updated_at = NOW()
            WHERE id = $5 AND status = '{from}' AND acceptance_attempt_count = $4
            "#
        ))
        .bind(bid_id)
        .bind(acceptance_opens_at)
        .bind(acceptance_closes_at)
        .bind(expected_prior_attempt)
        .bind(self.id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Guarded acceptance: requires the job to still be `pending_acceptance`
    /// with the exact offered bid and within the acceptance deadline.
    pub async fn try_assign<'c>(
        &self,
        bid_id: crate::common::BidId,
        operator_id: OperatorId,
        platform_margin: Decimal,
        now: DateTime<Utc>,
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'assigned',
                assigned_operator_id = $1,
                winning_bid_id = $2,
                platform_margin = $3,
                current_offered_bid_id = NULL,
                updated_at = NOW()
            WHERE id = $4
              AND status = 'pending_acceptance'
              AND current_offered_bid_id = $2
              AND acceptance_closes_at >= $5
            "#,
        )
        .bind(operator_id)
        .bind(bid_id)
        .bind(platform_margin)
        .bind(self.id)
        .bind(now)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Guarded escalation into `no_bids_received`, from either
    /// `bidding_closed` (no bids at all) or `pending_acceptance` (every
    /// operator declined/timed out).
    pub async fn try_mark_no_bids<'c>(
        &self,
        from_status: JobStatus,
        reason: EscalationReason,
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<bool, sqlx::Error> {
        let from: &str = match from_status {
            JobStatus::BiddingClosed => "bidding_closed",
            JobStatus::PendingAcceptance => "pending_acceptance",
            _ => return Ok(false),
        };

        let result = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = 'no_bids_received',
                escalation_reason = $1,
                current_offered_bid_id = NULL,
                updated_at = NOW()
            WHERE id = $2 AND status = '{from}'
            "#
        ))
        .bind(reason)
        .bind(self.id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn try_mark_cancelled<'c>(
        &self,
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'cancelled', current_offered_bid_id = NULL, updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('assigned', 'completed', 'cancelled')
            "#,
        )
        .bind(self.id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn try_mark_completed<'c>(
        &self,
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'completed', completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'assigned'
            "#,
        )
        .bind(self.id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Admin reopen: only valid from `no_bids_received`, back to a fresh
    /// bidding window.
    pub async fn try_reopen_bidding<'c>(
        &self,
        bidding_closes_at: DateTime<Utc>,
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'open_for_bidding',
                bidding_opens_at = NOW(),
                bidding_closes_at = $1,
                escalation_reason = NULL,
                updated_at = NOW()
            WHERE id = $2 AND status = 'no_bids_received'
            "#,
        )
        .bind(bidding_closes_at)
        .bind(self.id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Admin override: assigns directly from `open_for_bidding` or
    /// `bidding_closed`, bypassing the cascade guard `try_assign` enforces.
    /// Kept distinct from `try_assign` so the normal cascade path can never
    /// accidentally skip straight from an open auction to `assigned`.
    pub async fn try_admin_override_assign<'c>(
        &self,
        bid_id: crate::common::BidId,
        operator_id: OperatorId,
        platform_margin: Decimal,
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'assigned', assigned_operator_id = $1, winning_bid_id = $2,
                platform_margin = $3, current_offered_bid_id = NULL, updated_at = NOW()
            WHERE id = $4 AND status IN ('open_for_bidding', 'bidding_closed', 'pending_acceptance')
            "#,
        )
        .bind(operator_id)
        .bind(bid_id)
        .bind(platform_margin)
        .bind(self.id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
