//! Bid model: one operator's offer against one job.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;

use crate::common::{BidId, JobId, OperatorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "bid_status", rename_all = "snake_case")]
pub enum BidStatus {
    #[default]
    Pending,
    Offered,
    Won,
    Lost,
    Declined,
    Withdrawn,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Bid {
    #[builder(default = BidId::new())]
    pub id: BidId,

    pub job_id: JobId,
    pub operator_id: OperatorId,
    pub amount: Decimal,

    #[builder(default)]
    pub notes: Option<String>,

    #[builder(default)]
    pub status: BidStatus,

    #[builder(default = Utc::now())]
    pub submitted_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub offered_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub responded_at: Option<DateTime<Utc>>,
}

impl Bid {
    /// Places a bid, relying on the partial unique index
    /// `(job_id, operator_id) WHERE status <> 'withdrawn'` to reject a
    /// second non-withdrawn bid from the same operator on the same job.
    pub async fn insert(&self, db: &sqlx::PgPool) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO bids (id, job_id, operator_id, amount, notes, status, submitted_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.job_id)
        .bind(self.operator_id)
        .bind(self.amount)
        .bind(&self.notes)
        .bind(self.submitted_at)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(id: BidId, db: &sqlx::PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM bids WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// The operator's own existing non-withdrawn bid on a job, if any.
    pub async fn find_active_for_operator(
        job_id: JobId,
        operator_id: OperatorId,
        db: &sqlx::PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM bids WHERE job_id = $1 AND operator_id = $2 AND status <> 'withdrawn'",
        )
        .bind(job_id)
        .bind(operator_id)
        .fetch_optional(db)
        .await
    }

    pub async fn list_for_job(job_id: JobId, db: &sqlx::PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM bids WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(db)
            .await
    }

    pub async fn list_for_operator(
        operator_id: OperatorId,
        db: &sqlx::PgPool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM bids WHERE operator_id = $1 ORDER BY submitted_at DESC")
            .bind(operator_id)
            .fetch_all(db)
            .await
    }

    /// Lowest-price-first, earliest-submission-tiebreak ordering used to
    /// pick the winner at bidding close and to pick the next offer in a
    /// cascade. Deterministic: `(amount ASC, submitted_at ASC)`.
    pub async fn next_candidate<'c>(
        job_id: JobId,
        excluding: &[BidId],
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM bids
            WHERE job_id = $1 AND status = 'pending' AND NOT (id = ANY($2))
            ORDER BY amount ASC, submitted_at ASC
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .bind(
            excluding
                .iter()
                .map(|id| id.into_uuid())
                .collect::<Vec<_>>(),
        )
        .fetch_optional(exec)
        .await
    }

    pub async fn update_amount_and_notes(
        &self,
        amount: Decimal,
        notes: Option<String>,
        db: &sqlx::PgPool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE bids SET amount = $1, notes = $2
            WHERE id = $3 AND status = 'pending'
            "#,
        )
        .bind(amount)
        .bind(notes)
        .bind(self.id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn try_withdraw(&self, db: &sqlx::PgPool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE bids SET status = 'withdrawn' WHERE id = $1 AND status = 'pending'")
            .bind(self.id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn try_mark_offered<'c>(&self, exec: impl sqlx::PgExecutor<'c>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE bids SET status = 'offered', offered_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(self.id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn try_mark_won<'c>(&self, exec: impl sqlx::PgExecutor<'c>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE bids SET status = 'won', responded_at = NOW()
            WHERE id = $1 AND status = 'offered'
            "#,
        )
        .bind(self.id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn try_mark_declined<'c>(&self, exec: impl sqlx::PgExecutor<'c>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE bids SET status = 'declined', responded_at = NOW()
            WHERE id = $1 AND status = 'offered'
            "#,
        )
        .bind(self.id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark every other `offered`/`pending` bid on the job `lost` once a
    /// winner is assigned.
    pub async fn mark_remaining_lost<'c>(
        job_id: JobId,
        winning_bid_id: BidId,
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE bids SET status = 'lost'
            WHERE job_id = $1 AND id <> $2 AND status IN ('pending', 'offered')
            "#,
        )
        .bind(job_id)
        .bind(winning_bid_id)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Mark every still-live bid on the job `lost` when the job itself is
    /// cancelled outright (no winner).
    pub async fn mark_all_live_lost<'c>(
        job_id: JobId,
        exec: impl sqlx::PgExecutor<'c>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE bids SET status = 'lost'
            WHERE job_id = $1 AND status IN ('pending', 'offered')
            "#,
        )
        .bind(job_id)
        .execute(exec)
        .await?;
        Ok(())
    }
}
