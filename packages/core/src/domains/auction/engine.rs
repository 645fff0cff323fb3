//! Auction Engine: the bidding/acceptance state machine.
//!
//! Every transition first issues a `WHERE`-guarded `UPDATE` (see the model
//! methods in [`crate::domains::auction::models`]); a zero-row update is
//! reported back as [`TransitionOutcome::AlreadyProcessed`] rather than an
//! error, so duplicate timer firings and racing accept/decline/timeout calls
//! are silently idempotent. Everything a transition writes beyond that first
//! guarded row — bid status, the audit trail in `job_events` — happens in
//! the same database transaction, so a crash mid-transition can never leave
//! the job row "assigned" while its winning bid is still "offered".

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use crate::common::{money::percent_of, BidId, JobId, OperatorId};
use crate::domains::auction::booking::{BookingCancelled, BookingPaid};
use crate::domains::auction::eligibility::{self, JobEligibilityContext};
use crate::domains::auction::errors::AuctionError;
use crate::domains::auction::models::{Bid, EscalationReason, Job, JobEvent, JobStatus};
use crate::domains::auction::notifications::NotificationIntent;
use crate::kernel::ServerKernel;

/// Distinguishes a genuine state change from an idempotent no-op, so
/// callers and tests don't need to inspect row counts by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    AlreadyProcessed,
}

pub struct AuctionEngine {
    kernel: std::sync::Arc<ServerKernel>,
}

impl AuctionEngine {
    pub fn new(kernel: std::sync::Arc<ServerKernel>) -> Self {
        Self { kernel }
    }

    /// Retries a transaction body on serialization failures / deadlocks
    /// (SQLSTATE `40001`/`40P01`) with jittered exponential backoff, bounded
    /// to a handful of attempts before surfacing `AuctionError::Transient`.
    async fn retry_serializable<T, F, Fut>(&self, mut body: F) -> Result<T, AuctionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        const MAX_ATTEMPTS: u32 = 5;
        let mut attempt = 0;
        loop {
            match body().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < MAX_ATTEMPTS && is_retryable(&err) => {
                    let base_ms = 2u64.pow(attempt) * 20;
                    let jitter_ms = rand::thread_rng().gen_range(0..base_ms.max(1));
                    tokio::time::sleep(Duration::from_millis(base_ms + jitter_ms)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Idempotent on `booking_id`: a duplicate `BookingPaid` delivery
    /// returns the already-created job without scheduling a second timer or
    /// broadcast. Duration is fixed at zero here since the core does not
    /// model journey duration beyond the booking event; `duration_hours` is
    /// carried on the Job row for a host surface that does.
    pub async fn create_job_from_booking_paid(
        &self,
        event: &BookingPaid,
        duration_hours: i32,
    ) -> Result<(Job, TransitionOutcome), AuctionError> {
        let now = Utc::now();
        let bidding_window_hours = event.journey_type.bidding_window_hours(&self.kernel.settings);
        let bidding_closes_at = now + chrono::Duration::hours(bidding_window_hours);

        let (job, created) = self
            .retry_serializable(|| {
                Job::create_for_booking(
                    event.booking_id,
                    bidding_closes_at,
                    duration_hours,
                    &self.kernel.db_pool,
                )
            })
            .await?;

        if created {
            JobEvent::record(
                job.id,
                None,
                JobStatus::OpenForBidding,
                Some("booking_paid"),
                &self.kernel.db_pool,
            )
            .await?;

            crate::domains::auction::timers::TimerEntry::schedule_close_bidding(
                job.id,
                bidding_closes_at,
                &self.kernel,
            )
            .await?;

            self.broadcast_new_job(&job, event).await?;
        }

        Ok((
            job,
            if created {
                TransitionOutcome::Applied
            } else {
                TransitionOutcome::AlreadyProcessed
            },
        ))
    }

    /// Runs the Eligibility Filter (C2) against the operator candidate pool
    /// and emits `BROADCAST_NEW_JOB`. Per spec.md §4.2 rule 4: when postcode
    /// filtering is enabled but the booking carries no pickup postcode, the
    /// broadcast is suppressed entirely and an operational warning is
    /// logged instead, rather than broadcasting to an unfiltered population.
    async fn broadcast_new_job(&self, job: &Job, event: &BookingPaid) -> Result<(), AuctionError> {
        let prefix = event.pickup_postcode_prefix();
        if self.kernel.settings.enable_postcode_filtering && prefix.is_none() {
            tracing::warn!(
                job_id = %job.id,
                booking_id = %event.booking_id,
                "postcode filtering enabled but booking has no pickup postcode; suppressing broadcast"
            );
            return Ok(());
        }

        let candidates = self
            .kernel
            .operator_directory
            .candidates_for_vehicle_type(&event.vehicle_type)
            .await
            .map_err(AuctionError::Internal)?;

        let job_ctx = JobEligibilityContext {
            required_vehicle_type: event.vehicle_type.clone(),
            pickup_postcode_prefix: prefix.unwrap_or_default(),
        };
        let eligible_operator_ids =
            eligibility::filter_eligible(&candidates, &job_ctx, &self.kernel.settings);

        let max_bid_amount = percent_of(event.customer_price, self.kernel.settings.max_bid_percent);

        self.kernel
            .notification_sink
            .send(NotificationIntent::BroadcastNewJob {
                job_id: job.id,
                max_bid_amount,
                eligible_operator_ids,
            })
            .await;

        Ok(())
    }

    /// Transitions a non-terminal job to `cancelled` on a `BookingCancelled`
    /// delivery. A job already in a terminal state is left untouched (a
    /// no-op, not an error) since `try_mark_cancelled` already guards on
    /// `status NOT IN ('assigned', 'completed', 'cancelled')`.
    pub async fn handle_booking_cancelled(
        &self,
        job: &Job,
        event: &BookingCancelled,
    ) -> Result<TransitionOutcome, AuctionError> {
        let _ = &event.reason;
        self.cancel_job(job).await
    }

    /// Closes bidding (fired by the CLOSE_BIDDING timer, or by admin
    /// force-close): picks the lowest `(amount ASC, submitted_at ASC)`
    /// pending bid and offers it, or escalates with `NoBidsSubmitted`.
    pub async fn close_bidding(&self, job: &Job) -> Result<TransitionOutcome, AuctionError> {
        let applied = self
            .retry_serializable(|| job.try_mark_bidding_closed(&self.kernel.db_pool))
            .await?;
        if !applied {
            return Ok(TransitionOutcome::AlreadyProcessed);
        }
        JobEvent::record(
            job.id,
            Some(JobStatus::OpenForBidding),
            JobStatus::BiddingClosed,
            Some("close_bidding_timer"),
            &self.kernel.db_pool,
        )
        .await?;

        self.offer_next_or_escalate(job, &[], 0).await
    }

    /// Offers the next cheapest untried pending bid, or escalates to
    /// `no_bids_received` with the appropriate reason when none remain. The
    /// offer (job row + bid row) is written in a single transaction; the
    /// `ACCEPTANCE_TIMEOUT` timer and the `JOB_OFFER` notification are only
    /// scheduled/sent after that transaction commits.
    async fn offer_next_or_escalate(
        &self,
        job: &Job,
        already_tried: &[BidId],
        prior_attempt: i32,
    ) -> Result<TransitionOutcome, AuctionError> {
        let from_status = if prior_attempt == 0 {
            JobStatus::BiddingClosed
        } else {
            JobStatus::PendingAcceptance
        };

        let candidate = Bid::next_candidate(job.id, already_tried, &self.kernel.db_pool).await?;

        match candidate {
            Some(candidate) => {
                let acceptance_window =
                    chrono::Duration::minutes(self.kernel.settings.acceptance_window_minutes);
                let acceptance_opens_at = Utc::now();
                let acceptance_closes_at = acceptance_opens_at + acceptance_window;

                let applied = self
                    .retry_serializable(|| {
                        self.offer_to_in_tx(
                            job,
                            from_status,
                            &candidate,
                            acceptance_opens_at,
                            acceptance_closes_at,
                            prior_attempt,
                        )
                    })
                    .await?;

                if !applied {
                    return Ok(TransitionOutcome::AlreadyProcessed);
                }

                crate::domains::auction::timers::TimerEntry::schedule_acceptance_timeout(
                    job.id,
                    prior_attempt + 1,
                    acceptance_closes_at,
                    &self.kernel,
                )
                .await?;

                self.kernel
                    .notification_sink
                    .send(NotificationIntent::JobOffer {
                        job_id: job.id,
                        bid_id: candidate.id,
                        operator_id: candidate.operator_id,
                        acceptance_closes_at,
                    })
                    .await;

                Ok(TransitionOutcome::Applied)
            }
            None => {
                let reason = if prior_attempt == 0 {
                    EscalationReason::NoBidsSubmitted
                } else {
                    EscalationReason::AllOperatorsRejected
                };

                let applied = self
                    .retry_serializable(|| self.mark_no_bids_in_tx(job, from_status, reason))
                    .await?;

                if applied {
                    self.kernel
                        .notification_sink
                        .send(NotificationIntent::JobEscalationToAdmin {
                            job_id: job.id,
                            reason,
                        })
                        .await;
                    Ok(TransitionOutcome::Applied)
                } else {
                    Ok(TransitionOutcome::AlreadyProcessed)
                }
            }
        }
    }

    async fn offer_to_in_tx(
        &self,
        job: &Job,
        from_status: JobStatus,
        candidate: &Bid,
        acceptance_opens_at: chrono::DateTime<Utc>,
        acceptance_closes_at: chrono::DateTime<Utc>,
        prior_attempt: i32,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.kernel.db_pool.begin().await?;

        let applied = job
            .try_offer_to(
                from_status,
                candidate.id,
                acceptance_opens_at,
                acceptance_closes_at,
                prior_attempt,
                &mut *tx,
            )
            .await?;
        if !applied {
            tx.rollback().await?;
            return Ok(false);
        }

        candidate.try_mark_offered(&mut *tx).await?;

        JobEvent::record(
            job.id,
            Some(from_status),
            JobStatus::PendingAcceptance,
            Some("offer_to_next"),
            &mut *tx,
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn mark_no_bids_in_tx(
        &self,
        job: &Job,
        from_status: JobStatus,
        reason: EscalationReason,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.kernel.db_pool.begin().await?;

        let applied = job.try_mark_no_bids(from_status, reason, &mut *tx).await?;
        if !applied {
            tx.rollback().await?;
            return Ok(false);
        }

        JobEvent::record(
            job.id,
            Some(from_status),
            JobStatus::NoBidsReceived,
            Some(match reason {
                EscalationReason::NoBidsSubmitted => "no_bids_submitted",
                EscalationReason::AllOperatorsRejected => "all_operators_rejected",
            }),
            &mut *tx,
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Accepts the currently offered bid. Guarded on job status, the exact
    /// offered bid, caller identity, and the acceptance deadline all in one
    /// `UPDATE`, so a racing timeout firing for the same attempt can win but
    /// never both; the bid's `WON` transition and every other bid's `LOST`
    /// transition commit in the same transaction as the job's `ASSIGNED`
    /// transition.
    pub async fn accept_offer(
        &self,
        job: &Job,
        bid: &Bid,
        caller_operator_id: OperatorId,
        customer_price: rust_decimal::Decimal,
    ) -> Result<TransitionOutcome, AuctionError> {
        if bid.operator_id != caller_operator_id {
            return Err(AuctionError::Forbidden);
        }

        let platform_margin = customer_price - bid.amount;
        let now = Utc::now();

        let applied = self
            .retry_serializable(|| self.accept_in_tx(job, bid, caller_operator_id, platform_margin, now))
            .await?;

        if !applied {
            return Ok(TransitionOutcome::AlreadyProcessed);
        }

        crate::domains::auction::timers::TimerEntry::cancel_acceptance_timeout(
            job.id,
            job.acceptance_attempt_count,
            &self.kernel,
        )
        .await?;

        self.kernel
            .notification_sink
            .send(NotificationIntent::BidWon {
                job_id: job.id,
                bid_id: bid.id,
                operator_id: caller_operator_id,
                amount: bid.amount,
            })
            .await;

        Ok(TransitionOutcome::Applied)
    }

    async fn accept_in_tx(
        &self,
        job: &Job,
        bid: &Bid,
        caller_operator_id: OperatorId,
        platform_margin: rust_decimal::Decimal,
        now: chrono::DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.kernel.db_pool.begin().await?;

        let applied = job
            .try_assign(bid.id, caller_operator_id, platform_margin, now, &mut *tx)
            .await?;
        if !applied {
            tx.rollback().await?;
            return Ok(false);
        }

        bid.try_mark_won(&mut *tx).await?;
        Bid::mark_remaining_lost(job.id, bid.id, &mut *tx).await?;
        JobEvent::record(
            job.id,
            Some(JobStatus::PendingAcceptance),
            JobStatus::Assigned,
            Some("accept_offer"),
            &mut *tx,
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Explicit decline: implicit decline via [`Self::handle_acceptance_timeout`]
    /// shares this same cascade path.
    pub async fn decline_offer(
        &self,
        job: &Job,
        bid: &Bid,
        caller_operator_id: OperatorId,
    ) -> Result<TransitionOutcome, AuctionError> {
        if bid.operator_id != caller_operator_id {
            return Err(AuctionError::Forbidden);
        }
        self.cascade_away_from(job, bid).await
    }

    /// Fired by the ACCEPTANCE_TIMEOUT timer: an implicit decline if the
    /// offer is still outstanding for this exact attempt.
    pub async fn handle_acceptance_timeout(
        &self,
        job: &Job,
        attempt: i32,
    ) -> Result<TransitionOutcome, AuctionError> {
        if job.status != JobStatus::PendingAcceptance
            || job.acceptance_attempt_count != attempt
            || job.current_offered_bid_id.is_none()
        {
            return Ok(TransitionOutcome::AlreadyProcessed);
        }

        let Some(bid_id) = job.current_offered_bid_id else {
            return Ok(TransitionOutcome::AlreadyProcessed);
        };
        if job.acceptance_closes_at.map(|t| Utc::now() < t).unwrap_or(false) {
            return Ok(TransitionOutcome::AlreadyProcessed);
        }
        let Some(bid) = Bid::find_by_id(bid_id, &self.kernel.db_pool).await? else {
            return Ok(TransitionOutcome::AlreadyProcessed);
        };

        self.cascade_away_from(job, &bid).await
    }

    async fn cascade_away_from(&self, job: &Job, bid: &Bid) -> Result<TransitionOutcome, AuctionError> {
        let declined = self.retry_serializable(|| self.decline_in_tx(job, bid)).await?;
        if !declined {
            return Ok(TransitionOutcome::AlreadyProcessed);
        }

        self.offer_next_or_escalate(job, &[bid.id], job.acceptance_attempt_count)
            .await
    }

    async fn decline_in_tx(&self, job: &Job, bid: &Bid) -> Result<bool, sqlx::Error> {
        let mut tx = self.kernel.db_pool.begin().await?;
        let applied = bid.try_mark_declined(&mut *tx).await?;
        if !applied {
            tx.rollback().await?;
            return Ok(false);
        }
        JobEvent::record(
            job.id,
            Some(JobStatus::PendingAcceptance),
            JobStatus::PendingAcceptance,
            Some("offer_declined"),
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Admin: force-close bidding ahead of the scheduled timer. Shares the
    /// same guard as the timer-driven path, so firing both is harmless.
    pub async fn force_close_bidding(&self, job: &Job) -> Result<TransitionOutcome, AuctionError> {
        crate::domains::auction::timers::TimerEntry::cancel_close_bidding(job.id, &self.kernel)
            .await?;
        self.close_bidding(job).await
    }

    /// Cancels a job outright, whether triggered by a `BookingCancelled`
    /// event or an admin action. Valid from any non-terminal state.
    pub async fn cancel_job(&self, job: &Job) -> Result<TransitionOutcome, AuctionError> {
        let applied = self.retry_serializable(|| self.cancel_in_tx(job)).await?;
        if applied {
            crate::domains::auction::timers::TimerEntry::cancel_close_bidding(job.id, &self.kernel)
                .await?;
            crate::domains::auction::timers::TimerEntry::cancel_acceptance_timeout(
                job.id,
                job.acceptance_attempt_count,
                &self.kernel,
            )
            .await?;
            Ok(TransitionOutcome::Applied)
        } else {
            Ok(TransitionOutcome::AlreadyProcessed)
        }
    }

    async fn cancel_in_tx(&self, job: &Job) -> Result<bool, sqlx::Error> {
        let mut tx = self.kernel.db_pool.begin().await?;
        let applied = job.try_mark_cancelled(&mut *tx).await?;
        if !applied {
            tx.rollback().await?;
            return Ok(false);
        }
        Bid::mark_all_live_lost(job.id, &mut *tx).await?;
        JobEvent::record(job.id, None, JobStatus::Cancelled, Some("cancelled"), &mut *tx).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Admin: marks an assigned job completed once the transfer has run.
    /// Increments the winning operator's completed-job counter (spec.md
    /// §4.5) in the same transaction as the status change.
    pub async fn complete_job(&self, job: &Job) -> Result<TransitionOutcome, AuctionError> {
        let applied = self.retry_serializable(|| self.complete_in_tx(job)).await?;
        if applied {
            Ok(TransitionOutcome::Applied)
        } else {
            Ok(TransitionOutcome::AlreadyProcessed)
        }
    }

    async fn complete_in_tx(&self, job: &Job) -> Result<bool, sqlx::Error> {
        let mut tx = self.kernel.db_pool.begin().await?;

        let applied = job.try_mark_completed(&mut *tx).await?;
        if !applied {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(operator_id) = job.assigned_operator_id {
            sqlx::query(
                r#"
                INSERT INTO operator_completed_job_counts (operator_id, completed_job_count, updated_at)
                VALUES ($1, 1, NOW())
                ON CONFLICT (operator_id) DO UPDATE SET
                    completed_job_count = operator_completed_job_counts.completed_job_count + 1,
                    updated_at = NOW()
                "#,
            )
            .bind(operator_id)
            .execute(&mut *tx)
            .await?;
        }

        JobEvent::record(
            job.id,
            Some(JobStatus::Assigned),
            JobStatus::Completed,
            Some("admin_complete"),
            &mut *tx,
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Admin: reopens a job stuck in `no_bids_received` for a fresh bidding
    /// window.
    pub async fn reopen_bidding(&self, job: &Job) -> Result<TransitionOutcome, AuctionError> {
        let bidding_closes_at =
            Utc::now() + chrono::Duration::hours(self.kernel.settings.default_bidding_window_hours);
        let applied = job
            .try_reopen_bidding(bidding_closes_at, &self.kernel.db_pool)
            .await?;
        if applied {
            JobEvent::record(
                job.id,
                Some(JobStatus::NoBidsReceived),
                JobStatus::OpenForBidding,
                Some("admin_reopen"),
                &self.kernel.db_pool,
            )
            .await?;
            crate::domains::auction::timers::TimerEntry::schedule_close_bidding(
                job.id,
                bidding_closes_at,
                &self.kernel,
            )
            .await?;
            Ok(TransitionOutcome::Applied)
        } else {
            Ok(TransitionOutcome::AlreadyProcessed)
        }
    }

    /// Admin: directly assigns a job to a specific bid/operator, bypassing
    /// the cascade. Kept only as an escape hatch per spec.md §9: normal flow
    /// is exclusively cascade-driven.
    pub async fn manual_assign(
        &self,
        job: &Job,
        bid: &Bid,
        customer_price: rust_decimal::Decimal,
    ) -> Result<TransitionOutcome, AuctionError> {
        let platform_margin = customer_price - bid.amount;
        let applied = self
            .retry_serializable(|| self.manual_assign_in_tx(job, bid, platform_margin))
            .await?;

        if applied {
            crate::domains::auction::timers::TimerEntry::cancel_close_bidding(job.id, &self.kernel)
                .await?;
            crate::domains::auction::timers::TimerEntry::cancel_acceptance_timeout(
                job.id,
                job.acceptance_attempt_count,
                &self.kernel,
            )
            .await?;
            Ok(TransitionOutcome::Applied)
        } else {
            Ok(TransitionOutcome::AlreadyProcessed)
        }
    }

    async fn manual_assign_in_tx(
        &self,
        job: &Job,
        bid: &Bid,
        platform_margin: rust_decimal::Decimal,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.kernel.db_pool.begin().await?;

        let applied = job
            .try_admin_override_assign(bid.id, bid.operator_id, platform_margin, &mut *tx)
            .await?;
        if !applied {
            tx.rollback().await?;
            return Ok(false);
        }

        bid.try_mark_won(&mut *tx).await?;
        // try_mark_won only matches bids currently `offered`; an admin can
        // assign a bid that never went through the cascade, so fall back to
        // an unconditional status write for that case.
        sqlx::query("UPDATE bids SET status = 'won', responded_at = NOW() WHERE id = $1 AND status <> 'won'")
            .bind(bid.id)
            .execute(&mut *tx)
            .await?;
        Bid::mark_remaining_lost(job.id, bid.id, &mut *tx).await?;
        JobEvent::record(job.id, None, JobStatus::Assigned, Some("admin_manual_assign"), &mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

fn is_retryable(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
    } else {
        false
    }
}
