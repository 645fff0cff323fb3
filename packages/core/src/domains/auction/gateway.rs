//! Bid Gateway: the operator-facing surface over the auction engine.
//!
//! Each method performs input validation and authorization before
//! delegating into [`AuctionEngine`], mirroring the split this codebase
//! otherwise draws between a request-handling edge and the domain effect it
//! calls into.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::common::{BidId, JobId, OperatorId};
use crate::domains::auction::eligibility::{self, JobEligibilityContext, OperatorProfile};
use crate::domains::auction::engine::{AuctionEngine, TransitionOutcome};
use crate::domains::auction::errors::AuctionError;
use crate::domains::auction::models::{Bid, BidStatus, Job, JobStatus};
use crate::kernel::ServerKernel;

pub struct BidGateway {
    kernel: Arc<ServerKernel>,
    engine: AuctionEngine,
}

impl BidGateway {
    pub fn new(kernel: Arc<ServerKernel>) -> Self {
        let engine = AuctionEngine::new(kernel.clone());
        Self { kernel, engine }
    }

    /// Loads a job and rejects unless it is still genuinely open: status
    /// `OPEN_FOR_BIDDING` and within `biddingClosesAt` (spec.md §4.6). Timer
    /// dispatch can fall behind, so the status flag alone isn't enough —
    /// without this a bid could be placed after the window closed but before
    /// the CLOSE_BIDDING timer has actually fired.
    async fn load_open_job(&self, job_id: JobId) -> Result<Job, AuctionError> {
        let job = Job::find_by_id(job_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("job"))?;
        if job.status != JobStatus::OpenForBidding || Utc::now() >= job.bidding_closes_at {
            return Err(AuctionError::JobClosed);
        }
        Ok(job)
    }

    /// Re-checks rules (1)-(3) at bid-submission time; the postcode rule is
    /// broadcast-only (spec.md §4.2) and is not re-applied here.
    fn check_eligible(
        &self,
        operator: &OperatorProfile,
        job_ctx: &JobEligibilityContext,
    ) -> Result<(), AuctionError> {
        use crate::domains::auction::eligibility::EligibilityDecision::*;
        match eligibility::evaluate_for_bid_submission(operator, job_ctx) {
            Eligible => Ok(()),
            RejectedNotApproved => Err(AuctionError::OperatorNotApproved),
            RejectedDocumentsMissingOrExpired => Err(AuctionError::DocumentsMissingOrExpired),
            RejectedVehicleTypeUnsupported => Err(AuctionError::VehicleTypeUnsupported),
            RejectedPostcodeMismatch => Err(AuctionError::OperatorNotApproved),
        }
    }

    /// `MAX_BID_PERCENT` is a displayed/advisory ceiling only (spec.md
    /// §4.1, §9 open questions): the hard bounds enforced at placement are
    /// `MIN_BID_PERCENT × customerPrice ≤ amount ≤ customerPrice`. A bid at
    /// exactly `customerPrice` must be accepted even when it exceeds the
    /// advisory cap.
    fn check_bid_bounds(
        &self,
        amount: Decimal,
        customer_price: Decimal,
    ) -> Result<(), AuctionError> {
        use crate::common::money::percent_of;
        let settings = &self.kernel.settings;
        if amount > customer_price {
            return Err(AuctionError::BidExceedsCustomerPrice);
        }
        if amount < percent_of(customer_price, settings.min_bid_percent) {
            return Err(AuctionError::BidBelowMinimum);
        }
        Ok(())
    }

    /// Places a new bid. Eligibility and bid-amount bounds are re-checked
    /// here even though the broadcast-time filter already ran, since an
    /// operator's approval state or the job's price can change between
    /// broadcast and submission.
    pub async fn place_bid(
        &self,
        job_id: JobId,
        operator: &OperatorProfile,
        job_ctx: &JobEligibilityContext,
        customer_price: Decimal,
        amount: Decimal,
        notes: Option<String>,
    ) -> Result<Bid, AuctionError> {
        let job = self.load_open_job(job_id).await?;
        self.check_eligible(operator, job_ctx)?;
        self.check_bid_bounds(amount, customer_price)?;

        if Bid::find_active_for_operator(job.id, operator.id, &self.kernel.db_pool)
            .await?
            .is_some()
        {
            return Err(AuctionError::Conflict);
        }

        let bid = Bid::builder()
            .job_id(job.id)
            .operator_id(operator.id)
            .amount(amount)
            .notes(notes)
            .build();

        Ok(bid.insert(&self.kernel.db_pool).await?)
    }

    /// Updates a still-pending bid's amount/notes. Only valid while the job
    /// is still `OPEN_FOR_BIDDING` and within its bidding window (spec.md
    /// §4.6): once bidding has closed, a losing `PENDING` bid must stay
    /// frozen, or an operator could lower it mid-cascade and jump
    /// `next_candidate`'s `amount ASC` tie-break ordering.
    pub async fn update_bid(
        &self,
        bid_id: BidId,
        caller_operator_id: OperatorId,
        customer_price: Decimal,
        amount: Decimal,
        notes: Option<String>,
    ) -> Result<Bid, AuctionError> {
        let bid = Bid::find_by_id(bid_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("bid"))?;
        if bid.operator_id != caller_operator_id {
            return Err(AuctionError::Forbidden);
        }
        let job = Job::find_by_id(bid.job_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("job"))?;
        if job.status != JobStatus::OpenForBidding || Utc::now() >= job.bidding_closes_at {
            return Err(AuctionError::JobClosed);
        }
        self.check_bid_bounds(amount, customer_price)?;

        if !bid
            .update_amount_and_notes(amount, notes, &self.kernel.db_pool)
            .await?
        {
            return Err(AuctionError::Conflict);
        }

        Bid::find_by_id(bid_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("bid"))
    }

    pub async fn withdraw_bid(
        &self,
        bid_id: BidId,
        caller_operator_id: OperatorId,
    ) -> Result<(), AuctionError> {
        let bid = Bid::find_by_id(bid_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("bid"))?;
        if bid.operator_id != caller_operator_id {
            return Err(AuctionError::Forbidden);
        }
        bid.try_withdraw(&self.kernel.db_pool).await?;
        Ok(())
    }

    pub async fn accept_offer(
        &self,
        bid_id: BidId,
        caller_operator_id: OperatorId,
        customer_price: Decimal,
    ) -> Result<TransitionOutcome, AuctionError> {
        let bid = Bid::find_by_id(bid_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("bid"))?;
        let job = Job::find_by_id(bid.job_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("job"))?;
        self.engine
            .accept_offer(&job, &bid, caller_operator_id, customer_price)
            .await
    }

    pub async fn decline_offer(
        &self,
        bid_id: BidId,
        caller_operator_id: OperatorId,
    ) -> Result<TransitionOutcome, AuctionError> {
        let bid = Bid::find_by_id(bid_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("bid"))?;
        let job = Job::find_by_id(bid.job_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("job"))?;
        self.engine.decline_offer(&job, &bid, caller_operator_id).await
    }

    pub async fn list_my_offers(
        &self,
        operator_id: OperatorId,
    ) -> Result<Vec<Bid>, AuctionError> {
        let bids = Bid::list_for_operator(operator_id, &self.kernel.db_pool).await?;
        Ok(bids
            .into_iter()
            .filter(|b| b.status == BidStatus::Offered)
            .collect())
    }

    // ---- Admin operations -------------------------------------------------

    pub async fn admin_force_close_bidding(
        &self,
        job_id: JobId,
    ) -> Result<TransitionOutcome, AuctionError> {
        let job = Job::find_by_id(job_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("job"))?;
        self.engine.force_close_bidding(&job).await
    }

    pub async fn admin_manual_assign(
        &self,
        job_id: JobId,
        bid_id: BidId,
        customer_price: Decimal,
    ) -> Result<TransitionOutcome, AuctionError> {
        let job = Job::find_by_id(job_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("job"))?;
        let bid = Bid::find_by_id(bid_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("bid"))?;
        self.engine.manual_assign(&job, &bid, customer_price).await
    }

    pub async fn admin_reopen_bidding(
        &self,
        job_id: JobId,
    ) -> Result<TransitionOutcome, AuctionError> {
        let job = Job::find_by_id(job_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("job"))?;
        self.engine.reopen_bidding(&job).await
    }

    pub async fn admin_cancel_job(&self, job_id: JobId) -> Result<TransitionOutcome, AuctionError> {
        let job = Job::find_by_id(job_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("job"))?;
        self.engine.cancel_job(&job).await
    }

    pub async fn admin_complete_job(&self, job_id: JobId) -> Result<TransitionOutcome, AuctionError> {
        let job = Job::find_by_id(job_id, &self.kernel.db_pool)
            .await?
            .ok_or(AuctionError::NotFound("job"))?;
        self.engine.complete_job(&job).await
    }
}
