//! Consumed-event webhooks: `BookingPaid` and `BookingCancelled` (spec.md
//! §6). These are system-to-system deliveries, not operator-facing
//! operations, so they call `AuctionEngine` directly rather than going
//! through `BidGateway`.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domains::auction::errors::AuctionError;
use crate::domains::auction::models::Job;
use crate::domains::auction::{BookingCancelled, BookingPaid, TransitionOutcome};
use crate::server::app::AppState;
use crate::server::errors::ApiError;

/// `BookingPaid` plus the one field the core carries on the Job row but
/// does not itself derive: the quoted duration of the transfer.
#[derive(Debug, Deserialize)]
pub struct BookingPaidRequest {
    #[serde(flatten)]
    pub event: BookingPaid,
    pub duration_hours: i32,
}

#[derive(Serialize)]
pub struct JobCreatedResponse {
    job_id: String,
    applied: bool,
}

pub async fn booking_paid_handler(
    Extension(state): Extension<AppState>,
    Json(req): Json<BookingPaidRequest>,
) -> Result<(StatusCode, Json<JobCreatedResponse>), ApiError> {
    let (job, outcome) = state
        .engine
        .create_job_from_booking_paid(&req.event, req.duration_hours)
        .await?;

    Ok((
        StatusCode::OK,
        Json(JobCreatedResponse {
            job_id: job.id.to_string(),
            applied: matches!(outcome, TransitionOutcome::Applied),
        }),
    ))
}

pub async fn booking_cancelled_handler(
    Extension(state): Extension<AppState>,
    Json(event): Json<BookingCancelled>,
) -> Result<StatusCode, ApiError> {
    let job = Job::find_by_booking_id(event.booking_id, &state.kernel.db_pool)
        .await
        .map_err(AuctionError::from)?
        .ok_or(AuctionError::NotFound("job"))?;

    state.engine.handle_booking_cancelled(&job, &event).await?;
    Ok(StatusCode::OK)
}
