//! Admin operations (spec.md §6): force-close, manual assign, reopen,
//! cancel, complete. These bypass operator identity checks entirely —
//! whatever sits in front of this host is expected to have already
//! authorized the caller as an admin before routing here.

use axum::extract::{Extension, Path};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::common::{BidId, JobId};
use crate::server::app::AppState;
use crate::server::errors::ApiError;
use crate::server::routes::offers::TransitionResponse;

pub async fn force_close_bidding_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let outcome = state.gateway.admin_force_close_bidding(job_id).await?;
    Ok(Json(outcome.into()))
}

#[derive(Deserialize)]
pub struct ManualAssignRequest {
    pub bid_id: BidId,
    pub customer_price: Decimal,
}

pub async fn manual_assign_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<ManualAssignRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let outcome = state
        .gateway
        .admin_manual_assign(job_id, req.bid_id, req.customer_price)
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn reopen_bidding_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let outcome = state.gateway.admin_reopen_bidding(job_id).await?;
    Ok(Json(outcome.into()))
}

pub async fn cancel_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let outcome = state.gateway.admin_cancel_job(job_id).await?;
    Ok(Json(outcome.into()))
}

pub async fn complete_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let outcome = state.gateway.admin_complete_job(job_id).await?;
    Ok(Json(outcome.into()))
}
