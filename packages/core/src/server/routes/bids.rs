//! Operator-facing bid operations (spec.md §4.6 / SPEC_FULL.md §6):
//! `POST /bids`, `PATCH /bids/:id`, `POST /bids/:id/withdraw`.

use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::common::BidId;
use crate::domains::auction::eligibility::JobEligibilityContext;
use crate::domains::auction::errors::AuctionError;
use crate::domains::auction::models::Bid;
use crate::server::app::AppState;
use crate::server::caller::operator_id_from_headers;
use crate::server::errors::ApiError;

#[derive(Deserialize)]
pub struct PlaceBidRequest {
    pub job_id: crate::common::JobId,
    pub vehicle_type: String,
    pub pickup_postcode_prefix: String,
    pub customer_price: Decimal,
    pub amount: Decimal,
    pub notes: Option<String>,
}

pub async fn place_bid_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(req): Json<PlaceBidRequest>,
) -> Result<(StatusCode, Json<Bid>), ApiError> {
    let operator_id = operator_id_from_headers(&headers)?;
    let operator = state
        .kernel
        .operator_directory
        .find_by_id(operator_id)
        .await
        .map_err(AuctionError::Internal)?
        .ok_or(AuctionError::OperatorNotApproved)?;

    let job_ctx = JobEligibilityContext {
        required_vehicle_type: req.vehicle_type,
        pickup_postcode_prefix: req.pickup_postcode_prefix,
    };

    let bid = state
        .gateway
        .place_bid(
            req.job_id,
            &operator,
            &job_ctx,
            req.customer_price,
            req.amount,
            req.notes,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(bid)))
}

#[derive(Deserialize)]
pub struct UpdateBidRequest {
    pub customer_price: Decimal,
    pub amount: Decimal,
    pub notes: Option<String>,
}

pub async fn update_bid_handler(
    Extension(state): Extension<AppState>,
    Path(bid_id): Path<BidId>,
    headers: HeaderMap,
    Json(req): Json<UpdateBidRequest>,
) -> Result<Json<Bid>, ApiError> {
    let operator_id = operator_id_from_headers(&headers)?;
    let bid = state
        .gateway
        .update_bid(bid_id, operator_id, req.customer_price, req.amount, req.notes)
        .await?;
    Ok(Json(bid))
}

pub async fn withdraw_bid_handler(
    Extension(state): Extension<AppState>,
    Path(bid_id): Path<BidId>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let operator_id = operator_id_from_headers(&headers)?;
    state.gateway.withdraw_bid(bid_id, operator_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
