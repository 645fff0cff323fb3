//! Operator-facing offer operations (spec.md §4.6): `POST /offers/accept`,
//! `POST /offers/decline`, `GET /offers/mine`.

use axum::extract::Extension;
use axum::http::HeaderMap;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::BidId;
use crate::domains::auction::models::Bid;
use crate::domains::auction::TransitionOutcome;
use crate::server::app::AppState;
use crate::server::caller::operator_id_from_headers;
use crate::server::errors::ApiError;

#[derive(Deserialize)]
pub struct AcceptOfferRequest {
    pub bid_id: BidId,
    pub customer_price: Decimal,
}

#[derive(Serialize)]
pub struct TransitionResponse {
    applied: bool,
}

impl From<TransitionOutcome> for TransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            applied: matches!(outcome, TransitionOutcome::Applied),
        }
    }
}

pub async fn accept_offer_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(req): Json<AcceptOfferRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let operator_id = operator_id_from_headers(&headers)?;
    let outcome = state
        .gateway
        .accept_offer(req.bid_id, operator_id, req.customer_price)
        .await?;
    Ok(Json(outcome.into()))
}

#[derive(Deserialize)]
pub struct DeclineOfferRequest {
    pub bid_id: BidId,
}

pub async fn decline_offer_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(req): Json<DeclineOfferRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let operator_id = operator_id_from_headers(&headers)?;
    let outcome = state.gateway.decline_offer(req.bid_id, operator_id).await?;
    Ok(Json(outcome.into()))
}

pub async fn list_my_offers_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Bid>>, ApiError> {
    let operator_id = operator_id_from_headers(&headers)?;
    let offers = state.gateway.list_my_offers(operator_id).await?;
    Ok(Json(offers))
}
