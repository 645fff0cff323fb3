//! Maps [`AuctionError`] to HTTP responses.
//!
//! Kept out of `domains::auction::errors` on purpose (spec.md §7 /
//! SPEC_FULL.md §7): the library stays transport-agnostic, only this host
//! knows what an HTTP status code is.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domains::auction::errors::AuctionError;

pub struct ApiError(pub AuctionError);

impl From<AuctionError> for ApiError {
    fn from(err: AuctionError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AuctionError::JobClosed => StatusCode::CONFLICT,
            AuctionError::OperatorNotApproved => StatusCode::FORBIDDEN,
            AuctionError::DocumentsMissingOrExpired => StatusCode::FORBIDDEN,
            AuctionError::VehicleTypeUnsupported => StatusCode::BAD_REQUEST,
            AuctionError::BidBelowMinimum => StatusCode::BAD_REQUEST,
            AuctionError::BidExceedsCustomerPrice => StatusCode::BAD_REQUEST,
            AuctionError::Forbidden => StatusCode::FORBIDDEN,
            AuctionError::NotFound(_) => StatusCode::NOT_FOUND,
            AuctionError::Conflict => StatusCode::CONFLICT,
            AuctionError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuctionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE) {
            tracing::error!(error = %self.0, "request failed");
        }

        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}
