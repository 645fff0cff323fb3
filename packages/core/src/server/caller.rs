//! Resolves the calling operator's identity from the request.
//!
//! Authentication and session management are an external collaborator
//! (spec.md §1 Non-goals): whatever sits in front of this host (an API
//! gateway, a reverse proxy doing JWT verification) is expected to attach
//! the caller's operator id to the request. This host only reads it back
//! out of a header; it never verifies who set it.

use axum::http::HeaderMap;

use crate::common::OperatorId;
use crate::server::errors::ApiError;
use crate::domains::auction::errors::AuctionError;

pub const OPERATOR_ID_HEADER: &str = "x-operator-id";

pub fn operator_id_from_headers(headers: &HeaderMap) -> Result<OperatorId, ApiError> {
    let raw = headers
        .get(OPERATOR_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuctionError::Forbidden)?;
    let id: uuid::Uuid = raw.parse().map_err(|_| AuctionError::Forbidden)?;
    Ok(OperatorId::from(id))
}
