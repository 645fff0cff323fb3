use thiserror::Error;

/// Errors surfaced by the auction engine and bid gateway.
///
/// `Conflict`/`NotFound` on an already-processed transition are expected
/// under concurrent delivery (duplicate timer firings, racing accept vs.
/// timeout) — callers on the idempotent path should log these at `info`,
/// not treat them as failures.
#[derive(Error, Debug)]
pub enum AuctionError {
    #[error("job is not open for bidding")]
    JobClosed,

    #[error("operator is not approved")]
    OperatorNotApproved,

    #[error("operator is missing a current operating license or insurance document")]
    DocumentsMissingOrExpired,

    #[error("operator's vehicle type is not supported for this job")]
    VehicleTypeUnsupported,

    #[error("bid amount is below the minimum allowed percentage of the customer price")]
    BidBelowMinimum,

    #[error("bid amount exceeds the customer price")]
    BidExceedsCustomerPrice,

    #[error("caller is not authorized to act on this bid or job")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("transition already applied or no longer valid for the current state")]
    Conflict,

    #[error("transient database error, retries exhausted: {0}")]
    Transient(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
