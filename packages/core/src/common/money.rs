//! Fixed-point currency helpers.
//!
//! Money never touches `f64`: every price, bid amount, and margin is a
//! [`rust_decimal::Decimal`] scaled to two places, matching the exact-equality
//! boundary behaviour the auction engine's invariants depend on.

use rust_decimal::Decimal;

/// Scale a customer price by an integer percentage (e.g. `MIN_BID_PERCENT`,
/// `MAX_BID_PERCENT`), rounding to two decimal places using banker's
/// rounding.
pub fn percent_of(amount: Decimal, percent: u32) -> Decimal {
    (amount * Decimal::from(percent) / Decimal::from(100)).round_dp(2)
}
