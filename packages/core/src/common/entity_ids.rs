//! Typed ID definitions for all domain entities.
//!
//! Each entity gets its own marker type and a type alias over [`Id`], so the
//! compiler rejects passing e.g. a `BidId` where a `JobId` is expected.
//!
//! # Example
//!
//! ```rust
//! use auction_core::common::{BidId, JobId};
//!
//! let job_id = JobId::new();
//! let bid_id = BidId::new();
//!
//! // This would be a compile error:
//! // let wrong: JobId = bid_id;
//! ```

pub use super::id::{Id, V4, V7};

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Booking entities (consumed from the payment/booking system).
pub struct Booking;

/// Marker type for Job entities (an auction's bidding/acceptance lifecycle).
pub struct Job;

/// Marker type for Bid entities.
pub struct Bid;

/// Marker type for Operator entities (consumed from the onboarding system).
pub struct Operator;

/// Marker type for TimerEntry entities (owned by the timer service).
pub struct TimerEntry;

/// Marker type for Customer entities (consumed from the booking system).
pub struct Customer;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for Booking entities. Minted upstream, so either UUID version is
/// accepted on the wire; we do not mint new BookingIds ourselves.
pub type BookingId = Id<Booking, V4>;

/// Typed ID for Job entities.
pub type JobId = Id<Job>;

/// Typed ID for Bid entities.
pub type BidId = Id<Bid>;

/// Typed ID for Operator entities. Minted upstream by operator onboarding.
pub type OperatorId = Id<Operator, V4>;

/// Typed ID for TimerEntry entities.
pub type TimerEntryId = Id<TimerEntry>;

/// Typed ID for Customer entities. Minted upstream; never dereferenced by
/// this core beyond carrying it through a `BookingPaid` payload.
pub type CustomerId = Id<Customer, V4>;
