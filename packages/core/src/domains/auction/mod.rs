pub mod booking;
pub mod eligibility;
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod notifications;
pub mod timers;
pub mod worker;

pub use booking::{BookingCancelled, BookingPaid, JourneyType};
pub use engine::{AuctionEngine, TransitionOutcome};
pub use errors::AuctionError;
pub use gateway::BidGateway;
