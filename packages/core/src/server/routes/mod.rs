// HTTP routes
pub mod admin;
pub mod bids;
pub mod health;
pub mod offers;
pub mod webhooks;

pub use admin::{
    cancel_job_handler, complete_job_handler, force_close_bidding_handler, manual_assign_handler,
    reopen_bidding_handler, ManualAssignRequest,
};
pub use bids::*;
pub use health::*;
pub use offers::*;
pub use webhooks::*;
