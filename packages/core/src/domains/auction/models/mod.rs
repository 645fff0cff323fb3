pub mod bid;
pub mod job;
pub mod job_event;

pub use bid::{Bid, BidStatus};
pub use job::{EscalationReason, Job, JobStatus};
pub use job_event::JobEvent;
