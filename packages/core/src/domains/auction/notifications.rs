//! Notification Sink: typed intents emitted by the auction engine.
//!
//! Delivery itself (push/SMS/email) is an external collaborator; this core
//! only ever produces an intent and hands it to whatever
//! [`crate::kernel::BaseNotificationSink`] is wired in.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::{BidId, JobId, OperatorId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotificationIntent {
    BroadcastNewJob {
        job_id: JobId,
        max_bid_amount: Decimal,
        eligible_operator_ids: Vec<OperatorId>,
    },
    JobOffer {
        job_id: JobId,
        bid_id: BidId,
        operator_id: OperatorId,
        acceptance_closes_at: chrono::DateTime<chrono::Utc>,
    },
    BidWon {
        job_id: JobId,
        bid_id: BidId,
        operator_id: OperatorId,
        amount: Decimal,
    },
    JobEscalationToAdmin {
        job_id: JobId,
        reason: crate::domains::auction::models::EscalationReason,
    },
}
