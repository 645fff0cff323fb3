// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
//
// Naming convention: Base* for trait names (e.g. BaseNotificationSink),
// matching how other injected infrastructure collaborators are named in
// this codebase.

use async_trait::async_trait;

use crate::common::OperatorId;
use crate::domains::auction::eligibility::OperatorProfile;
use crate::domains::auction::notifications::NotificationIntent;

/// Delivers notification intents emitted by the auction engine.
///
/// Delivery is always best-effort: a failure here is logged and never rolls
/// back the state transition that produced the intent.
#[async_trait]
pub trait BaseNotificationSink: Send + Sync {
    async fn send(&self, intent: NotificationIntent);
}

/// Logs every intent at `info` level and otherwise drops it. This is the
/// production sink for this core: real delivery (push/SMS/email) is an
/// external collaborator out of scope here.
pub struct LoggingNotificationSink;

#[async_trait]
impl BaseNotificationSink for LoggingNotificationSink {
    async fn send(&self, intent: NotificationIntent) {
        tracing::info!(intent = ?intent, "notification intent emitted");
    }
}

/// Test double that forwards every intent onto a bounded channel so tests
/// can assert on exactly what was emitted.
pub struct ChannelNotificationSink {
    tx: tokio::sync::mpsc::Sender<NotificationIntent>,
}

impl ChannelNotificationSink {
    pub fn new(capacity: usize) -> (Self, tokio::sync::mpsc::Receiver<NotificationIntent>) {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl BaseNotificationSink for ChannelNotificationSink {
    async fn send(&self, intent: NotificationIntent) {
        if self.tx.send(intent).await.is_err() {
            tracing::warn!("notification receiver dropped, intent discarded");
        }
    }
}

/// Read-only access to the operator population the Eligibility Filter (C2)
/// checks a job against. Operators are onboarded and approved by an external
/// collaborator (spec.md §1); this core only ever reads them.
#[async_trait]
pub trait BaseOperatorDirectory: Send + Sync {
    /// Approved operators whose `vehicleTypes` includes `vehicle_type`, with
    /// their document set attached. The full eligibility check (document
    /// currency, postcode) still runs in `eligibility::evaluate` — this is
    /// only a coarse candidate set to avoid scanning every operator.
    async fn candidates_for_vehicle_type(
        &self,
        vehicle_type: &str,
    ) -> Result<Vec<OperatorProfile>, anyhow::Error>;

    /// A single operator's profile, for callers (the HTTP host) that already
    /// know which operator is calling and only need that one record.
    async fn find_by_id(
        &self,
        operator_id: OperatorId,
    ) -> Result<Option<OperatorProfile>, anyhow::Error>;
}

/// Test double returning a fixed, pre-populated candidate set regardless of
/// vehicle type.
pub struct StaticOperatorDirectory {
    operators: Vec<OperatorProfile>,
}

impl StaticOperatorDirectory {
    pub fn new(operators: Vec<OperatorProfile>) -> Self {
        Self { operators }
    }
}

#[async_trait]
impl BaseOperatorDirectory for StaticOperatorDirectory {
    async fn candidates_for_vehicle_type(
        &self,
        _vehicle_type: &str,
    ) -> Result<Vec<OperatorProfile>, anyhow::Error> {
        Ok(self.operators.clone())
    }

    async fn find_by_id(
        &self,
        operator_id: OperatorId,
    ) -> Result<Option<OperatorProfile>, anyhow::Error> {
        Ok(self.operators.iter().find(|o| o.id == operator_id).cloned())
    }
}
