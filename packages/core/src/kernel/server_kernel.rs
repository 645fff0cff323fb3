// ServerKernel - core infrastructure with all dependencies
//
// The ServerKernel holds all server dependencies (database, injected
// collaborators) and provides access via traits for testability.

use sqlx::PgPool;
use std::sync::Arc;

use super::{BaseNotificationSink, BaseOperatorDirectory};
use crate::common::Settings;

/// ServerKernel holds all server dependencies.
///
/// Every component (C2-C6) is constructed with `Arc<ServerKernel>` rather
/// than reaching for a global singleton, so a lifecycle-scoped test kernel
/// with swapped-in test doubles is always possible.
#[derive(Clone)]
pub struct ServerKernel {
    pub db_pool: PgPool,
    pub settings: Arc<Settings>,
    pub notification_sink: Arc<dyn BaseNotificationSink>,
    pub operator_directory: Arc<dyn BaseOperatorDirectory>,
}

impl ServerKernel {
    pub fn new(
        db_pool: PgPool,
        settings: Arc<Settings>,
        notification_sink: Arc<dyn BaseNotificationSink>,
        operator_directory: Arc<dyn BaseOperatorDirectory>,
    ) -> Self {
        Self {
            db_pool,
            settings,
            notification_sink,
            operator_directory,
        }
    }
}
