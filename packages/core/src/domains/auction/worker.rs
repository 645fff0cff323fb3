//! Timer worker: polls [`TimerEntry`] for due entries and dispatches them to
//! the two [`AuctionEngine`] handlers that care, with a heartbeat so a lease
//! isn't reclaimed out from under a still-running fire.
//!
//! Mirrors the kernel job worker's claim/heartbeat/graceful-shutdown shape,
//! closed over a fixed two-variant dispatch instead of a generic command
//! registry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::common::JobId;
use crate::domains::auction::engine::AuctionEngine;
use crate::domains::auction::models::Job;
use crate::domains::auction::timers::{TimerEntry, TimerFire};
use crate::kernel::ServerKernel;

#[derive(Debug, Clone)]
pub struct TimerWorkerConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub lease: ChronoDuration,
    pub worker_id: String,
}

impl Default for TimerWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            poll_interval: Duration::from_secs(2),
            lease: ChronoDuration::seconds(30),
            worker_id: format!("timer-worker-{}", Uuid::new_v4()),
        }
    }
}

pub struct TimerWorker {
    kernel: Arc<ServerKernel>,
    engine: AuctionEngine,
    config: TimerWorkerConfig,
}

impl TimerWorker {
    pub fn new(kernel: Arc<ServerKernel>, config: TimerWorkerConfig) -> Self {
        let engine = AuctionEngine::new(kernel.clone());
        Self {
            kernel,
            engine,
            config,
        }
    }

    /// Runs until `shutdown` is cancelled, draining whatever batch is
    /// in-flight before returning.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(worker_id = %self.config.worker_id, "timer worker starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let entries = match TimerEntry::claim_due(
                self.config.batch_size,
                &self.config.worker_id,
                self.config.lease,
                &self.kernel,
            )
            .await
            {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::error!(error = %err, "failed to claim due timers");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if entries.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
                continue;
            }

            tracing::debug!(count = entries.len(), "claimed due timers");
            for entry in entries {
                self.fire(entry).await;
            }
        }

        tracing::info!(worker_id = %self.config.worker_id, "timer worker stopped");
    }

    async fn fire(&self, entry: TimerEntry) {
        let Some(decoded) = entry.decode() else {
            tracing::warn!(external_id = %entry.external_id, "discarding timer with undecodable payload");
            return;
        };

        let job_id: JobId = match decoded {
            TimerFire::CloseBidding { job_id } => job_id,
            TimerFire::AcceptanceTimeout { job_id, .. } => job_id,
        };

        let job = match Job::find_by_id(job_id, &self.kernel.db_pool).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "discarding timer for missing job");
                return;
            }
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "failed to load job for timer");
                return;
            }
        };

        let result = match decoded {
            TimerFire::CloseBidding { .. } => self.engine.close_bidding(&job).await,
            TimerFire::AcceptanceTimeout { attempt, .. } => {
                self.engine.handle_acceptance_timeout(&job, attempt).await
            }
        };

        match result {
            Ok(outcome) => {
                tracing::debug!(job_id = %job_id, outcome = ?outcome, "timer fired");
                match entry.mark_done(&self.config.worker_id, &self.kernel).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(
                            external_id = %entry.external_id,
                            "lease lost before entry could be retired; leaving for reclaim"
                        );
                    }
                    Err(err) => {
                        tracing::error!(
                            external_id = %entry.external_id,
                            error = %err,
                            "failed to retire fired timer"
                        );
                    }
                }
            }
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "timer handler failed");
            }
        }
    }
}
