//! Standalone binary hosting the Timer Service's polling worker.
//!
//! Kept separate from the HTTP server so the two can scale independently,
//! the same split the kernel's background-job infrastructure was built
//! around.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use auction_core::common::Settings;
use auction_core::domains::auction::worker::{TimerWorker, TimerWorkerConfig};
use auction_core::kernel::{LoggingNotificationSink, PostgresOperatorDirectory, ServerKernel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/auction".to_string());

    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let settings = Arc::new(Settings::from_env());
    let operator_directory = Arc::new(PostgresOperatorDirectory::new(db_pool.clone()));
    let kernel = Arc::new(ServerKernel::new(
        db_pool,
        settings,
        Arc::new(LoggingNotificationSink),
        operator_directory,
    ));

    let shutdown = CancellationToken::new();
    let worker = TimerWorker::new(kernel, TimerWorkerConfig::default());

    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_signal.cancel();
        }
    });

    worker.run(shutdown).await;

    // Give any final fire's notification delivery a moment to land.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
