// Main entry point for the auction core's HTTP host.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auction_core::common::Settings;
use auction_core::kernel::{LoggingNotificationSink, PostgresOperatorDirectory};
use auction_core::server::build_kernel;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,auction_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting auction core server");

    let settings = Arc::new(Settings::from_env());

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    tracing::info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;

    tracing::info!("running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let operator_directory = Arc::new(PostgresOperatorDirectory::new(pool.clone()));
    let kernel = build_kernel(
        pool,
        settings,
        Arc::new(LoggingNotificationSink),
        operator_directory,
    );

    let app = auction_core::server::build_app(kernel);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{port}");
    tracing::info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
