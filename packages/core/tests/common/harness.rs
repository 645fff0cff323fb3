//! Test harness with testcontainers for integration testing.
//!
//! Uses a shared Postgres container across all tests for performance: the
//! container and migrations are started once on first use, then every test
//! opens its own pool and its own kernel wiring against it. Tests that
//! mutate rows stay independent by minting fresh booking/operator ids
//! rather than by isolating the container.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio::sync::{mpsc, Mutex, OnceCell};

use auction_core::common::Settings;
use auction_core::domains::auction::notifications::NotificationIntent;
use auction_core::domains::auction::{AuctionEngine, BidGateway};
use auction_core::kernel::{ChannelNotificationSink, PostgresOperatorDirectory, ServerKernel};

// =============================================================================
// Shared Test Infrastructure
// =============================================================================

struct SharedTestInfra {
    db_url: String,
    _postgres: ContainerAsync<GenericImage>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = GenericImage::new("postgres", "16-alpine")
            .with_wait_for(testcontainers::core::WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_exposed_port(testcontainers::core::ContainerPort::Tcp(5432))
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_DB", "postgres")
            .start()
            .await
            .context("failed to start postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPool::connect(&db_url)
            .await
            .context("failed to connect to postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        pool.close().await;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("failed to initialize shared test infrastructure")
            })
            .await
    }
}

// =============================================================================
// Per-test Harness
// =============================================================================

/// Everything a lifecycle test needs: a live pool against the shared
/// container, the three auction collaborators wired with a channel-backed
/// notification sink, and the receiving end of that channel so assertions
/// can inspect exactly what the engine emitted.
pub struct TestHarness {
    pub db_pool: PgPool,
    pub kernel: Arc<ServerKernel>,
    pub gateway: Arc<BidGateway>,
    pub engine: Arc<AuctionEngine>,
    pub notifications: Mutex<mpsc::Receiver<NotificationIntent>>,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        Self::with_settings(Settings::from_env()).await
    }

    /// Builds a harness against an explicit [`Settings`], for tests that
    /// need a short bidding or acceptance window rather than the defaults.
    pub async fn with_settings(settings: Settings) -> Result<Self> {
        let infra = SharedTestInfra::get().await;
        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("failed to connect to test database")?;

        let (sink, rx) = ChannelNotificationSink::new(64);
        let operator_directory = Arc::new(PostgresOperatorDirectory::new(db_pool.clone()));
        let kernel = Arc::new(ServerKernel::new(
            db_pool.clone(),
            Arc::new(settings),
            Arc::new(sink),
            operator_directory,
        ));
        let gateway = Arc::new(BidGateway::new(kernel.clone()));
        let engine = Arc::new(AuctionEngine::new(kernel.clone()));

        Ok(Self {
            db_pool,
            kernel,
            gateway,
            engine,
            notifications: Mutex::new(rx),
        })
    }

    /// Drains every notification intent emitted so far, in emission order.
    pub async fn drain_notifications(&self) -> Vec<NotificationIntent> {
        let mut rx = self.notifications.lock().await;
        let mut out = Vec::new();
        while let Ok(intent) = rx.try_recv() {
            out.push(intent);
        }
        out
    }
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}
