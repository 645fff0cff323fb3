//! Application setup and server configuration.
//!
//! Builds the thin axum host mentioned in spec.md §1 as an external
//! collaborator: this module only wires routes to `domains::auction`
//! operations and attaches cross-cutting middleware (CORS, request
//! tracing). No business rule lives here.

use std::sync::Arc;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, patch, post},
    Extension, Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::common::Settings;
use crate::domains::auction::{AuctionEngine, BidGateway};
use crate::kernel::{BaseNotificationSink, BaseOperatorDirectory, ServerKernel};
use crate::server::routes::{
    booking_cancelled_handler, booking_paid_handler, cancel_job_handler, complete_job_handler,
    decline_offer_handler, force_close_bidding_handler, health_handler, list_my_offers_handler,
    manual_assign_handler, place_bid_handler, reopen_bidding_handler, update_bid_handler,
    withdraw_bid_handler,
};

use super::routes::offers::accept_offer_handler;

/// Shared state handed to every route via an [`Extension`].
///
/// Holds the three collaborators a request handler ever needs: the kernel
/// (for reads that don't go through a domain effect, and for health
/// checks), the operator-facing gateway (C6), and the auction engine (C5)
/// for the two system-to-system webhooks.
#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<ServerKernel>,
    pub gateway: Arc<BidGateway>,
    pub engine: Arc<AuctionEngine>,
}

impl AppState {
    pub fn new(kernel: Arc<ServerKernel>) -> Self {
        let gateway = Arc::new(BidGateway::new(kernel.clone()));
        let engine = Arc::new(AuctionEngine::new(kernel.clone()));
        Self {
            kernel,
            gateway,
            engine,
        }
    }
}

/// Builds the kernel (C0) from its injected collaborators and constructs
/// the router. Split from `main`/`timer-worker` so both binaries, and
/// tests, share one wiring path.
pub fn build_kernel(
    db_pool: PgPool,
    settings: Arc<Settings>,
    notification_sink: Arc<dyn BaseNotificationSink>,
    operator_directory: Arc<dyn BaseOperatorDirectory>,
) -> Arc<ServerKernel> {
    Arc::new(ServerKernel::new(
        db_pool,
        settings,
        notification_sink,
        operator_directory,
    ))
}

/// Builds the axum [`Router`] exposing C6's operator-facing operations,
/// the two consumed-event webhooks, the admin surface, and a health check.
pub fn build_app(kernel: Arc<ServerKernel>) -> Router {
    let state = AppState::new(kernel);

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/webhooks/booking-paid", post(booking_paid_handler))
        .route(
            "/webhooks/booking-cancelled",
            post(booking_cancelled_handler),
        )
        .route("/bids", post(place_bid_handler))
        .route("/bids/:id", patch(update_bid_handler))
        .route("/bids/:id/withdraw", post(withdraw_bid_handler))
        .route("/offers/accept", post(accept_offer_handler))
        .route("/offers/decline", post(decline_offer_handler))
        .route("/offers/mine", get(list_my_offers_handler))
        .route(
            "/admin/jobs/:id/force-close-bidding",
            post(force_close_bidding_handler),
        )
        .route("/admin/jobs/:id/manual-assign", post(manual_assign_handler))
        .route("/admin/jobs/:id/reopen-bidding", post(reopen_bidding_handler))
        .route("/admin/jobs/:id/cancel", post(cancel_job_handler))
        .route("/admin/jobs/:id/complete", post(complete_job_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
