//! HTTP front end for critic.
//!
//! Accepts review requests, runs them on a bounded worker queue and reports
//! their status. Also serves a canned demo review.

mod error;
pub mod queue;
mod routes;
mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use critic_core::CriticConfig;
use tokio::signal;
use tracing::{error, info};

pub use error::{AppError, AppResult};
pub use queue::{JobStatus, PipelineRunner, ReviewQueue, ReviewRunner};
pub use state::AppState;

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/review", post(routes::submit_review))
        .route(
            "/review/{review_id}",
            get(routes::review_status).delete(routes::cancel_review),
        )
        .route("/demo-review", get(routes::demo_review))
        .with_state(state)
}

/// Serve on `config.server.bind` until Ctrl+C.
///
/// # Errors
///
/// Returns [`AppError::Bind`] if the address cannot be bound and
/// [`AppError::Server`] if serving fails.
pub async fn start(config: CriticConfig) -> Result<(), AppError> {
    let config = Arc::new(config);
    let addr = config.server.bind.clone();
    let runner = Arc::new(PipelineRunner::new(config.clone()));
    let state = AppState::new(config, runner);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, "review service listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
