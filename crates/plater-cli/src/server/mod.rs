//! HTTP interface.
//!
//! | Route | |
//! |---|---|
//! | `POST /api/slices` | start or join a session |
//! | `GET /api/slices/:id` | session snapshot |
//! | `DELETE /api/slices/:id` | cancel |
//! | `GET /api/slices/:id/stream` | SSE progress stream |
//! | `POST /api/auto-slice` | debounced auto-trigger |
//! | `GET /health` | liveness |

mod error;
mod handlers;

pub use error::ApiError;

use crate::runtime::SliceRuntime;
use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<SliceRuntime>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/slices", post(handlers::start_slice))
        .route(
            "/api/slices/:id",
            get(handlers::get_slice).delete(handlers::cancel_slice),
        )
        .route("/api/slices/:id/stream", get(handlers::stream_slice))
        .route("/api/auto-slice", post(handlers::observe_configuration))
        .with_state(state)
}

/// Serves until Ctrl-C.
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    tracing::info!("[Server] listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("[Server] shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[Server] failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
