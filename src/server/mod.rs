// src/server/mod.rs

//! HTTP + SSE transport.
//!
//! | Route                       | Answer                                   |
//! |-----------------------------|------------------------------------------|
//! | `GET  /api/runs`            | catalog names                            |
//! | `GET  /api/runs/active`     | names with a live run                    |
//! | `GET  /api/stream/{name}`   | start the run, stream it as SSE          |
//! | `POST /api/abort/{name}`    | `{"ok":true,"was_active":bool}`          |
//! | `POST /api/reset`           | `{"ok":true,"aborted":n}`                |
//!
//! The transport owns no run state; everything goes through the
//! [`Orchestrator`].

pub mod routes;
pub mod sse;

use std::future::Future;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;

use crate::exec::ProcessBackend;
use crate::orchestrator::Orchestrator;

pub use sse::SseFrame;

pub fn router<B: ProcessBackend>(orchestrator: Orchestrator<B>) -> Router {
    Router::new()
        .route("/api/runs", get(routes::list_runs::<B>))
        .route("/api/runs/active", get(routes::list_active::<B>))
        .route("/api/stream/{name}", get(routes::stream_run::<B>))
        .route("/api/abort/{name}", post(routes::abort_run::<B>))
        .route("/api/reset", post(routes::reset::<B>))
        .with_state(orchestrator)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn bind_and_serve<B, F>(addr: &str, orchestrator: Orchestrator<B>, shutdown: F) -> Result<()>
where
    B: ProcessBackend,
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve(listener, orchestrator, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// On shutdown every active run is aborted first, so open event streams end
/// with their `aborted` marker and the server can drain its connections.
pub async fn serve<B, F>(listener: TcpListener, orchestrator: Orchestrator<B>, shutdown: F) -> Result<()>
where
    B: ProcessBackend,
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("listener has no local address")?;
    info!(%addr, "runherd listening");

    let app = router(orchestrator.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let aborted = orchestrator.reset_all().await;
            info!(aborted, "shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}
