// src/server/routes.rs

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::parse_duration;
use crate::errors::RunherdError;
use crate::exec::ProcessBackend;
use crate::orchestrator::{Orchestrator, RunOptions};
use crate::server::sse::SseFrame;

#[derive(Debug, Deserialize)]
pub(crate) struct StreamQuery {
    /// Per-request timeout override, e.g. `90s`.
    timeout: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AbortResponse {
    ok: bool,
    was_active: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResetResponse {
    ok: bool,
    aborted: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

/// An error answered with a JSON body.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<RunherdError> for ApiError {
    fn from(err: RunherdError) -> Self {
        let status = match &err {
            RunherdError::UnknownRun(_) => StatusCode::NOT_FOUND,
            RunherdError::RunBusy(_) => StatusCode::CONFLICT,
            RunherdError::InvalidRunName(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            ok: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

pub(crate) async fn list_runs<B: ProcessBackend>(
    State(orchestrator): State<Orchestrator<B>>,
) -> Json<Vec<String>> {
    Json(orchestrator.list_known_run_names())
}

pub(crate) async fn list_active<B: ProcessBackend>(
    State(orchestrator): State<Orchestrator<B>>,
) -> Json<Vec<String>> {
    Json(orchestrator.list_active_runs())
}

/// Start a catalog run and stream it.
///
/// The subscription lives inside the response body; when the client goes
/// away hyper drops the body, and with it the subscription, which stops the
/// run.
pub(crate) async fn stream_run<B: ProcessBackend>(
    State(orchestrator): State<Orchestrator<B>>,
    Path(name): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let timeout = match query.timeout.as_deref() {
        Some(raw) => {
            let timeout = parse_duration(raw)
                .map_err(|e| ApiError::bad_request(format!("invalid timeout: {e}")))?;
            if timeout.is_zero() {
                return Err(ApiError::bad_request("invalid timeout: must be greater than zero"));
            }
            Some(timeout)
        }
        None => None,
    };

    let subscription = orchestrator
        .start_catalog_run(&name, RunOptions { timeout })
        .await
        .inspect_err(|e| warn!(run = %name, error = %e, "stream request refused"))?;
    info!(run = %name, run_id = %subscription.id(), "streaming run to client");

    let events = subscription.map(|event| Ok(Event::from(SseFrame::from_event(&event))));
    Ok(Sse::new(events))
}

pub(crate) async fn abort_run<B: ProcessBackend>(
    State(orchestrator): State<Orchestrator<B>>,
    Path(name): Path<String>,
) -> Json<AbortResponse> {
    let was_active = orchestrator.abort_run(&name).await;
    Json(AbortResponse {
        ok: true,
        was_active,
    })
}

pub(crate) async fn reset<B: ProcessBackend>(
    State(orchestrator): State<Orchestrator<B>>,
) -> Json<ResetResponse> {
    let aborted = orchestrator.reset_all().await;
    Json(ResetResponse { ok: true, aborted })
}
