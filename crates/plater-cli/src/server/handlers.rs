use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use plater_core::request::SliceRequest;
use plater_core::session::{ProgressEvent, SessionId, SliceSession};
use serde::Serialize;
use std::convert::Infallible;

use super::AppState;
use super::error::ApiError;

#[derive(Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
pub(super) struct StartResponse {
    session_id: SessionId,
}

pub(super) async fn start_slice(
    State(state): State<AppState>,
    Json(request): Json<SliceRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let session_id = state.runtime.manager.start_or_get(request).await?;
    Ok(Json(StartResponse { session_id }))
}

pub(super) async fn get_slice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SliceSession>, ApiError> {
    let session = state.runtime.manager.get_state(&SessionId::from(id)).await?;
    Ok(Json(session))
}

pub(super) async fn cancel_slice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.runtime.manager.cancel(&SessionId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Server-sent events, one JSON `ProgressEvent` per frame, named by variant.
///
/// The response ends after the terminal event. Dropping the connection only
/// detaches the consumer; the session keeps running.
pub(super) async fn stream_slice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = state.runtime.manager.attach(&SessionId::from(id)).await?;
    let stream = subscription
        .into_stream()
        .map(|event| Ok::<_, Infallible>(to_sse_event(&event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &ProgressEvent) -> Event {
    match Event::default().event(event.name()).json_data(event) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!("[Server] failed to encode {} event: {}", event.name(), e);
            Event::default().comment("encoding error")
        }
    }
}

#[derive(Serialize)]
pub(super) struct ObserveResponse {
    outcome: &'static str,
}

/// Debounced trigger for clients that post every configuration edit.
pub(super) async fn observe_configuration(
    State(state): State<AppState>,
    Json(request): Json<SliceRequest>,
) -> Json<ObserveResponse> {
    let outcome = state.runtime.auto_trigger.observe(request).await;
    Json(ObserveResponse {
        outcome: outcome.as_str(),
    })
}
