use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::domain::types::ErrorKind;
use crate::purge::coordinator::PurgeStatus;
use crate::purge::queue::{JobRecord, QueueError};
use crate::purge::trigger::PurgeTrigger;

use super::error::ApiError;
use super::models::{HookRequestBody, PurgeRequestBody, StatusResponse};
use super::state::ApiState;

pub async fn purge(
    State(state): State<ApiState>,
    Json(payload): Json<PurgeRequestBody>,
) -> Response {
    let trigger = PurgeTrigger::SitePurge {
        urls: payload.urls,
        mode: payload.mode,
    };
    purge_response(state.coordinator.handle(trigger).await)
}

pub async fn theme_switched(State(state): State<ApiState>) -> Response {
    purge_response(state.coordinator.handle(PurgeTrigger::ThemeChanged).await)
}

pub async fn external_hook(
    State(state): State<ApiState>,
    Json(payload): Json<HookRequestBody>,
) -> Result<Response, ApiError> {
    let source = payload.source.trim();
    if source.is_empty() {
        return Err(ApiError::bad_request(
            "Hook source is required",
            Some("set `source` to the integration asking for the purge".to_string()),
        ));
    }

    let trigger = PurgeTrigger::ExternalHook {
        source: source.to_string(),
    };
    Ok(purge_response(state.coordinator.handle(trigger).await))
}

pub async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|err| ApiError::bad_request("Invalid job id", Some(err.to_string())))?;
    let queue = state.queue().ok_or_else(ApiError::queue_unavailable)?;
    let record = queue.job(&id).ok_or(QueueError::UnknownJob(id))?;
    Ok(Json(record))
}

pub async fn get_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let queue = state.queue();
    Json(StatusResponse {
        capability: state.coordinator.detector().capability(),
        queue_running: queue.is_some(),
        queue_depth: queue.map(|queue| queue.depth()).unwrap_or(0),
    })
}

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

fn purge_response(status: PurgeStatus) -> Response {
    let code = status_code_for(&status);
    (code, Json(status)).into_response()
}

/// Purge failures are reported in the body; the status code only summarises them.
fn status_code_for(status: &PurgeStatus) -> StatusCode {
    match status {
        PurgeStatus::Disabled | PurgeStatus::Skipped(_) => StatusCode::OK,
        PurgeStatus::Scheduled(_) => StatusCode::ACCEPTED,
        PurgeStatus::Completed(outcome) => match outcome.error_kind {
            None if outcome.is_success() => StatusCode::OK,
            None => StatusCode::BAD_GATEWAY,
            Some(ErrorKind::Disabled) => StatusCode::OK,
            Some(ErrorKind::SchedulerUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Some(ErrorKind::EndpointUnresolved | ErrorKind::TransportFailure) => {
                StatusCode::BAD_GATEWAY
            }
        },
    }
}
