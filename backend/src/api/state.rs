//! Full channel state API handlers.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use sqpatch_types::api::{
    ErrorResponse, ExportQuery, ImportResponse, ReplaceStateRequest, StateResponse,
};
use sqpatch_types::ShowFile;
use tracing::{info, warn};

use super::{api_error, show_error, ApiError};
use crate::state::AppState;

async fn snapshot(state: &AppState) -> StateResponse {
    let layout = state.layout().clone();
    StateResponse {
        channels: state.channels().channels().await,
        sq_ip: state.settings().get().sq_ip,
        current_show: state.channels().current_show().await,
        line_preamp_ids: layout.line_preamp_ids.clone(),
        layout,
    }
}

/// Get the channel list, mixer address and current show.
#[utoipa::path(
    get,
    path = "/api/state",
    tag = "state",
    responses(
        (status = 200, description = "Current state", body = StateResponse)
    )
)]
pub async fn get_state(State(state): State<AppState>) -> Json<StateResponse> {
    Json(snapshot(&state).await)
}

/// Replace the whole channel list.
///
/// Every record is validated before anything changes: out of range sockets,
/// duplicate ids and socket collisions reject the request.
#[utoipa::path(
    post,
    path = "/api/state",
    tag = "state",
    request_body = ReplaceStateRequest,
    responses(
        (status = 200, description = "State replaced", body = StateResponse),
        (status = 400, description = "Invalid channel list", body = ErrorResponse)
    )
)]
pub async fn replace_state(
    State(state): State<AppState>,
    Json(req): Json<ReplaceStateRequest>,
) -> Result<Json<StateResponse>, ApiError> {
    let applied = state
        .channels()
        .replace_all(&req.channels, req.current_show.as_deref())
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    for w in &applied.warnings {
        warn!("Replace state: {}", w);
    }

    if let Some(ip) = req.sq_ip.as_deref().map(str::trim).filter(|ip| !ip.is_empty()) {
        state.update_settings(Some(ip), None).await.map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_details(
                    "Failed to save mixer address",
                    e.to_string(),
                )),
            )
        })?;
    }

    info!("Channel state replaced ({} channels)", applied.value.len());
    Ok(Json(snapshot(&state).await))
}

/// Remove every channel and clear the current show.
#[utoipa::path(
    post,
    path = "/api/state/reset",
    tag = "state",
    responses(
        (status = 200, description = "State cleared", body = StateResponse)
    )
)]
pub async fn reset_state(State(state): State<AppState>) -> Json<StateResponse> {
    state.channels().reset().await;
    Json(snapshot(&state).await)
}

/// Replace the channel list from a show file.
///
/// Accepts the current show format, the legacy `cubes` layout and a bare
/// array. The current show is cleared and nothing is sent to the mixer.
#[utoipa::path(
    post,
    path = "/api/state/import",
    tag = "state",
    request_body = ShowFile,
    responses(
        (status = 200, description = "Channels imported", body = ImportResponse),
        (status = 400, description = "Invalid show file", body = ErrorResponse)
    )
)]
pub async fn import_state(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ImportResponse>, ApiError> {
    let applied = state.shows().import(&body).await.map_err(show_error)?;
    Ok(Json(ImportResponse {
        channels: applied.value.channels,
        name: applied.value.name,
        warnings: applied.warnings,
    }))
}

/// Download the channel list as a show file.
#[utoipa::path(
    get,
    path = "/api/state/export",
    tag = "state",
    params(ExportQuery),
    responses(
        (status = 200, description = "Show file", body = ShowFile)
    )
)]
pub async fn export_state(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> impl IntoResponse {
    let show = state.shows().export(query.name.as_deref()).await;
    let disposition = format!("attachment; filename=\"{}.json\"", show.name);
    ([(header::CONTENT_DISPOSITION, disposition)], Json(show))
}

