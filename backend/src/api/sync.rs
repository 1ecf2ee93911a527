//! Mixer sync API handlers.

use axum::{extract::State, http::StatusCode, Json};
use sqpatch_types::api::{ErrorResponse, SyncStartedResponse};
use sqpatch_types::SyncStatusResponse;

use super::{api_error, ApiError};
use crate::state::{AppState, StartSyncError};

/// Start pushing every channel to the mixer.
///
/// Returns immediately; poll `/api/sync/status` for progress. Only one sync
/// runs at a time.
#[utoipa::path(
    post,
    path = "/api/sync",
    tag = "sync",
    responses(
        (status = 202, description = "Sync started", body = SyncStartedResponse),
        (status = 400, description = "Mixer address not set", body = ErrorResponse),
        (status = 409, description = "A sync is already running", body = ErrorResponse)
    )
)]
pub async fn start_sync(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SyncStartedResponse>), ApiError> {
    match state.start_sync().await {
        Ok(total) => Ok((
            StatusCode::ACCEPTED,
            Json(SyncStartedResponse {
                started: true,
                total,
            }),
        )),
        Err(e @ StartSyncError::NoMixer) => Err(api_error(StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => Err(api_error(StatusCode::CONFLICT, e.to_string())),
    }
}

/// Progress of the running sync, or the result of the last one.
#[utoipa::path(
    get,
    path = "/api/sync/status",
    tag = "sync",
    responses(
        (status = 200, description = "Sync status", body = SyncStatusResponse)
    )
)]
pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatusResponse> {
    Json(state.sync().status())
}
