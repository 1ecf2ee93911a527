//! Device settings API handlers.

use axum::{extract::State, http::StatusCode, Json};
use sqpatch_types::api::{ErrorResponse, SettingsResponse, UpdateSettingsRequest};
use tracing::{info, warn};

use super::ApiError;
use crate::state::AppState;

/// Get the mixer address and data directory.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "settings",
    responses(
        (status = 200, description = "Current settings", body = SettingsResponse)
    )
)]
pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    let settings = state.settings().get();
    Json(SettingsResponse {
        sq_ip: settings.sq_ip,
        data_dir: settings.data_dir,
    })
}

/// Update the mixer address and/or data directory.
///
/// A new data directory is created if needed and the channel list is reloaded
/// from it.
#[utoipa::path(
    post,
    path = "/api/config",
    tag = "settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings saved", body = SettingsResponse),
        (status = 500, description = "Settings could not be applied", body = ErrorResponse)
    )
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let applied = state
        .update_settings(req.sq_ip.as_deref(), req.data_dir.as_deref())
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_details(
                    "Failed to update settings",
                    e.to_string(),
                )),
            )
        })?;

    for w in &applied.warnings {
        warn!("Reloading state: {}", w);
    }
    info!(
        "Settings updated: mixer '{}', data dir {}",
        applied.value.sq_ip, applied.value.data_dir
    );
    Ok(Json(SettingsResponse {
        sq_ip: applied.value.sq_ip,
        data_dir: applied.value.data_dir,
    }))
}
