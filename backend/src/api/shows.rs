//! Show API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sqpatch_types::api::{
    ErrorResponse, LoadShowResponse, SaveShowRequest, SaveShowResponse, ShowListResponse,
    ShowResponse,
};
use tracing::{info, warn};

use super::{show_error, ApiError};
use crate::state::AppState;

/// List stored shows and the current one.
#[utoipa::path(
    get,
    path = "/api/shows",
    tag = "shows",
    responses(
        (status = 200, description = "Stored shows", body = ShowListResponse),
        (status = 500, description = "Storage error", body = ErrorResponse)
    )
)]
pub async fn list_shows(State(state): State<AppState>) -> Result<Json<ShowListResponse>, ApiError> {
    let shows = state.shows().list().await.map_err(show_error)?;
    Ok(Json(ShowListResponse {
        shows,
        current_show: state.channels().current_show().await,
    }))
}

/// Create or overwrite a show.
///
/// The name is reduced to letters, digits, `_` and `-`. Without `channels` the
/// live channel list is stored.
#[utoipa::path(
    post,
    path = "/api/shows",
    tag = "shows",
    request_body = SaveShowRequest,
    responses(
        (status = 200, description = "Show saved", body = SaveShowResponse),
        (status = 400, description = "Invalid channel records", body = ErrorResponse),
        (status = 500, description = "Storage error", body = ErrorResponse)
    )
)]
pub async fn save_show(
    State(state): State<AppState>,
    Json(req): Json<SaveShowRequest>,
) -> Result<Json<SaveShowResponse>, ApiError> {
    let applied = state
        .shows()
        .save(
            &req.name,
            req.channels.as_deref(),
            req.sq_ip.as_deref(),
            req.set_current.unwrap_or(true),
        )
        .await
        .map_err(show_error)?;
    for w in &applied.warnings {
        warn!("Saving show {}: {}", applied.value.name, w);
    }
    Ok(Json(SaveShowResponse {
        name: applied.value.name,
    }))
}

/// Get a stored show.
#[utoipa::path(
    get,
    path = "/api/shows/{name}",
    tag = "shows",
    params(
        ("name" = String, Path, description = "Show name")
    ),
    responses(
        (status = 200, description = "Show found", body = ShowResponse),
        (status = 404, description = "Show not found", body = ErrorResponse)
    )
)]
pub async fn get_show(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ShowResponse>, ApiError> {
    let show = state.shows().get(&name).await.map_err(show_error)?;
    Ok(Json(ShowResponse { show }))
}

/// Delete a stored show. The current show cannot be deleted.
#[utoipa::path(
    delete,
    path = "/api/shows/{name}",
    tag = "shows",
    params(
        ("name" = String, Path, description = "Show name")
    ),
    responses(
        (status = 204, description = "Show deleted"),
        (status = 404, description = "Show not found", body = ErrorResponse),
        (status = 409, description = "Show is the current show", body = ErrorResponse)
    )
)]
pub async fn delete_show(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.shows().delete_named(&name).await.map_err(show_error)?;
    info!("Deleted show {}", name);
    Ok(StatusCode::NO_CONTENT)
}

/// Make a stored show the live channel list and push it to the mixer.
#[utoipa::path(
    post,
    path = "/api/shows/{name}/load",
    tag = "shows",
    params(
        ("name" = String, Path, description = "Show name")
    ),
    responses(
        (status = 200, description = "Show loaded", body = LoadShowResponse),
        (status = 400, description = "Show file is invalid", body = ErrorResponse),
        (status = 404, description = "Show not found", body = ErrorResponse)
    )
)]
pub async fn load_show(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<LoadShowResponse>, ApiError> {
    let loaded = state.shows().load_named(&name).await.map_err(show_error)?;
    Ok(Json(loaded))
}
