//! Channel API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sqpatch_types::api::{
    AddChannelRequest, AvailableIdsResponse, AvailableQuery, ChannelResponse, ErrorResponse,
    GainRequest, ToggleQuery, UpdateChannelRequest,
};
use sqpatch_types::ChannelId;
use tracing::info;

use super::{channel_error, ApiError};
use crate::channel_store::Applied;
use crate::state::AppState;
use sqpatch_types::Channel;

fn respond(applied: Applied<Channel>) -> Json<ChannelResponse> {
    Json(ChannelResponse {
        channel: applied.value,
        warnings: applied.warnings,
    })
}

/// Add a mono channel on the lowest free socket of a bus.
#[utoipa::path(
    post,
    path = "/api/channels",
    tag = "channels",
    request_body = AddChannelRequest,
    responses(
        (status = 201, description = "Channel created", body = ChannelResponse),
        (status = 409, description = "No free socket on the bus", body = ErrorResponse)
    )
)]
pub async fn add_channel(
    State(state): State<AppState>,
    Json(req): Json<AddChannelRequest>,
) -> Result<(StatusCode, Json<ChannelResponse>), ApiError> {
    let applied = state
        .channels()
        .add_channel(req.name.as_deref(), req.bus)
        .await
        .map_err(channel_error)?;
    info!(
        "Created channel {} on {}",
        applied.value.id,
        applied.value.socket()
    );
    Ok((StatusCode::CREATED, respond(applied)))
}

/// Rename a channel, move it to other sockets or change its bus.
///
/// Socket changes are validated as a whole; on conflict nothing changes.
#[utoipa::path(
    patch,
    path = "/api/channels/{id}",
    tag = "channels",
    params(
        ("id" = u32, Path, description = "Channel ID")
    ),
    request_body = UpdateChannelRequest,
    responses(
        (status = 200, description = "Channel updated", body = ChannelResponse),
        (status = 400, description = "Socket out of range", body = ErrorResponse),
        (status = 404, description = "Channel not found", body = ErrorResponse),
        (status = 409, description = "Socket already in use", body = ErrorResponse)
    )
)]
pub async fn update_channel(
    State(state): State<AppState>,
    Path(id): Path<ChannelId>,
    Json(req): Json<UpdateChannelRequest>,
) -> Result<Json<ChannelResponse>, ApiError> {
    let applied = state
        .channels()
        .update(id, &req)
        .await
        .map_err(channel_error)?;
    Ok(respond(applied))
}

/// Remove a channel.
#[utoipa::path(
    delete,
    path = "/api/channels/{id}",
    tag = "channels",
    params(
        ("id" = u32, Path, description = "Channel ID")
    ),
    responses(
        (status = 200, description = "Channel removed", body = ChannelResponse),
        (status = 404, description = "Channel not found", body = ErrorResponse)
    )
)]
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(id): Path<ChannelId>,
) -> Result<Json<ChannelResponse>, ApiError> {
    let applied = state
        .channels()
        .remove_channel(id)
        .await
        .map_err(channel_error)?;
    info!("Removed channel {}", id);
    Ok(respond(applied))
}

/// Socket ids the channel could move to. Advisory: the update still validates.
#[utoipa::path(
    get,
    path = "/api/channels/{id}/available",
    tag = "channels",
    params(
        ("id" = u32, Path, description = "Channel ID"),
        AvailableQuery
    ),
    responses(
        (status = 200, description = "Candidate ids", body = AvailableIdsResponse),
        (status = 404, description = "Channel not found", body = ErrorResponse)
    )
)]
pub async fn available_ids(
    State(state): State<AppState>,
    Path(id): Path<ChannelId>,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<AvailableIdsResponse>, ApiError> {
    let bus = match query.bus {
        Some(bus) => bus,
        None => state.channels().get(id).await.map_err(channel_error)?.preamp_bus,
    };
    let ids = state
        .channels()
        .available_ids(id, bus)
        .await
        .map_err(channel_error)?;
    Ok(Json(AvailableIdsResponse {
        channel_id: id,
        bus,
        ids,
    }))
}

/// Switch phantom power on (`?on=true` or `?on=1`) or off.
///
/// The change is saved even when the mixer cannot be reached; failures are
/// returned as warnings.
#[utoipa::path(
    post,
    path = "/api/channels/{id}/phantom",
    tag = "channels",
    params(
        ("id" = u32, Path, description = "Channel ID"),
        ToggleQuery
    ),
    responses(
        (status = 200, description = "Phantom updated", body = ChannelResponse),
        (status = 404, description = "Channel not found", body = ErrorResponse)
    )
)]
pub async fn set_phantom(
    State(state): State<AppState>,
    Path(id): Path<ChannelId>,
    Query(query): Query<ToggleQuery>,
) -> Result<Json<ChannelResponse>, ApiError> {
    let applied = state
        .channels()
        .set_phantom(id, query.is_on())
        .await
        .map_err(channel_error)?;
    Ok(respond(applied))
}

/// Switch the pad on (`?on=true` or `?on=1`) or off.
#[utoipa::path(
    post,
    path = "/api/channels/{id}/pad",
    tag = "channels",
    params(
        ("id" = u32, Path, description = "Channel ID"),
        ToggleQuery
    ),
    responses(
        (status = 200, description = "Pad updated", body = ChannelResponse),
        (status = 404, description = "Channel not found", body = ErrorResponse)
    )
)]
pub async fn set_pad(
    State(state): State<AppState>,
    Path(id): Path<ChannelId>,
    Query(query): Query<ToggleQuery>,
) -> Result<Json<ChannelResponse>, ApiError> {
    let applied = state
        .channels()
        .set_pad(id, query.is_on())
        .await
        .map_err(channel_error)?;
    Ok(respond(applied))
}

/// Set preamp gain. The value is clamped to 0-60 dB and reaches the mixer once
/// it stops changing.
#[utoipa::path(
    put,
    path = "/api/channels/{id}/gain",
    tag = "channels",
    params(
        ("id" = u32, Path, description = "Channel ID")
    ),
    request_body = GainRequest,
    responses(
        (status = 200, description = "Gain accepted", body = ChannelResponse),
        (status = 404, description = "Channel not found", body = ErrorResponse)
    )
)]
pub async fn set_gain(
    State(state): State<AppState>,
    Path(id): Path<ChannelId>,
    Json(req): Json<GainRequest>,
) -> Result<Json<ChannelResponse>, ApiError> {
    let applied = state
        .channels()
        .set_gain(id, req.db)
        .await
        .map_err(channel_error)?;
    Ok(respond(applied))
}
