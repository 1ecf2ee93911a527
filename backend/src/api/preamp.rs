//! Direct preamp socket API handlers.
//!
//! These address a socket rather than a channel. Channels using the socket
//! are updated once the mixer has accepted the command.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sqpatch_types::api::{
    ErrorResponse, GainQuery, GainRequest, PreampGainResponse, PreampToggleResponse, ToggleQuery,
};
use sqpatch_types::{PreampBus, PreampSocket, GAIN_MAX_DB, GAIN_MIN_DB};

use super::{api_error, ApiError};
use crate::protocol::PreampCommand;
use crate::state::{AppState, PreampCommandError};

fn parse_socket(state: &AppState, bus: &str, id: &str) -> Result<PreampSocket, ApiError> {
    let bus: PreampBus = bus
        .parse()
        .map_err(|e: sqpatch_types::channel::ParseBusError| {
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        })?;
    let max = state.layout().max_id(bus);
    match id.parse::<u8>() {
        Ok(id) if id >= 1 && id <= max => Ok(PreampSocket::new(bus, id)),
        _ => Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("Invalid {} preamp id '{}' (1-{})", bus.label(), id, max),
        )),
    }
}

async fn send(state: &AppState, socket: PreampSocket, command: PreampCommand) -> Result<(), ApiError> {
    match state.send_preamp_command(socket, command).await {
        Ok(_) => Ok(()),
        Err(e @ PreampCommandError::NoMixer) => Err(api_error(StatusCode::BAD_REQUEST, e.to_string())),
        Err(PreampCommandError::Device(e)) => Err((
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse::with_details(
                format!("Mixer did not accept {} for {}", command, socket),
                e.to_string(),
            )),
        )),
    }
}

/// Switch phantom power on a socket.
///
/// Line inputs have no phantom power; the request succeeds without effect.
#[utoipa::path(
    post,
    path = "/preamp/{bus}/{id}/phantom",
    tag = "preamp",
    params(
        ("bus" = String, Path, description = "local or slink"),
        ("id" = u8, Path, description = "Socket number"),
        ToggleQuery
    ),
    responses(
        (status = 200, description = "Command sent", body = PreampToggleResponse),
        (status = 400, description = "Invalid socket or mixer address not set", body = ErrorResponse),
        (status = 502, description = "Mixer unreachable", body = ErrorResponse)
    )
)]
pub async fn set_phantom(
    State(state): State<AppState>,
    Path((bus, id)): Path<(String, String)>,
    Query(query): Query<ToggleQuery>,
) -> Result<Json<PreampToggleResponse>, ApiError> {
    let socket = parse_socket(&state, &bus, &id)?;
    let on = query.is_on();
    send(&state, socket, PreampCommand::Phantom(on)).await?;
    Ok(Json(PreampToggleResponse {
        preamp: socket.id,
        phantom: Some(on),
        pad: None,
    }))
}

/// Switch the pad on a socket.
#[utoipa::path(
    post,
    path = "/preamp/{bus}/{id}/pad",
    tag = "preamp",
    params(
        ("bus" = String, Path, description = "local or slink"),
        ("id" = u8, Path, description = "Socket number"),
        ToggleQuery
    ),
    responses(
        (status = 200, description = "Command sent", body = PreampToggleResponse),
        (status = 400, description = "Invalid socket or mixer address not set", body = ErrorResponse),
        (status = 502, description = "Mixer unreachable", body = ErrorResponse)
    )
)]
pub async fn set_pad(
    State(state): State<AppState>,
    Path((bus, id)): Path<(String, String)>,
    Query(query): Query<ToggleQuery>,
) -> Result<Json<PreampToggleResponse>, ApiError> {
    let socket = parse_socket(&state, &bus, &id)?;
    let on = query.is_on();
    send(&state, socket, PreampCommand::Pad(on)).await?;
    Ok(Json(PreampToggleResponse {
        preamp: socket.id,
        phantom: None,
        pad: Some(on),
    }))
}

/// Set gain on a socket, sent immediately.
///
/// Takes `{"db": n}` as the body or `?db=n`. Values outside 0-60 dB are
/// rejected.
#[utoipa::path(
    post,
    path = "/preamp/{bus}/{id}/gain",
    tag = "preamp",
    params(
        ("bus" = String, Path, description = "local or slink"),
        ("id" = u8, Path, description = "Socket number"),
        GainQuery
    ),
    request_body = GainRequest,
    responses(
        (status = 200, description = "Command sent", body = PreampGainResponse),
        (status = 400, description = "Invalid socket, gain or mixer address not set", body = ErrorResponse),
        (status = 502, description = "Mixer unreachable", body = ErrorResponse)
    )
)]
pub async fn set_gain(
    State(state): State<AppState>,
    Path((bus, id)): Path<(String, String)>,
    Query(query): Query<GainQuery>,
    body: Bytes,
) -> Result<Json<PreampGainResponse>, ApiError> {
    let socket = parse_socket(&state, &bus, &id)?;

    let db = if body.iter().all(u8::is_ascii_whitespace) {
        query.db
    } else {
        let req: GainRequest = serde_json::from_slice(&body).map_err(|e| {
            api_error(StatusCode::BAD_REQUEST, format!("Invalid gain body: {}", e))
        })?;
        Some(req.db)
    };
    let db = match db {
        Some(db) if db.is_finite() && db >= GAIN_MIN_DB as f64 && db <= GAIN_MAX_DB as f64 => db,
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("db must be between {} and {}", GAIN_MIN_DB, GAIN_MAX_DB),
            ))
        }
    };

    send(&state, socket, PreampCommand::Gain(db.round() as u8)).await?;
    Ok(Json(PreampGainResponse {
        preamp: socket.id,
        gain_db: db,
    }))
}
