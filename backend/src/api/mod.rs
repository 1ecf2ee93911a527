//! API handlers.

pub mod channels;
pub mod preamp;
pub mod settings;
pub mod shows;
pub mod sse;
pub mod state;
pub mod sync;

use crate::allocator::AllocatorError;
use crate::channel_store::ChannelError;
use crate::shows::ShowError;
use axum::http::StatusCode;
use axum::Json;
use sqpatch_types::api::ErrorResponse;

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(error)))
}

pub(crate) fn channel_error(e: ChannelError) -> ApiError {
    let status = match &e {
        ChannelError::NotFound(_) => StatusCode::NOT_FOUND,
        ChannelError::Allocator(AllocatorError::SlotConflict { .. })
        | ChannelError::Allocator(AllocatorError::SlotsExhausted { .. }) => StatusCode::CONFLICT,
        ChannelError::Allocator(_) | ChannelError::Invalid(_) | ChannelError::Snapshot(_) => {
            StatusCode::BAD_REQUEST
        }
        ChannelError::Storage(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_details(
                    "Failed to read channel state",
                    e.to_string(),
                )),
            )
        }
    };
    api_error(status, e.to_string())
}

pub(crate) fn show_error(e: ShowError) -> ApiError {
    match e {
        ShowError::NotFound(_) => api_error(StatusCode::NOT_FOUND, e.to_string()),
        ShowError::CannotDeleteActive(_) => api_error(StatusCode::CONFLICT, e.to_string()),
        ShowError::Invalid(_) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        ShowError::Channels(e) => channel_error(e),
        ShowError::Storage(_) | ShowError::Settings(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::with_details(
                "Show storage failed",
                e.to_string(),
            )),
        ),
    }
}
