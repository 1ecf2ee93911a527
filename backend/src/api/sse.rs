//! Server-Sent Events endpoint for real-time updates.

use axum::extract::State;
use axum::response::sse::Sse;
use futures::Stream;
use std::convert::Infallible;
use tracing::info;

use crate::state::AppState;

/// Subscribe to Server-Sent Events for real-time updates.
///
/// Streams channel changes, sync progress, show and settings changes, and
/// failed device commands. Each message is one JSON encoded event:
///
/// ```javascript
/// const events = new EventSource('/api/events');
/// events.onmessage = (e) => console.log(JSON.parse(e.data).type);
/// ```
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "events",
    responses(
        (status = 200, description = "Event stream (text/event-stream)")
    )
)]
pub async fn events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    info!(
        "New SSE client connected (total subscribers: {})",
        state.events().subscriber_count() + 1
    );
    state.events().subscribe()
}
