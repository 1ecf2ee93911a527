//! Fan-out of [`SqEvent`]s to connected SSE clients.
//!
//! Every mutation path in the service broadcasts here: the channel store,
//! the sync job, the show repository and settings changes. Delivery is best
//! effort. A client that falls more than the buffer behind loses the oldest
//! events and keeps receiving from there; a full reload via `GET /api/state`
//! is how it catches up.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use sqpatch_types::SqEvent;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};

/// Events kept for slow subscribers before they start missing some.
const DEFAULT_BUFFER: usize = 100;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct EventBroadcaster {
    sender: Arc<broadcast::Sender<SqEvent>>,
}

impl EventBroadcaster {
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Send to whoever is listening. Nobody listening is fine.
    pub fn broadcast(&self, event: SqEvent) {
        debug!("Event: {}", event.description());
        let _ = self.sender.send(event);
    }

    /// A new SSE response carrying every event broadcast from now on, one
    /// JSON object per message.
    pub fn subscribe(&self) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let events = BroadcastStream::new(self.sender.subscribe()).filter_map(|received| {
            let event = match received {
                Ok(event) => event,
                Err(lagged) => {
                    warn!("SSE client fell behind: {}", lagged);
                    return None;
                }
            };
            match Event::default().json_data(&event) {
                Ok(message) => Some(Ok(message)),
                Err(e) => {
                    error!("Cannot encode {}: {}", event.description(), e);
                    None
                }
            }
        });

        Sse::new(events).keep_alive(
            KeepAlive::new()
                .interval(KEEP_ALIVE_INTERVAL)
                .text("keep-alive"),
        )
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}
