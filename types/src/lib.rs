//! Shared types for the sqpatch preamp patching service.
//!
//! This crate contains the domain model, the show file format and API types
//! shared between the server and the command-line client.

/// Default port for the sqpatch HTTP server.
pub const DEFAULT_PORT: u16 = 8080;

/// TCP port the SQ console listens on for control packets.
pub const DEFAULT_MIXER_PORT: u16 = 51326;

pub mod api;
pub mod channel;
pub mod events;
pub mod show;
pub mod snapshot;
pub mod sync;

// Re-export commonly used types
pub use channel::{
    display_gain, Channel, ChannelId, PreampBus, PreampLayout, PreampSocket, GAIN_MAX_DB,
    GAIN_MIN_DB,
};
pub use events::SqEvent;
pub use show::{sanitize_show_name, ShowChannel, ShowFile};
pub use snapshot::{from_snapshot, to_snapshot, Snapshot, SnapshotError};
pub use sync::{SyncResult, SyncState, SyncStatusResponse};
