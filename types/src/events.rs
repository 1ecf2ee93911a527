//! Events for real-time updates across clients.

use crate::channel::{Channel, ChannelId};
use crate::sync::SyncResult;
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Event types that can be broadcast to all connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(tag = "type", content = "data")]
pub enum SqEvent {
    /// The whole channel list was replaced (load, import, reset, full POST)
    ChannelsReplaced {
        count: usize,
        current_show: Option<String>,
    },
    /// A single channel changed
    ChannelUpdated { channel: Channel },
    ChannelRemoved { channel_id: ChannelId },
    SyncStarted { total: usize },
    SyncProgress { current: usize, total: usize },
    SyncFinished { result: SyncResult },
    ShowSaved { name: String },
    ShowLoaded { name: String },
    ShowDeleted { name: String },
    /// Mixer address or data directory changed
    SettingsChanged { sq_ip: String, data_dir: String },
    /// A command to the mixer failed outside of a sync job
    DeviceCommandFailed { socket: String, error: String },
    /// Keep-alive
    Ping,
}

impl SqEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SqEvent::ChannelsReplaced {
                count,
                current_show: Some(show),
            } => format!("{} channels loaded from show {}", count, show),
            SqEvent::ChannelsReplaced { count, .. } => format!("{} channels loaded", count),
            SqEvent::ChannelUpdated { channel } => format!("Channel {} updated", channel.id),
            SqEvent::ChannelRemoved { channel_id } => format!("Channel {} removed", channel_id),
            SqEvent::SyncStarted { total } => format!("Sync started ({} sockets)", total),
            SqEvent::SyncProgress { current, total } => format!("Sync {}/{}", current, total),
            SqEvent::SyncFinished { result } => match &result.error {
                Some(error) => format!("Sync finished with errors: {}", error),
                None => format!("Sync finished, {} channels synced", result.synced),
            },
            SqEvent::ShowSaved { name } => format!("Show {} saved", name),
            SqEvent::ShowLoaded { name } => format!("Show {} loaded", name),
            SqEvent::ShowDeleted { name } => format!("Show {} deleted", name),
            SqEvent::SettingsChanged { sq_ip, data_dir } => {
                format!("Settings changed: mixer '{}', data dir {}", sq_ip, data_dir)
            }
            SqEvent::DeviceCommandFailed { socket, error } => {
                format!("Command to {} failed: {}", socket, error)
            }
            SqEvent::Ping => "Ping".to_string(),
        }
    }
}
