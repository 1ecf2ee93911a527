//! API request and response types.

use crate::channel::{Channel, ChannelId, PreampBus, PreampLayout};
use crate::show::ShowFile;
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::{IntoParams, ToSchema};

// ============================================================================
// State API Types
// ============================================================================

/// Full channel list plus the current show marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct StateResponse {
    pub channels: Vec<Channel>,
    /// Configured mixer address, empty when unset
    #[serde(default)]
    pub sq_ip: String,
    #[serde(default)]
    pub current_show: Option<String>,
    /// Local sockets that are line inputs
    #[serde(default)]
    pub line_preamp_ids: Vec<u8>,
    pub layout: PreampLayout,
}

/// Request to replace the full channel list.
///
/// Records are coerced like show snapshots but validated strictly: an out of
/// range socket or a collision rejects the whole request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ReplaceStateRequest {
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<Object>))]
    pub channels: Vec<serde_json::Value>,
    /// Replace the current show marker when present (empty string clears it)
    #[serde(default)]
    pub current_show: Option<String>,
    /// Store a new mixer address when non-empty
    #[serde(default)]
    pub sq_ip: Option<String>,
}

/// Query for `GET /api/state/export`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
pub struct ExportQuery {
    /// Name written into the exported file
    pub name: Option<String>,
}

/// Result of an import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ImportResponse {
    pub channels: Vec<Channel>,
    /// Name carried by the imported file, if any
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// ============================================================================
// Settings API Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct SettingsResponse {
    /// Mixer address, empty when unset
    pub sq_ip: String,
    /// Directory holding channel state and shows
    pub data_dir: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub sq_ip: Option<String>,
    /// Blank keeps the current data directory
    #[serde(default)]
    pub data_dir: Option<String>,
}

// ============================================================================
// Channel API Types
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AddChannelRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bus: PreampBus,
}

/// Partial update of a channel. Socket fields are validated together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct UpdateChannelRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// Move to another bus; ids are clamped into its bounds
    #[serde(default)]
    pub preamp_bus: Option<PreampBus>,
    #[serde(default)]
    pub preamp_id: Option<u8>,
    /// Stereo partner; `0` makes the channel mono
    #[serde(default, rename = "preampIdR")]
    pub preamp_id_r: Option<u8>,
}

impl UpdateChannelRequest {
    pub fn touches_sockets(&self) -> bool {
        self.preamp_bus.is_some() || self.preamp_id.is_some() || self.preamp_id_r.is_some()
    }
}

/// A channel after a mutation, with anything that went wrong on the way out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ChannelResponse {
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AvailableIdsResponse {
    pub channel_id: ChannelId,
    pub bus: PreampBus,
    pub ids: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
pub struct AvailableQuery {
    pub bus: Option<PreampBus>,
}

/// `?on=` flag. `true` and `1` switch on, anything else switches off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
pub struct ToggleQuery {
    pub on: Option<String>,
}

impl ToggleQuery {
    pub fn is_on(&self) -> bool {
        matches!(self.on.as_deref(), Some("true") | Some("1"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct GainRequest {
    /// Gain in dB, 0 to 60
    pub db: f64,
}

/// Query form of a gain request (`?db=12`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
pub struct GainQuery {
    pub db: Option<f64>,
}

// ============================================================================
// Direct Preamp API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PreampToggleResponse {
    pub preamp: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phantom: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PreampGainResponse {
    pub preamp: u8,
    pub gain_db: f64,
}

// ============================================================================
// Show API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ShowListResponse {
    pub shows: Vec<String>,
    #[serde(default)]
    pub current_show: Option<String>,
}

/// Request to create or overwrite a show.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct SaveShowRequest {
    pub name: String,
    /// Channel records to store; the live channel list when omitted
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Vec<Object>>))]
    pub channels: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub sq_ip: Option<String>,
    /// Mark as the current show (default true)
    #[serde(default)]
    pub set_current: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct SaveShowResponse {
    /// Name the show was stored under
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct LoadShowResponse {
    pub name: String,
    pub channels: Vec<Channel>,
    /// A sync was started against the configured mixer
    pub sync_started: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ShowResponse {
    pub show: ShowFile,
}

// ============================================================================
// Sync API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct SyncStartedResponse {
    pub started: bool,
    /// Sockets the job will address
    pub total: usize,
}

// ============================================================================
// Common API Types
// ============================================================================

/// Generic error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
