//! Mixer synchronization status.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Running,
}

impl SyncState {
    pub fn is_running(&self) -> bool {
        matches!(self, SyncState::Running)
    }
}

/// Outcome of the most recent completed sync.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct SyncResult {
    /// Channels whose commands all succeeded
    pub synced: usize,
    /// First failure, if any command failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct SyncStatusResponse {
    pub status: SyncState,
    /// Sockets addressed so far in the running job
    pub current: usize,
    /// Sockets the running job will address
    pub total: usize,
    pub last_result: Option<SyncResult>,
}
