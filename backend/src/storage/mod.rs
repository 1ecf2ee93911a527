//! Storage layer for persisting channel state and shows.

mod json_storage;

pub use json_storage::JsonFileStorage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqpatch_types::{Channel, ShowFile};
use std::path::PathBuf;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Show not found: {0}")]
    ShowNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// What `state.json` holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub channels: Vec<Channel>,
    /// Empty when no show is current
    #[serde(default)]
    pub current_show: String,
}

/// Trait for state and show storage backends.
///
/// State and shows are read back as raw JSON: files may come from older
/// versions and are normalized by the caller.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load the persisted channel state, `None` if nothing was saved yet.
    async fn load_state(&self) -> Result<Option<serde_json::Value>>;

    async fn save_state(&self, state: &PersistedState) -> Result<()>;

    /// Names of all stored shows, sorted.
    async fn list_shows(&self) -> Result<Vec<String>>;

    async fn get_show(&self, name: &str) -> Result<serde_json::Value>;

    /// Create or overwrite the show stored under `show.name`.
    async fn save_show(&self, show: &ShowFile) -> Result<()>;

    async fn delete_show(&self, name: &str) -> Result<()>;

    async fn data_dir(&self) -> PathBuf;

    /// Point storage at another data directory.
    async fn set_data_dir(&self, dir: PathBuf) -> Result<()>;
}
