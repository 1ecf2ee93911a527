//! JSON file-based storage implementation.

use super::{PersistedState, Result, Storage, StorageError};
use crate::paths::DataPaths;
use async_trait::async_trait;
use sqpatch_types::show::{is_valid_show_name, ShowFile};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const SAVE_STATE_RETRIES: u32 = 3;
const SAVE_STATE_BACKOFF: Duration = Duration::from_millis(50);

/// Storage backend that keeps `state.json` and `shows/*.json` in a data directory.
pub struct JsonFileStorage {
    paths: RwLock<DataPaths>,
}

impl JsonFileStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: RwLock::new(DataPaths::new(data_dir)),
        }
    }

    async fn paths(&self) -> DataPaths {
        self.paths.read().await.clone()
    }

    /// Write to a temporary file first, then rename over the target.
    async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, contents).await?;
        fs::rename(&temp_path, path).await
    }

    async fn read_json(path: &Path) -> Result<Option<serde_json::Value>> {
        match fs::read_to_string(path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(None),
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn load_state(&self) -> Result<Option<serde_json::Value>> {
        let paths = self.paths().await;
        debug!("Loading state from {:?}", paths.state_path);
        let state = Self::read_json(&paths.state_path).await?;
        if state.is_none() {
            info!("No saved state in {}, starting empty", paths.data_dir.display());
        }
        Ok(state)
    }

    async fn save_state(&self, state: &PersistedState) -> Result<()> {
        let paths = self.paths().await;
        let json = serde_json::to_vec_pretty(state)?;

        let mut attempt = 1;
        loop {
            match Self::write_atomic(&paths.state_path, &json).await {
                Ok(()) => {
                    debug!("Saved {} channels to {:?}", state.channels.len(), paths.state_path);
                    return Ok(());
                }
                Err(e) if attempt < SAVE_STATE_RETRIES => {
                    warn!("Saving state failed (attempt {}): {}", attempt, e);
                    tokio::time::sleep(SAVE_STATE_BACKOFF).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Saving state failed after {} attempts: {}", SAVE_STATE_RETRIES, e);
                    return Err(e.into());
                }
            }
        }
    }

    async fn list_shows(&self) -> Result<Vec<String>> {
        let paths = self.paths().await;
        paths.ensure().await?;

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&paths.shows_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn get_show(&self, name: &str) -> Result<serde_json::Value> {
        if !is_valid_show_name(name) {
            return Err(StorageError::ShowNotFound(name.to_string()));
        }
        let paths = self.paths().await;
        Self::read_json(&paths.show_path(name))
            .await?
            .ok_or_else(|| StorageError::ShowNotFound(name.to_string()))
    }

    async fn save_show(&self, show: &ShowFile) -> Result<()> {
        if !is_valid_show_name(&show.name) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsafe show name '{}'", show.name),
            )));
        }
        let paths = self.paths().await;
        paths.ensure().await?;
        let json = serde_json::to_vec_pretty(show)?;
        Self::write_atomic(&paths.show_path(&show.name), &json).await?;
        info!("Saved show {} ({} channels)", show.name, show.channels.len());
        Ok(())
    }

    async fn delete_show(&self, name: &str) -> Result<()> {
        if !is_valid_show_name(name) {
            return Err(StorageError::ShowNotFound(name.to_string()));
        }
        let paths = self.paths().await;
        match fs::remove_file(paths.show_path(name)).await {
            Ok(()) => {
                info!("Deleted show {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::ShowNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn data_dir(&self) -> PathBuf {
        self.paths.read().await.data_dir.clone()
    }

    async fn set_data_dir(&self, dir: PathBuf) -> Result<()> {
        let paths = DataPaths::resolve(Some(&dir));
        paths.ensure().await?;
        info!("Data directory set to {}", paths.data_dir.display());
        *self.paths.write().await = paths;
        Ok(())
    }
}
