//! Data path resolution.
//!
//! The data directory holds `state.json` and a `shows/` directory with one
//! file per show. The settings file lives outside of it so the data directory
//! itself can be moved at runtime.

use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_SETTINGS_FILE: &str = "config.json";
const STATE_FILE: &str = "state.json";
const SHOWS_DIR: &str = "shows";

/// Resolved locations inside one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    /// Persisted channel list and current show marker
    pub state_path: PathBuf,
    pub shows_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            state_path: data_dir.join(STATE_FILE),
            shows_dir: data_dir.join(SHOWS_DIR),
            data_dir,
        }
    }

    /// Resolve an optional configured directory; blank means the default.
    pub fn resolve(data_dir: Option<&Path>) -> Self {
        match data_dir {
            Some(dir) if !dir.as_os_str().is_empty() => Self::new(dir),
            _ => Self::new(DEFAULT_DATA_DIR),
        }
    }

    /// Show file for an already sanitized name.
    pub fn show_path(&self, name: &str) -> PathBuf {
        self.shows_dir.join(format!("{}.json", name))
    }

    /// Create the data and shows directories if missing.
    pub async fn ensure(&self) -> std::io::Result<()> {
        if !tokio::fs::try_exists(&self.shows_dir).await.unwrap_or(false) {
            tokio::fs::create_dir_all(&self.shows_dir).await?;
            info!("Created data directory: {}", self.data_dir.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_inside_data_dir() {
        let paths = DataPaths::new("/srv/sq");
        assert_eq!(paths.state_path, PathBuf::from("/srv/sq/state.json"));
        assert_eq!(paths.show_path("gig"), PathBuf::from("/srv/sq/shows/gig.json"));
    }

    #[test]
    fn test_blank_dir_resolves_to_default() {
        assert_eq!(DataPaths::resolve(Some(Path::new(""))).data_dir, PathBuf::from("data"));
        assert_eq!(DataPaths::resolve(None).data_dir, PathBuf::from("data"));
    }

    #[tokio::test]
    async fn test_ensure_creates_shows_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path().join("nested"));
        paths.ensure().await.unwrap();
        assert!(paths.shows_dir.is_dir());
    }
}
