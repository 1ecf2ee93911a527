//! Device settings kept in a small JSON file next to the binary.
//!
//! The file holds the mixer address and the data directory. Its location is
//! fixed at startup so that moving the data directory does not move it.

use crate::mixer::MixerTarget;
use crate::paths::DEFAULT_DATA_DIR;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Contents of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Mixer address, empty when unset
    #[serde(default)]
    pub sq_ip: String,
    #[serde(default)]
    pub data_dir: String,
}

/// Owner of the settings file.
pub struct SettingsStore {
    path: PathBuf,
    mixer_port: u16,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Read the settings file, creating it if missing.
    ///
    /// A missing file is first migrated from `<default data dir>/config.json`
    /// if that exists. A freshly created file starts with `fallback_ip` and
    /// `default_data_dir`.
    pub async fn load(
        path: impl Into<PathBuf>,
        fallback_ip: Option<String>,
        default_data_dir: &Path,
        mixer_port: u16,
    ) -> Result<Self, SettingsError> {
        let path = path.into();
        let default_dir = display_dir(default_data_dir);

        let settings = match read_settings(&path).await? {
            Some(mut settings) => {
                settings.sq_ip = settings.sq_ip.trim().to_string();
                settings.data_dir = settings.data_dir.trim().to_string();
                if settings.data_dir.is_empty() {
                    settings.data_dir = default_dir;
                }
                settings
            }
            None => {
                let legacy_path = default_data_dir.join("config.json");
                let settings = match read_settings(&legacy_path).await {
                    Ok(Some(legacy)) => {
                        info!("Migrating settings from {}", legacy_path.display());
                        Settings {
                            sq_ip: legacy.sq_ip.trim().to_string(),
                            data_dir: default_dir,
                        }
                    }
                    Ok(None) => Settings {
                        sq_ip: fallback_ip.unwrap_or_default().trim().to_string(),
                        data_dir: default_dir,
                    },
                    Err(e) => {
                        warn!("Ignoring unreadable legacy settings: {}", e);
                        Settings {
                            sq_ip: fallback_ip.unwrap_or_default().trim().to_string(),
                            data_dir: default_dir,
                        }
                    }
                };
                write_settings(&path, &settings).await?;
                settings
            }
        };

        if settings.sq_ip.is_empty() {
            info!("Mixer address not set");
        } else {
            info!("Mixer address {}:{}", settings.sq_ip, mixer_port);
        }

        Ok(Self {
            path,
            mixer_port,
            current: RwLock::new(settings),
        })
    }

    pub fn get(&self) -> Settings {
        self.current.read().clone()
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.current.read().data_dir)
    }

    /// Configured mixer, `None` when no address is set.
    pub fn mixer_target(&self) -> Option<MixerTarget> {
        let settings = self.current.read();
        if settings.sq_ip.is_empty() {
            None
        } else {
            Some(MixerTarget::new(settings.sq_ip.clone(), self.mixer_port))
        }
    }

    pub fn has_mixer(&self) -> bool {
        !self.current.read().sq_ip.is_empty()
    }

    /// Apply an update and persist it.
    ///
    /// `sq_ip` replaces the address (empty clears it). A blank `data_dir`
    /// keeps the current directory. Returns the new settings and whether the
    /// data directory changed.
    pub async fn update(
        &self,
        sq_ip: Option<&str>,
        data_dir: Option<&str>,
    ) -> Result<(Settings, bool), SettingsError> {
        let previous = self.get();
        let mut next = previous.clone();
        if let Some(ip) = sq_ip {
            next.sq_ip = ip.trim().to_string();
        }
        if let Some(dir) = data_dir.map(str::trim).filter(|d| !d.is_empty()) {
            next.data_dir = dir.to_string();
        }

        write_settings(&self.path, &next).await?;
        *self.current.write() = next.clone();

        if next.sq_ip != previous.sq_ip {
            if next.sq_ip.is_empty() {
                info!("Mixer address cleared");
            } else {
                info!("Mixer address {}:{}", next.sq_ip, self.mixer_port);
            }
        }
        let dir_changed = next.data_dir != previous.data_dir;
        Ok((next, dir_changed))
    }

    /// Store an address only if none is configured. Returns true if adopted.
    pub async fn adopt_ip(&self, ip: &str) -> Result<bool, SettingsError> {
        let ip = ip.trim();
        if ip.is_empty() || self.has_mixer() {
            return Ok(false);
        }
        self.update(Some(ip), None).await?;
        Ok(true)
    }
}

fn display_dir(dir: &Path) -> String {
    let s = dir.to_string_lossy().to_string();
    if s.is_empty() {
        DEFAULT_DATA_DIR.to_string()
    } else {
        s
    }
}

async fn read_settings(path: &Path) -> Result<Option<Settings>, SettingsError> {
    match fs::read_to_string(path).await {
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SettingsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn write_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let io_err = |source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_vec_pretty(settings).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, json).await.map_err(io_err)?;
    fs::rename(&temp_path, path).await.map_err(io_err)
}
