//! Application state management.

use crate::channel_store::{Applied, ChannelError, ChannelStore};
use crate::config::Config;
use crate::events::EventBroadcaster;
use crate::mixer::{DeviceCommandError, MixerClient, TcpMixerClient};
use crate::protocol::PreampCommand;
use crate::settings::{Settings, SettingsError, SettingsStore};
use crate::shows::ShowRepository;
use crate::storage::{JsonFileStorage, Storage, StorageError};
use crate::sync::{SyncCoordinator, SyncError};
use anyhow::Context;
use sqpatch_types::{PreampLayout, PreampSocket, SqEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Errors from changing device settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsUpdateError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("Cannot use data directory: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Channels(#[from] ChannelError),
}

/// Errors from a command sent straight to a socket.
#[derive(Debug, thiserror::Error)]
pub enum PreampCommandError {
    #[error("SQ IP not set")]
    NoMixer,
    #[error(transparent)]
    Device(#[from] DeviceCommandError),
}

/// Errors from starting a sync.
#[derive(Debug, thiserror::Error)]
pub enum StartSyncError {
    #[error("SQ IP not set")]
    NoMixer,
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    /// Mixer address and data directory
    settings: Arc<SettingsStore>,
    storage: Arc<dyn Storage>,
    mixer: Arc<dyn MixerClient>,
    channels: ChannelStore,
    shows: ShowRepository,
    sync: SyncCoordinator,
    events: EventBroadcaster,
}

impl AppState {
    /// Build the state and load the persisted channel list.
    pub async fn new(config: Config, mixer: Arc<dyn MixerClient>) -> anyhow::Result<Self> {
        let settings = Arc::new(
            SettingsStore::load(
                &config.settings_path,
                config.mixer.ip.clone(),
                &config.data_dir,
                config.mixer.port,
            )
            .await
            .context("Failed to load settings")?,
        );

        let data_dir = settings.data_dir();
        let storage: Arc<dyn Storage> = Arc::new(JsonFileStorage::new(&data_dir));
        info!("Using data directory {}", data_dir.display());

        let events = EventBroadcaster::default();
        let channels = ChannelStore::new(
            Arc::clone(&storage),
            Arc::clone(&mixer),
            Arc::clone(&settings),
            config.mixer.layout.clone(),
            config.mixer.gain_debounce,
            events.clone(),
        );
        let sync = SyncCoordinator::new(Arc::clone(&mixer), config.mixer.pace, events.clone());
        let shows = ShowRepository::new(channels.clone(), sync.clone(), events.clone());

        let warnings = channels
            .load()
            .await
            .context("Failed to load channel state")?;
        if !warnings.is_empty() {
            warn!("Channel state repaired on load ({} changes)", warnings.len());
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                settings,
                storage,
                mixer,
                channels,
                shows,
                sync,
                events,
            }),
        })
    }

    /// Build the state talking to the real console over TCP.
    pub async fn with_tcp_mixer(config: Config) -> anyhow::Result<Self> {
        let mixer = Arc::new(TcpMixerClient::new(config.mixer.command_timeout));
        Self::new(config, mixer).await
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn layout(&self) -> &PreampLayout {
        self.inner.channels.layout()
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.inner.settings
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    pub fn channels(&self) -> &ChannelStore {
        &self.inner.channels
    }

    pub fn shows(&self) -> &ShowRepository {
        &self.inner.shows
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.inner.sync
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.inner.events
    }

    /// Change the mixer address and/or data directory.
    ///
    /// Moving the data directory re-points storage and reloads the channel
    /// list from it; repairs made while loading come back as warnings.
    /// Settings are only written once the new directory is usable.
    pub async fn update_settings(
        &self,
        sq_ip: Option<&str>,
        data_dir: Option<&str>,
    ) -> Result<Applied<Settings>, SettingsUpdateError> {
        let previous_dir = self.inner.settings.get().data_dir;
        let new_dir = data_dir
            .map(str::trim)
            .filter(|d| !d.is_empty() && *d != previous_dir);

        if let Some(dir) = new_dir {
            self.inner.storage.set_data_dir(PathBuf::from(dir)).await?;
        }

        let settings = match self.inner.settings.update(sq_ip, data_dir).await {
            Ok((settings, _)) => settings,
            Err(e) => {
                if new_dir.is_some() {
                    if let Err(restore) = self
                        .inner
                        .storage
                        .set_data_dir(PathBuf::from(&previous_dir))
                        .await
                    {
                        warn!("Could not return to {}: {}", previous_dir, restore);
                    }
                }
                return Err(e.into());
            }
        };

        let mut warnings = Vec::new();
        if new_dir.is_some() {
            warnings = self.inner.channels.load().await?;
        }

        self.inner.events.broadcast(SqEvent::SettingsChanged {
            sq_ip: settings.sq_ip.clone(),
            data_dir: settings.data_dir.clone(),
        });
        Ok(Applied {
            value: settings,
            warnings,
        })
    }

    /// Push the current channel list to the configured mixer in the background.
    pub async fn start_sync(&self) -> Result<usize, StartSyncError> {
        let target = self
            .inner
            .settings
            .mixer_target()
            .ok_or(StartSyncError::NoMixer)?;
        let channels = self.inner.channels.channels().await;
        Ok(self.inner.sync.start(target, channels, self.layout())?)
    }

    /// Send one command straight to a socket and record it on the channels
    /// using that socket.
    ///
    /// Line sockets have no preamp controls; the command is accepted and
    /// ignored. Returns `false` in that case.
    pub async fn send_preamp_command(
        &self,
        socket: PreampSocket,
        command: PreampCommand,
    ) -> Result<bool, PreampCommandError> {
        if self.layout().is_line_socket(socket) {
            info!("Ignoring {} for line input {}", command, socket);
            return Ok(false);
        }
        let target = self
            .inner
            .settings
            .mixer_target()
            .ok_or(PreampCommandError::NoMixer)?;

        if let Err(e) = self.inner.mixer.send(&target, socket, command).await {
            self.inner.events.broadcast(SqEvent::DeviceCommandFailed {
                socket: socket.to_string(),
                error: e.to_string(),
            });
            return Err(e.into());
        }

        for w in self
            .inner
            .channels
            .record_socket_command(socket, command)
            .await
        {
            warn!("{}", w);
        }
        Ok(true)
    }
}
