//! Named shows: saving, loading and file import/export.

use crate::channel_store::{Applied, ChannelError, ChannelStore};
use crate::events::EventBroadcaster;
use crate::settings::SettingsError;
use crate::storage::StorageError;
use crate::sync::{SyncCoordinator, SyncError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqpatch_types::api::LoadShowResponse;
use sqpatch_types::show::DEFAULT_SHOW_NAME;
use sqpatch_types::snapshot::to_show_file;
use sqpatch_types::{
    from_snapshot, sanitize_show_name, to_snapshot, ShowFile, Snapshot, SnapshotError, SqEvent,
};
use tracing::info;

/// Error type for show operations.
#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error("Show not found: {0}")]
    NotFound(String),

    #[error("Show '{0}' is the current show and cannot be deleted")]
    CannotDeleteActive(String),

    #[error(transparent)]
    Invalid(#[from] SnapshotError),

    #[error(transparent)]
    Channels(ChannelError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl From<StorageError> for ShowError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ShowNotFound(name) => ShowError::NotFound(name),
            other => ShowError::Storage(other),
        }
    }
}

impl From<ChannelError> for ShowError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Snapshot(e) => ShowError::Invalid(e),
            ChannelError::Storage(e) => e.into(),
            other => ShowError::Channels(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ShowError>;

/// Shows on top of the channel store.
#[derive(Clone)]
pub struct ShowRepository {
    store: ChannelStore,
    sync: SyncCoordinator,
    events: EventBroadcaster,
}

impl ShowRepository {
    pub fn new(store: ChannelStore, sync: SyncCoordinator, events: EventBroadcaster) -> Self {
        Self {
            store,
            sync,
            events,
        }
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        Ok(self.store.storage().list_shows().await?)
    }

    /// Create or overwrite a show.
    ///
    /// Without `channels` the current channel list is saved. Without `sq_ip`
    /// the configured mixer address is recorded.
    pub async fn save(
        &self,
        name: &str,
        channels: Option<&[Value]>,
        sq_ip: Option<&str>,
        set_current: bool,
    ) -> Result<Applied<ShowFile>> {
        let name = sanitize_show_name(name);
        let channels = match channels {
            Some(records) => {
                let value = Value::Array(records.to_vec());
                to_snapshot(&from_snapshot(&value, self.store.layout(), 1)?.channels)
            }
            None => to_snapshot(&self.store.channels().await),
        };
        let sq_ip = sq_ip
            .map(str::to_string)
            .or_else(|| Some(self.store.settings().get().sq_ip));

        let show = ShowFile::new(name.clone(), channels, sq_ip);
        self.store.storage().save_show(&show).await?;

        let warnings = if set_current {
            self.store.set_current_show(Some(name.clone())).await
        } else {
            Vec::new()
        };
        self.events.broadcast(SqEvent::ShowSaved { name });
        Ok(Applied {
            value: show,
            warnings,
        })
    }

    /// Fetch a stored show, normalized to the current file format.
    pub async fn get(&self, name: &str) -> Result<ShowFile> {
        let raw = self.store.storage().get_show(name).await?;
        let snapshot = from_snapshot(&raw, self.store.layout(), 1)?;
        let mut show = to_show_file(name, &snapshot.channels, snapshot.sq_ip);
        show.saved_at = raw
            .get("savedAt")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));
        Ok(show)
    }

    /// Replace the channel list with a stored show and push it to the mixer.
    ///
    /// The show's mixer address is adopted only when none is configured. A
    /// sync that is already running is reported as a warning.
    pub async fn load_named(&self, name: &str) -> Result<LoadShowResponse> {
        let raw = self.store.storage().get_show(name).await?;
        let Applied {
            value: snapshot,
            mut warnings,
        } = self
            .store
            .adopt_snapshot(&raw, Some(name.to_string()))
            .await?;
        self.adopt_address(&snapshot).await?;
        info!("Loaded show {} ({} channels)", name, snapshot.channels.len());
        self.events.broadcast(SqEvent::ShowLoaded {
            name: name.to_string(),
        });

        let sync_started = match self.store.settings().mixer_target() {
            Some(target) => {
                match self
                    .sync
                    .start(target, snapshot.channels.clone(), self.store.layout())
                {
                    Ok(_) => true,
                    Err(SyncError::AlreadyRunning) => {
                        warnings.push("sync already in progress; show not pushed".to_string());
                        false
                    }
                    Err(e) => {
                        warnings.push(e.to_string());
                        false
                    }
                }
            }
            None => {
                warnings.push("mixer address not set; show not pushed".to_string());
                false
            }
        };

        Ok(LoadShowResponse {
            name: name.to_string(),
            channels: snapshot.channels,
            sync_started,
            warnings,
        })
    }

    /// Delete a stored show. The current show cannot be deleted.
    pub async fn delete_named(&self, name: &str) -> Result<()> {
        if self.store.current_show().await.as_deref() == Some(name) {
            return Err(ShowError::CannotDeleteActive(name.to_string()));
        }
        self.store.storage().delete_show(name).await?;
        self.events.broadcast(SqEvent::ShowDeleted {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Replace the channel list from a show file. Clears the current show and
    /// does not sync.
    pub async fn import(&self, value: &Value) -> Result<Applied<Snapshot>> {
        let applied = self.store.adopt_snapshot(value, None).await?;
        self.adopt_address(&applied.value).await?;
        info!("Imported {} channels", applied.value.channels.len());
        Ok(applied)
    }

    /// Current channel list as a show file.
    pub async fn export(&self, name: Option<&str>) -> ShowFile {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => sanitize_show_name(name),
            None => self
                .store
                .current_show()
                .await
                .unwrap_or_else(|| DEFAULT_SHOW_NAME.to_string()),
        };
        let sq_ip = Some(self.store.settings().get().sq_ip);
        to_show_file(&name, &self.store.channels().await, sq_ip)
    }

    async fn adopt_address(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(ip) = &snapshot.sq_ip {
            if self.store.settings().adopt_ip(ip).await? {
                info!("Mixer address {} taken from show", ip);
                let settings = self.store.settings().get();
                self.events.broadcast(SqEvent::SettingsChanged {
                    sq_ip: settings.sq_ip,
                    data_dir: settings.data_dir,
                });
            }
        }
        Ok(())
    }
}
