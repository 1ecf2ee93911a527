//! Server-owned channel list.
//!
//! All channel mutations go through [`ChannelStore`]. Socket changes are
//! validated by the allocator before anything is modified. Once a change is
//! in memory it stays there: persistence and device failures come back as
//! warnings next to the result.

use crate::allocator::{AllocatorError, PreampAllocator, PreampAssignment};
use crate::debounce::Debouncer;
use crate::events::EventBroadcaster;
use crate::mixer::MixerClient;
use crate::protocol::PreampCommand;
use crate::settings::SettingsStore;
use crate::storage::{PersistedState, Storage, StorageError};
use serde::Deserialize;
use serde_json::Value;
use sqpatch_types::api::UpdateChannelRequest;
use sqpatch_types::channel::{
    clamp_gain, sanitize_channel_name, Channel, ChannelId, PreampBus, PreampLayout, PreampSocket,
};
use sqpatch_types::snapshot::{channel_records, from_snapshot, normalize_record, Snapshot};
use sqpatch_types::{SnapshotError, SqEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Error type for channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel not found: {0}")]
    NotFound(ChannelId),

    #[error(transparent)]
    Allocator(#[from] AllocatorError),

    #[error("Invalid channel list: {0}")]
    Invalid(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result of a mutation that went through, with any side effects that failed.
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Applied<T> {
    fn new(value: T, warnings: Vec<String>) -> Self {
        Self { value, warnings }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    channels: Vec<Channel>,
    /// Next session id; only ever grows
    next_id: ChannelId,
    current_show: Option<String>,
}

fn ids_exhausted() -> ChannelError {
    ChannelError::Invalid("channel ids exhausted".to_string())
}

impl StoreState {
    fn position(&self, id: ChannelId) -> Result<usize, ChannelError> {
        self.channels
            .iter()
            .position(|c| c.id == id)
            .ok_or(ChannelError::NotFound(id))
    }

    fn take_id(&mut self) -> Result<ChannelId, ChannelError> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or_else(ids_exhausted)?;
        Ok(id)
    }

    fn persisted(&self) -> PersistedState {
        PersistedState {
            channels: self.channels.clone(),
            current_show: self.current_show.clone().unwrap_or_default(),
        }
    }
}

struct StoreInner {
    state: RwLock<StoreState>,
    storage: Arc<dyn Storage>,
    mixer: Arc<dyn MixerClient>,
    settings: Arc<SettingsStore>,
    allocator: PreampAllocator,
    gain_debouncer: Debouncer<ChannelId>,
    events: EventBroadcaster,
}

/// Record shape accepted by the full-state write. Stricter than snapshots:
/// bounds are checked, not clamped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateRecord {
    #[serde(default)]
    id: ChannelId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    preamp_bus: Option<String>,
    preamp_id: i64,
    #[serde(default, rename = "preampIdR")]
    preamp_id_r: Option<i64>,
    #[serde(default)]
    phantom: bool,
    #[serde(default)]
    pad: bool,
    #[serde(default)]
    gain: f64,
}

/// Shared handle to the channel list.
#[derive(Clone)]
pub struct ChannelStore {
    inner: Arc<StoreInner>,
}

impl ChannelStore {
    pub fn new(
        storage: Arc<dyn Storage>,
        mixer: Arc<dyn MixerClient>,
        settings: Arc<SettingsStore>,
        layout: PreampLayout,
        gain_debounce: Duration,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState {
                    next_id: 1,
                    ..Default::default()
                }),
                storage,
                mixer,
                settings,
                allocator: PreampAllocator::new(layout),
                gain_debouncer: Debouncer::new(gain_debounce),
                events,
            }),
        }
    }

    pub fn allocator(&self) -> &PreampAllocator {
        &self.inner.allocator
    }

    pub fn layout(&self) -> &PreampLayout {
        self.inner.allocator.layout()
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.inner.settings
    }

    // ------------------------------------------------------------------------
    // Loading and persistence
    // ------------------------------------------------------------------------

    /// Replace memory with the persisted state.
    ///
    /// Accepts `{channels, current_show}` and the legacy bare array. Records
    /// are normalized and collisions repaired; every repair is returned as a
    /// warning. Channels get fresh session ids.
    pub async fn load(&self) -> Result<Vec<String>, ChannelError> {
        self.inner.gain_debouncer.cancel_all();
        let raw = self.inner.storage.load_state().await?;

        let mut state = self.inner.state.write().await;
        let mut warnings = Vec::new();
        let mut channels = Vec::new();
        let mut current_show = None;

        if let Some(raw) = raw {
            if let Value::Object(map) = &raw {
                current_show = map
                    .get("current_show")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
            }
            let records: &[Value] = match channel_records(&raw) {
                Ok(records) => records,
                Err(e) => {
                    warnings.push(format!("saved state ignored: {}", e));
                    &[]
                }
            };
            for (index, record) in records.iter().enumerate() {
                match normalize_record(record, self.layout()) {
                    Ok(normalized) => {
                        let id = state.take_id()?;
                        channels.push(normalized.into_channel(id));
                    }
                    Err(e) => warnings.push(format!("saved channel {} skipped: {}", index + 1, e)),
                }
            }
        }

        let (channels, repairs) = self.inner.allocator.repair(channels);
        warnings.extend(repairs);
        for w in &warnings {
            warn!("Loading state: {}", w);
        }

        info!(
            "Loaded {} channels{}",
            channels.len(),
            current_show
                .as_deref()
                .map(|s| format!(" (show {})", s))
                .unwrap_or_default()
        );
        state.channels = channels;
        state.current_show = current_show;
        self.inner.events.broadcast(SqEvent::ChannelsReplaced {
            count: state.channels.len(),
            current_show: state.current_show.clone(),
        });
        Ok(warnings)
    }

    async fn persist(&self, state: &StoreState) -> Vec<String> {
        match self.inner.storage.save_state(&state.persisted()).await {
            Ok(()) => Vec::new(),
            Err(e) => {
                warn!("Failed to persist channel state: {}", e);
                vec![format!("state not saved: {}", e)]
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn channels(&self) -> Vec<Channel> {
        self.inner.state.read().await.channels.clone()
    }

    pub async fn current_show(&self) -> Option<String> {
        self.inner.state.read().await.current_show.clone()
    }

    pub async fn get(&self, id: ChannelId) -> Result<Channel, ChannelError> {
        let state = self.inner.state.read().await;
        let index = state.position(id)?;
        Ok(state.channels[index].clone())
    }

    pub async fn available_ids(
        &self,
        id: ChannelId,
        bus: PreampBus,
    ) -> Result<Vec<u8>, ChannelError> {
        let state = self.inner.state.read().await;
        state.position(id)?;
        Ok(self
            .inner
            .allocator
            .available_ids_for(&state.channels, bus, id))
    }

    // ------------------------------------------------------------------------
    // Structural mutations
    // ------------------------------------------------------------------------

    /// Add a mono channel on the lowest free socket of `bus`.
    pub async fn add_channel(
        &self,
        name: Option<&str>,
        bus: PreampBus,
    ) -> Result<Applied<Channel>, ChannelError> {
        let mut state = self.inner.state.write().await;
        let preamp = self.inner.allocator.next_free_slot(&state.channels, bus)?;
        let id = state.take_id()?;
        let mut channel = Channel::new(id, PreampSocket::new(bus, preamp));
        channel.name = name.map(sanitize_channel_name).unwrap_or_default();
        state.channels.push(channel.clone());
        debug!("Added channel {} on {}", id, channel.socket());

        let warnings = self.persist(&state).await;
        self.inner.events.broadcast(SqEvent::ChannelUpdated {
            channel: channel.clone(),
        });
        Ok(Applied::new(channel, warnings))
    }

    /// Remove a channel, freeing both of its sockets.
    pub async fn remove_channel(&self, id: ChannelId) -> Result<Applied<Channel>, ChannelError> {
        let mut state = self.inner.state.write().await;
        let index = state.position(id)?;
        self.inner.gain_debouncer.cancel(&id);
        let removed = state.channels.remove(index);
        debug!("Removed channel {}", id);

        let warnings = self.persist(&state).await;
        self.inner
            .events
            .broadcast(SqEvent::ChannelRemoved { channel_id: id });
        Ok(Applied::new(removed, warnings))
    }

    /// Trim and cut `name` to the strip width.
    pub async fn rename(&self, id: ChannelId, name: &str) -> Result<Applied<Channel>, ChannelError> {
        let mut state = self.inner.state.write().await;
        let index = state.position(id)?;
        state.channels[index].name = sanitize_channel_name(name);
        let channel = state.channels[index].clone();

        let warnings = self.persist(&state).await;
        self.inner.events.broadcast(SqEvent::ChannelUpdated {
            channel: channel.clone(),
        });
        Ok(Applied::new(channel, warnings))
    }

    /// Move a channel to explicit sockets.
    pub async fn assign(
        &self,
        id: ChannelId,
        bus: PreampBus,
        preamp_id: i64,
        preamp_id_r: Option<i64>,
    ) -> Result<Applied<Channel>, ChannelError> {
        let mut state = self.inner.state.write().await;
        let index = state.position(id)?;
        let assignment = self.inner.allocator.validate_assignment(
            &state.channels,
            id,
            bus,
            preamp_id,
            preamp_id_r,
        )?;
        self.commit_assignment(&mut state, index, assignment).await
    }

    /// Move a channel to another bus, clamping its sockets into the new bounds.
    pub async fn change_bus(
        &self,
        id: ChannelId,
        bus: PreampBus,
    ) -> Result<Applied<Channel>, ChannelError> {
        let mut state = self.inner.state.write().await;
        let index = state.position(id)?;
        let assignment = self.bus_change_assignment(&state.channels, &state.channels[index], bus)?;
        self.commit_assignment(&mut state, index, assignment).await
    }

    /// Clamp onto `bus`, then validate. A partner that is taken on the new bus
    /// is dropped; a taken primary is a conflict.
    fn bus_change_assignment(
        &self,
        channels: &[Channel],
        channel: &Channel,
        bus: PreampBus,
    ) -> Result<PreampAssignment, ChannelError> {
        let allocator = &self.inner.allocator;
        let moved = allocator.change_bus(channel, bus);
        match allocator.validate_assignment(
            channels,
            channel.id,
            moved.bus,
            moved.id as i64,
            moved.id_r.map(i64::from),
        ) {
            Ok(assignment) => Ok(assignment),
            Err(AllocatorError::SlotConflict { socket, .. })
                if Some(socket.id) == moved.id_r && socket.id != moved.id =>
            {
                Ok(allocator.validate_assignment(
                    channels,
                    channel.id,
                    moved.bus,
                    moved.id as i64,
                    None,
                )?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn commit_assignment(
        &self,
        state: &mut StoreState,
        index: usize,
        assignment: PreampAssignment,
    ) -> Result<Applied<Channel>, ChannelError> {
        assignment.apply(&mut state.channels[index]);
        let channel = state.channels[index].clone();
        debug!("Channel {} now on {}", channel.id, channel.socket());

        let warnings = self.persist(state).await;
        self.inner.events.broadcast(SqEvent::ChannelUpdated {
            channel: channel.clone(),
        });
        Ok(Applied::new(channel, warnings))
    }

    /// Apply a partial update: name and/or sockets.
    ///
    /// A new bus without an explicit id follows [`Self::change_bus`]. A
    /// partner of `0` makes the channel mono; no partner keeps the current one.
    pub async fn update(
        &self,
        id: ChannelId,
        request: &UpdateChannelRequest,
    ) -> Result<Applied<Channel>, ChannelError> {
        if !request.touches_sockets() {
            return match &request.name {
                Some(name) => self.rename(id, name).await,
                None => Ok(Applied::new(self.get(id).await?, Vec::new())),
            };
        }

        let mut state = self.inner.state.write().await;
        let index = state.position(id)?;
        let current = state.channels[index].clone();

        let bus = request.preamp_bus.unwrap_or(current.preamp_bus);
        let bus_changed = bus != current.preamp_bus;
        let assignment =
            if bus_changed && request.preamp_id.is_none() && request.preamp_id_r.is_none() {
                self.bus_change_assignment(&state.channels, &current, bus)?
            } else {
                let preamp_id = request.preamp_id.unwrap_or(current.preamp_id);
                let preamp_id_r = match request.preamp_id_r {
                    Some(r) => Some(r as i64),
                    None if bus_changed => None,
                    None => current.preamp_id_r.map(i64::from),
                };
                self.inner.allocator.validate_assignment(
                    &state.channels,
                    id,
                    bus,
                    preamp_id as i64,
                    preamp_id_r,
                )?
            };

        if let Some(name) = &request.name {
            state.channels[index].name = sanitize_channel_name(name);
        }
        self.commit_assignment(&mut state, index, assignment).await
    }

    /// Replace the whole list from client records.
    ///
    /// Every record is checked before anything changes. Ids of channels the
    /// store knows, or ids never handed out, are kept; others get fresh ids.
    /// `current_show` of `Some("")` clears the marker, `None` leaves it.
    pub async fn replace_all(
        &self,
        records: &[Value],
        current_show: Option<&str>,
    ) -> Result<Applied<Vec<Channel>>, ChannelError> {
        let mut parsed = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let record: StateRecord = serde_json::from_value(record.clone())
                .map_err(|e| ChannelError::Invalid(format!("record {}: {}", index + 1, e)))?;
            parsed.push(record);
        }

        let mut state = self.inner.state.write().await;
        let known: HashSet<ChannelId> = state.channels.iter().map(|c| c.id).collect();

        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(parsed.len());
        for record in &parsed {
            let id = record.id;
            if id == 0 {
                kept.push(None);
                continue;
            }
            if !seen.insert(id) {
                return Err(ChannelError::Invalid(format!("duplicate channel id {}", id)));
            }
            kept.push((known.contains(&id) || id >= state.next_id).then_some(id));
        }
        let mut next_id = state.next_id;
        for id in kept.iter().flatten() {
            let after = id.checked_add(1).ok_or_else(|| {
                ChannelError::Invalid(format!("channel id {} is too large", id))
            })?;
            next_id = next_id.max(after);
        }

        let mut channels = Vec::with_capacity(parsed.len());
        for (record, kept_id) in parsed.into_iter().zip(kept) {
            let id = match kept_id {
                Some(id) => id,
                None => {
                    let id = next_id;
                    next_id = id.checked_add(1).ok_or_else(ids_exhausted)?;
                    id
                }
            };
            let bus = match record.preamp_bus.as_deref() {
                None | Some("") => PreampBus::Local,
                Some(other) => other.parse().map_err(|e| {
                    ChannelError::Invalid(format!("channel {}: {}", id, e))
                })?,
            };
            let max = self.layout().max_id(bus);
            let in_range = |n: i64| n >= 1 && n <= max as i64;
            if !in_range(record.preamp_id) {
                return Err(ChannelError::Invalid(format!(
                    "channel {}: {} preampId must be 1-{}",
                    id,
                    bus.label(),
                    max
                )));
            }
            let partner = match record.preamp_id_r.filter(|r| *r != 0) {
                Some(r) if !in_range(r) => {
                    return Err(ChannelError::Invalid(format!(
                        "channel {}: {} preampIdR must be 1-{}",
                        id,
                        bus.label(),
                        max
                    )))
                }
                other => other.map(|r| r as u8),
            };
            channels.push(Channel {
                id,
                name: sanitize_channel_name(&record.name),
                preamp_bus: bus,
                preamp_id: record.preamp_id as u8,
                preamp_id_r: partner,
                phantom: record.phantom,
                pad: record.pad,
                gain: clamp_gain(record.gain.round() as i64),
            });
        }

        self.inner
            .allocator
            .validate_all(&channels)
            .map_err(|e| ChannelError::Invalid(e.to_string()))?;

        // Validated: commit
        let replaced: HashSet<ChannelId> = channels.iter().map(|c| c.id).collect();
        for id in known.difference(&replaced) {
            self.inner.gain_debouncer.cancel(id);
        }
        state.next_id = next_id;
        state.channels = channels;
        if let Some(show) = current_show {
            state.current_show = Some(show.trim().to_string()).filter(|s| !s.is_empty());
        }
        let warnings = self.persist(&state).await;
        self.broadcast_replaced(&state);
        Ok(Applied::new(state.channels.clone(), warnings))
    }

    /// Rebuild the list from a snapshot document, assigning fresh ids.
    ///
    /// The snapshot is rejected as a whole if it does not normalize cleanly.
    pub async fn adopt_snapshot(
        &self,
        value: &Value,
        current_show: Option<String>,
    ) -> Result<Applied<Snapshot>, ChannelError> {
        let mut state = self.inner.state.write().await;
        let snapshot = from_snapshot(value, self.layout(), state.next_id)?;

        let next_id = state
            .next_id
            .checked_add(snapshot.channels.len() as ChannelId)
            .ok_or_else(ids_exhausted)?;

        self.inner.gain_debouncer.cancel_all();
        state.next_id = next_id;
        state.channels = snapshot.channels.clone();
        state.current_show = current_show;

        let warnings = self.persist(&state).await;
        self.broadcast_replaced(&state);
        Ok(Applied::new(snapshot, warnings))
    }

    /// Drop every channel and the current show marker.
    pub async fn reset(&self) -> Applied<()> {
        let mut state = self.inner.state.write().await;
        self.inner.gain_debouncer.cancel_all();
        state.channels.clear();
        state.current_show = None;
        info!("Channel state reset");

        let warnings = self.persist(&state).await;
        self.broadcast_replaced(&state);
        Applied::new((), warnings)
    }

    pub async fn set_current_show(&self, show: Option<String>) -> Vec<String> {
        let mut state = self.inner.state.write().await;
        state.current_show = show;
        self.persist(&state).await
    }

    fn broadcast_replaced(&self, state: &StoreState) {
        self.inner.events.broadcast(SqEvent::ChannelsReplaced {
            count: state.channels.len(),
            current_show: state.current_show.clone(),
        });
    }

    // ------------------------------------------------------------------------
    // Preamp controls
    // ------------------------------------------------------------------------

    pub async fn set_phantom(&self, id: ChannelId, on: bool) -> Result<Applied<Channel>, ChannelError> {
        self.set_switch(id, PreampCommand::Phantom(on)).await
    }

    pub async fn set_pad(&self, id: ChannelId, on: bool) -> Result<Applied<Channel>, ChannelError> {
        self.set_switch(id, PreampCommand::Pad(on)).await
    }

    /// Store a phantom or pad change and send it to the channel's sockets.
    async fn set_switch(
        &self,
        id: ChannelId,
        command: PreampCommand,
    ) -> Result<Applied<Channel>, ChannelError> {
        let (channel, mut warnings) = {
            let mut state = self.inner.state.write().await;
            let index = state.position(id)?;
            if self.inner.allocator.is_line_channel(&state.channels[index]) {
                let channel = state.channels[index].clone();
                return Ok(Applied::new(
                    channel,
                    vec!["line input has no preamp controls".to_string()],
                ));
            }
            let channel = &mut state.channels[index];
            match command {
                PreampCommand::Phantom(on) => channel.phantom = on,
                PreampCommand::Pad(on) => channel.pad = on,
                PreampCommand::Gain(db) => channel.gain = db,
            }
            let channel = channel.clone();
            let warnings = self.persist(&state).await;
            (channel, warnings)
        };

        warnings.extend(self.send_to_channel(&channel, command).await);
        self.inner.events.broadcast(SqEvent::ChannelUpdated {
            channel: channel.clone(),
        });
        Ok(Applied::new(channel, warnings))
    }

    /// Set gain in memory now; persist and send once the value settles.
    ///
    /// The value is rounded and clamped to 0-60 dB. Only the last value in a
    /// burst reaches storage and the mixer.
    pub async fn set_gain(&self, id: ChannelId, db: f64) -> Result<Applied<Channel>, ChannelError> {
        let gain = if db.is_finite() {
            clamp_gain(db.round() as i64)
        } else {
            0
        };
        let channel = {
            let mut state = self.inner.state.write().await;
            let index = state.position(id)?;
            if self.inner.allocator.is_line_channel(&state.channels[index]) {
                let channel = state.channels[index].clone();
                return Ok(Applied::new(
                    channel,
                    vec!["line input has no preamp controls".to_string()],
                ));
            }
            state.channels[index].gain = gain;
            state.channels[index].clone()
        };

        let store = self.clone();
        self.inner
            .gain_debouncer
            .schedule(id, move || async move { store.flush_gain(id).await });

        Ok(Applied::new(channel, Vec::new()))
    }

    /// Persist and send the channel's current gain.
    ///
    /// Flushes for one channel run one after another, and each reads the
    /// gain when it starts, so the mixer ends on the stored value.
    async fn flush_gain(&self, id: ChannelId) {
        let channel = {
            let state = self.inner.state.read().await;
            let Ok(index) = state.position(id) else {
                debug!("Gain flush for removed channel {}", id);
                return;
            };
            let channel = state.channels[index].clone();
            for w in self.persist(&state).await {
                warn!("Gain for channel {}: {}", id, w);
            }
            channel
        };
        for w in self
            .send_to_channel(&channel, PreampCommand::Gain(channel.gain))
            .await
        {
            debug!("Gain for channel {}: {}", id, w);
        }
        self.inner
            .events
            .broadcast(SqEvent::ChannelUpdated { channel });
    }

    /// Gain changes not yet flushed, including flushes in progress.
    pub fn pending_gain_updates(&self) -> usize {
        self.inner.gain_debouncer.pending_count()
    }

    /// Wait for every scheduled gain flush to reach storage and the mixer.
    /// Returns false if some were still outstanding at `deadline`.
    pub async fn wait_for_gain_flushes(&self, deadline: Duration) -> bool {
        self.inner
            .gain_debouncer
            .wait_idle(Duration::from_millis(50), deadline)
            .await
    }

    /// Send one command to every non-line socket of `channel`.
    async fn send_to_channel(&self, channel: &Channel, command: PreampCommand) -> Vec<String> {
        let Some(target) = self.inner.settings.mixer_target() else {
            return vec!["mixer address not set; change saved only".to_string()];
        };
        let mut warnings = Vec::new();
        for socket in channel.sockets() {
            if self.inner.allocator.is_line_socket(socket) {
                continue;
            }
            if let Err(e) = self.inner.mixer.send(&target, socket, command).await {
                warn!("{} {} failed: {}", socket, command, e);
                self.inner.events.broadcast(SqEvent::DeviceCommandFailed {
                    socket: socket.to_string(),
                    error: e.to_string(),
                });
                warnings.push(format!("{}: {}", socket, e));
            }
        }
        warnings
    }

    /// Record a command that was sent directly to a socket on every channel
    /// using that socket.
    pub async fn record_socket_command(
        &self,
        socket: PreampSocket,
        command: PreampCommand,
    ) -> Vec<String> {
        let mut state = self.inner.state.write().await;
        let mut touched = Vec::new();
        for channel in state
            .channels
            .iter_mut()
            .filter(|c| c.sockets().any(|s| s == socket))
        {
            match command {
                PreampCommand::Phantom(on) => channel.phantom = on,
                PreampCommand::Pad(on) => channel.pad = on,
                PreampCommand::Gain(db) => channel.gain = db,
            }
            touched.push(channel.clone());
        }
        if touched.is_empty() {
            return Vec::new();
        }
        let warnings = self.persist(&state).await;
        for channel in touched {
            self.inner
                .events
                .broadcast(SqEvent::ChannelUpdated { channel });
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::recording::RecordingMixer;
    use crate::storage::JsonFileStorage;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: ChannelStore,
        mixer: Arc<RecordingMixer>,
        storage: Arc<JsonFileStorage>,
    }

    async fn fixture_with(sq_ip: Option<&str>, state: Option<Value>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let storage = Arc::new(JsonFileStorage::new(&data));
        if let Some(state) = state {
            std::fs::create_dir_all(&data).unwrap();
            std::fs::write(data.join("state.json"), state.to_string()).unwrap();
        }
        let settings = Arc::new(
            SettingsStore::load(
                dir.path().join("config.json"),
                sq_ip.map(str::to_string),
                &data,
                51326,
            )
            .await
            .unwrap(),
        );
        let mixer = Arc::new(RecordingMixer::default());
        let store = ChannelStore::new(
            storage.clone(),
            mixer.clone(),
            settings,
            PreampLayout::default(),
            Duration::from_millis(150),
            EventBroadcaster::default(),
        );
        store.load().await.unwrap();
        Fixture {
            _dir: dir,
            store,
            mixer,
            storage,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Some("10.0.0.1"), None).await
    }

    fn local(id: u8) -> PreampSocket {
        PreampSocket::new(PreampBus::Local, id)
    }

    #[tokio::test]
    async fn test_add_uses_next_free_slot_and_ids_are_not_reused() {
        let f = fixture().await;
        let a = f.store.add_channel(Some("Kick"), PreampBus::Local).await.unwrap().value;
        let b = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;
        assert_eq!((a.preamp_id, b.preamp_id), (1, 2));

        f.store.remove_channel(a.id).await.unwrap();
        let c = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;
        assert_eq!(c.preamp_id, 1);
        assert!(c.id > b.id);
    }

    #[tokio::test]
    async fn test_add_fails_when_bus_full() {
        let f = fixture().await;
        for _ in 0..21 {
            f.store.add_channel(None, PreampBus::Local).await.unwrap();
        }
        assert!(matches!(
            f.store.add_channel(None, PreampBus::Local).await,
            Err(ChannelError::Allocator(AllocatorError::SlotsExhausted { .. }))
        ));
        assert_eq!(f.store.channels().await.len(), 21);
    }

    #[tokio::test]
    async fn test_assign_conflict_leaves_state_unchanged() {
        let f = fixture().await;
        let a = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;
        let b = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;

        let err = f
            .store
            .assign(b.id, PreampBus::Local, 5, Some(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Allocator(AllocatorError::SlotConflict { channel_id, .. }) if channel_id == a.id
        ));
        assert_eq!(f.store.get(b.id).await.unwrap().preamp_id, 2);

        let moved = f.store.assign(b.id, PreampBus::Local, 5, Some(6)).await.unwrap().value;
        assert_eq!(moved.partner_socket(), Some(local(6)));
    }

    #[tokio::test]
    async fn test_change_bus_clamps_and_keeps() {
        let f = fixture().await;
        let c = f.store.add_channel(None, PreampBus::Slink).await.unwrap().value;
        f.store.assign(c.id, PreampBus::Slink, 30, Some(31)).await.unwrap();

        let moved = f.store.change_bus(c.id, PreampBus::Local).await.unwrap().value;
        assert_eq!(moved.socket(), local(21));
        assert_eq!(moved.preamp_id_r, None);

        f.store.assign(c.id, PreampBus::Local, 15, None).await.unwrap();
        let moved = f.store.change_bus(c.id, PreampBus::Slink).await.unwrap().value;
        assert_eq!(moved.preamp_id, 15);
    }

    #[tokio::test]
    async fn test_update_name_and_partner() {
        let f = fixture().await;
        let c = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;
        let updated = f
            .store
            .update(
                c.id,
                &UpdateChannelRequest {
                    name: Some("  Overheads  ".to_string()),
                    preamp_id_r: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .value;
        assert_eq!(updated.name, "Overheads");
        assert_eq!(updated.preamp_id_r, Some(2));

        let mono = f
            .store
            .update(
                c.id,
                &UpdateChannelRequest {
                    preamp_id_r: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .value;
        assert!(!mono.is_stereo());
        assert_eq!(mono.name, "Overheads");

        let renamed = f
            .store
            .update(
                c.id,
                &UpdateChannelRequest {
                    name: Some("Drum overheads left and right pair".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .value;
        assert_eq!(renamed.name.chars().count(), 32);
        assert_eq!(renamed.preamp_id, 1);
        let raw = f.storage.load_state().await.unwrap().unwrap();
        assert_eq!(raw["channels"][0]["name"], renamed.name.as_str());

        assert!(matches!(
            f.store.rename(999, "Ghost").await,
            Err(ChannelError::NotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_toggles_send_to_both_sockets() {
        let f = fixture().await;
        let c = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;
        f.store.assign(c.id, PreampBus::Local, 3, Some(4)).await.unwrap();

        let applied = f.store.set_phantom(c.id, true).await.unwrap();
        assert!(applied.value.phantom);
        assert!(applied.warnings.is_empty());
        assert_eq!(
            f.mixer.sent(),
            vec![
                (local(3), PreampCommand::Phantom(true)),
                (local(4), PreampCommand::Phantom(true))
            ]
        );

        let raw = f.storage.load_state().await.unwrap().unwrap();
        assert_eq!(raw["channels"][0]["phantom"], true);
    }

    #[tokio::test]
    async fn test_device_failure_is_a_warning() {
        let f = fixture().await;
        let c = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;
        f.mixer.fail_on(local(1));

        let applied = f.store.set_pad(c.id, true).await.unwrap();
        assert!(applied.value.pad);
        assert_eq!(applied.warnings.len(), 1);
        assert!(f.store.get(c.id).await.unwrap().pad);
    }

    #[tokio::test]
    async fn test_toggle_without_address_persists_with_warning() {
        let f = fixture_with(None, None).await;
        let c = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;
        let applied = f.store.set_phantom(c.id, true).await.unwrap();
        assert!(applied.value.phantom);
        assert!(applied.warnings[0].contains("mixer address not set"));
        assert!(f.mixer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_line_channel_controls_are_inert() {
        let f = fixture().await;
        let c = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;
        f.store.assign(c.id, PreampBus::Local, 19, None).await.unwrap();

        let applied = f.store.set_phantom(c.id, true).await.unwrap();
        assert!(!applied.value.phantom);
        assert!(f.mixer.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gain_is_debounced() {
        let f = fixture().await;
        let c = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;

        for db in [10.0, 25.4, 80.0] {
            let applied = f.store.set_gain(c.id, db).await.unwrap();
            assert_eq!(applied.value.gain, clamp_gain(db.round() as i64));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(f.mixer.sent().is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(f.mixer.sent(), vec![(local(1), PreampCommand::Gain(60))]);
        let raw = f.storage.load_state().await.unwrap().unwrap();
        assert_eq!(raw["channels"][0]["gain"], 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_gain_flush_does_not_overwrite_newer_value() {
        let f = fixture().await;
        let c = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;
        f.mixer.delay_next_send(Duration::from_secs(1));

        f.store.set_gain(c.id, 10.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        // First flush is stuck on the mixer
        f.store.set_gain(c.id, 20.0).await.unwrap();
        assert_eq!(f.store.pending_gain_updates(), 2);

        assert!(f.store.wait_for_gain_flushes(Duration::from_secs(5)).await);
        assert_eq!(
            f.mixer.sent(),
            vec![
                (local(1), PreampCommand::Gain(10)),
                (local(1), PreampCommand::Gain(20)),
            ]
        );
        let raw = f.storage.load_state().await.unwrap().unwrap();
        assert_eq!(raw["channels"][0]["gain"], 20);
        assert_eq!(f.store.pending_gain_updates(), 0);
    }

    #[tokio::test]
    async fn test_replace_all_rejects_ids_at_the_limit() {
        let f = fixture().await;
        f.store.add_channel(Some("keep"), PreampBus::Local).await.unwrap();

        let top = [json!({"id": ChannelId::MAX, "preampId": 1})];
        assert!(matches!(
            f.store.replace_all(&top, None).await,
            Err(ChannelError::Invalid(_))
        ));
        assert_eq!(f.store.channels().await[0].name, "keep");

        // The highest id that still leaves room for the next one
        let near = [json!({"id": ChannelId::MAX - 1, "preampId": 1})];
        f.store.replace_all(&near, None).await.unwrap();
        assert!(matches!(
            f.store.add_channel(None, PreampBus::Local).await,
            Err(ChannelError::Invalid(_))
        ));
        assert_eq!(f.store.channels().await.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_all_validates_before_commit() {
        let f = fixture().await;
        f.store.add_channel(Some("keep"), PreampBus::Local).await.unwrap();

        let bad = [
            json!({"preampBus": "local", "preampId": 1}),
            json!({"preampBus": "local", "preampId": 1}),
        ];
        assert!(matches!(
            f.store.replace_all(&bad, None).await,
            Err(ChannelError::Invalid(_))
        ));
        let out_of_range = [json!({"preampBus": "slink", "preampId": 41})];
        assert!(f.store.replace_all(&out_of_range, None).await.is_err());
        let bad_bus = [json!({"preampBus": "aes", "preampId": 1})];
        assert!(f.store.replace_all(&bad_bus, None).await.is_err());
        assert_eq!(f.store.channels().await[0].name, "keep");

        let good = [
            json!({"id": 0, "name": "A", "preampBus": "", "preampId": 2, "gain": 12.6}),
            json!({"name": "B", "preampBus": "slink", "preampId": 2, "preampIdR": 3}),
        ];
        let applied = f.store.replace_all(&good, Some("gig")).await.unwrap();
        assert_eq!(applied.value.len(), 2);
        assert_eq!(applied.value[0].gain, 13);
        assert_ne!(applied.value[0].id, applied.value[1].id);
        assert_eq!(f.store.current_show().await.as_deref(), Some("gig"));
    }

    #[tokio::test]
    async fn test_load_repairs_legacy_state() {
        let state = json!([
            {"id": 9, "channel": 5, "phantom": true},
            {"preampId": 5, "gain": "30"},
            "garbage"
        ]);
        let f = fixture_with(Some("10.0.0.1"), Some(state)).await;
        let channels = f.store.channels().await;
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].socket(), local(5));
        assert!(channels[0].phantom);
        assert_eq!(channels[1].socket(), local(1));
        assert_eq!(channels[1].gain, 30);
        assert!(f.store.current_show().await.is_none());
    }

    #[tokio::test]
    async fn test_load_object_form_keeps_current_show() {
        let state = json!({"channels": [{"preampBus": "slink", "preampId": 7}], "current_show": "gig"});
        let f = fixture_with(None, Some(state)).await;
        assert_eq!(f.store.current_show().await.as_deref(), Some("gig"));
        assert_eq!(
            f.store.channels().await[0].socket(),
            PreampSocket::new(PreampBus::Slink, 7)
        );
    }

    #[tokio::test]
    async fn test_record_socket_command_updates_matching_channels() {
        let f = fixture().await;
        let c = f.store.add_channel(None, PreampBus::Local).await.unwrap().value;
        f.store.assign(c.id, PreampBus::Local, 3, Some(4)).await.unwrap();

        f.store
            .record_socket_command(local(4), PreampCommand::Gain(33))
            .await;
        assert_eq!(f.store.get(c.id).await.unwrap().gain, 33);
        assert!(f
            .store
            .record_socket_command(local(9), PreampCommand::Pad(true))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let f = fixture().await;
        f.store.add_channel(None, PreampBus::Local).await.unwrap();
        f.store.set_current_show(Some("gig".to_string())).await;
        f.store.reset().await;
        assert!(f.store.channels().await.is_empty());
        assert!(f.store.current_show().await.is_none());
    }
}
