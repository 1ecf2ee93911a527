//! Preamp socket allocation.
//!
//! A socket may be held by at most one channel, either as its primary or as
//! its stereo partner. Every socket change in the service goes through
//! [`PreampAllocator::validate_assignment`] or [`PreampAllocator::validate_all`].

use sqpatch_types::channel::{Channel, ChannelId, PreampBus, PreampLayout, PreampSocket};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocatorError {
    #[error("{socket} is already used by channel {channel_id}")]
    SlotConflict {
        socket: PreampSocket,
        channel_id: ChannelId,
    },
    #[error("no free {} preamp left", .bus.label())]
    SlotsExhausted { bus: PreampBus },
    #[error("{} preamp {id} is out of range (1-{max})", .bus.label())]
    OutOfRange { bus: PreampBus, id: i64, max: u8 },
    #[error("stereo partner cannot be the same socket as the primary ({socket})")]
    SameSocket { socket: PreampSocket },
}

/// A validated socket assignment for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreampAssignment {
    pub bus: PreampBus,
    pub id: u8,
    pub id_r: Option<u8>,
}

impl PreampAssignment {
    pub fn of(channel: &Channel) -> Self {
        Self {
            bus: channel.preamp_bus,
            id: channel.preamp_id,
            id_r: channel.preamp_id_r,
        }
    }

    pub fn apply(&self, channel: &mut Channel) {
        channel.preamp_bus = self.bus;
        channel.preamp_id = self.id;
        channel.preamp_id_r = self.id_r;
    }
}

/// Socket bookkeeping for one device layout.
#[derive(Debug, Clone, Default)]
pub struct PreampAllocator {
    layout: PreampLayout,
}

impl PreampAllocator {
    pub fn new(layout: PreampLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &PreampLayout {
        &self.layout
    }

    /// Ids on `bus` held by any channel other than `excluding`.
    fn used_ids(
        &self,
        channels: &[Channel],
        bus: PreampBus,
        excluding: Option<ChannelId>,
    ) -> BTreeSet<u8> {
        channels
            .iter()
            .filter(|c| Some(c.id) != excluding && c.preamp_bus == bus)
            .flat_map(|c| std::iter::once(c.preamp_id).chain(c.preamp_id_r))
            .collect()
    }

    /// Channel holding `socket` as primary or partner, other than `excluding`.
    fn holder_of(
        channels: &[Channel],
        socket: PreampSocket,
        excluding: ChannelId,
    ) -> Option<ChannelId> {
        channels
            .iter()
            .filter(|c| c.id != excluding)
            .find(|c| c.sockets().any(|s| s == socket))
            .map(|c| c.id)
    }

    /// Lowest id on `bus` not used by any channel.
    pub fn next_free_slot(
        &self,
        channels: &[Channel],
        bus: PreampBus,
    ) -> Result<u8, AllocatorError> {
        let used = self.used_ids(channels, bus, None);
        (1..=self.layout.max_id(bus))
            .find(|id| !used.contains(id))
            .ok_or(AllocatorError::SlotsExhausted { bus })
    }

    fn check_bounds(&self, bus: PreampBus, id: i64) -> Result<u8, AllocatorError> {
        let max = self.layout.max_id(bus);
        if id < 1 || id > max as i64 {
            return Err(AllocatorError::OutOfRange { bus, id, max });
        }
        Ok(id as u8)
    }

    /// Check that `channel_id` may take `(bus, id)` and optionally `(bus, id_r)`.
    ///
    /// The channel's own current sockets never conflict. A partner of `0` is
    /// treated as mono.
    pub fn validate_assignment(
        &self,
        channels: &[Channel],
        channel_id: ChannelId,
        bus: PreampBus,
        id: i64,
        id_r: Option<i64>,
    ) -> Result<PreampAssignment, AllocatorError> {
        let id = self.check_bounds(bus, id)?;
        let id_r = match id_r.filter(|r| *r != 0) {
            Some(r) => Some(self.check_bounds(bus, r)?),
            None => None,
        };

        let primary = PreampSocket::new(bus, id);
        if id_r == Some(id) {
            return Err(AllocatorError::SameSocket { socket: primary });
        }

        let wanted = std::iter::once(primary).chain(id_r.map(|r| PreampSocket::new(bus, r)));
        for socket in wanted {
            if let Some(holder) = Self::holder_of(channels, socket, channel_id) {
                return Err(AllocatorError::SlotConflict {
                    socket,
                    channel_id: holder,
                });
            }
        }

        Ok(PreampAssignment { bus, id, id_r })
    }

    /// Validate a whole channel list at once: bounds, distinct partner and
    /// no socket held twice.
    pub fn validate_all(&self, channels: &[Channel]) -> Result<(), AllocatorError> {
        let mut holders: HashMap<PreampSocket, ChannelId> = HashMap::new();
        for channel in channels {
            self.check_bounds(channel.preamp_bus, channel.preamp_id as i64)?;
            if let Some(r) = channel.preamp_id_r {
                self.check_bounds(channel.preamp_bus, r as i64)?;
                if r == channel.preamp_id {
                    return Err(AllocatorError::SameSocket {
                        socket: channel.socket(),
                    });
                }
            }
            for socket in channel.sockets() {
                if let Some(holder) = holders.insert(socket, channel.id) {
                    return Err(AllocatorError::SlotConflict {
                        socket,
                        channel_id: holder,
                    });
                }
            }
        }
        Ok(())
    }

    /// Sockets for `channel` after moving it to `new_bus`.
    ///
    /// The primary is clamped into the new bus; the partner is dropped if it
    /// falls outside the bus or lands on the primary. Collisions are not
    /// checked here.
    pub fn change_bus(&self, channel: &Channel, new_bus: PreampBus) -> PreampAssignment {
        let id = self.layout.clamp_id(new_bus, channel.preamp_id as i64);
        let id_r = channel
            .preamp_id_r
            .filter(|r| *r <= self.layout.max_id(new_bus) && *r != id);
        PreampAssignment {
            bus: new_bus,
            id,
            id_r,
        }
    }

    pub fn is_line_channel(&self, channel: &Channel) -> bool {
        self.layout.is_line_socket(channel.socket())
    }

    pub fn is_line_socket(&self, socket: PreampSocket) -> bool {
        self.layout.is_line_socket(socket)
    }

    /// Ids `channel_id` could move to on `bus`: its own plus every unused one.
    /// Advisory only.
    pub fn available_ids_for(
        &self,
        channels: &[Channel],
        bus: PreampBus,
        channel_id: ChannelId,
    ) -> Vec<u8> {
        let used = self.used_ids(channels, bus, Some(channel_id));
        (1..=self.layout.max_id(bus))
            .filter(|id| !used.contains(id))
            .collect()
    }

    /// Make a channel list collision free, keeping earlier holders.
    ///
    /// A later channel on a taken primary moves to the next free socket on
    /// its bus, or is dropped when the bus is full. A taken or invalid partner
    /// is dropped. Returns one message per repair.
    pub fn repair(&self, channels: Vec<Channel>) -> (Vec<Channel>, Vec<String>) {
        let mut taken: HashMap<PreampSocket, ChannelId> = HashMap::new();
        let mut repaired = Vec::with_capacity(channels.len());
        let mut notes = Vec::new();

        for mut channel in channels {
            let bus = channel.preamp_bus;
            let primary = channel.socket();
            if let Some(holder) = taken.get(&primary) {
                let free = (1..=self.layout.max_id(bus))
                    .find(|id| !taken.contains_key(&PreampSocket::new(bus, *id)));
                match free {
                    Some(id) => {
                        let note = format!(
                            "channel {} moved from {} (held by channel {}) to {}",
                            channel.id,
                            primary,
                            holder,
                            PreampSocket::new(bus, id)
                        );
                        warn!("{}", note);
                        notes.push(note);
                        channel.preamp_id = id;
                    }
                    None => {
                        let note = format!(
                            "channel {} dropped: {} is held by channel {} and no {} preamp is free",
                            channel.id,
                            primary,
                            holder,
                            bus.label()
                        );
                        warn!("{}", note);
                        notes.push(note);
                        continue;
                    }
                }
            }

            if let Some(partner) = channel.partner_socket() {
                let invalid = partner.id == channel.preamp_id
                    || !self.layout.contains(bus, partner.id)
                    || taken.contains_key(&partner);
                if invalid {
                    let note = format!(
                        "channel {} made mono: stereo partner {} is unavailable",
                        channel.id, partner
                    );
                    warn!("{}", note);
                    notes.push(note);
                    channel.preamp_id_r = None;
                }
            }

            for socket in channel.sockets() {
                taken.insert(socket, channel.id);
            }
            repaired.push(channel);
        }

        (repaired, notes)
    }
}
