//! Channels, preamp buses and sockets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Session-scoped channel identifier. Never reused while the process runs.
pub type ChannelId = u32;

pub const GAIN_MIN_DB: u8 = 0;
pub const GAIN_MAX_DB: u8 = 60;
/// Fixed attenuation inserted ahead of the gain stage when pad is engaged.
pub const PAD_ATTENUATION_DB: i32 = 20;
pub const CHANNEL_NAME_MAX_LEN: usize = 32;

/// Local sockets when 18–21 are reserved as stereo line inputs.
pub const LOCAL_PREAMP_MAX: u8 = 21;
/// Local sockets on a console without stereo line inputs (16 inputs + talkback).
pub const LOCAL_PREAMP_MAX_SIMPLE: u8 = 17;
pub const SLINK_PREAMP_MAX: u8 = 40;
pub const TALKBACK_PREAMP_ID: u8 = 17;
pub const DEFAULT_LINE_PREAMP_IDS: [u8; 4] = [18, 19, 20, 21];

/// Physical socket group a preamp lives on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum PreampBus {
    /// On-console sockets
    #[default]
    Local,
    /// Remote expansion link
    Slink,
}

impl PreampBus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreampBus::Local => "local",
            PreampBus::Slink => "slink",
        }
    }

    /// Operator-facing name.
    pub fn label(&self) -> &'static str {
        match self {
            PreampBus::Local => "Local",
            PreampBus::Slink => "S-Link",
        }
    }
}

impl fmt::Display for PreampBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid preamp bus '{0}' (expected local or slink)")]
pub struct ParseBusError(pub String);

impl FromStr for PreampBus {
    type Err = ParseBusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(PreampBus::Local),
            "slink" => Ok(PreampBus::Slink),
            other => Err(ParseBusError(other.to_string())),
        }
    }
}

/// A physical preamp input addressed by bus and socket number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreampSocket {
    pub bus: PreampBus,
    pub id: u8,
}

impl PreampSocket {
    pub fn new(bus: PreampBus, id: u8) -> Self {
        Self { bus, id }
    }
}

impl fmt::Display for PreampSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} preamp {}", self.bus.label(), self.id)
    }
}

/// Shape of the device: socket bounds and which local sockets are line inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PreampLayout {
    pub local_max: u8,
    #[serde(default)]
    pub line_preamp_ids: Vec<u8>,
}

impl Default for PreampLayout {
    fn default() -> Self {
        Self {
            local_max: LOCAL_PREAMP_MAX,
            line_preamp_ids: DEFAULT_LINE_PREAMP_IDS.to_vec(),
        }
    }
}

impl PreampLayout {
    /// Layout without reserved line inputs.
    pub fn simple() -> Self {
        Self {
            local_max: LOCAL_PREAMP_MAX_SIMPLE,
            line_preamp_ids: Vec::new(),
        }
    }

    pub fn max_id(&self, bus: PreampBus) -> u8 {
        match bus {
            PreampBus::Local => self.local_max,
            PreampBus::Slink => SLINK_PREAMP_MAX,
        }
    }

    pub fn contains(&self, bus: PreampBus, id: u8) -> bool {
        id >= 1 && id <= self.max_id(bus)
    }

    /// Clamp an arbitrary number into `[1, max]` for the bus.
    pub fn clamp_id(&self, bus: PreampBus, id: i64) -> u8 {
        let max = self.max_id(bus) as i64;
        id.clamp(1, max) as u8
    }

    pub fn is_line_socket(&self, socket: PreampSocket) -> bool {
        socket.bus == PreampBus::Local && self.line_preamp_ids.contains(&socket.id)
    }
}

/// A logical console strip patched to one (mono) or two (stereo) sockets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: ChannelId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub preamp_bus: PreampBus,
    pub preamp_id: u8,
    /// Stereo partner on the same bus; serialized as `0` when mono
    #[serde(default, rename = "preampIdR", with = "mono_partner")]
    #[cfg_attr(feature = "openapi", schema(value_type = u8))]
    pub preamp_id_r: Option<u8>,
    #[serde(default)]
    pub phantom: bool,
    #[serde(default)]
    pub pad: bool,
    /// Pre-pad gain stage value in dB
    #[serde(default)]
    pub gain: u8,
}

impl Channel {
    /// Create a mono channel with everything switched off.
    pub fn new(id: ChannelId, socket: PreampSocket) -> Self {
        Self {
            id,
            name: String::new(),
            preamp_bus: socket.bus,
            preamp_id: socket.id,
            preamp_id_r: None,
            phantom: false,
            pad: false,
            gain: GAIN_MIN_DB,
        }
    }

    pub fn socket(&self) -> PreampSocket {
        PreampSocket::new(self.preamp_bus, self.preamp_id)
    }

    pub fn partner_socket(&self) -> Option<PreampSocket> {
        self.preamp_id_r
            .map(|id| PreampSocket::new(self.preamp_bus, id))
    }

    /// Primary socket followed by the stereo partner, if any.
    pub fn sockets(&self) -> impl Iterator<Item = PreampSocket> + '_ {
        std::iter::once(self.socket()).chain(self.partner_socket())
    }

    pub fn is_stereo(&self) -> bool {
        self.preamp_id_r.is_some()
    }

    pub fn display_gain(&self) -> i32 {
        display_gain(self.pad, self.gain)
    }
}

/// Effective input gain shown to the operator.
pub fn display_gain(pad: bool, gain: u8) -> i32 {
    if pad {
        gain as i32 - PAD_ATTENUATION_DB
    } else {
        gain as i32
    }
}

/// Trim and cut a channel name to the console's strip width.
pub fn sanitize_channel_name(name: &str) -> String {
    name.trim().chars().take(CHANNEL_NAME_MAX_LEN).collect()
}

pub fn clamp_gain(db: i64) -> u8 {
    db.clamp(GAIN_MIN_DB as i64, GAIN_MAX_DB as i64) as u8
}

mod mono_partner {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(value.unwrap_or(0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
        let raw = Option::<u8>::deserialize(deserializer)?;
        Ok(raw.filter(|id| *id != 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_gain_subtracts_pad() {
        assert_eq!(display_gain(false, 30), 30);
        assert_eq!(display_gain(true, 30), 10);
        assert_eq!(display_gain(true, 0), -20);
    }

    #[test]
    fn test_partner_serialized_as_zero_when_mono() {
        let channel = Channel::new(1, PreampSocket::new(PreampBus::Local, 3));
        let json = serde_json::to_value(&channel).unwrap();
        assert_eq!(json["preampIdR"], 0);
        assert_eq!(json["preampBus"], "local");

        let parsed: Channel = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.preamp_id_r, None);
    }

    #[test]
    fn test_partner_round_trip() {
        let json = serde_json::json!({
            "id": 4, "name": "OH", "preampBus": "slink", "preampId": 7, "preampIdR": 8,
            "phantom": true, "pad": false, "gain": 25
        });
        let channel: Channel = serde_json::from_value(json).unwrap();
        assert_eq!(channel.partner_socket(), Some(PreampSocket::new(PreampBus::Slink, 8)));
        assert_eq!(channel.sockets().count(), 2);
    }

    #[test]
    fn test_layout_bounds() {
        let layout = PreampLayout::default();
        assert_eq!(layout.max_id(PreampBus::Local), 21);
        assert_eq!(layout.max_id(PreampBus::Slink), 40);
        assert_eq!(layout.clamp_id(PreampBus::Local, 99), 21);
        assert_eq!(layout.clamp_id(PreampBus::Slink, -3), 1);
        assert!(layout.is_line_socket(PreampSocket::new(PreampBus::Local, 19)));
        assert!(!layout.is_line_socket(PreampSocket::new(PreampBus::Slink, 19)));
        assert!(!PreampLayout::simple().contains(PreampBus::Local, 18));
    }

    #[test]
    fn test_channel_name_is_cut_to_strip_width() {
        let long = "x".repeat(40);
        assert_eq!(sanitize_channel_name(&long).len(), CHANNEL_NAME_MAX_LEN);
        assert_eq!(sanitize_channel_name("  Kick In "), "Kick In");
    }
}
