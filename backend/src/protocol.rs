//! SQ control packet encoding.
//!
//! Every command is one 8 byte packet sent over TCP:
//!
//! ```text
//! F7 0C 0C [subtype] [ch] [block] [v1] [v2]
//! ```
//!
//! `subtype` selects the parameter, `block` the bus, `ch` the socket on it.
//! Booleans travel in `v1`; gain is a big endian raw value in `v1 v2`.

use sqpatch_types::channel::{
    PreampBus, PreampSocket, GAIN_MAX_DB, SLINK_PREAMP_MAX, TALKBACK_PREAMP_ID,
};
use std::fmt;

pub const PACKET_LEN: usize = 8;
const HEADER: [u8; 3] = [0xF7, 0x0C, 0x0C];

const SUBTYPE_GAIN: u8 = 0x0C;
const SUBTYPE_PHANTOM: u8 = 0x0D;
const SUBTYPE_PAD: u8 = 0x0E;

const BLOCK_LOCAL: u8 = 0x01;
const BLOCK_SLINK: u8 = 0x02;

/// Raw gain value at 0 dB; one step per dB up to 60 dB (`0xBC`).
pub const GAIN_RAW_0DB: u16 = 0x0080;
pub const GAIN_RAW_60DB: u16 = GAIN_RAW_0DB + GAIN_MAX_DB as u16;

/// Local inputs 1-16 map straight onto channels 0-15.
const LOCAL_INPUT_MAX: u8 = 16;
const TALKBACK_CH: u8 = 58;

pub type Packet = [u8; PACKET_LEN];

/// One parameter change for one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreampCommand {
    Phantom(bool),
    Pad(bool),
    /// Gain in dB, 0 to 60
    Gain(u8),
}

impl PreampCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            PreampCommand::Phantom(_) => "phantom",
            PreampCommand::Pad(_) => "pad",
            PreampCommand::Gain(_) => "gain",
        }
    }

    /// All three commands that describe a channel's preamp state.
    pub fn full_state(phantom: bool, pad: bool, gain: u8) -> [PreampCommand; 3] {
        [
            PreampCommand::Phantom(phantom),
            PreampCommand::Pad(pad),
            PreampCommand::Gain(gain),
        ]
    }

    /// Build the packet addressing `socket`.
    pub fn encode(&self, socket: PreampSocket) -> Result<Packet, ProtocolError> {
        let ch = socket_to_ch(socket)?;
        let block = match socket.bus {
            PreampBus::Local => BLOCK_LOCAL,
            PreampBus::Slink => BLOCK_SLINK,
        };
        let (subtype, v1, v2) = match *self {
            PreampCommand::Phantom(on) => (SUBTYPE_PHANTOM, on as u8, 0x00),
            PreampCommand::Pad(on) => (SUBTYPE_PAD, on as u8, 0x00),
            PreampCommand::Gain(db) => {
                if db > GAIN_MAX_DB {
                    return Err(ProtocolError::GainOutOfRange(db));
                }
                let [hi, lo] = (GAIN_RAW_0DB + db as u16).to_be_bytes();
                (SUBTYPE_GAIN, hi, lo)
            }
        };
        Ok([
            HEADER[0], HEADER[1], HEADER[2], subtype, ch, block, v1, v2,
        ])
    }
}

impl fmt::Display for PreampCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreampCommand::Phantom(on) | PreampCommand::Pad(on) => {
                write!(f, "{} {}", self.kind(), if *on { "on" } else { "off" })
            }
            PreampCommand::Gain(db) => write!(f, "gain {} dB", db),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("{0} cannot be addressed on the mixer")]
    NotAddressable(PreampSocket),
    #[error("gain {0} dB is outside 0-60")]
    GainOutOfRange(u8),
}

/// Mixer channel number for a socket. Local 18 and up are stereo line
/// inputs without a preamp and have no channel number.
fn socket_to_ch(socket: PreampSocket) -> Result<u8, ProtocolError> {
    match (socket.bus, socket.id) {
        (PreampBus::Local, id @ 1..=LOCAL_INPUT_MAX) => Ok(id - 1),
        (PreampBus::Local, TALKBACK_PREAMP_ID) => Ok(TALKBACK_CH),
        (PreampBus::Slink, id @ 1..=SLINK_PREAMP_MAX) => Ok(id - 1),
        _ => Err(ProtocolError::NotAddressable(socket)),
    }
}

/// Lower-case hex with spaces, for debug logs.
pub fn hex(packet: &[u8]) -> String {
    packet
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
