//! Conversion between show snapshots and live channels.
//!
//! Snapshots come from old files, other versions of the app, or hand edits, so
//! nothing about a record's shape is trusted. Every record goes through
//! [`normalize_record`], which yields a typed value or rejects the snapshot.

use crate::channel::{
    clamp_gain, sanitize_channel_name, Channel, ChannelId, PreampBus, PreampLayout, PreampSocket,
};
use crate::show::{ShowChannel, ShowFile};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

/// A record after field coercion, before it is given a session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    /// Session id carried by the record, if any
    pub id: Option<ChannelId>,
    pub name: String,
    pub socket: PreampSocket,
    /// Stereo partner, kept only when in bounds and distinct from the primary
    pub partner: Option<u8>,
    pub phantom: bool,
    pub pad: bool,
    pub gain: u8,
}

impl NormalizedRecord {
    pub fn into_channel(self, id: ChannelId) -> Channel {
        Channel {
            id,
            name: self.name,
            preamp_bus: self.socket.bus,
            preamp_id: self.socket.id,
            preamp_id_r: self.partner,
            phantom: self.phantom,
            pad: self.pad,
            gain: self.gain,
        }
    }
}

/// Channels recovered from a snapshot, with fresh session ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub name: Option<String>,
    pub channels: Vec<Channel>,
    pub sq_ip: Option<String>,
}

/// Strip runtime-only fields.
pub fn to_snapshot(channels: &[Channel]) -> Vec<ShowChannel> {
    channels
        .iter()
        .map(|c| ShowChannel {
            name: c.name.clone(),
            preamp_bus: c.preamp_bus,
            preamp_id: c.preamp_id,
            phantom: c.phantom,
            pad: c.pad,
            gain: c.gain,
        })
        .collect()
}

/// Build a show file for the given channels.
pub fn to_show_file(name: &str, channels: &[Channel], sq_ip: Option<String>) -> ShowFile {
    ShowFile::new(name, to_snapshot(channels), sq_ip)
}

/// Locate the channel records in a snapshot document.
///
/// Accepts `{channels: [...]}`, the legacy `{cubes: [...]}` and a bare array.
pub fn channel_records(value: &Value) -> Result<&[Value], SnapshotError> {
    match value {
        Value::Array(records) => Ok(records),
        Value::Object(map) => {
            if let Some(Value::Array(records)) = map.get("channels") {
                Ok(records)
            } else if let Some(Value::Array(records)) = map.get("cubes") {
                Ok(records)
            } else {
                Err(SnapshotError::Invalid("no channel list".to_string()))
            }
        }
        _ => Err(SnapshotError::Invalid(
            "expected an object or an array".to_string(),
        )),
    }
}

/// Coerce one record. Bounds are clamped, types are coerced, shape is checked.
pub fn normalize_record(
    record: &Value,
    layout: &PreampLayout,
) -> Result<NormalizedRecord, SnapshotError> {
    let map = record
        .as_object()
        .ok_or_else(|| SnapshotError::Invalid("channel record is not an object".to_string()))?;

    let bus = match map.get("preampBus").and_then(Value::as_str) {
        Some("slink") => PreampBus::Slink,
        _ => PreampBus::Local,
    };

    // preampId, then the legacy flat `channel` field, then 1.
    let raw_id = match map.get("preampId") {
        Some(v) if !v.is_null() => coerce_int(v),
        _ => map.get("channel").and_then(coerce_int),
    };
    let id = layout.clamp_id(bus, raw_id.filter(|n| *n != 0).unwrap_or(1));

    let partner = map
        .get("preampIdR")
        .and_then(coerce_int)
        .filter(|n| *n != 0 && *n != id as i64)
        .filter(|n| *n >= 1 && *n <= layout.max_id(bus) as i64)
        .map(|n| n as u8);

    let name = match map.get("name") {
        Some(Value::String(s)) => sanitize_channel_name(s),
        Some(Value::Number(n)) => sanitize_channel_name(&n.to_string()),
        _ => String::new(),
    };

    let gain = map
        .get("gain")
        .and_then(coerce_float)
        .map(|db| clamp_gain(db.round() as i64))
        .unwrap_or(0);

    let id_field = map
        .get("id")
        .and_then(coerce_int)
        .filter(|n| *n > 0 && *n <= ChannelId::MAX as i64)
        .map(|n| n as ChannelId);

    Ok(NormalizedRecord {
        id: id_field,
        name,
        socket: PreampSocket::new(bus, id),
        partner,
        phantom: map.get("phantom").map(truthy).unwrap_or(false),
        pad: map.get("pad").map(truthy).unwrap_or(false),
        gain,
    })
}

/// Rebuild a channel list from a snapshot document.
///
/// Session ids are assigned sequentially from `first_id`. Stereo partners are
/// not part of a show and are dropped. The whole snapshot is rejected if a
/// record is malformed or two records land on the same socket.
pub fn from_snapshot(
    value: &Value,
    layout: &PreampLayout,
    first_id: ChannelId,
) -> Result<Snapshot, SnapshotError> {
    let records = channel_records(value)?;

    let mut holders: HashMap<PreampSocket, usize> = HashMap::new();
    let mut channels = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let mut normalized = normalize_record(record, layout)
            .map_err(|e| SnapshotError::Invalid(format!("record {}: {}", index + 1, e)))?;
        normalized.partner = None;

        if let Some(previous) = holders.insert(normalized.socket, index) {
            return Err(SnapshotError::Invalid(format!(
                "records {} and {} both use {}",
                previous + 1,
                index + 1,
                normalized.socket
            )));
        }

        let id = first_id
            .checked_add(index as ChannelId)
            .ok_or_else(|| SnapshotError::Invalid("channel ids exhausted".to_string()))?;
        channels.push(normalized.into_channel(id));
    }

    let (name, sq_ip) = match value {
        Value::Object(map) => (
            map.get("name").and_then(Value::as_str).map(str::to_string),
            map.get("sq_ip")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(str::to_string),
        ),
        _ => (None, None),
    };

    Ok(Snapshot {
        name,
        channels,
        sq_ip,
    })
}

/// Integer in the loose sense of JavaScript's `parseInt`: numbers are
/// truncated, strings contribute their leading digits.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .char_indices()
                .find(|(_, c)| !c.is_ascii_digit())
                .map(|(i, _)| i)
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layout() -> PreampLayout {
        PreampLayout::default()
    }

    #[test]
    fn test_ids_past_the_limit_are_rejected() {
        let value = json!([{"preampId": 1}, {"preampId": 2}]);
        assert!(from_snapshot(&value, &layout(), ChannelId::MAX - 1).is_ok());
        assert!(matches!(
            from_snapshot(&value, &layout(), ChannelId::MAX),
            Err(SnapshotError::Invalid(_))
        ));
    }

    #[test]
    fn test_legacy_record() {
        let snapshot = from_snapshot(&json!({"channels": [{"channel": 5, "phantom": true}]}), &layout(), 1)
            .unwrap();
        let channel = &snapshot.channels[0];
        assert_eq!(channel.preamp_bus, PreampBus::Local);
        assert_eq!(channel.preamp_id, 5);
        assert!(channel.phantom);
        assert!(!channel.pad);
        assert_eq!(channel.gain, 0);
    }

    #[test]
    fn test_round_trip_preserves_channel_fields() {
        let mut a = Channel::new(7, PreampSocket::new(PreampBus::Local, 3));
        a.name = "Kick".to_string();
        a.phantom = true;
        a.gain = 42;
        let mut b = Channel::new(9, PreampSocket::new(PreampBus::Slink, 40));
        b.pad = true;
        b.gain = 60;
        let channels = vec![a, b];

        let file = to_show_file("gig", &channels, None);
        let value = serde_json::to_value(&file).unwrap();
        let restored = from_snapshot(&value, &layout(), 100).unwrap();

        assert_eq!(to_snapshot(&restored.channels), to_snapshot(&channels));
        assert_eq!(restored.channels[0].id, 100);
        assert_eq!(restored.channels[1].id, 101);
    }

    #[test]
    fn test_legacy_cubes_key_and_bare_array() {
        let cubes = json!({"cubes": [{"preampId": 2}]});
        assert_eq!(from_snapshot(&cubes, &layout(), 1).unwrap().channels.len(), 1);

        let bare = json!([{"preampId": 2}, {"preampId": 3}]);
        assert_eq!(from_snapshot(&bare, &layout(), 1).unwrap().channels.len(), 2);
    }

    #[test]
    fn test_coercion_and_clamping() {
        let value = json!({"channels": [
            {"preampBus": "slink", "preampId": "55", "gain": "71.6", "pad": 1, "phantom": ""},
            {"preampBus": "bogus", "preampId": 0, "gain": -4, "name": "  Vox  "}
        ]});
        let snapshot = from_snapshot(&value, &layout(), 1).unwrap();

        let first = &snapshot.channels[0];
        assert_eq!(first.socket(), PreampSocket::new(PreampBus::Slink, 40));
        assert_eq!(first.gain, 60);
        assert!(first.pad);
        assert!(!first.phantom);

        let second = &snapshot.channels[1];
        assert_eq!(second.socket(), PreampSocket::new(PreampBus::Local, 1));
        assert_eq!(second.gain, 0);
        assert_eq!(second.name, "Vox");
    }

    #[test]
    fn test_partner_is_not_restored_from_show() {
        let value = json!({"channels": [{"preampId": 1, "preampIdR": 2}]});
        let snapshot = from_snapshot(&value, &layout(), 1).unwrap();
        assert_eq!(snapshot.channels[0].preamp_id_r, None);
    }

    #[test]
    fn test_collision_rejects_whole_snapshot() {
        let value = json!({"channels": [{"preampId": 4}, {"preampId": 5}, {"channel": 4}]});
        let err = from_snapshot(&value, &layout(), 1).unwrap_err();
        assert!(err.to_string().contains("records 1 and 3"));
    }

    #[test]
    fn test_malformed_snapshots() {
        assert!(from_snapshot(&json!("nope"), &layout(), 1).is_err());
        assert!(from_snapshot(&json!({"name": "x"}), &layout(), 1).is_err());
        assert!(from_snapshot(&json!({"channels": [42]}), &layout(), 1).is_err());
    }

    #[test]
    fn test_snapshot_address_and_name() {
        let value = json!({"name": "gig", "sq_ip": " 10.0.0.9 ", "channels": []});
        let snapshot = from_snapshot(&value, &layout(), 1).unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("gig"));
        assert_eq!(snapshot.sq_ip.as_deref(), Some("10.0.0.9"));
        assert!(snapshot.channels.is_empty());
    }

    #[test]
    fn test_normalize_keeps_valid_partner_and_id() {
        let record = json!({"id": 12, "preampId": 3, "preampIdR": 4});
        let normalized = normalize_record(&record, &layout()).unwrap();
        assert_eq!(normalized.id, Some(12));
        assert_eq!(normalized.partner, Some(4));

        let same = json!({"preampId": 3, "preampIdR": 3});
        assert_eq!(normalize_record(&same, &layout()).unwrap().partner, None);
    }
}
