//! Show file format shared by server storage and file import/export.

use crate::channel::PreampBus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

pub const SHOW_FILE_VERSION: u32 = 1;
pub const SHOW_NAME_MAX_LEN: usize = 64;
pub const DEFAULT_SHOW_NAME: &str = "show";

/// One channel as persisted in a show. Session ids and stereo partners are not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ShowChannel {
    pub name: String,
    pub preamp_bus: PreampBus,
    pub preamp_id: u8,
    pub phantom: bool,
    pub pad: bool,
    pub gain: u8,
}

/// A named snapshot of the channel list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ShowFile {
    pub version: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = DateTime))]
    pub saved_at: Option<DateTime<Utc>>,
    pub channels: Vec<ShowChannel>,
    /// Mixer address the show was saved against
    #[serde(default, rename = "sq_ip", skip_serializing_if = "Option::is_none")]
    pub sq_ip: Option<String>,
}

impl ShowFile {
    pub fn new(name: impl Into<String>, channels: Vec<ShowChannel>, sq_ip: Option<String>) -> Self {
        Self {
            version: SHOW_FILE_VERSION,
            name: name.into(),
            saved_at: Some(Utc::now()),
            channels,
            sq_ip: sq_ip.filter(|ip| !ip.trim().is_empty()),
        }
    }
}

/// Map a free-form name onto the storage key alphabet `[A-Za-z0-9_-]`.
pub fn sanitize_show_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return DEFAULT_SHOW_NAME.to_string();
    }
    trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(SHOW_NAME_MAX_LEN)
        .collect()
}

/// True if the name can be used as a storage key without sanitizing.
pub fn is_valid_show_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= SHOW_NAME_MAX_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_show_name() {
        assert_eq!(sanitize_show_name("Sunday Service"), "Sunday_Service");
        assert_eq!(sanitize_show_name("   "), "show");
        assert_eq!(sanitize_show_name("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_show_name(&"a".repeat(100)).len(), SHOW_NAME_MAX_LEN);
    }

    #[test]
    fn test_valid_show_name() {
        assert!(is_valid_show_name("band-2024_v2"));
        assert!(!is_valid_show_name("band 2024"));
        assert!(!is_valid_show_name(""));
        assert!(!is_valid_show_name("../x"));
    }

    #[test]
    fn test_show_file_field_names() {
        let show = ShowFile::new("gig", Vec::new(), Some("10.0.0.5".to_string()));
        let json = serde_json::to_value(&show).unwrap();
        assert_eq!(json["version"], 1);
        assert!(json.get("savedAt").is_some());
        assert_eq!(json["sq_ip"], "10.0.0.5");
    }
}
