//! Configuration management.

use crate::paths::{DEFAULT_DATA_DIR, DEFAULT_SETTINGS_FILE};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use sqpatch_types::channel::{PreampLayout, DEFAULT_LINE_PREAMP_IDS, LOCAL_PREAMP_MAX};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    mixer: MixerSection,
    #[serde(default)]
    storage: StorageSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MixerSection {
    /// Fallback address when the settings file has none
    #[serde(default)]
    ip: Option<String>,
    #[serde(default = "default_mixer_port")]
    port: u16,
    /// Delay between channels during a sync
    #[serde(default = "default_pace_ms")]
    pace_ms: u64,
    #[serde(default = "default_gain_debounce_ms")]
    gain_debounce_ms: u64,
    /// Connect and write timeout for one command
    #[serde(default = "default_command_timeout_ms")]
    command_timeout_ms: u64,
    #[serde(default = "default_local_preamp_max")]
    local_preamp_max: u8,
    #[serde(default = "default_line_preamp_ids")]
    line_preamp_ids: Vec<u8>,
}

impl Default for MixerSection {
    fn default() -> Self {
        Self {
            ip: None,
            port: default_mixer_port(),
            pace_ms: default_pace_ms(),
            gain_debounce_ms: default_gain_debounce_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            local_preamp_max: default_local_preamp_max(),
            line_preamp_ids: default_line_preamp_ids(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StorageSection {
    /// Settings file holding the mixer address and data directory
    settings_path: Option<PathBuf>,
    /// Data directory used when the settings file does not name one
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingSection {
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    log_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

fn default_port() -> u16 {
    sqpatch_types::DEFAULT_PORT
}

fn default_mixer_port() -> u16 {
    sqpatch_types::DEFAULT_MIXER_PORT
}

fn default_pace_ms() -> u64 {
    40
}

fn default_gain_debounce_ms() -> u64 {
    150
}

fn default_command_timeout_ms() -> u64 {
    2000
}

fn default_local_preamp_max() -> u8 {
    LOCAL_PREAMP_MAX
}

fn default_line_preamp_ids() -> Vec<u8> {
    DEFAULT_LINE_PREAMP_IDS.to_vec()
}

/// Values given on the command line. `None` leaves lower layers in charge.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub mixer_ip: Option<String>,
    pub mixer_port: Option<u16>,
    pub settings_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Mixer connection and device shape.
#[derive(Debug, Clone)]
pub struct MixerConfig {
    pub ip: Option<String>,
    pub port: u16,
    pub pace: Duration,
    pub gain_debounce: Duration,
    pub command_timeout: Duration,
    pub layout: PreampLayout,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self::from_section(MixerSection::default())
    }
}

impl MixerConfig {
    fn from_section(section: MixerSection) -> Self {
        Self {
            ip: section
                .ip
                .map(|ip| ip.trim().to_string())
                .filter(|ip| !ip.is_empty()),
            port: section.port,
            pace: Duration::from_millis(section.pace_ms),
            gain_debounce: Duration::from_millis(section.gain_debounce_ms),
            command_timeout: Duration::from_millis(section.command_timeout_ms),
            layout: PreampLayout {
                local_max: section.local_preamp_max,
                line_preamp_ids: section.line_preamp_ids,
            },
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    pub mixer: MixerConfig,
    /// Settings file (mixer address, data directory)
    pub settings_path: PathBuf,
    /// Data directory used until the settings file names one
    pub data_dir: PathBuf,
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    pub log_file: Option<PathBuf>,
    /// Log level, used when RUST_LOG is unset
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            mixer: MixerConfig::default(),
            settings_path: PathBuf::from(DEFAULT_SETTINGS_FILE),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log_file: None,
            log_level: None,
        }
    }
}

impl Config {
    /// Load configuration with full priority chain: CLI args > env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `config.toml` in user config directory (~/.config/sqpatch/ on Linux)
    /// 2. `.sqpatch.toml` in current directory
    ///
    /// Environment variables use the `SQPATCH_` prefix with `__` between
    /// section and key (`SQPATCH_MIXER__PACE_MS`). The unprefixed `SQ_IP`,
    /// `SQ_PORT` and `PORT` are honored below them.
    pub fn from_figment(overrides: ConfigOverrides) -> anyhow::Result<Self> {
        let local_config = std::env::current_dir()
            .ok()
            .map(|d| d.join(".sqpatch.toml"));
        let user_config = directories::ProjectDirs::from("", "", "sqpatch")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        // defaults < user config < local config < legacy env < prefixed env < CLI args
        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile {
            server: ServerConfig::default(),
            mixer: MixerSection::default(),
            storage: StorageSection::default(),
            logging: LoggingSection::default(),
        }));

        if let Some(ref path) = user_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        if let Some(ref path) = local_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(
            Env::raw()
                .only(&["SQ_IP", "SQ_PORT", "PORT"])
                .map(|key| legacy_env_key(key.as_str()).into()),
        );

        figment = figment.merge(
            Env::prefixed("SQPATCH_").map(|key| key.as_str().replace("__", ".").into()),
        );

        if let Some(p) = overrides.port {
            figment = figment.merge(Serialized::default("server.port", p));
        }
        if let Some(ref ip) = overrides.mixer_ip {
            figment = figment.merge(Serialized::default("mixer.ip", ip));
        }
        if let Some(p) = overrides.mixer_port {
            figment = figment.merge(Serialized::default("mixer.port", p));
        }
        if let Some(ref path) = overrides.settings_path {
            figment = figment.merge(Serialized::default("storage.settings_path", path));
        }
        if let Some(ref dir) = overrides.data_dir {
            figment = figment.merge(Serialized::default("storage.data_dir", dir));
        }
        if let Some(ref level) = overrides.log_level {
            figment = figment.merge(Serialized::default("logging.log_level", level));
        }

        let config_file: ConfigFile = figment.extract()?;
        validate_layout(&config_file.mixer)?;

        Ok(Self {
            port: config_file.server.port,
            mixer: MixerConfig::from_section(config_file.mixer),
            settings_path: config_file
                .storage
                .settings_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE)),
            data_dir: config_file
                .storage
                .data_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            log_file: config_file.logging.log_file,
            log_level: config_file.logging.log_level,
        })
    }
}

fn legacy_env_key(key: &str) -> String {
    match key.to_ascii_lowercase().as_str() {
        "sq_ip" => "mixer.ip".to_string(),
        "sq_port" => "mixer.port".to_string(),
        "port" => "server.port".to_string(),
        other => other.to_string(),
    }
}

fn validate_layout(mixer: &MixerSection) -> anyhow::Result<()> {
    if mixer.local_preamp_max == 0 || mixer.local_preamp_max > LOCAL_PREAMP_MAX {
        anyhow::bail!(
            "mixer.local_preamp_max must be between 1 and {}",
            LOCAL_PREAMP_MAX
        );
    }
    if let Some(id) = mixer
        .line_preamp_ids
        .iter()
        .find(|id| **id == 0 || **id > mixer.local_preamp_max)
    {
        anyhow::bail!(
            "mixer.line_preamp_ids contains {} outside local preamps 1-{}",
            id,
            mixer.local_preamp_max
        );
    }
    if mixer.port == 0 {
        anyhow::bail!("mixer.port must not be 0");
    }
    Ok(())
}
