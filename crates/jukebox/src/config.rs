//! Configuration loading and defaults.
//!
//! Every key of the TOML file is optional; command-line flags override the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

pub use audio_player::config::PlaybackConfig;

const DEFAULT_HTTP_BIND: &str = "0.0.0.0:8080";
const DEFAULT_MUSIC_DIR: &str = "/var/lib/jukebox/music";
const DEFAULT_MAPPINGS_FILE: &str = "/var/lib/jukebox/mappings.txt";
const DEFAULT_TAG_FILE: &str = "/run/jukebox/tag";

/// Top-level config file schema.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// HTTP API bind address (host:port).
    pub http_bind: Option<String>,
    /// Folder holding the songs; relative mapping paths resolve against it.
    pub music_dir: Option<String>,
    /// Mapping table file.
    pub mappings_file: Option<String>,
    /// Output device substring match.
    pub device: Option<String>,
    /// Advertise the HTTP API over mDNS (default: true).
    pub mdns: Option<bool>,
    pub timing: Option<TimingConfig>,
    pub playback: Option<PlaybackSettings>,
    pub store: Option<StoreConfig>,
    pub hardware: Option<HardwareConfig>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str::<FileConfig>(&raw).with_context(|| format!("parse config {:?}", path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub nfc_read_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub debounce_delay_ms: u64,
    pub repeat_delay_ms: u64,
    /// Pause between control-loop passes.
    pub loop_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            nfc_read_interval_ms: 2_000,
            shutdown_timeout_ms: 120_000,
            debounce_delay_ms: 50,
            repeat_delay_ms: 300,
            loop_interval_ms: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub forward_seek_sec: i64,
    pub backward_seek_sec: i64,
    /// Raw ADC readings averaged per volume update.
    pub volume_samples: u32,
    pub max_volume: u8,
    pub adc_max: u16,
    pub initial_volume: u8,
    /// Decode-ahead buffer in seconds.
    pub buffer_seconds: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            forward_seek_sec: 30,
            backward_seek_sec: -10,
            volume_samples: 200,
            max_volume: 21,
            adc_max: 4095,
            initial_volume: 10,
            buffer_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub max_slots: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_slots: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// File the reader daemon writes the current tag UID to.
    pub tag_file: PathBuf,
    pub forward_gpio: Option<PathBuf>,
    pub backward_gpio: Option<PathBuf>,
    pub volume_adc: Option<PathBuf>,
    /// Program and arguments run on auto-shutdown; empty only logs.
    pub poweroff_command: Vec<String>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            tag_file: PathBuf::from(DEFAULT_TAG_FILE),
            forward_gpio: None,
            backward_gpio: None,
            volume_adc: None,
            poweroff_command: Vec::new(),
        }
    }
}

/// Command-line values that win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub http_bind: Option<SocketAddr>,
    pub device: Option<String>,
    pub music_dir: Option<PathBuf>,
    pub mappings_file: Option<PathBuf>,
}

/// Fully resolved settings for `jukebox run`.
#[derive(Debug, Clone)]
pub struct JukeboxConfig {
    pub http_bind: SocketAddr,
    pub music_dir: PathBuf,
    pub mappings_file: PathBuf,
    pub device: Option<String>,
    pub mdns: bool,
    pub timing: TimingConfig,
    pub playback: PlaybackSettings,
    pub store: StoreConfig,
    pub hardware: HardwareConfig,
}

impl JukeboxConfig {
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let http_bind = match (overrides.http_bind, file.http_bind) {
            (Some(addr), _) => addr,
            (None, Some(raw)) => raw
                .parse()
                .with_context(|| format!("parse http_bind {raw}"))?,
            (None, None) => DEFAULT_HTTP_BIND
                .parse()
                .context("parse default http_bind")?,
        };
        let music_dir = overrides
            .music_dir
            .or_else(|| file.music_dir.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MUSIC_DIR));
        let mappings_file = overrides
            .mappings_file
            .or_else(|| file.mappings_file.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPINGS_FILE));

        let config = Self {
            http_bind,
            music_dir,
            mappings_file,
            device: normalize_device_name(overrides.device.or(file.device)),
            mdns: file.mdns.unwrap_or(true),
            timing: file.timing.unwrap_or_default(),
            playback: file.playback.unwrap_or_default(),
            store: file.store.unwrap_or_default(),
            hardware: file.hardware.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let p = &self.playback;
        if p.max_volume == 0 {
            bail!("playback.max_volume must be positive");
        }
        if p.initial_volume > p.max_volume {
            bail!(
                "playback.initial_volume {} exceeds max_volume {}",
                p.initial_volume,
                p.max_volume
            );
        }
        if p.volume_samples == 0 || p.adc_max == 0 {
            bail!("playback.volume_samples and playback.adc_max must be positive");
        }
        if p.forward_seek_sec <= 0 || p.backward_seek_sec >= 0 {
            bail!("forward_seek_sec must be positive and backward_seek_sec negative");
        }
        if self.store.max_slots == 0 {
            bail!("store.max_slots must be positive");
        }
        if self.timing.nfc_read_interval_ms == 0 || self.timing.shutdown_timeout_ms == 0 {
            bail!("timing intervals must be positive");
        }
        Ok(())
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            buffer_seconds: self.playback.buffer_seconds,
            device: self.device.clone(),
            ..PlaybackConfig::default()
        }
    }
}

pub(crate) fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
