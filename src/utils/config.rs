//! Configuration management for the mirrorcast renderers
//!
//! This module handles loading and managing renderer configuration
//! from config files and environment variables. A [`RendererConfig`]
//! snapshot is captured by the factory when renderers are constructed;
//! later edits to a [`Config`] never reach a running pipeline.

use crate::convert::{Geometry, ScaleFilter};
use crate::utils::error::{IntoRendererError, RendererError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "MIRRORCAST_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General application settings
    pub general: GeneralConfig,

    /// Renderer settings handed to the factory
    pub renderer: RendererConfig,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Receiver name, used as the window title
    pub name: String,
}

/// Everything the renderer factory needs to build a backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Tune decoders and sinks for latency instead of smoothness
    pub low_latency: bool,

    /// Video renderer settings
    pub video: VideoConfig,

    /// Audio renderer settings
    pub audio: AudioConfig,
}

/// Video renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Backend selector ("wgpu" or "callback")
    pub backend: String,

    /// What the surface shows while no connection is active
    pub background: BackgroundMode,

    /// Clockwise rotation applied at presentation time
    pub rotation: Rotation,

    /// Mirroring applied at presentation time
    pub flip: Flip,

    /// Scaling kernel used by the conversion context
    pub scale_filter: ScaleFilter,

    /// Convert every frame to this size instead of following the stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_size: Option<Geometry>,

    /// Append every submitted video unit to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_path: Option<PathBuf>,

    /// Window width before the first frame arrives
    pub initial_width: u32,

    /// Window height before the first frame arrives
    pub initial_height: u32,
}

/// Audio renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device: "default", "hdmi", "analog", a device name, or "none"
    pub device: String,

    /// Initial volume (0.0 - 1.0)
    pub volume: f32,

    /// Sink buffer length in milliseconds
    pub buffer_ms: u32,
}

/// Background behaviour while no client is connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMode {
    /// Keep the surface visible and paint it black
    #[default]
    On,
    /// Hide the surface entirely
    Off,
}

/// Clockwise rotation in quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarter,
}

/// Mirroring axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flip {
    #[default]
    None,
    Horizontal,
    Vertical,
}

impl Rotation {
    /// Rotation in degrees
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarter => 270,
        }
    }

    /// Whether width and height trade places on screen
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Quarter | Rotation::ThreeQuarter)
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> std::result::Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Quarter),
            180 => Ok(Rotation::Half),
            270 => Ok(Rotation::ThreeQuarter),
            other => Err(format!("rotation must be 0, 90, 180 or 270, got {}", other)),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl FromStr for Flip {
    type Err = RendererError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Flip::None),
            "horizontal" | "h" => Ok(Flip::Horizontal),
            "vertical" | "v" => Ok(Flip::Vertical),
            other => Err(RendererError::Config(format!("Invalid flip '{}'", other))),
        }
    }
}

impl FromStr for BackgroundMode {
    type Err = RendererError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Ok(BackgroundMode::On),
            "off" | "false" | "0" => Ok(BackgroundMode::Off),
            other => Err(RendererError::Config(format!("Invalid background mode '{}'", other))),
        }
    }
}

impl fmt::Display for Flip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flip::None => write!(f, "none"),
            Flip::Horizontal => write!(f, "horizontal"),
            Flip::Vertical => write!(f, "vertical"),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            name: "Mirrorcast".to_string(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            backend: "wgpu".to_string(),
            background: BackgroundMode::On,
            rotation: Rotation::None,
            flip: Flip::None,
            scale_filter: ScaleFilter::Bicubic,
            fixed_size: None,
            dump_path: None,
            initial_width: 1280,
            initial_height: 720,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            volume: 1.0,
            buffer_ms: 500,
        }
    }
}

impl GeneralConfig {
    /// Default log filter; `--debug` raises it to debug
    pub fn effective_log_level(&self, debug: bool) -> &str {
        if debug {
            "debug"
        } else {
            self.log_level.as_str()
        }
    }
}

impl AudioConfig {
    /// Sink buffer length after the low-latency adjustment
    pub fn effective_buffer_ms(&self, low_latency: bool) -> u32 {
        if low_latency {
            self.buffer_ms.min(100)
        } else {
            self.buffer_ms
        }
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/mirrorcast/config.toml on Linux)
    /// 3. User config file (~/.config/mirrorcast/config.toml on Linux)
    /// 4. An explicit file passed on the command line
    /// 5. Environment variables (MIRRORCAST_* prefix)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config.merge_from_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config.merge_from_file(&user_path)?;
            }
        }

        if let Some(path) = explicit {
            config.merge_from_file(path)?;
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to an arbitrary path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(path, toml).config_err("Failed to write config file")?;

        Ok(())
    }

    /// Layer a TOML file over the current configuration
    ///
    /// Keys present in the file win; everything else keeps the value of the
    /// earlier layers.
    pub fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)
            .config_err(&format!("Failed to read {}", path.display()))?;
        let overlay: toml::Table = contents
            .parse()
            .config_err(&format!("Failed to parse {}", path.display()))?;

        let mut merged = match toml::Value::try_from(&*self).config_err("Failed to serialize config")? {
            toml::Value::Table(table) => table,
            _ => return Err(RendererError::Config("Config did not serialize to a table".to_string())),
        };
        merge_tables(&mut merged, overlay);

        *self = toml::Value::Table(merged)
            .try_into()
            .config_err(&format!("Invalid configuration in {}", path.display()))?;

        Ok(())
    }

    /// Apply `MIRRORCAST_*` overrides fetched through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(backend) = var("VIDEO_BACKEND") {
            self.renderer.video.backend = backend;
        }

        if let Some(device) = var("AUDIO_DEVICE") {
            self.renderer.audio.device = device;
        }

        if let Some(low_latency) = var("LOW_LATENCY") {
            self.renderer.low_latency = parse_bool(&low_latency)
                .ok_or_else(|| RendererError::Config("Invalid MIRRORCAST_LOW_LATENCY".to_string()))?;
        }

        if let Some(rotation) = var("ROTATION") {
            let degrees: u16 = rotation
                .parse()
                .map_err(|_| RendererError::Config("Invalid MIRRORCAST_ROTATION".to_string()))?;
            self.renderer.video.rotation = Rotation::try_from(degrees).map_err(RendererError::Config)?;
        }

        if let Some(flip) = var("FLIP") {
            self.renderer.video.flip = flip.parse()?;
        }

        if let Some(background) = var("BACKGROUND") {
            self.renderer.video.background = background.parse()?;
        }

        if let Some(log_level) = var("LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let video = &self.renderer.video;
        if video.initial_width == 0 || video.initial_height == 0 {
            return Err(RendererError::Config("Initial window dimensions must be non-zero".to_string()));
        }

        if let Some(size) = video.fixed_size {
            if size.is_empty() {
                return Err(RendererError::Config("Fixed output size must be non-zero".to_string()));
            }
        }

        let audio = &self.renderer.audio;
        if !(0.0..=1.0).contains(&audio.volume) {
            return Err(RendererError::Config("Audio volume must be between 0.0 and 1.0".to_string()));
        }

        if !(20..=5000).contains(&audio.buffer_ms) {
            return Err(RendererError::Config("Audio buffer must be between 20 and 5000 ms".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(RendererError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/mirrorcast/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("Mirrorcast").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/Mirrorcast/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mirrorcast").join("config.toml"))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Recursively copy `overlay` into `base`, replacing leaves
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(nested) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, nested);
                continue;
            }
            base.insert(key, toml::Value::Table(nested));
        } else {
            base.insert(key, value);
        }
    }
}
