use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::gpu::BackendKind;

/// Adapter preference passed to wgpu when the GPU backend is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerPreference {
    High,
    Low,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(pref: PowerPreference) -> Self {
        match pref {
            PowerPreference::High => wgpu::PowerPreference::HighPerformance,
            PowerPreference::Low => wgpu::PowerPreference::LowPower,
        }
    }
}

/// Decoder settings for `ClipElement`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_bin: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe_bin: String,
    /// Longest clip (seconds) that will be pre-decoded. Longer sources are rejected.
    #[serde(default = "default_max_predecode_secs")]
    pub max_predecode_secs: f64,
    /// How long a packed still image is shown before it ends.
    #[serde(default = "default_still_frame_ms")]
    pub still_frame_ms: u32,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_max_predecode_secs() -> f64 {
    60.0
}

fn default_still_frame_ms() -> u32 {
    40
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: default_ffmpeg(),
            ffprobe_bin: default_ffprobe(),
            max_predecode_secs: default_max_predecode_secs(),
            still_frame_ms: default_still_frame_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_power")]
    pub power_preference: PowerPreference,
    #[serde(default)]
    pub default_loop: bool,
    #[serde(default)]
    pub media: MediaConfig,
}

fn default_version() -> u32 {
    1
}

fn default_power() -> PowerPreference {
    PowerPreference::High
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            backend: BackendKind::default(),
            power_preference: default_power(),
            default_loop: false,
            media: MediaConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// `<config_dir>/alphaclip/settings.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("alphaclip").join("settings.json"))
    }

    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Missing or malformed files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed settings {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        if let Some(path) = Self::default_path() {
            if let Err(e) = self.save_to(&path) {
                log::warn!("Failed to save settings: {e}");
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
