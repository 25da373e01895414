use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dsp::stretch::FACTOR_RANGE;
use crate::error::{Error, Result};

/// Runtime settings, read from a TOML file. Every key is optional.
///
/// ```toml
/// [window]
/// start_secs = 12.0
/// end_secs = 18.5
///
/// [playback]
/// slowdown = 1.5
/// loops = 0
///
/// [stretch]
/// fft_size = 4096
///
/// [video]
/// ffmpeg_path = "/usr/local/bin/ffmpeg"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub window: WindowSettings,
    pub playback: PlaybackSettings,
    pub stretch: StretchSettings,
    pub video: VideoSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSettings {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            start_secs: 0.0,
            end_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaybackSettings {
    /// 1.0 = normal speed, 2.0 = half speed.
    pub slowdown: f64,
    /// 0 = loop until stopped.
    pub loops: u32,
    /// Silence between two iterations of the loop.
    pub loop_gap_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            slowdown: 2.0,
            loops: 1,
            loop_gap_ms: 100,
        }
    }
}

/// Phase vocoder frame layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StretchSettings {
    pub fft_size: usize,
    pub hop_length: usize,
}

impl Default for StretchSettings {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            hop_length: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoSettings {
    pub ffmpeg_path: PathBuf,
    /// Extensions routed through audio-track extraction instead of direct decoding.
    pub extensions: Vec<String>,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            extensions: ["mp4", "mov", "avi", "mkv"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Settings {
    /// Read and validate settings from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let settings = Self::from_toml_str(&text)?;
        log::info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let WindowSettings {
            start_secs,
            end_secs,
        } = self.window;
        if !start_secs.is_finite() || !end_secs.is_finite() || start_secs < 0.0 {
            return Err(Error::Config(format!(
                "window bounds must be finite and non-negative, got {start_secs}..{end_secs}"
            )));
        }
        if end_secs <= start_secs {
            return Err(Error::Config(format!(
                "window.end_secs ({end_secs}) must be greater than window.start_secs ({start_secs})"
            )));
        }
        let slowdown = self.playback.slowdown;
        if !FACTOR_RANGE.contains(&slowdown) {
            return Err(Error::Config(format!(
                "playback.slowdown must be between {} and {}, got {slowdown}",
                FACTOR_RANGE.start(),
                FACTOR_RANGE.end()
            )));
        }
        let StretchSettings {
            fft_size,
            hop_length,
        } = self.stretch;
        if fft_size < 64 || !fft_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "stretch.fft_size must be a power of two >= 64, got {fft_size}"
            )));
        }
        if hop_length == 0 || hop_length > fft_size / 2 {
            return Err(Error::Config(format!(
                "stretch.hop_length must be in 1..={}, got {hop_length}",
                fft_size / 2
            )));
        }
        if self.video.ffmpeg_path.as_os_str().is_empty() {
            return Err(Error::Config("video.ffmpeg_path is empty".into()));
        }
        Ok(())
    }

    pub fn loop_gap(&self) -> Duration {
        Duration::from_millis(self.playback.loop_gap_ms)
    }
}
