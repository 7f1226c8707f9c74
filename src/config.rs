//! Configuration management for screenreel
//!
//! The settings file supplies defaults; the `start` command's options are
//! merged over them into an immutable [`RecordingConfig`] snapshot.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Video capture defaults
    #[serde(default)]
    pub video: VideoSettings,

    /// Audio capture defaults and device names
    #[serde(default)]
    pub audio: AudioSettings,

    /// Webcam device names
    #[serde(default)]
    pub webcam: WebcamSettings,

    /// Recording session defaults
    #[serde(default)]
    pub recording: RecordingSettings,

    /// ffmpeg backend
    #[serde(default)]
    pub ffmpeg: FfmpegSettings,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSettings {
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// 1..=100
    #[serde(default = "default_quality")]
    pub quality: u32,

    /// Default source selector (e.g. `screen:0`, `win:1234`)
    pub source: Option<String>,

    /// Default encoder selector (e.g. `ffmpeg:0`, `gif`)
    pub encoder: Option<String>,

    /// Off unless enabled here or with `--cursor`
    #[serde(default)]
    pub include_cursor: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// 1..=100
    #[serde(default = "default_quality")]
    pub quality: u32,

    /// Microphone device names, selectable by index
    #[serde(default)]
    pub microphones: Vec<String>,

    /// Speaker loopback device names, selectable by index
    #[serde(default)]
    pub speakers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebcamSettings {
    /// Webcam device names, selectable by index
    #[serde(default)]
    pub cameras: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    /// Where recordings without an explicit file name go
    #[serde(default = "default_output_directory_option")]
    pub output_directory: Option<PathBuf>,

    /// Pre-roll countdown in seconds (0 = none)
    #[serde(default)]
    pub pre_start_countdown: u32,

    /// Fixed recording length in seconds (0 = unbounded)
    #[serde(default)]
    pub duration: u64,

    /// Delay before capture starts, in milliseconds
    #[serde(default)]
    pub start_delay_ms: u64,

    #[serde(default)]
    pub show_keystrokes: bool,

    #[serde(default)]
    pub show_clicks: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegSettings {
    /// ffmpeg binary; searched on PATH when unset
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_frame_rate() -> u32 {
    30
}

fn default_quality() -> u32 {
    70
}

fn default_output_directory() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.video_dir().map(|d| d.join("screenreel")))
        .unwrap_or_else(|| std::env::temp_dir().join("screenreel"))
}

fn default_output_directory_option() -> Option<PathBuf> {
    Some(default_output_directory())
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            quality: default_quality(),
            source: None,
            encoder: None,
            include_cursor: false,
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            microphones: Vec::new(),
            speakers: Vec::new(),
        }
    }
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_directory: default_output_directory_option(),
            pre_start_countdown: 0,
            duration: 0,
            start_delay_ms: 0,
            show_keystrokes: false,
            show_clicks: false,
        }
    }
}

impl Config {
    /// Load the settings file, writing one with defaults on first run
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_config_path()?)
    }

    fn load_from(path: PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Cannot read settings from {}", path.display()))?;
            toml::from_str::<Config>(&text)
                .with_context(|| format!("Invalid settings in {}", path.display()))?
        } else {
            Config::default()
        };

        let created = !path.exists();
        config.config_path = Some(path);
        if created {
            config.save()?;
        }
        Ok(config)
    }

    /// Write the settings back to where they were loaded from
    pub fn save(&self) -> Result<()> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => Self::default_config_path()?,
        };

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create settings directory {}", dir.display()))?;
        }

        let text = toml::to_string_pretty(self).context("Cannot serialize settings")?;
        std::fs::write(&path, text)
            .with_context(|| format!("Cannot write settings to {}", path.display()))
    }

    /// Get the config file path, if known
    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config_path.as_ref()
    }

    fn default_config_path() -> Result<PathBuf> {
        directories::ProjectDirs::from("dev", "screenreel", "screenreel")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .context("No home directory to keep settings in")
    }

    pub fn output_directory(&self) -> PathBuf {
        self.recording
            .output_directory
            .clone()
            .unwrap_or_else(default_output_directory)
    }
}

/// Per-invocation overrides from the command line. `None` keeps the setting.
#[derive(Debug, Clone, Default)]
pub struct RecordingOverrides {
    pub frame_rate: Option<u32>,
    pub video_quality: Option<u32>,
    pub audio_quality: Option<u32>,
    pub source: Option<String>,
    pub encoder: Option<String>,
    pub microphone: Option<i32>,
    pub speaker: Option<i32>,
    pub webcam: Option<i32>,
    pub include_cursor: Option<bool>,
    pub show_keystrokes: Option<bool>,
    pub show_clicks: Option<bool>,
    pub output_path: Option<PathBuf>,
    pub overwrite: bool,
    pub duration_secs: Option<u64>,
    pub start_delay_ms: Option<u64>,
    pub countdown_secs: Option<u32>,
}

/// Immutable snapshot of everything one recording session needs
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingConfig {
    pub frame_rate: u32,
    pub video_quality: u32,
    pub audio_quality: u32,
    /// Source selector, resolved by the source providers
    pub source: Option<String>,
    /// Encoder selector, resolved by the writer providers
    pub encoder: Option<String>,
    /// Device indices; -1 = none
    pub microphone: i32,
    pub speaker: i32,
    pub webcam: i32,
    pub include_cursor: bool,
    pub show_keystrokes: bool,
    pub show_clicks: bool,
    /// Explicit output file; generated in `output_directory` when unset
    pub output_path: Option<PathBuf>,
    pub output_directory: PathBuf,
    pub overwrite: bool,
    /// 0 = unbounded
    pub duration_secs: u64,
    pub start_delay: Duration,
    pub countdown_secs: u32,
}

impl RecordingConfig {
    pub fn from_settings(config: &Config, overrides: RecordingOverrides) -> Self {
        Self {
            frame_rate: overrides.frame_rate.unwrap_or(config.video.frame_rate).max(1),
            video_quality: overrides
                .video_quality
                .unwrap_or(config.video.quality)
                .clamp(1, 100),
            audio_quality: overrides
                .audio_quality
                .unwrap_or(config.audio.quality)
                .clamp(1, 100),
            source: overrides.source.or_else(|| config.video.source.clone()),
            encoder: overrides.encoder.or_else(|| config.video.encoder.clone()),
            microphone: overrides.microphone.unwrap_or(-1),
            speaker: overrides.speaker.unwrap_or(-1),
            webcam: overrides.webcam.unwrap_or(-1),
            include_cursor: overrides
                .include_cursor
                .unwrap_or(config.video.include_cursor),
            show_keystrokes: overrides
                .show_keystrokes
                .unwrap_or(config.recording.show_keystrokes),
            show_clicks: overrides
                .show_clicks
                .unwrap_or(config.recording.show_clicks),
            output_path: overrides.output_path,
            output_directory: config.output_directory(),
            overwrite: overrides.overwrite,
            duration_secs: overrides.duration_secs.unwrap_or(config.recording.duration),
            start_delay: Duration::from_millis(
                overrides
                    .start_delay_ms
                    .unwrap_or(config.recording.start_delay_ms),
            ),
            countdown_secs: overrides
                .countdown_secs
                .unwrap_or(config.recording.pre_start_countdown),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self::from_settings(&Config::default(), RecordingOverrides::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win_over_settings() {
        let mut config = Config::default();
        config.video.frame_rate = 15;
        config.video.encoder = Some("gif".to_string());
        config.recording.pre_start_countdown = 3;

        let recording = RecordingConfig::from_settings(
            &config,
            RecordingOverrides {
                frame_rate: Some(60),
                video_quality: Some(250),
                microphone: Some(1),
                ..Default::default()
            },
        );

        assert_eq!(recording.frame_rate, 60);
        assert_eq!(recording.video_quality, 100);
        assert_eq!(recording.encoder.as_deref(), Some("gif"));
        assert_eq!(recording.countdown_secs, 3);
        assert_eq!(recording.microphone, 1);
        assert_eq!(recording.speaker, -1);
    }

    #[test]
    fn test_cursor_setting_and_override() {
        let mut config = Config::default();
        let recording = RecordingConfig::from_settings(&config, RecordingOverrides::default());
        assert!(!recording.include_cursor);

        config.video.include_cursor = true;
        let recording = RecordingConfig::from_settings(&config, RecordingOverrides::default());
        assert!(recording.include_cursor);

        let recording = RecordingConfig::from_settings(
            &config,
            RecordingOverrides {
                include_cursor: Some(false),
                ..Default::default()
            },
        );
        assert!(!recording.include_cursor);
    }

    #[test]
    fn test_first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(path.clone()).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_path(), Some(&path));

        let reloaded = Config::load_from(path).unwrap();
        assert_eq!(reloaded.video.frame_rate, config.video.frame_rate);
        assert_eq!(reloaded.output_directory(), config.output_directory());
    }

    #[test]
    fn test_partial_settings_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [recording]
            duration = 10

            [audio]
            microphones = ["alsa_input.usb"]
            "#,
        )
        .unwrap();

        assert_eq!(config.recording.duration, 10);
        assert_eq!(config.video.frame_rate, 30);
        assert!(!config.video.include_cursor);
        assert_eq!(config.audio.microphones, vec!["alsa_input.usb"]);
        assert!(config.recording.output_directory.is_some());
    }
}
