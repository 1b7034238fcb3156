use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Sub-stream layout of the camera and probing behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Path appended to the base URL for the low-resolution preview feed.
    #[serde(default = "default_preview_path")]
    pub preview_path: String,
    /// Path appended to the base URL for the full-resolution feed that is recorded.
    #[serde(default = "default_record_path")]
    pub record_path: String,
    /// ffprobe is killed after this many seconds. 0 disables the timeout.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Output width in pixels; height follows the source aspect ratio.
    #[serde(default = "default_target_width")]
    pub target_width: u32,
    #[serde(default = "default_output_fps")]
    pub output_fps: u32,
    #[serde(default = "default_container_ext")]
    pub container_ext: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Forward one frame out of this many ticks to the preview.
    #[serde(default = "default_display_every")]
    pub display_every: u32,
    /// Consecutive empty reads before the preview reports a stalled stream.
    /// 0 never reports; the session keeps running until stopped.
    #[serde(default)]
    pub stall_ticks: u32,
    /// Frames buffered between the scheduler thread and the UI.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// User-configurable output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Recordings land in `<output_root>/<YYYYMMDD>/`.
    /// Defaults to `~/rtsp_saved`.
    #[serde(default = "platform::output_root")]
    pub output_root: PathBuf,
    #[serde(default = "platform::history_path")]
    pub history_file: PathBuf,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            preview_path: default_preview_path(),
            record_path: default_record_path(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            target_width: default_target_width(),
            output_fps: default_output_fps(),
            container_ext: default_container_ext(),
            audio_codec: default_audio_codec(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            display_every: default_display_every(),
            stall_ticks: 0,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_root: platform::output_root(),
            history_file: platform::history_path(),
        }
    }
}

fn default_preview_path() -> String {
    "h264/ch1/sub/av_stream".to_string()
}

fn default_record_path() -> String {
    "h264/ch1/main/av_stream".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_target_width() -> u32 {
    860
}

fn default_output_fps() -> u32 {
    15
}

fn default_container_ext() -> String {
    "mp4".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_display_every() -> u32 {
    10
}

fn default_channel_capacity() -> usize {
    4
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing {}", config_path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("settings.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stream.preview_path, "h264/ch1/sub/av_stream");
        assert_eq!(config.stream.record_path, "h264/ch1/main/av_stream");
        assert_eq!(config.recorder.target_width, 860);
        assert_eq!(config.display.display_every, 10);
        assert_eq!(config.display.stall_ticks, 0);
        assert!(config.paths.output_root.ends_with("rtsp_saved"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [recorder]
            target_width = 640
            "#,
        )
        .unwrap();
        assert_eq!(config.recorder.target_width, 640);
        assert_eq!(config.recorder.output_fps, 15);
        assert_eq!(config.display.channel_capacity, 4);
    }

    #[test]
    fn test_first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.recorder.container_ext, "mp4");

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.stream.probe_timeout_secs, 10);
    }
}
