use crate::classifier::ClassifierConfig;
use crate::services::PipelineSettings;
use crate::video::{Facing, FormatPreference, FrameSize, Orientation};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_facing")]
    pub facing: Facing,

    #[serde(default = "default_orientation")]
    pub orientation: Orientation,

    #[serde(default = "default_capture_width")]
    pub capture_width: u32,

    #[serde(default = "default_capture_height")]
    pub capture_height: u32,

    /// Preferred recording formats, most preferred first
    #[serde(default = "default_recording_formats")]
    pub recording_formats: Vec<String>,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    #[serde(default = "default_seek_step")]
    pub seek_step_seconds: f64,

    /// Frame rate of the built-in test pattern camera
    #[serde(default = "default_test_pattern_fps")]
    pub test_pattern_fps: u32,

    /// Length of the take recorded by the command-line session
    #[serde(default = "default_take_seconds")]
    pub take_seconds: u64,

    #[serde(default)]
    pub classifier: ClassifierConfig,
}

fn default_facing() -> Facing {
    Facing::Environment
}

fn default_orientation() -> Orientation {
    Orientation::Landscape
}

fn default_capture_width() -> u32 {
    1280
}

fn default_capture_height() -> u32 {
    720
}

fn default_recording_formats() -> Vec<String> {
    vec![
        "video/webm;codecs=vp9".to_string(),
        "video/webm;codecs=vp8".to_string(),
    ]
}

fn default_flush_interval_ms() -> u64 {
    100
}

fn default_frame_interval_ms() -> u64 {
    33
}

fn default_seek_step() -> f64 {
    0.5
}

fn default_test_pattern_fps() -> u32 {
    30
}

fn default_take_seconds() -> u64 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            facing: default_facing(),
            orientation: default_orientation(),
            capture_width: default_capture_width(),
            capture_height: default_capture_height(),
            recording_formats: default_recording_formats(),
            flush_interval_ms: default_flush_interval_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            seek_step_seconds: default_seek_step(),
            test_pattern_fps: default_test_pattern_fps(),
            take_seconds: default_take_seconds(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.config/swingcam/config.json)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing the defaults there if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("swingcam").join("config.json"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.capture_width == 0 || self.capture_height == 0 {
            return Err(anyhow::anyhow!("capture size must be non-zero"));
        }

        if self.flush_interval_ms == 0 || self.frame_interval_ms == 0 {
            return Err(anyhow::anyhow!("intervals must be non-zero"));
        }

        if !self.seek_step_seconds.is_finite() || self.seek_step_seconds <= 0.0 {
            return Err(anyhow::anyhow!("seek_step_seconds must be positive"));
        }

        if self.test_pattern_fps == 0 {
            return Err(anyhow::anyhow!("test_pattern_fps must be non-zero"));
        }

        let classifier = &self.classifier;

        if !(1..=60).contains(&classifier.sample_every) {
            return Err(anyhow::anyhow!("classifier.sample_every must be between 1 and 60"));
        }

        if !(0.0..=1.0).contains(&classifier.min_confidence) {
            return Err(anyhow::anyhow!("classifier.min_confidence must be between 0 and 1"));
        }

        if classifier.min_regression_dwell < classifier.min_skip_dwell {
            return Err(anyhow::anyhow!(
                "classifier.min_regression_dwell cannot be below min_skip_dwell"
            ));
        }

        let thresholds = &classifier.recorded_thresholds;
        let inside = thresholds.iter().all(|t| *t > 0.0 && *t < 1.0);
        let increasing = thresholds.windows(2).all(|pair| pair[0] < pair[1]);
        if !inside || !increasing {
            return Err(anyhow::anyhow!(
                "classifier.recorded_thresholds must be strictly increasing within (0, 1)"
            ));
        }

        Ok(())
    }

    /// Requested camera resolution, before orientation is applied
    pub fn capture_size(&self) -> FrameSize {
        FrameSize::new(self.capture_width, self.capture_height)
    }

    pub fn format_preference(&self) -> FormatPreference {
        FormatPreference::new(self.recording_formats.iter().cloned())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            seek_step_seconds: self.seek_step_seconds,
            classifier: self.classifier.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::CaptureConstraints;
    use crate::video::format::RecordingFormat;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();

        let formats = config.format_preference();
        assert_eq!(formats.formats().len(), 3);
        assert_eq!(formats.formats().last(), Some(&RecordingFormat::Default));
        assert_eq!(config.capture_size(), CaptureConstraints::default().ideal_size);
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swingcam").join("config.json");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.frame_interval_ms, 33);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.recording_formats, config.recording_formats);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"facing": "user", "classifier": {"sample_every": 3, "lead_side": "right"}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.facing, Facing::User);
        assert_eq!(config.orientation, Orientation::Landscape);
        assert_eq!(config.classifier.sample_every, 3);
        assert_eq!(config.classifier.min_skip_dwell, 10);
        assert_eq!(config.classifier.recorded_thresholds, [0.2, 0.4, 0.6, 0.8]);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.classifier.sample_every = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.classifier.min_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.classifier.recorded_thresholds = [0.2, 0.6, 0.4, 0.8];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.classifier.recorded_thresholds = [0.0, 0.4, 0.6, 0.8];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.classifier.min_regression_dwell = 5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.frame_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
