use crate::error::{AutotrimError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ffmpeg executable used for silence detection, cutting and merging.
    pub ffmpeg_path: PathBuf,
    /// ffprobe executable used for duration and keyframe probing.
    pub ffprobe_path: PathBuf,
    /// Maximum number of segments cut at once.
    pub concurrency: usize,
    /// Silence threshold in dB.
    pub threshold_db: f64,
    /// Shortest pause counted as silence, in seconds.
    pub min_silence_duration: f64,
    /// Shortest kept segment, in seconds. Zero disables widening.
    pub min_segment_duration: f64,
    /// Re-encode cut segments instead of copying streams.
    pub reencode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            concurrency: default_concurrency(),
            threshold_db: -35.0,
            min_silence_duration: 0.2,
            min_segment_duration: 0.0,
            reencode: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    AutotrimError::Config(format!("{}: {}", config_path.display(), e))
                })?;
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override fields from `AUTOTRIM_*` variables. Unparseable values are
    /// ignored.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("AUTOTRIM_FFMPEG") {
            self.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(path) = var("AUTOTRIM_FFPROBE") {
            self.ffprobe_path = PathBuf::from(path);
        }
        if let Some(c) = var("AUTOTRIM_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.concurrency = c;
        }
        if let Some(db) = var("AUTOTRIM_THRESHOLD_DB").and_then(|v| v.parse().ok()) {
            self.threshold_db = db;
        }
        if let Some(d) = var("AUTOTRIM_MIN_SILENCE").and_then(|v| v.parse().ok()) {
            self.min_silence_duration = d;
        }
        if let Some(d) = var("AUTOTRIM_MIN_SEGMENT").and_then(|v| v.parse().ok()) {
            self.min_segment_duration = d;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(AutotrimError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if !self.min_silence_duration.is_finite() || self.min_silence_duration <= 0.0 {
            return Err(AutotrimError::Config(format!(
                "Minimum silence duration must be greater than 0, got {}",
                self.min_silence_duration
            )));
        }

        if !self.min_segment_duration.is_finite() || self.min_segment_duration < 0.0 {
            return Err(AutotrimError::InvalidMinDuration(self.min_segment_duration));
        }

        Ok(())
    }

    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("autotrim").join("config.toml"))
    }
}
