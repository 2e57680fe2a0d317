//! 抽帧配置 - JSON 文件 + 命令行覆盖

use super::error::{ExtractorError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub const DEFAULT_CONFIG_FILE: &str = "video_frame_extractor_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    #[default]
    TimeInterval,
    SceneChange,
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionMode::TimeInterval => f.write_str("time_interval"),
            ExtractionMode::SceneChange => f.write_str("scene_change"),
        }
    }
}

/// Immutable per-run extraction settings.
///
/// Keys missing from the JSON file fall back to [`Default`], so a partial file
/// is merged over the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    #[serde(alias = "mode")]
    pub extraction_mode: ExtractionMode,
    pub time_interval_seconds: f64,
    /// Percent of significantly changed pixels (0-100).
    pub scene_change_threshold: f64,
    pub min_scene_duration_seconds: f64,
    pub output_directory: PathBuf,
    pub preserve_directory_structure: bool,
    pub image_quality: u8,
    pub resize_width: Option<u32>,
    pub resize_height: Option<u32>,
    pub frame_prefix: String,
    pub start_time_seconds: f64,
    pub end_time_seconds: Option<f64>,
    pub max_frames_per_video: Option<u32>,
    pub skip_existing: bool,
    pub log_progress: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            extraction_mode: ExtractionMode::TimeInterval,
            time_interval_seconds: 5.0,
            scene_change_threshold: 30.0,
            min_scene_duration_seconds: 1.0,
            output_directory: PathBuf::from("extracted_frames"),
            preserve_directory_structure: true,
            image_quality: 95,
            resize_width: None,
            resize_height: None,
            frame_prefix: "frame".to_string(),
            start_time_seconds: 0.0,
            end_time_seconds: None,
            max_frames_per_video: None,
            skip_existing: true,
            log_progress: true,
        }
    }
}

impl ExtractionConfig {
    /// Load the config file, creating it with defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("⚠️ Config file not found: {:?}, creating it with defaults", path);
            let config = Self::default();
            if let Err(e) = config.save(path) {
                warn!("Could not create config file {:?}: {}", path, e);
                info!("Using default configuration in memory");
            }
            return Ok(config);
        }

        let content = fs::read_to_string(path).map_err(|e| ExtractorError::ConfigLoad {
            path: path.to_path_buf(),
            source: Box::new(e.into()),
        })?;
        let config = Self::from_json(&content).map_err(|e| ExtractorError::ConfigLoad {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        info!("📄 Configuration loaded from: {:?}", path);
        Ok(config)
    }

    /// Parse and validate. Blank input yields the defaults.
    pub fn from_json(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            info!("Config file is empty, using default config");
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        // serde_json only ever emits UTF-8
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Write a default config file (the `--create-config` flow).
    pub fn create_default_file(path: &Path) -> Result<Self> {
        let config = Self::default();
        config.save(path)?;
        info!("✅ Created default config file: {:?}", path);
        info!("You can edit this file to customize extraction settings.");
        Ok(config)
    }

    /// Apply `--time` / `--scene`. The caller guarantees at most one is set.
    pub fn apply_overrides(&mut self, time: Option<f64>, scene: Option<f64>) -> Result<()> {
        if let Some(seconds) = time {
            self.extraction_mode = ExtractionMode::TimeInterval;
            self.time_interval_seconds = seconds;
            info!("Command line override: time interval mode ({}s intervals)", seconds);
        } else if let Some(percent) = scene {
            self.extraction_mode = ExtractionMode::SceneChange;
            self.scene_change_threshold = percent;
            info!("Command line override: scene change mode ({}% threshold)", percent);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(ExtractorError::InvalidConfig(msg));

        if !self.time_interval_seconds.is_finite() || self.time_interval_seconds <= 0.0 {
            return fail(format!(
                "time_interval_seconds must be > 0, got {}",
                self.time_interval_seconds
            ));
        }
        if !(0.0..=100.0).contains(&self.scene_change_threshold) {
            return fail(format!(
                "scene_change_threshold must be within 0-100, got {}",
                self.scene_change_threshold
            ));
        }
        if !self.min_scene_duration_seconds.is_finite() || self.min_scene_duration_seconds < 0.0 {
            return fail(format!(
                "min_scene_duration_seconds must be >= 0, got {}",
                self.min_scene_duration_seconds
            ));
        }
        if !(1..=100).contains(&self.image_quality) {
            return fail(format!(
                "image_quality must be within 1-100, got {}",
                self.image_quality
            ));
        }
        if self.resize_width == Some(0) || self.resize_height == Some(0) {
            return fail("resize_width/resize_height must be positive".to_string());
        }
        if !self.start_time_seconds.is_finite() || self.start_time_seconds < 0.0 {
            return fail(format!(
                "start_time_seconds must be >= 0, got {}",
                self.start_time_seconds
            ));
        }
        if let Some(end) = self.end_time_seconds {
            if !end.is_finite() || end <= self.start_time_seconds {
                return fail(format!(
                    "end_time_seconds ({}) must be greater than start_time_seconds ({})",
                    end, self.start_time_seconds
                ));
            }
        }
        if self.max_frames_per_video == Some(0) {
            return fail("max_frames_per_video must be positive".to_string());
        }
        if self.output_directory.as_os_str().is_empty() {
            return fail("output_directory must not be empty".to_string());
        }
        if self.frame_prefix.is_empty() || self.frame_prefix.contains(['/', '\\']) {
            return fail(format!("invalid frame_prefix {:?}", self.frame_prefix));
        }
        Ok(())
    }

    /// Upper bound on time-interval extractions for a video of `duration` seconds.
    pub fn estimated_interval_frames(&self, duration: f64) -> u64 {
        let end = self.end_time_seconds.map_or(duration, |e| e.min(duration));
        let span = end - self.start_time_seconds;
        let estimate = if span > 0.0 {
            (span / self.time_interval_seconds).ceil() as u64
        } else {
            0
        };
        match self.max_frames_per_video {
            Some(cap) => estimate.min(cap as u64),
            None => estimate,
        }
    }
}

/// Options that shape a single run but are not persisted to the config file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub recursive: bool,
    /// 0 means one worker per CPU.
    pub workers: usize,
    pub cancel: Arc<AtomicBool>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            workers: 1,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl RunOptions {
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}
