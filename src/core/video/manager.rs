//! 抽帧管理器 - 发现视频、逐个处理、汇总统计

use super::discovery::discover_videos;
use super::ffmpeg::FfmpegOpener;
use super::source::VideoOpener;
use crate::core::config::{ExtractionConfig, RunOptions};
use crate::core::error::{ExtractorError, Result};
use crate::frame_extractor::pipeline::{FrameExtractor, VideoReport};
use log::{error, info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What happened to one discovered video.
#[derive(Debug)]
pub enum VideoOutcome {
    Processed(VideoReport),
    /// Output subfolder already populated.
    Skipped { existing_files: usize },
    Failed { error: ExtractorError },
    /// Not started because the run was cancelled.
    Cancelled,
}

/// 运行统计
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
    pub videos_discovered: usize,
    pub videos_processed: usize,
    pub videos_skipped: usize,
    pub videos_failed: usize,
    /// Not started, or interrupted mid-stream, by cancellation.
    pub videos_cancelled: usize,
    pub frames_scanned: u64,
    pub frames_extracted: u64,
    pub write_failures: u64,
    pub decode_errors: u64,
    pub elapsed: Duration,
    pub videos: Vec<VideoReport>,
    pub errors: Vec<String>,
}

impl RunStatistics {
    pub fn record(&mut self, video: &Path, outcome: VideoOutcome) {
        match outcome {
            VideoOutcome::Processed(report) => {
                if report.interrupted {
                    self.videos_cancelled += 1;
                } else {
                    self.videos_processed += 1;
                }
                self.frames_scanned += report.frames_scanned;
                self.frames_extracted += report.frames_extracted as u64;
                self.write_failures += report.write_failures as u64;
                self.decode_errors += report.decode_errors as u64;
                self.videos.push(report);
            }
            VideoOutcome::Skipped { .. } => self.videos_skipped += 1,
            VideoOutcome::Failed { error } => {
                self.videos_failed += 1;
                self.errors.push(format!("{}: {}", video.display(), error));
            }
            VideoOutcome::Cancelled => self.videos_cancelled += 1,
        }
    }

    /// Fold a worker's partial statistics into this one, keeping discovery order.
    pub fn merge(mut self, other: RunStatistics) -> Self {
        self.videos_processed += other.videos_processed;
        self.videos_skipped += other.videos_skipped;
        self.videos_failed += other.videos_failed;
        self.videos_cancelled += other.videos_cancelled;
        self.frames_scanned += other.frames_scanned;
        self.frames_extracted += other.frames_extracted;
        self.write_failures += other.write_failures;
        self.decode_errors += other.decode_errors;
        self.videos.extend(other.videos);
        self.errors.extend(other.errors);
        self
    }

    pub fn videos_accounted(&self) -> usize {
        self.videos_processed + self.videos_skipped + self.videos_failed + self.videos_cancelled
    }

    pub fn log_summary(&self, output_root: &Path) {
        info!("{}", "=".repeat(60));
        info!("📊 Extraction summary");
        info!("Videos found: {}", self.videos_discovered);
        info!("Videos processed: {}", self.videos_processed);
        info!("Videos skipped (existing output): {}", self.videos_skipped);
        info!("Videos failed: {}", self.videos_failed);
        if self.videos_cancelled > 0 {
            info!("Videos cancelled: {}", self.videos_cancelled);
        }
        info!("Frames scanned: {}", self.frames_scanned);
        info!("Frames extracted: {}", self.frames_extracted);
        if self.write_failures > 0 || self.decode_errors > 0 {
            warn!(
                "Write failures: {}, decode errors: {}",
                self.write_failures, self.decode_errors
            );
        }
        info!("Total time: {:.2}s", self.elapsed.as_secs_f64());

        for report in &self.videos {
            let name = report
                .video
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!(
                "  {}: {} frames ({} scanned, {:.2}s){}",
                name,
                report.frames_extracted,
                report.frames_scanned,
                report.elapsed.as_secs_f64(),
                if report.interrupted { " [interrupted]" } else { "" }
            );
        }

        if !self.errors.is_empty() {
            error!("❌ Errors ({}):", self.errors.len());
            for e in &self.errors {
                error!("  {}", e);
            }
        }

        let absolute = if output_root.is_absolute() {
            output_root.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(output_root))
                .unwrap_or_else(|_| output_root.to_path_buf())
        };
        info!("Output directory: {}", absolute.display());
        info!("{}", "=".repeat(60));
    }
}

fn count_entries(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).count())
        .unwrap_or(0)
}

/// 抽帧管理器
///
/// Videos are independent: each gets its own source, policy state and output
/// subfolder. With more than one worker they are spread over a rayon pool and
/// per-worker statistics are merged at the end.
pub struct ExtractionManager {
    opener: Arc<dyn VideoOpener>,
}

impl ExtractionManager {
    pub fn new() -> Self {
        Self::with_opener(FfmpegOpener::default())
    }

    pub fn with_opener(opener: impl VideoOpener + 'static) -> Self {
        Self {
            opener: Arc::new(opener),
        }
    }

    /// Discover and process every video under `input`.
    ///
    /// Only fatal errors (bad input path, invalid config) are returned; every
    /// per-video failure is recorded in the statistics instead.
    pub fn run(
        &self,
        input: &Path,
        config: &ExtractionConfig,
        options: &RunOptions,
    ) -> Result<RunStatistics> {
        let started = Instant::now();
        let extractor = FrameExtractor::new(config)?.with_cancel(options.cancel.clone());
        let discovery = discover_videos(input, options.recursive)?;

        info!(
            "🚀 Found {} video(s) under {:?} (mode: {}, output: {:?})",
            discovery.videos.len(),
            input,
            config.extraction_mode,
            config.output_directory
        );
        if discovery.videos.is_empty() {
            warn!("⚠️ No supported video files found");
        }

        let workers = options.effective_workers().min(discovery.videos.len().max(1));
        let process = |stats: RunStatistics, video: &PathBuf| {
            let mut stats = stats;
            let outcome = self.process_one(video, &discovery.scan_root, &extractor, config, options);
            stats.record(video, outcome);
            stats
        };

        let mut stats = if workers > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => {
                    info!("Processing with {} workers", workers);
                    pool.install(|| {
                        discovery
                            .videos
                            .par_iter()
                            .fold(RunStatistics::default, process)
                            .reduce(RunStatistics::default, RunStatistics::merge)
                    })
                }
                Err(e) => {
                    warn!("⚠️ Could not start worker pool ({}), running sequentially", e);
                    discovery.videos.iter().fold(RunStatistics::default(), process)
                }
            }
        } else {
            discovery.videos.iter().fold(RunStatistics::default(), process)
        };

        stats.videos_discovered = discovery.videos.len();
        stats.elapsed = started.elapsed();
        Ok(stats)
    }

    /// One video, fully isolated: any failure becomes a `VideoOutcome`.
    pub fn process_one(
        &self,
        video: &Path,
        scan_root: &Path,
        extractor: &FrameExtractor,
        config: &ExtractionConfig,
        options: &RunOptions,
    ) -> VideoOutcome {
        if options.cancel.load(Ordering::Relaxed) {
            return VideoOutcome::Cancelled;
        }

        let output_dir = extractor.writer().output_dir_for(video, scan_root);
        if config.skip_existing {
            let existing_files = count_entries(&output_dir);
            if existing_files > 0 {
                info!(
                    "⏭️ Skipping {:?}: {} file(s) already in {:?}",
                    video, existing_files, output_dir
                );
                return VideoOutcome::Skipped { existing_files };
            }
        }

        if config.log_progress {
            info!("Processing: {:?}", video);
        }

        // 先打开视频再建目录，坏文件不会留下空目录
        let mut source = match self.opener.open(video) {
            Ok(source) => source,
            Err(error) => {
                error!("❌ {}", error);
                return VideoOutcome::Failed { error };
            }
        };

        if let Err(e) = fs::create_dir_all(&output_dir) {
            let error = ExtractorError::OutputDir {
                path: output_dir,
                source: e,
            };
            error!("❌ {}", error);
            return VideoOutcome::Failed { error };
        }

        match extractor.process_video(source.as_mut(), video, &output_dir) {
            Ok(report) => VideoOutcome::Processed(report),
            Err(error) => {
                error!("❌ {:?}: {}", video, error);
                VideoOutcome::Failed { error }
            }
        }
    }
}

impl Default for ExtractionManager {
    fn default() -> Self {
        Self::new()
    }
}
