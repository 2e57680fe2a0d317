use crate::core::config::{ExtractionConfig, ExtractionMode};
use crate::core::error::Result;
use crate::core::video::FrameSource;
use crate::frame_extractor::diff_filter::{ChangeDetector, LumaPlane};
use crate::frame_extractor::state_machine::{
    Decision, DoneReason, ExtractionPolicy, PolicyConfig, PolicyPhase,
};
use crate::frame_extractor::writer::FrameWriter;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SCAN_PROGRESS_EVERY: u64 = 1000;
const EXTRACT_PROGRESS_EVERY: u32 = 10;
/// A video is abandoned after this many writes in a row have failed.
pub const MAX_CONSECUTIVE_WRITE_FAILURES: u32 = 5;

/// Result of driving one video through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct VideoReport {
    pub video: PathBuf,
    pub output_dir: PathBuf,
    pub frames_scanned: u64,
    pub frames_extracted: u32,
    pub write_failures: u32,
    pub decode_errors: u32,
    pub first_frame: Option<PathBuf>,
    pub last_frame: Option<PathBuf>,
    pub stop_reason: Option<DoneReason>,
    /// Stopped by the cancellation flag before the stream was exhausted.
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl VideoReport {
    fn new(video: &Path, output_dir: &Path) -> Self {
        Self {
            video: video.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn record(&mut self, path: PathBuf) {
        if self.first_frame.is_none() {
            self.first_frame = Some(path.clone());
        }
        self.last_frame = Some(path);
    }
}

/// 单个视频的抽帧流水线
///
/// Source -> ChangeDetector (scene mode only) -> ExtractionPolicy -> FrameWriter.
/// Frames are pulled strictly in presentation order; only the previous frame's
/// intensity plane is retained between iterations.
pub struct FrameExtractor {
    config: ExtractionConfig,
    policy: PolicyConfig,
    detector: ChangeDetector,
    writer: FrameWriter,
    cancel: Arc<AtomicBool>,
}

impl FrameExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        Ok(Self {
            policy: PolicyConfig::from_config(config)?,
            detector: ChangeDetector::new(),
            writer: FrameWriter::new(config),
            config: config.clone(),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_detector(mut self, detector: ChangeDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn writer(&self) -> &FrameWriter {
        &self.writer
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Run one opened video to completion. `output_dir` must already exist.
    ///
    /// Decode and write failures are counted in the report; only a failed seek
    /// is returned as an error. Names have 0.01s resolution, so a candidate
    /// whose name was already written is skipped instead of overwriting it.
    pub fn process_video(
        &self,
        source: &mut dyn FrameSource,
        video: &Path,
        output_dir: &Path,
    ) -> Result<VideoReport> {
        let started = Instant::now();
        let mut report = VideoReport::new(video, output_dir);
        let mut policy = ExtractionPolicy::with_config(self.policy.clone());
        let log_progress = self.config.log_progress;

        let info = source.info().clone();
        if log_progress {
            info!(
                "🎬 {:?}: {:.2}s, {:.2} fps, {} frames, {}x{}",
                video, info.duration, info.fps, info.frame_count, info.width, info.height
            );
            if self.config.extraction_mode == ExtractionMode::TimeInterval {
                info!(
                    "Estimated frames to extract: {}",
                    self.config.estimated_interval_frames(info.duration)
                );
            }
        }

        if self.config.start_time_seconds > 0.0 {
            source.seek_to_time(self.config.start_time_seconds)?;
            debug!(
                "Seeked {:?} to {:.2}s (frame {})",
                video,
                self.config.start_time_seconds,
                source.position()
            );
        }

        let mut previous: Option<LumaPlane> = None;
        let mut last_name: Option<String> = None;
        let mut failures_in_a_row = 0u32;

        loop {
            if self.is_cancelled() {
                warn!("⏹️ Cancelled while processing {:?}", video);
                report.interrupted = true;
                break;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    // 解码出错按流结束处理，不尝试跳过
                    warn!("⚠️ {}", e);
                    report.decode_errors += 1;
                    break;
                }
            };

            let score = if policy.needs_score() {
                let current = LumaPlane::from_frame(&frame);
                let score = match previous.as_ref() {
                    Some(prev) => match self.detector.score_luma(prev, &current) {
                        Ok(score) => Some(score),
                        Err(e) => {
                            warn!("{:?} frame {}: {}, resetting reference", video, frame.index, e);
                            None
                        }
                    },
                    None => None,
                };
                previous = Some(current);
                score
            } else {
                None
            };

            match policy.evaluate(frame.timestamp, score) {
                Decision::Extract { sequence } => {
                    let name = self.writer.frame_file_name(frame.timestamp);
                    if last_name.as_deref() == Some(name.as_str()) {
                        // 同一个文件名只写一次
                        debug!("{:.4}s would overwrite {}, skipped", frame.timestamp, name);
                    } else {
                        match self.writer.write(&frame, output_dir) {
                            Ok(path) => {
                                policy.mark_extracted(frame.timestamp);
                                failures_in_a_row = 0;
                                last_name = Some(name);
                                if log_progress && sequence % EXTRACT_PROGRESS_EVERY == 0 {
                                    info!(
                                        "📸 {:?}: extracted {} frames (last at {:.2}s)",
                                        video, sequence, frame.timestamp
                                    );
                                }
                                report.record(path);
                            }
                            Err(e) => {
                                warn!("⚠️ {:?} frame {} ({:.2}s): {}", video, frame.index, frame.timestamp, e);
                                report.write_failures += 1;
                                failures_in_a_row += 1;
                                if failures_in_a_row >= MAX_CONSECUTIVE_WRITE_FAILURES {
                                    error!(
                                        "❌ {:?}: {} writes failed in a row, giving up on this video",
                                        video, failures_in_a_row
                                    );
                                    policy.stop(DoneReason::WriteFailures);
                                }
                            }
                        }
                    }
                }
                Decision::Skip(reason) => {
                    if let Some(score) = score {
                        if score >= self.policy.threshold {
                            debug!("{:.2}s: change {:.1}% skipped ({:?})", frame.timestamp, score, reason);
                        }
                    }
                }
                Decision::Done(reason) => {
                    debug!("{:?} done at {:.2}s: {:?}", video, frame.timestamp, reason);
                    break;
                }
            }

            let scanned = policy.scanned_count();
            if log_progress && scanned % SCAN_PROGRESS_EVERY == 0 {
                let percent = if info.frame_count > 0 {
                    (frame.index + 1) as f64 / info.frame_count as f64 * 100.0
                } else {
                    0.0
                };
                info!(
                    "Progress {:?}: {:.1}% (frame {}/{}), {} extracted",
                    video,
                    percent.min(100.0),
                    frame.index + 1,
                    info.frame_count,
                    policy.extracted_count()
                );
            }

            if policy.is_done() {
                break;
            }
        }

        if !report.interrupted {
            policy.finish();
        }
        report.frames_scanned = policy.scanned_count();
        report.frames_extracted = policy.extracted_count();
        report.stop_reason = match policy.phase() {
            PolicyPhase::Done(reason) => Some(reason),
            _ => None,
        };
        report.elapsed = started.elapsed();

        if log_progress {
            info!(
                "✅ {:?}: {} frames extracted from {} scanned in {:.2}s",
                video,
                report.frames_extracted,
                report.frames_scanned,
                report.elapsed.as_secs_f64()
            );
            if let (Some(first), Some(last)) = (&report.first_frame, &report.last_frame) {
                info!("   first: {:?}, last: {:?}", first, last);
            }
        }

        Ok(report)
    }
}
