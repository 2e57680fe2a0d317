//! Frame sources: a video presented as an ordered stream of decoded frames.

use super::frame::Frame;
use crate::core::error::{ExtractorError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Static properties of an opened video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
    /// Seconds. Containers sometimes misreport this, so treat it as a hint.
    pub duration: f64,
}

impl VideoInfo {
    pub fn new(width: u32, height: u32, fps: f64, frame_count: u64) -> Self {
        let duration = if fps > 0.0 {
            frame_count as f64 / fps
        } else {
            0.0
        };
        Self {
            width,
            height,
            fps,
            frame_count,
            duration,
        }
    }

    /// Reject zero/NaN fps and empty rasters.
    pub fn validated(self, path: &Path) -> Result<Self> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(ExtractorError::unreadable(
                path,
                format!("invalid frame rate {}", self.fps),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ExtractorError::unreadable(
                path,
                format!("invalid dimensions {}x{}", self.width, self.height),
            ));
        }
        Ok(self)
    }

    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Index of the first frame at or after `seconds`.
    pub fn frame_index_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.fps - 1e-6).ceil().max(0.0) as u64
    }
}

/// An open video. Dropping the source releases the underlying decoder.
pub trait FrameSource: Send {
    fn info(&self) -> &VideoInfo;

    /// Index of the next frame [`next_frame`](Self::next_frame) will return.
    fn position(&self) -> u64;

    /// Position the read cursor at the first frame at or after `seconds`.
    fn seek_to_time(&mut self, seconds: f64) -> Result<()>;

    /// `Ok(None)` at end of stream; `Err(Decode)` when a frame cannot be read.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

pub trait VideoOpener: Send + Sync {
    /// Fails with `UnreadableVideo` when the file cannot be decoded.
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
}

type FillFn = dyn Fn(u64, f64) -> [u8; 3] + Send + Sync;

/// In-memory video description for tests and dry runs.
#[derive(Clone)]
pub struct SyntheticVideo {
    pub info: VideoInfo,
    fill: Arc<FillFn>,
    /// Frame index at which decoding fails.
    pub decode_error_at: Option<u64>,
    /// From this frame index on, frames come out at the given size.
    pub resize_at: Option<(u64, (u32, u32))>,
    pub corrupt: bool,
}

impl SyntheticVideo {
    pub fn new(width: u32, height: u32, fps: f64, duration: f64) -> Self {
        let frame_count = (duration * fps).round().max(0.0) as u64;
        Self {
            info: VideoInfo::new(width, height, fps, frame_count),
            fill: Arc::new(|_, _| [0, 0, 0]),
            decode_error_at: None,
            resize_at: None,
            corrupt: false,
        }
    }

    /// Colour per frame from `(index, timestamp)`.
    pub fn with_fill<F>(mut self, fill: F) -> Self
    where
        F: Fn(u64, f64) -> [u8; 3] + Send + Sync + 'static,
    {
        self.fill = Arc::new(fill);
        self
    }

    /// Uniform colour that switches from `before` to `after` at `at` seconds.
    pub fn with_cut(self, at: f64, before: [u8; 3], after: [u8; 3]) -> Self {
        self.with_fill(move |_, ts| if ts + 1e-9 >= at { after } else { before })
    }

    pub fn with_decode_error_at(mut self, index: u64) -> Self {
        self.decode_error_at = Some(index);
        self
    }

    /// Mid-stream resolution change, as seen in some concatenated recordings.
    pub fn with_resolution_change(mut self, index: u64, width: u32, height: u32) -> Self {
        self.resize_at = Some((index, (width, height)));
        self
    }

    pub fn corrupt() -> Self {
        let mut video = Self::new(16, 16, 30.0, 1.0);
        video.corrupt = true;
        video
    }
}

pub struct SyntheticSource {
    path: PathBuf,
    video: SyntheticVideo,
    position: u64,
}

impl FrameSource for SyntheticSource {
    fn info(&self) -> &VideoInfo {
        &self.video.info
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek_to_time(&mut self, seconds: f64) -> Result<()> {
        self.position = self.video.info.frame_index_at(seconds);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let info = &self.video.info;
        if self.position >= info.frame_count {
            return Ok(None);
        }
        if self.video.decode_error_at == Some(self.position) {
            return Err(ExtractorError::Decode {
                path: self.path.clone(),
                frame_index: self.position,
                reason: "synthetic decode failure".to_string(),
            });
        }
        let index = self.position;
        let timestamp = index as f64 / info.fps;
        let rgb = (self.video.fill)(index, timestamp);
        let (width, height) = match self.video.resize_at {
            Some((at, size)) if index >= at => size,
            _ => (info.width, info.height),
        };
        self.position += 1;
        Ok(Some(Frame::filled(width, height, rgb, timestamp, index)))
    }
}

/// Opens [`SyntheticVideo`]s registered by file name.
#[derive(Clone, Default)]
pub struct SyntheticOpener {
    videos: HashMap<String, SyntheticVideo>,
}

impl SyntheticOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, file_name: &str, video: SyntheticVideo) -> Self {
        self.videos.insert(file_name.to_string(), video);
        self
    }
}

impl VideoOpener for SyntheticOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let video = self
            .videos
            .get(&name)
            .ok_or_else(|| ExtractorError::unreadable(path, "no such synthetic video"))?;
        if video.corrupt {
            return Err(ExtractorError::unreadable(path, "corrupt container"));
        }
        let info = video.info.clone().validated(path)?;
        Ok(Box::new(SyntheticSource {
            path: path.to_path_buf(),
            video: SyntheticVideo {
                info,
                ..video.clone()
            },
            position: 0,
        }))
    }
}
