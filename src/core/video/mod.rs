pub mod discovery;
pub mod ffmpeg;
pub mod frame;
pub mod manager;
pub mod source;

pub use discovery::{discover_videos, is_supported_video, Discovery, SUPPORTED_EXTENSIONS};
pub use ffmpeg::{FfmpegOpener, FfmpegSource};
pub use frame::Frame;
pub use manager::{ExtractionManager, RunStatistics, VideoOutcome};
pub use source::{FrameSource, SyntheticOpener, SyntheticSource, SyntheticVideo, VideoInfo, VideoOpener};
