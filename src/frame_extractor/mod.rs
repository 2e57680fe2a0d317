//! 视频抽帧 - 按时间间隔或场景变化提取关键帧
//!
//! 核心流程：
//! 1. 帧差检测 - 亮度差超过噪声阈值的像素占比
//! 2. 状态机驱动 - 起止时间、最小间隔、数量上限
//! 3. 帧写入 - 按视频分目录，文件名带时间戳

pub mod diff_filter;
pub mod pipeline;
pub mod state_machine;
pub mod writer;

pub use diff_filter::{ChangeDetector, LumaPlane, DEFAULT_NOISE_THRESHOLD};
pub use pipeline::{FrameExtractor, VideoReport, MAX_CONSECUTIVE_WRITE_FAILURES};
pub use state_machine::{
    Decision, DoneReason, ExtractionPolicy, ExtractionState, PolicyConfig, PolicyPhase, SkipReason,
};
pub use writer::FrameWriter;
