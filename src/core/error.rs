use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to load config {path:?}: {source}")]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: Box<ExtractorError>,
    },
    #[error("Unreadable video {path:?}: {reason}")]
    UnreadableVideo { path: PathBuf, reason: String },
    #[error("Decode error in {path:?} at frame {frame_index}: {reason}")]
    Decode {
        path: PathBuf,
        frame_index: u64,
        reason: String,
    },
    #[error("Frame size mismatch: expected {expected:?}, got {actual:?}")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: Box<ExtractorError>,
    },
    #[error("Failed to create output directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Input path does not exist: {0:?}")]
    InputNotFound(PathBuf),
    #[error("Not a supported video format: {0:?}")]
    UnsupportedInput(PathBuf),
}

impl ExtractorError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ExtractorError::UnreadableVideo {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Errors that abort the whole run rather than a single video or frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExtractorError::InvalidConfig(_)
                | ExtractorError::ConfigLoad { .. }
                | ExtractorError::InputNotFound(_)
                | ExtractorError::UnsupportedInput(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ExtractorError>;
