pub mod config;
pub mod error;
pub mod video;

pub use config::{ExtractionConfig, ExtractionMode, RunOptions, DEFAULT_CONFIG_FILE};
pub use error::{ExtractorError, Result};
