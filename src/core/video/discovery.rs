//! 视频文件发现

use crate::core::error::{ExtractorError, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v"];

pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Videos to process plus the directory their output paths are relative to.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub scan_root: PathBuf,
    pub videos: Vec<PathBuf>,
}

/// Resolve the input path into a sorted list of videos.
///
/// A file must carry a supported extension; a directory is walked (recursively
/// unless `recursive` is false) and unreadable entries are logged and skipped.
pub fn discover_videos(input: &Path, recursive: bool) -> Result<Discovery> {
    if !input.exists() {
        return Err(ExtractorError::InputNotFound(input.to_path_buf()));
    }

    if input.is_file() {
        if !is_supported_video(input) {
            return Err(ExtractorError::UnsupportedInput(input.to_path_buf()));
        }
        let scan_root = input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        return Ok(Discovery {
            scan_root,
            videos: vec![input.to_path_buf()],
        });
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut videos = Vec::new();
    for entry in WalkDir::new(input).max_depth(max_depth).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("⚠️ Skipping unreadable entry under {:?}: {}", input, e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_supported_video(entry.path()) {
            debug!("Found video: {:?}", entry.path());
            videos.push(entry.into_path());
        }
    }
    videos.sort();

    Ok(Discovery {
        scan_root: input.to_path_buf(),
        videos,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        assert!(is_supported_video(Path::new("a.mp4")));
        assert!(is_supported_video(Path::new("a.MOV")));
        assert!(is_supported_video(Path::new("dir/b.WebM")));
        assert!(!is_supported_video(Path::new("a.jpg")));
        assert!(!is_supported_video(Path::new("mp4")));
        assert!(!is_supported_video(Path::new("a.mp4.txt")));
    }

    #[test]
    fn test_recursive_discovery() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.mp4"));
        touch(&dir.path().join("a.MKV"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("sub/deeper/c.avi"));

        let found = discover_videos(dir.path(), true).unwrap();
        assert_eq!(found.scan_root, dir.path());
        assert_eq!(
            found.videos,
            vec![
                dir.path().join("a.MKV"),
                dir.path().join("b.mp4"),
                dir.path().join("sub/deeper/c.avi"),
            ]
        );
    }

    #[test]
    fn test_non_recursive_discovery() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("top.m4v"));
        touch(&dir.path().join("sub/nested.flv"));

        let found = discover_videos(dir.path(), false).unwrap();
        assert_eq!(found.videos, vec![dir.path().join("top.m4v")]);
    }

    #[test]
    fn test_single_file_input() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.wmv");
        touch(&video);

        let found = discover_videos(&video, true).unwrap();
        assert_eq!(found.scan_root, dir.path());
        assert_eq!(found.videos, vec![video]);
    }

    #[test]
    fn test_bad_inputs_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = discover_videos(&dir.path().join("nope"), true).unwrap_err();
        assert!(matches!(missing, ExtractorError::InputNotFound(_)));
        assert!(missing.is_fatal());

        let text = dir.path().join("readme.txt");
        touch(&text);
        let unsupported = discover_videos(&text, true).unwrap_err();
        assert!(matches!(unsupported, ExtractorError::UnsupportedInput(_)));
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_videos(dir.path(), true).unwrap().videos.is_empty());
    }
}
