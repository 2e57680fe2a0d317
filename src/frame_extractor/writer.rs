use crate::core::config::ExtractionConfig;
use crate::core::error::{ExtractorError, Result};
use crate::core::video::Frame;
use image::ImageOutputFormat;
use log::debug;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

/// 帧写入 - 命名、缩放、JPEG 编码
///
/// Layout: `output_directory/[<relative-dirs>/]<video-stem>/<prefix>_<ts>s.jpg`.
#[derive(Debug, Clone)]
pub struct FrameWriter {
    output_root: PathBuf,
    preserve_structure: bool,
    prefix: String,
    quality: u8,
    resize_width: Option<u32>,
    resize_height: Option<u32>,
}

impl FrameWriter {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            output_root: config.output_directory.clone(),
            preserve_structure: config.preserve_directory_structure,
            prefix: config.frame_prefix.clone(),
            quality: config.image_quality.clamp(1, 100),
            resize_width: config.resize_width,
            resize_height: config.resize_height,
        }
    }

    /// Per-video subfolder. `scan_root` is the directory the video was discovered under.
    pub fn output_dir_for(&self, video: &Path, scan_root: &Path) -> PathBuf {
        let stem = video
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "video".into());

        let relative_dirs = if self.preserve_structure {
            video
                .strip_prefix(scan_root)
                .ok()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .unwrap_or_default()
        } else {
            PathBuf::new()
        };

        self.output_root.join(relative_dirs).join(stem)
    }

    /// `frame_00012.50s.jpg`
    pub fn frame_file_name(&self, timestamp: f64) -> String {
        format!("{}_{:08.2}s.jpg", self.prefix, timestamp.max(0.0))
    }

    /// Output raster size, `None` when no resize is configured.
    ///
    /// Both dimensions set: exact box. One set: the other follows the aspect ratio.
    pub fn target_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let scaled = |num: u32, den: u32, target: u32| -> u32 {
            if den == 0 {
                return target;
            }
            ((num as f64 * target as f64 / den as f64).round() as u32).max(1)
        };
        match (self.resize_width, self.resize_height) {
            (Some(w), Some(h)) => Some((w, h)),
            (Some(w), None) => Some((w, scaled(height, width, w))),
            (None, Some(h)) => Some((scaled(width, height, h), h)),
            (None, None) => None,
        }
    }

    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let resized;
        let frame = match self.target_size(frame.width, frame.height) {
            Some(size) if size != frame.dimensions() => {
                resized = frame.resize_to(size.0, size.1).ok_or_else(malformed_buffer)?;
                &resized
            }
            _ => frame,
        };

        let img = frame.to_image().ok_or_else(malformed_buffer)?;
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageOutputFormat::Jpeg(self.quality))?;
        Ok(buffer.into_inner())
    }

    /// Encode and write one frame into `dir`, which must already exist.
    pub fn write(&self, frame: &Frame, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.frame_file_name(frame.timestamp));
        let write_err = |source: ExtractorError| ExtractorError::Write {
            path: path.clone(),
            source: Box::new(source),
        };

        let bytes = self.encode(frame).map_err(write_err)?;
        if let Err(e) = fs::write(&path, &bytes) {
            // 不留半截文件，否则 skip_existing 会误判
            let _ = fs::remove_file(&path);
            return Err(write_err(e.into()));
        }

        debug!("Saved frame {} ({:.2}s) -> {:?}", frame.index, frame.timestamp, path);
        Ok(path)
    }
}

fn malformed_buffer() -> ExtractorError {
    ExtractorError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        "frame buffer does not match its dimensions",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn writer_with(f: impl FnOnce(&mut ExtractionConfig)) -> FrameWriter {
        let mut config = ExtractionConfig {
            output_directory: PathBuf::from("out"),
            ..Default::default()
        };
        f(&mut config);
        FrameWriter::new(&config)
    }

    #[test]
    fn test_frame_file_name() {
        let writer = writer_with(|_| {});
        assert_eq!(writer.frame_file_name(12.5), "frame_00012.50s.jpg");
        assert_eq!(writer.frame_file_name(0.0), "frame_00000.00s.jpg");
        assert_eq!(writer.frame_file_name(3725.456), "frame_03725.46s.jpg");

        let writer = writer_with(|c| c.frame_prefix = "shot".to_string());
        assert_eq!(writer.frame_file_name(1.0), "shot_00001.00s.jpg");
    }

    #[test]
    fn test_names_sort_by_time() {
        let writer = writer_with(|_| {});
        let mut names: Vec<_> = [100.0, 2.0, 10.5, 0.25]
            .iter()
            .map(|&t| writer.frame_file_name(t))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "frame_00000.25s.jpg",
                "frame_00002.00s.jpg",
                "frame_00010.50s.jpg",
                "frame_00100.00s.jpg",
            ]
        );
    }

    #[test]
    fn test_output_dir_preserving_structure() {
        let writer = writer_with(|_| {});
        let dir = writer.output_dir_for(
            Path::new("/media/trips/2023/beach.mp4"),
            Path::new("/media"),
        );
        assert_eq!(dir, PathBuf::from("out/trips/2023/beach"));

        let top = writer.output_dir_for(Path::new("/media/clip.MOV"), Path::new("/media"));
        assert_eq!(top, PathBuf::from("out/clip"));
    }

    #[test]
    fn test_output_dir_flattened() {
        let writer = writer_with(|c| c.preserve_directory_structure = false);
        let dir = writer.output_dir_for(
            Path::new("/media/trips/2023/beach.mp4"),
            Path::new("/media"),
        );
        assert_eq!(dir, PathBuf::from("out/beach"));
    }

    #[test]
    fn test_output_dir_outside_root_falls_back_to_flat() {
        let writer = writer_with(|_| {});
        let dir = writer.output_dir_for(Path::new("/elsewhere/a/b.mkv"), Path::new("/media"));
        assert_eq!(dir, PathBuf::from("out/b"));
    }

    #[test]
    fn test_target_size() {
        let none = writer_with(|_| {});
        assert_eq!(none.target_size(1920, 1080), None);

        let both = writer_with(|c| {
            c.resize_width = Some(320);
            c.resize_height = Some(320);
        });
        assert_eq!(both.target_size(1920, 1080), Some((320, 320)));

        let width_only = writer_with(|c| c.resize_width = Some(640));
        assert_eq!(width_only.target_size(1920, 1080), Some((640, 360)));

        let height_only = writer_with(|c| c.resize_height = Some(540));
        assert_eq!(height_only.target_size(1920, 1080), Some((960, 540)));

        let tiny = writer_with(|c| c.resize_width = Some(1));
        assert_eq!(tiny.target_size(1000, 10), Some((1, 1)));
    }

    #[test]
    fn test_write_jpeg_with_resize() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer_with(|c| {
            c.resize_width = Some(16);
            c.image_quality = 80;
        });
        let frame = Frame::filled(64, 32, [200, 40, 40], 7.25, 217);

        let path = writer.write(&frame, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "frame_00007.25s.jpg");

        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer_with(|_| {});
        let frame = Frame::filled(8, 8, [0, 0, 0], 1.0, 30);

        let err = writer
            .write(&frame, &dir.path().join("does/not/exist"))
            .unwrap_err();
        assert!(matches!(err, ExtractorError::Write { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_malformed_frame_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer_with(|_| {});
        let frame = Frame::new(8, 8, vec![0u8; 5], 0.0, 0);
        assert!(matches!(
            writer.write(&frame, dir.path()),
            Err(ExtractorError::Write { .. })
        ));
    }
}
