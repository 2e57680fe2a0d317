use crate::core::error::{ExtractorError, Result};
use crate::core::video::Frame;

/// Per-pixel intensity difference above which a pixel counts as changed.
pub const DEFAULT_NOISE_THRESHOLD: u8 = 30;

/// Intensity plane kept as the comparison reference between frames.
#[derive(Debug, Clone)]
pub struct LumaPlane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl LumaPlane {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            data: frame.to_luma(),
        }
    }
}

/// 帧差检测 - 阈值后取比例，而非平均差
///
/// Scores the percentage of pixels whose intensity moved by more than the
/// noise threshold. Uniform low-level noise scores ~0, a hard cut scores high.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    noise_threshold: u8,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_NOISE_THRESHOLD)
    }

    pub fn with_threshold(noise_threshold: u8) -> Self {
        Self { noise_threshold }
    }

    /// Dissimilarity in `[0, 100]`.
    pub fn score(&self, prev: &Frame, curr: &Frame) -> Result<f64> {
        self.score_luma(&LumaPlane::from_frame(prev), &LumaPlane::from_frame(curr))
    }

    pub fn score_luma(&self, prev: &LumaPlane, curr: &LumaPlane) -> Result<f64> {
        if (prev.width, prev.height) != (curr.width, curr.height)
            || prev.data.len() != curr.data.len()
        {
            return Err(ExtractorError::FrameSizeMismatch {
                expected: (prev.width, prev.height),
                actual: (curr.width, curr.height),
            });
        }
        if curr.data.is_empty() {
            return Ok(0.0);
        }

        let changed = prev
            .data
            .iter()
            .zip(curr.data.iter())
            .filter(|(a, b)| a.abs_diff(**b) > self.noise_threshold)
            .count();

        Ok(changed as f64 / curr.data.len() as f64 * 100.0)
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_frame(width: u32, height: u32, fill: u8) -> Frame {
        Frame::filled(width, height, [fill, fill, fill], 0.0, 0)
    }

    #[test]
    fn test_identical_frames() {
        let detector = ChangeDetector::new();
        let frame1 = create_test_frame(100, 100, 128);
        let frame2 = create_test_frame(100, 100, 128);

        assert_eq!(detector.score(&frame1, &frame2).unwrap(), 0.0);
    }

    #[test]
    fn test_different_frames() {
        let detector = ChangeDetector::new();
        let frame1 = create_test_frame(10, 10, 0);
        let frame2 = create_test_frame(10, 10, 255);

        assert_eq!(detector.score(&frame1, &frame2).unwrap(), 100.0);
    }

    #[test]
    fn test_small_uniform_change_ignored() {
        let detector = ChangeDetector::new();
        let frame1 = create_test_frame(50, 50, 100);
        let frame2 = create_test_frame(50, 50, 125);

        assert_eq!(detector.score(&frame1, &frame2).unwrap(), 0.0);
    }

    #[test]
    fn test_localized_change_ratio() {
        let detector = ChangeDetector::new();
        let frame1 = create_test_frame(10, 10, 0);
        let mut frame2 = create_test_frame(10, 10, 0);
        // top two rows go white
        for px in frame2.data.iter_mut().take(20 * 3) {
            *px = 255;
        }

        let score = detector.score(&frame1, &frame2).unwrap();
        assert!((score - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_strict() {
        let detector = ChangeDetector::with_threshold(30);
        let a = LumaPlane {
            width: 2,
            height: 1,
            data: vec![0, 0],
        };
        let b = LumaPlane {
            width: 2,
            height: 1,
            data: vec![30, 31],
        };
        assert_eq!(detector.score_luma(&a, &b).unwrap(), 50.0);
    }

    #[test]
    fn test_size_mismatch() {
        let detector = ChangeDetector::new();
        let frame1 = create_test_frame(10, 10, 0);
        let frame2 = create_test_frame(20, 10, 0);

        assert!(matches!(
            detector.score(&frame1, &frame2),
            Err(ExtractorError::FrameSizeMismatch { .. })
        ));
    }
}
