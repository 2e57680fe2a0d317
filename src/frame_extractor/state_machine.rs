use crate::core::config::{ExtractionConfig, ExtractionMode};
use crate::core::error::{ExtractorError, Result};

/// Tolerance for floating point timestamp jitter, in seconds.
pub const TIMESTAMP_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyPhase {
    AwaitingStart,
    Active,
    Done(DoneReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    EndTime,
    FrameCap,
    EndOfStream,
    /// Output kept failing to persist.
    WriteFailures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BeforeStart,
    IntervalNotElapsed,
    /// Scene mode without a previous frame to compare against.
    NoReference,
    BelowThreshold,
    /// Scene change inside the minimum scene duration.
    TooSoon,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// `sequence` is 1-based within the video.
    Extract { sequence: u32 },
    Skip(SkipReason),
    Done(DoneReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    pub mode: ExtractionMode,
    pub interval: f64,
    pub threshold: f64,
    pub min_scene_duration: f64,
    pub start: f64,
    pub end: Option<f64>,
    pub max_frames: Option<u32>,
}

impl PolicyConfig {
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let policy = Self {
            mode: config.extraction_mode,
            interval: config.time_interval_seconds,
            threshold: config.scene_change_threshold,
            min_scene_duration: config.min_scene_duration_seconds,
            start: config.start_time_seconds,
            end: config.end_time_seconds,
            max_frames: config.max_frames_per_video,
        };
        policy.validate()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<()> {
        if !(self.interval.is_finite() && self.interval > 0.0) {
            return Err(ExtractorError::InvalidConfig(format!(
                "time interval must be > 0, got {}",
                self.interval
            )));
        }
        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(ExtractorError::InvalidConfig(format!(
                "scene threshold must be within 0-100, got {}",
                self.threshold
            )));
        }
        if !(self.min_scene_duration.is_finite() && self.min_scene_duration >= 0.0) {
            return Err(ExtractorError::InvalidConfig(format!(
                "minimum scene duration must be >= 0, got {}",
                self.min_scene_duration
            )));
        }
        if matches!(self.end, Some(end) if end <= self.start) || self.max_frames == Some(0) {
            return Err(ExtractorError::InvalidConfig(
                "empty extraction window".to_string(),
            ));
        }
        Ok(())
    }
}

/// Mutable working state for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionState {
    pub phase: PolicyPhase,
    pub last_extracted: Option<f64>,
    pub extracted: u32,
    pub scanned: u64,
}

impl ExtractionState {
    pub fn new() -> Self {
        Self {
            phase: PolicyPhase::AwaitingStart,
            last_extracted: None,
            extracted: 0,
            scanned: 0,
        }
    }

    fn transition(&self, timestamp: f64, score: Option<f64>, config: &PolicyConfig) -> (PolicyPhase, Decision) {
        if let PolicyPhase::Done(reason) = self.phase {
            return (self.phase, Decision::Done(reason));
        }
        if matches!(config.max_frames, Some(cap) if self.extracted >= cap) {
            let reason = DoneReason::FrameCap;
            return (PolicyPhase::Done(reason), Decision::Done(reason));
        }
        if matches!(config.end, Some(end) if timestamp >= end - TIMESTAMP_EPSILON) {
            let reason = DoneReason::EndTime;
            return (PolicyPhase::Done(reason), Decision::Done(reason));
        }
        if timestamp < config.start - TIMESTAMP_EPSILON {
            return (
                PolicyPhase::AwaitingStart,
                Decision::Skip(SkipReason::BeforeStart),
            );
        }

        let extract = Decision::Extract {
            sequence: self.extracted + 1,
        };
        let elapsed = self.last_extracted.map(|last| timestamp - last);
        let decision = match config.mode {
            ExtractionMode::TimeInterval => match elapsed {
                None => extract,
                Some(gap) if gap > 0.0 && gap >= config.interval - TIMESTAMP_EPSILON => extract,
                Some(_) => Decision::Skip(SkipReason::IntervalNotElapsed),
            },
            ExtractionMode::SceneChange => match score {
                None => Decision::Skip(SkipReason::NoReference),
                Some(s) if s < config.threshold => Decision::Skip(SkipReason::BelowThreshold),
                Some(_) => match elapsed {
                    None => extract,
                    Some(gap)
                        if gap > 0.0 && gap >= config.min_scene_duration - TIMESTAMP_EPSILON =>
                    {
                        extract
                    }
                    Some(_) => Decision::Skip(SkipReason::TooSoon),
                },
            },
        };
        (PolicyPhase::Active, decision)
    }
}

impl Default for ExtractionState {
    fn default() -> Self {
        Self::new()
    }
}

/// 抽帧策略状态机
///
/// `AwaitingStart -> Active -> Done`. Feed every decoded frame to
/// [`evaluate`](Self::evaluate) in presentation order; after an `Extract`
/// decision has been persisted call [`mark_extracted`](Self::mark_extracted).
/// A failed write is simply not marked, so the next candidate stays eligible.
#[derive(Debug, Clone)]
pub struct ExtractionPolicy {
    config: PolicyConfig,
    state: ExtractionState,
}

impl ExtractionPolicy {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        Ok(Self::with_config(PolicyConfig::from_config(config)?))
    }

    pub fn with_config(config: PolicyConfig) -> Self {
        Self {
            config,
            state: ExtractionState::new(),
        }
    }

    /// `score` is the detector score against the immediately preceding frame,
    /// `None` when there is nothing to compare with. Ignored in time mode.
    pub fn evaluate(&mut self, timestamp: f64, score: Option<f64>) -> Decision {
        if !self.is_done() {
            self.state.scanned += 1;
        }
        let (phase, decision) = self.state.transition(timestamp, score, &self.config);
        self.state.phase = phase;
        decision
    }

    pub fn mark_extracted(&mut self, timestamp: f64) {
        self.state.last_extracted = Some(timestamp);
        self.state.extracted += 1;
        if matches!(self.config.max_frames, Some(cap) if self.state.extracted >= cap) {
            self.state.phase = PolicyPhase::Done(DoneReason::FrameCap);
        }
    }

    /// Stop early. A policy that is already done keeps its first reason.
    pub fn stop(&mut self, reason: DoneReason) {
        if !self.is_done() {
            self.state.phase = PolicyPhase::Done(reason);
        }
    }

    /// The stream ended.
    pub fn finish(&mut self) {
        self.stop(DoneReason::EndOfStream);
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state.phase, PolicyPhase::Done(_))
    }

    pub fn needs_score(&self) -> bool {
        self.config.mode == ExtractionMode::SceneChange && !self.is_done()
    }

    pub fn phase(&self) -> PolicyPhase {
        self.state.phase
    }

    pub fn state(&self) -> &ExtractionState {
        &self.state
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn extracted_count(&self) -> u32 {
        self.state.extracted
    }

    pub fn scanned_count(&self) -> u64 {
        self.state.scanned
    }

    pub fn reset(&mut self) {
        self.state = ExtractionState::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval_config(interval: f64) -> PolicyConfig {
        PolicyConfig {
            mode: ExtractionMode::TimeInterval,
            interval,
            threshold: 30.0,
            min_scene_duration: 1.0,
            start: 0.0,
            end: None,
            max_frames: None,
        }
    }

    fn scene_config(threshold: f64, min_scene_duration: f64) -> PolicyConfig {
        PolicyConfig {
            mode: ExtractionMode::SceneChange,
            threshold,
            min_scene_duration,
            ..interval_config(5.0)
        }
    }

    /// Runs a 30fps stream through the policy, treating every decision as persisted.
    fn run(policy: &mut ExtractionPolicy, frames: u64, score: impl Fn(u64) -> Option<f64>) -> Vec<f64> {
        let mut extracted = Vec::new();
        for i in 0..frames {
            let ts = i as f64 / 30.0;
            match policy.evaluate(ts, score(i)) {
                Decision::Extract { .. } => {
                    policy.mark_extracted(ts);
                    extracted.push(ts);
                }
                Decision::Skip(_) => {}
                Decision::Done(_) => break,
            }
        }
        policy.finish();
        extracted
    }

    #[test]
    fn test_interval_every_two_seconds() {
        let mut policy = ExtractionPolicy::with_config(interval_config(2.0));
        let extracted = run(&mut policy, 300, |_| None);
        assert_eq!(extracted, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(policy.phase(), PolicyPhase::Done(DoneReason::EndOfStream));
        assert_eq!(policy.scanned_count(), 300);
    }

    #[test]
    fn test_frame_cap_stops_early() {
        let mut policy = ExtractionPolicy::with_config(PolicyConfig {
            max_frames: Some(3),
            ..interval_config(1.0)
        });
        let extracted = run(&mut policy, 300, |_| None);
        assert_eq!(extracted, vec![0.0, 1.0, 2.0]);
        assert_eq!(policy.phase(), PolicyPhase::Done(DoneReason::FrameCap));
        // frame 60 was the last one evaluated
        assert_eq!(policy.scanned_count(), 61);
    }

    #[test]
    fn test_window_is_start_inclusive_end_exclusive() {
        let mut policy = ExtractionPolicy::with_config(PolicyConfig {
            start: 3.0,
            end: Some(7.0),
            ..interval_config(1.0)
        });
        let extracted = run(&mut policy, 300, |_| None);
        assert_eq!(extracted, vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(policy.phase(), PolicyPhase::Done(DoneReason::EndTime));
    }

    #[test]
    fn test_awaiting_start_then_active() {
        let mut policy = ExtractionPolicy::with_config(PolicyConfig {
            start: 1.0,
            ..interval_config(1.0)
        });
        assert_eq!(policy.phase(), PolicyPhase::AwaitingStart);
        assert_eq!(
            policy.evaluate(0.5, None),
            Decision::Skip(SkipReason::BeforeStart)
        );
        assert_eq!(policy.phase(), PolicyPhase::AwaitingStart);
        assert_eq!(
            policy.evaluate(1.0 - 1e-9, None),
            Decision::Extract { sequence: 1 }
        );
        assert_eq!(policy.phase(), PolicyPhase::Active);
    }

    #[test]
    fn test_interval_boundary_jitter_still_extracts() {
        let mut policy = ExtractionPolicy::with_config(interval_config(0.1));
        assert!(matches!(policy.evaluate(0.0, None), Decision::Extract { .. }));
        policy.mark_extracted(0.0);
        // 0.1 accumulated in floating point lands just below the boundary
        let jittered = 0.1 - 5e-7;
        assert_eq!(
            policy.evaluate(jittered, None),
            Decision::Extract { sequence: 2 }
        );
    }

    #[test]
    fn test_scene_first_frame_is_reference_only() {
        let mut policy = ExtractionPolicy::with_config(scene_config(20.0, 1.0));
        assert_eq!(
            policy.evaluate(0.0, None),
            Decision::Skip(SkipReason::NoReference)
        );
        assert_eq!(policy.extracted_count(), 0);
    }

    #[test]
    fn test_scene_single_cut() {
        let mut policy = ExtractionPolicy::with_config(scene_config(20.0, 1.0));
        let extracted = run(&mut policy, 300, |i| match i {
            0 => None,
            150 => Some(100.0),
            _ => Some(0.0),
        });
        assert_eq!(extracted, vec![5.0]);
    }

    #[test]
    fn test_scene_min_duration_gate() {
        let mut policy = ExtractionPolicy::with_config(scene_config(20.0, 1.0));
        // flashing footage: every frame is a "cut"
        let extracted = run(&mut policy, 90, |i| if i == 0 { None } else { Some(90.0) });
        assert_eq!(extracted.len(), 3);
        for pair in extracted.windows(2) {
            assert!(pair[1] - pair[0] >= 1.0 - TIMESTAMP_EPSILON);
        }
    }

    #[test]
    fn test_scene_threshold_is_inclusive() {
        let mut policy = ExtractionPolicy::with_config(scene_config(30.0, 0.0));
        assert_eq!(
            policy.evaluate(0.1, Some(29.999)),
            Decision::Skip(SkipReason::BelowThreshold)
        );
        assert_eq!(
            policy.evaluate(0.2, Some(30.0)),
            Decision::Extract { sequence: 1 }
        );
    }

    #[test]
    fn test_unmarked_extract_keeps_candidate_eligible() {
        let mut policy = ExtractionPolicy::with_config(interval_config(1.0));
        assert!(matches!(policy.evaluate(0.0, None), Decision::Extract { .. }));
        // write failed: not marked
        assert_eq!(
            policy.evaluate(0.5, None),
            Decision::Extract { sequence: 1 }
        );
    }

    #[test]
    fn test_stop_keeps_first_reason() {
        let mut policy = ExtractionPolicy::with_config(interval_config(1.0));
        policy.stop(DoneReason::WriteFailures);
        assert_eq!(policy.evaluate(0.0, None), Decision::Done(DoneReason::WriteFailures));
        policy.finish();
        assert_eq!(policy.phase(), PolicyPhase::Done(DoneReason::WriteFailures));
        assert!(!policy.needs_score());
    }

    #[test]
    fn test_done_is_terminal() {
        let mut policy = ExtractionPolicy::with_config(PolicyConfig {
            end: Some(1.0),
            ..interval_config(0.5)
        });
        assert_eq!(policy.evaluate(2.0, None), Decision::Done(DoneReason::EndTime));
        assert_eq!(policy.evaluate(0.0, None), Decision::Done(DoneReason::EndTime));
        assert!(!policy.needs_score());
        policy.finish();
        assert_eq!(policy.phase(), PolicyPhase::Done(DoneReason::EndTime));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = ExtractionConfig {
            time_interval_seconds: 0.0,
            ..Default::default()
        };
        assert!(ExtractionPolicy::new(&config).is_err());

        let config = ExtractionConfig {
            scene_change_threshold: -1.0,
            ..Default::default()
        };
        assert!(ExtractionPolicy::new(&config).is_err());
    }

    #[test]
    fn test_reset() {
        let mut policy = ExtractionPolicy::with_config(interval_config(1.0));
        run(&mut policy, 60, |_| None);
        assert!(policy.is_done());
        policy.reset();
        assert_eq!(policy.phase(), PolicyPhase::AwaitingStart);
        assert_eq!(policy.extracted_count(), 0);
        assert_eq!(policy.scanned_count(), 0);
    }
}
