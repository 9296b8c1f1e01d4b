//! Common types, utilities, and error handling for the scene detection library.
//!
//! This module provides the foundational types used throughout the codebase,
//! including scenes derived from cut lists and the crate-wide error type.

use tracing::{instrument, debug};
use crate::timecode::FrameTimecode;

/// A contiguous span of frames between two cuts
///
/// `start` is the first frame of the scene and `end` is one past its last
/// frame, so consecutive scenes share a boundary: `scenes[i].end == scenes[i + 1].start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scene {
    pub start: FrameTimecode,
    pub end: FrameTimecode,
}

impl Scene {
    /// Create a scene from its boundaries
    ///
    /// # Panics
    /// Panics if the framerates differ or `end` is not after `start`
    #[instrument]
    pub fn new(start: FrameTimecode, end: FrameTimecode) -> Self {
        assert!(start.same_rate(&end), "Start and end FPS must match");
        assert!(end.frame_number() > start.frame_number(),
                "End frame must be after start frame");

        debug!("Created Scene: frames {}-{}",
               start.frame_number(), end.frame_number());

        Self { start, end }
    }

    /// Get the duration of this scene in frames
    pub fn duration_frames(&self) -> u64 {
        self.end.frame_number() - self.start.frame_number()
    }

    /// Get the duration of this scene in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.duration_frames() as f64 / self.start.fps()
    }
}

/// Pair every cut with its predecessor to form contiguous scenes
///
/// Cuts are expected sorted and strictly inside `(start, end)`; anything
/// outside that range is ignored. An empty cut list yields one scene
/// spanning the whole range, and an empty range yields no scenes.
pub fn scenes_from_cuts(cuts: &[FrameTimecode], start: FrameTimecode, end: FrameTimecode) -> Vec<Scene> {
    if end.frame_number() <= start.frame_number() {
        return Vec::new();
    }

    let mut scenes = Vec::with_capacity(cuts.len() + 1);
    let mut last_cut = start;

    for cut in cuts {
        if cut.frame_number() <= last_cut.frame_number() || cut.frame_number() >= end.frame_number() {
            continue;
        }
        scenes.push(Scene::new(last_cut, *cut));
        last_cut = *cut;
    }

    scenes.push(Scene::new(last_cut, end));
    scenes
}

/// All possible errors from the scene detection system
///
/// Configuration and data errors are raised to the immediate caller; nothing
/// in the detection core retries.
#[derive(Debug, thiserror::Error)]
pub enum SceneDetectError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Metric already registered: {name}")]
    DuplicateMetric { name: String },

    #[error("Framerate mismatch: {left} != {right}")]
    FramerateMismatch { left: f64, right: f64 },

    #[error("Invalid timecode '{input}': {reason}")]
    InvalidTimecode { input: String, reason: String },

    #[error("Stats file corrupt at line {line}: {reason}")]
    StatsCorrupt { line: usize, reason: String },

    #[error("Stats file framerate {found} does not match expected framerate {expected}")]
    StatsFramerateMismatch { expected: f64, found: f64 },

    #[error("Frame processing failed at frame {frame}: {reason}")]
    FrameProcessingFailed { frame: u64, reason: String },

    #[error("Frame source not found: {path}")]
    SourceNotFound { path: String },

    #[error("No frames found in source: {path}")]
    EmptySource { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl SceneDetectError {
    /// Create a configuration error with a descriptive message
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Create a frame processing error
    pub fn frame_error(frame: u64, reason: impl Into<String>) -> Self {
        Self::FrameProcessingFailed {
            frame,
            reason: reason.into()
        }
    }

    /// Create a timecode parsing error
    pub fn timecode_error(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTimecode {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a stats file corruption error
    pub fn corrupt_stats(line: usize, reason: impl Into<String>) -> Self {
        Self::StatsCorrupt {
            line,
            reason: reason.into(),
        }
    }

    /// Create an internal error (for unexpected conditions)
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }
}

/// Convenient Result type for scene detection operations
pub type Result<T> = std::result::Result<T, SceneDetectError>;

/// Check that a detector threshold is a usable number
pub(crate) fn validate_threshold(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(SceneDetectError::config_error(
            format!("{} must be a non-negative number, got: {}", name, value)
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tc(frame: u64) -> FrameTimecode {
        FrameTimecode::new(frame, 25.0)
    }

    #[test]
    fn test_scene_creation() {
        let scene = Scene::new(tc(100), tc(200));

        assert_eq!(scene.start.frame_number(), 100);
        assert_eq!(scene.end.frame_number(), 200);
        assert_eq!(scene.duration_frames(), 100);
        assert_eq!(scene.duration_seconds(), 4.0);
    }

    #[test]
    #[should_panic(expected = "Start and end FPS must match")]
    fn test_scene_mismatched_fps() {
        Scene::new(tc(100), FrameTimecode::new(200, 30.0));
    }

    #[test]
    #[should_panic(expected = "End frame must be after start frame")]
    fn test_scene_invalid_order() {
        Scene::new(tc(200), tc(100));
    }

    #[test]
    fn test_scenes_from_cuts() {
        let scenes = scenes_from_cuts(&[tc(250), tc(500)], tc(0), tc(1000));

        let bounds: Vec<(u64, u64)> = scenes
            .iter()
            .map(|s| (s.start.frame_number(), s.end.frame_number()))
            .collect();
        assert_eq!(bounds, vec![(0, 250), (250, 500), (500, 1000)]);
    }

    #[test]
    fn test_scenes_from_cuts_empty() {
        let scenes = scenes_from_cuts(&[], tc(10), tc(600));
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].start.frame_number(), 10);
        assert_eq!(scenes[0].end.frame_number(), 600);

        assert!(scenes_from_cuts(&[], tc(0), tc(0)).is_empty());
    }

    #[test]
    fn test_scenes_from_cuts_ignores_boundary_cuts() {
        // A cut at the very start or end would produce an empty scene
        let scenes = scenes_from_cuts(&[tc(0), tc(40), tc(100)], tc(0), tc(100));
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].end.frame_number(), 40);
        assert_eq!(scenes[1].start.frame_number(), 40);
    }

    #[test]
    fn test_error_types() {
        let error = SceneDetectError::config_error("Invalid threshold");
        assert!(matches!(error, SceneDetectError::InvalidConfig { .. }));

        let error = SceneDetectError::frame_error(42, "Processing failed");
        assert!(matches!(error, SceneDetectError::FrameProcessingFailed { frame: 42, .. }));

        let error = SceneDetectError::corrupt_stats(3, "bad row");
        assert!(matches!(error, SceneDetectError::StatsCorrupt { line: 3, .. }));

        let error = SceneDetectError::internal_error("Unexpected condition");
        assert!(matches!(error, SceneDetectError::InternalError { .. }));
    }

    #[test]
    fn test_error_display() {
        let error = SceneDetectError::DuplicateMetric {
            name: "content_val".to_string()
        };
        assert_eq!(error.to_string(), "Metric already registered: content_val");

        let error = SceneDetectError::config_error("Threshold must be positive");
        assert_eq!(error.to_string(), "Invalid configuration: Threshold must be positive");
    }

    #[test]
    fn test_validate_threshold() {
        assert!(validate_threshold("threshold", 27.0).is_ok());
        assert!(validate_threshold("threshold", 0.0).is_ok());
        assert!(validate_threshold("threshold", -1.0).is_err());
        assert!(validate_threshold("threshold", f64::NAN).is_err());
    }
}
