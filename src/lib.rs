//! Frame-accurate scene cut detection
//!
//! This crate finds the frames where one shot ends and the next begins. A
//! [`SceneManager`] reads frames from a [`FrameSource`], runs one or more
//! [`SceneDetector`]s over them and turns the cuts they report into a list of
//! [`Scene`]s. Per-frame metrics are kept in a [`StatsManager`] that can be
//! saved and reloaded so later runs skip the expensive analysis.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use scenecut::{detect, detect_scene_changes, ContentDetector, ImageSequence};
//!
//! // Cut frame numbers with default settings
//! let mut frames = ImageSequence::open("frames/", 24.0)?;
//! let cuts = detect_scene_changes(&mut frames)?;
//! println!("Scene changes at frames: {:?}", cuts);
//!
//! // Scenes with a custom detector
//! let mut frames = ImageSequence::open("frames/", 24.0)?;
//! let scenes = detect(&mut frames, ContentDetector::new(30.0))?;
//! for scene in scenes {
//!     println!("Scene {} - {}", scene.start, scene.end);
//! }
//! # Ok::<(), scenecut::SceneDetectError>(())
//! ```

mod adaptive_detector;
mod common;
mod config;
mod content_detector;
mod detector;
mod flash_filter;
mod hash_detector;
mod histogram_detector;
mod scene_manager;
mod stats_manager;
mod threshold_detector;
mod timecode;
mod video_stream;

// Re-export main types for public API
pub use adaptive_detector::{adaptive_ratio_key, AdaptiveDetector};
pub use common::{scenes_from_cuts, Result, Scene, SceneDetectError};
pub use config::{
    AdaptiveConfig, ContentConfig, DetectionConfig, DetectorConfig, HashConfig, HistogramConfig,
    ThresholdConfig, DETECTOR_NAMES,
};
pub use content_detector::{
    default_kernel_size, rgb_to_hsv, ComponentDeltas, ComponentWeights, ContentDetector,
    DELTA_EDGES_KEY, DELTA_HUE_KEY, DELTA_LUM_KEY, DELTA_SAT_KEY, FRAME_SCORE_KEY,
};
pub use detector::{DetectorDelay, SceneDetector};
pub use flash_filter::{FilterMode, FlashFilter};
pub use hash_detector::{FrameHash, FrameHasher, HashDetector, HASH_DIST_KEY};
pub use histogram_detector::{color_histogram, HistogramDetector, HIST_DIFF_KEY};
pub use scene_manager::{DetectOptions, Downscale, SceneManager};
pub use stats_manager::{MetricId, StatsManager, MAX_STATS_FRAME};
pub use threshold_detector::{
    average_rgb, ThresholdDetector, ThresholdMethod, ThresholdParams, AVERAGE_RGB_KEY, FADE_STATE_KEY,
};
pub use timecode::{FrameTimecode, MAX_FPS_DELTA};
pub use video_stream::{FrameBuffer, FrameSource, ImageSequence};

use tracing::{instrument, info};

/// Run a single detector over a whole source
///
/// # Arguments
/// * `source` - Frames to analyse, read from the current position to the end
/// * `detector` - Detector instance with the desired settings
///
/// # Returns
/// * `Result<Vec<Scene>>` - Scenes covering every processed frame
///
/// # Errors
/// * `FrameProcessingFailed` - If a frame cannot be decoded or analysed
///
/// # Example
/// ```rust,no_run
/// use scenecut::{detect, HistogramDetector, ImageSequence};
///
/// let mut frames = ImageSequence::open("frames/", 25.0)?;
/// let scenes = detect(&mut frames, HistogramDetector::default())?;
///
/// for (i, scene) in scenes.iter().enumerate() {
///     println!("Scene {}: starts at frame {}", i + 1, scene.start.frame_number());
/// }
/// # Ok::<(), scenecut::SceneDetectError>(())
/// ```
#[instrument(skip(source, detector))]
pub fn detect(source: &mut dyn FrameSource, detector: impl SceneDetector + 'static) -> Result<Vec<Scene>> {
    info!("Starting scene detection with {} detector", detector.name());

    let mut manager = SceneManager::new();
    manager.add_detector(Box::new(detector))?;
    manager.detect_scenes(source, &DetectOptions::default())?;

    let scenes = manager.get_scene_list();
    info!("Found {} scenes", scenes.len());
    Ok(scenes)
}

/// Frame numbers of every cut found by a default [`ContentDetector`]
#[instrument(skip(source))]
pub fn detect_scene_changes(source: &mut dyn FrameSource) -> Result<Vec<u64>> {
    let detector = ContentDetector::new(content_detector::DEFAULT_THRESHOLD);
    let scenes = detect(source, detector)?;

    // Every scene after the first starts at a cut
    let frame_numbers: Vec<u64> = scenes
        .iter()
        .skip(1)
        .map(|scene| scene.start.frame_number())
        .collect();

    info!("Extracted {} scene change frame numbers", frame_numbers.len());

    Ok(frame_numbers)
}

/// Initialize tracing for the library
///
/// This function sets up logging/tracing for the scene detection library.
/// Call this once at the start of your application to enable debug output.
///
/// # Arguments
/// * `level` - Tracing level filter (e.g., "debug", "info", "warn", "error")
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Scene detection library initialized with tracing level: {}", level);
}
