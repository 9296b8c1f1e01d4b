//! AdaptiveDetector - rolling-average variant of the content detector
//!
//! Each frame's content score is compared to the mean score of its neighbours
//! instead of a fixed threshold, which copes better with fast camera motion.
//! Because the window looks ahead, the detector keeps the score of every
//! processed frame and only decides on cuts in [`SceneDetector::post_process`].

use image::RgbImage;
use tracing::{debug, info, instrument, trace};
use crate::{
    common::{validate_threshold, Result, SceneDetectError},
    content_detector::{ComponentWeights, ContentDetector, METRIC_KEYS},
    detector::{DetectorDelay, SceneDetector},
    flash_filter::FilterMode,
    stats_manager::StatsManager,
    timecode::FrameTimecode,
};

/// Ratio reported when the window average is zero but the frame itself scored
const MAX_ADAPTIVE_RATIO: f64 = 255.0;

/// Window averages below this are treated as zero
const MIN_WINDOW_AVERAGE: f64 = 0.00001;

pub const DEFAULT_ADAPTIVE_THRESHOLD: f64 = 3.0;
pub const DEFAULT_WINDOW_WIDTH: usize = 2;
pub const DEFAULT_MIN_CONTENT_VAL: f64 = 15.0;

/// Name of the ratio metric for a given window width
pub fn adaptive_ratio_key(window_width: usize) -> String {
    format!("adaptive_ratio (w={})", window_width)
}

pub struct AdaptiveDetector {
    content: ContentDetector,
    adaptive_threshold: f64,
    min_scene_length: u64,
    window_width: usize,
    min_content_val: f64,
    ratio_key: String,
    scores: Vec<(FrameTimecode, f64)>,
}

impl AdaptiveDetector {
    /// Create an AdaptiveDetector
    ///
    /// # Arguments
    /// * `adaptive_threshold` - Minimum ratio of a frame's score to its window average
    /// * `min_scene_length` - Minimum frames between scene cuts
    /// * `window_width` - Frames on each side of the frame used for the average
    /// * `min_content_val` - Minimum raw content score for a cut
    /// * `weights` - Component weights for the content score
    #[instrument(skip(weights))]
    pub fn new(
        adaptive_threshold: f64,
        min_scene_length: u64,
        window_width: usize,
        min_content_val: f64,
        weights: ComponentWeights,
    ) -> Result<Self> {
        validate_threshold("Adaptive threshold", adaptive_threshold)?;
        validate_threshold("Minimum content value", min_content_val)?;
        if window_width == 0 {
            return Err(SceneDetectError::config_error("Window width must be at least 1"));
        }

        // The inner detector only scores frames; its flash filter is never consulted
        let content = ContentDetector::new_with_config(0.0, weights, 0, FilterMode::Suppress)?;

        debug!("Created AdaptiveDetector: threshold={}, window_width={}, min_content_val={}",
               adaptive_threshold, window_width, min_content_val);

        Ok(Self {
            content,
            adaptive_threshold,
            min_scene_length,
            window_width,
            min_content_val,
            ratio_key: adaptive_ratio_key(window_width),
            scores: Vec::new(),
        })
    }

    /// Use a fixed dilation kernel for the edge channel
    pub fn with_kernel_size(mut self, kernel_size: Option<usize>) -> Result<Self> {
        self.content = self.content.with_kernel_size(kernel_size)?;
        Ok(self)
    }

    pub fn adaptive_threshold(&self) -> f64 {
        self.adaptive_threshold
    }

    pub fn window_width(&self) -> usize {
        self.window_width
    }

    pub fn min_scene_length(&self) -> u64 {
        self.min_scene_length
    }

    /// Number of frame scores retained for the final pass
    pub fn buffered_frames(&self) -> usize {
        self.scores.len()
    }

    /// Ratio of `score` to the mean of its neighbours (the window without the centre)
    fn adaptive_ratio(&self, window: &[(FrameTimecode, f64)], score: f64) -> f64 {
        let neighbours: f64 = window
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.window_width)
            .map(|(_, (_, s))| s)
            .sum();
        let average = neighbours / (2 * self.window_width) as f64;

        if average.abs() >= MIN_WINDOW_AVERAGE {
            (score / average).min(MAX_ADAPTIVE_RATIO)
        } else if score >= self.min_content_val {
            MAX_ADAPTIVE_RATIO
        } else {
            0.0
        }
    }
}

impl Default for AdaptiveDetector {
    fn default() -> Self {
        Self {
            content: ContentDetector::new(0.0),
            adaptive_threshold: DEFAULT_ADAPTIVE_THRESHOLD,
            min_scene_length: crate::content_detector::DEFAULT_MIN_SCENE_LEN,
            window_width: DEFAULT_WINDOW_WIDTH,
            min_content_val: DEFAULT_MIN_CONTENT_VAL,
            ratio_key: adaptive_ratio_key(DEFAULT_WINDOW_WIDTH),
            scores: Vec::new(),
        }
    }
}

impl SceneDetector for AdaptiveDetector {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn metric_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = METRIC_KEYS.iter().map(|k| k.to_string()).collect();
        keys.push(self.ratio_key.clone());
        keys
    }

    fn process_frame(
        &mut self,
        timecode: FrameTimecode,
        frame: &RgbImage,
        stats: &mut StatsManager,
    ) -> Result<Vec<FrameTimecode>> {
        let score = self.content.score_frame(timecode, frame, stats)?.unwrap_or(0.0);
        self.scores.push((timecode, score));
        Ok(Vec::new())
    }

    #[instrument(skip(self, stats))]
    fn post_process(
        &mut self,
        last_timecode: FrameTimecode,
        stats: &mut StatsManager,
    ) -> Result<Vec<FrameTimecode>> {
        let scores = std::mem::take(&mut self.scores);
        let span = 2 * self.window_width + 1;
        if scores.len() < span {
            debug!("Only {} frames buffered, need {} for a full window", scores.len(), span);
            return Ok(Vec::new());
        }

        let ratio_id = stats.metric_id_or_insert(&self.ratio_key);
        let mut cuts = Vec::new();
        let mut last_cut: Option<FrameTimecode> = None;

        for window in scores.windows(span) {
            let (timecode, score) = window[self.window_width];
            let ratio = self.adaptive_ratio(window, score);
            stats.set_by_id(timecode.frame_number(), ratio_id, ratio);

            trace!("Frame {} adaptive ratio {:.3} (score {:.3})", timecode.frame_number(), ratio, score);

            let threshold_met = ratio >= self.adaptive_threshold && score >= self.min_content_val;
            let min_length_met = last_cut.map_or(true, |last| {
                timecode.frame_number().saturating_sub(last.frame_number()) >= self.min_scene_length
            });

            if threshold_met && min_length_met {
                debug!("Scene cut at frame {} (ratio {:.3})", timecode.frame_number(), ratio);
                cuts.push(timecode);
                last_cut = Some(timecode);
            }
        }

        info!("Adaptive pass over {} frames found {} cuts", scores.len(), cuts.len());
        Ok(cuts)
    }

    fn max_delay(&self) -> DetectorDelay {
        DetectorDelay::FullSequence
    }
}

impl std::fmt::Debug for AdaptiveDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveDetector")
            .field("adaptive_threshold", &self.adaptive_threshold)
            .field("min_scene_length", &self.min_scene_length)
            .field("window_width", &self.window_width)
            .field("min_content_val", &self.min_content_val)
            .field("buffered_frames", &self.scores.len())
            .finish()
    }
}
