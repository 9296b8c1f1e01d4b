//! ContentDetector - HSV-based scene change detection algorithm
//!
//! Detects fast cuts by comparing consecutive frames in the HSV color space
//! (plus an optional edge channel) and thresholding a weighted average of the
//! per-channel differences.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{instrument, debug, trace};
use crate::{
    common::{validate_threshold, Result, SceneDetectError},
    detector::{DetectorDelay, SceneDetector},
    flash_filter::{FlashFilter, FilterMode},
    stats_manager::{MetricId, StatsManager},
    timecode::FrameTimecode,
};

/// Weighted frame score metric
pub const FRAME_SCORE_KEY: &str = "content_val";
pub const DELTA_HUE_KEY: &str = "delta_hue";
pub const DELTA_SAT_KEY: &str = "delta_sat";
pub const DELTA_LUM_KEY: &str = "delta_lum";
pub const DELTA_EDGES_KEY: &str = "delta_edges";

pub(crate) const METRIC_KEYS: [&str; 5] = [
    FRAME_SCORE_KEY,
    DELTA_HUE_KEY,
    DELTA_SAT_KEY,
    DELTA_LUM_KEY,
    DELTA_EDGES_KEY,
];

/// Default threshold on the 0-255 score scale
pub const DEFAULT_THRESHOLD: f64 = 27.0;

/// Default minimum scene length in frames
pub const DEFAULT_MIN_SCENE_LEN: u64 = 15;

/// Component weights for frame score calculation
///
/// These weights determine how much each channel contributes to the
/// final scene change score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentWeights {
    pub delta_hue: f64,
    pub delta_sat: f64,
    pub delta_lum: f64,
    pub delta_edges: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            delta_hue: 1.0,
            delta_sat: 1.0,
            delta_lum: 1.0,
            delta_edges: 0.0,
        }
    }
}

impl ComponentWeights {
    /// Create weights for luma-only detection (brightness changes only)
    pub fn luma_only() -> Self {
        Self {
            delta_hue: 0.0,
            delta_sat: 0.0,
            delta_lum: 1.0,
            delta_edges: 0.0,
        }
    }

    /// Get the sum of absolute weights (for normalization)
    pub fn sum_abs(&self) -> f64 {
        self.delta_hue.abs() + self.delta_sat.abs() + self.delta_lum.abs() + self.delta_edges.abs()
    }

    /// Validate that weights are reasonable
    pub fn validate(&self) -> Result<()> {
        let all = [self.delta_hue, self.delta_sat, self.delta_lum, self.delta_edges];
        if all.iter().any(|w| !w.is_finite()) {
            return Err(SceneDetectError::config_error("Component weights must be finite"));
        }
        if self.sum_abs() <= 0.0 {
            return Err(SceneDetectError::config_error(
                "All component weights cannot be zero"
            ));
        }
        Ok(())
    }
}

/// Per-channel differences between two frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentDeltas {
    pub delta_hue: f64,
    pub delta_sat: f64,
    pub delta_lum: f64,
    pub delta_edges: f64,
}

impl ComponentDeltas {
    /// Weighted average of the deltas
    pub fn score(&self, weights: &ComponentWeights) -> f64 {
        let weighted_sum =
            self.delta_hue * weights.delta_hue +
            self.delta_sat * weights.delta_sat +
            self.delta_lum * weights.delta_lum +
            self.delta_edges * weights.delta_edges;

        weighted_sum / weights.sum_abs()
    }
}

/// Frame data extracted for scene detection analysis
#[derive(Debug)]
struct FrameData {
    width: u32,
    height: u32,
    hue: Vec<u8>,
    sat: Vec<u8>,
    lum: Vec<u8>,
    edges: Option<Vec<u8>>,
}

impl FrameData {
    /// Split an RGB frame into HSV planes, with an edge plane when `edge_kernel` is set
    fn from_rgb_frame(frame: &RgbImage, edge_kernel: Option<usize>) -> Self {
        let pixels = (frame.width() * frame.height()) as usize;
        let mut hue = Vec::with_capacity(pixels);
        let mut sat = Vec::with_capacity(pixels);
        let mut lum = Vec::with_capacity(pixels);

        for pixel in frame.pixels() {
            let [r, g, b] = pixel.0;
            let (h, s, v) = rgb_to_hsv(r, g, b);
            hue.push(h);
            sat.push(s);
            lum.push(v);
        }

        let edges = edge_kernel.map(|kernel| {
            detect_edges(&lum, frame.width() as usize, frame.height() as usize, kernel)
        });

        Self {
            width: frame.width(),
            height: frame.height(),
            hue,
            sat,
            lum,
            edges,
        }
    }

    fn same_size(&self, other: &FrameData) -> bool {
        self.width == other.width && self.height == other.height
    }

    fn deltas(&self, previous: &FrameData) -> ComponentDeltas {
        let delta_edges = match (&self.edges, &previous.edges) {
            (Some(current), Some(last)) => mean_pixel_distance(current, last),
            _ => 0.0,
        };

        ComponentDeltas {
            delta_hue: mean_pixel_distance(&self.hue, &previous.hue),
            delta_sat: mean_pixel_distance(&self.sat, &previous.sat),
            delta_lum: mean_pixel_distance(&self.lum, &previous.lum),
            delta_edges,
        }
    }
}

/// Convert one RGB pixel to 8-bit HSV
///
/// Hue is in `[0, 180)` (degrees halved), saturation and value in `[0, 255]`.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = (max - min) as f32;

    let sat = if max == 0 {
        0
    } else {
        ((diff * 255.0) / max as f32).round() as u8
    };

    let hue = if diff == 0.0 {
        0
    } else {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let mut degrees = if max as f32 == r {
            60.0 * (g - b) / diff
        } else if max as f32 == g {
            120.0 + 60.0 * (b - r) / diff
        } else {
            240.0 + 60.0 * (r - g) / diff
        };
        if degrees < 0.0 {
            degrees += 360.0;
        }
        ((degrees / 2.0).round() as u16 % 180) as u8
    };

    (hue, sat, max)
}

/// Default dilation kernel for a frame: grows with resolution, always odd
pub fn default_kernel_size(width: u32, height: u32) -> usize {
    let size = 4 + ((width as f64 * height as f64).sqrt() / 192.0).round() as usize;
    if size % 2 == 0 { size + 1 } else { size }
}

/// Binary edge map (0 or 255) of a luma plane, dilated by a square kernel
///
/// Gradients come from a 3x3 Sobel operator. Pixels whose gradient magnitude
/// reaches the high threshold are edges, as are pixels above the low threshold
/// touching one. Both thresholds are derived from the median luma.
fn detect_edges(lum: &[u8], width: usize, height: usize, kernel_size: usize) -> Vec<u8> {
    let mut edges = vec![0u8; lum.len()];
    if width < 3 || height < 3 {
        return edges;
    }

    let median = median_u8(lum) as f64;
    let sigma = 1.0 / 3.0;
    let low = ((1.0 - sigma) * median).max(0.0) as u32;
    let high = ((1.0 + sigma) * median).min(255.0) as u32;

    let mut magnitude = vec![0u32; lum.len()];
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let at = |dx: usize, dy: usize| lum[(y + dy - 1) * width + (x + dx - 1)] as i32;
            let gx = (at(2, 0) + 2 * at(2, 1) + at(2, 2)) - (at(0, 0) + 2 * at(0, 1) + at(0, 2));
            let gy = (at(0, 2) + 2 * at(1, 2) + at(2, 2)) - (at(0, 0) + 2 * at(1, 0) + at(2, 0));
            magnitude[y * width + x] = (gx.abs() + gy.abs()) as u32;
        }
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let m = magnitude[y * width + x];
            if m == 0 || m < low {
                continue;
            }
            let strong = m >= high || (y - 1..=y + 1).any(|ny| {
                (x - 1..=x + 1).any(|nx| magnitude[ny * width + nx] >= high.max(1))
            });
            if strong {
                edges[y * width + x] = 255;
            }
        }
    }

    dilate(&edges, width, height, kernel_size)
}

/// Square max filter, applied as a horizontal then a vertical pass
fn dilate(plane: &[u8], width: usize, height: usize, kernel_size: usize) -> Vec<u8> {
    let radius = kernel_size / 2;
    if radius == 0 {
        return plane.to_vec();
    }

    let mut horizontal = vec![0u8; plane.len()];
    for y in 0..height {
        let row = &plane[y * width..(y + 1) * width];
        for x in 0..width {
            let start = x.saturating_sub(radius);
            let end = (x + radius).min(width - 1);
            horizontal[y * width + x] = row[start..=end].iter().copied().max().unwrap_or(0);
        }
    }

    let mut output = vec![0u8; plane.len()];
    for y in 0..height {
        let start = y.saturating_sub(radius);
        let end = (y + radius).min(height - 1);
        for x in 0..width {
            output[y * width + x] = (start..=end).map(|ny| horizontal[ny * width + x]).max().unwrap_or(0);
        }
    }
    output
}

fn median_u8(values: &[u8]) -> u8 {
    let mut histogram = [0usize; 256];
    for v in values {
        histogram[*v as usize] += 1;
    }
    let half = values.len() / 2;
    let mut seen = 0;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > half {
            return value as u8;
        }
    }
    0
}

/// Calculate mean absolute difference between two single-channel planes
fn mean_pixel_distance(left: &[u8], right: &[u8]) -> f64 {
    if left.is_empty() {
        return 0.0;
    }
    let sum: u64 = left
        .iter()
        .zip(right)
        .map(|(a, b)| (*a as i32 - *b as i32).unsigned_abs() as u64)
        .sum();
    sum as f64 / left.len() as f64
}

/// ContentDetector - detects scene changes using HSV color space analysis
///
/// This detector compares consecutive frames in the HSV color space and
/// calculates a weighted score based on the differences in hue, saturation,
/// luminance and (optionally) edges. When this score reaches the threshold a
/// candidate cut is passed through the [`FlashFilter`].
pub struct ContentDetector {
    threshold: f64,
    weights: ComponentWeights,
    kernel_size: Option<usize>,
    last_frame_data: Option<FrameData>,
    /// Frame whose score came from the stats cache; converted only if the next frame needs it
    pending_frame: Option<RgbImage>,
    metric_ids: Option<[MetricId; 5]>,
    flash_filter: FlashFilter,
    frame_count: u64,
}

impl ContentDetector {
    /// Create a new ContentDetector with default settings
    ///
    /// # Arguments
    /// * `threshold` - Score threshold for detecting scene changes (default: 27.0)
    ///
    /// # Panics
    /// Panics if threshold is negative (fail-fast approach)
    #[instrument]
    pub fn new(threshold: f64) -> Self {
        assert!(threshold >= 0.0, "Threshold must be non-negative, got: {}", threshold);

        debug!("Created ContentDetector with threshold: {}", threshold);

        Self::build(threshold, ComponentWeights::default(), FlashFilter::new(DEFAULT_MIN_SCENE_LEN))
    }

    /// Create a ContentDetector with custom settings
    ///
    /// # Arguments
    /// * `threshold` - Score threshold for detecting scene changes
    /// * `weights` - Component weights for score calculation
    /// * `min_scene_length` - Minimum frames between scene cuts
    /// * `filter_mode` - Flash filter mode (Merge or Suppress)
    #[instrument(skip(weights))]
    pub fn new_with_config(
        threshold: f64,
        weights: ComponentWeights,
        min_scene_length: u64,
        filter_mode: FilterMode,
    ) -> Result<Self> {
        validate_threshold("Threshold", threshold)?;
        weights.validate()?;

        debug!("Created ContentDetector with custom config: threshold={}, min_scene_length={}, mode={:?}",
               threshold, min_scene_length, filter_mode);

        Ok(Self::build(threshold, weights, FlashFilter::new_with_mode(filter_mode, min_scene_length)))
    }

    /// Create a luma-only ContentDetector (brightness changes only)
    ///
    /// This is useful for black and white videos or when color information
    /// is not reliable for scene detection.
    #[instrument]
    pub fn new_luma_only(threshold: f64) -> Self {
        assert!(threshold >= 0.0, "Threshold must be non-negative");

        debug!("Created luma-only ContentDetector with threshold: {}", threshold);

        Self::build(threshold, ComponentWeights::luma_only(), FlashFilter::new(DEFAULT_MIN_SCENE_LEN))
    }

    fn build(threshold: f64, weights: ComponentWeights, flash_filter: FlashFilter) -> Self {
        Self {
            threshold,
            weights,
            kernel_size: None,
            last_frame_data: None,
            pending_frame: None,
            metric_ids: None,
            flash_filter,
            frame_count: 0,
        }
    }

    /// Use a fixed dilation kernel for the edge channel instead of one sized from the frame
    pub fn with_kernel_size(mut self, kernel_size: Option<usize>) -> Result<Self> {
        if let Some(size) = kernel_size {
            if size < 3 || size % 2 == 0 {
                return Err(SceneDetectError::config_error(
                    format!("Kernel size must be odd and at least 3, got: {}", size)
                ));
            }
        }
        self.kernel_size = kernel_size;
        Ok(self)
    }

    /// Compute the content score of a frame without applying the flash filter
    ///
    /// Returns `None` when there is nothing to compare against (first frame).
    /// Scores already present in `stats` are reused.
    pub(crate) fn score_frame(
        &mut self,
        timecode: FrameTimecode,
        frame: &RgbImage,
        stats: &mut StatsManager,
    ) -> Result<Option<f64>> {
        let frame_number = timecode.frame_number();
        let ids = self.resolve_metric_ids(stats);

        if let Some(score) = stats.get_by_id(frame_number, ids[0]) {
            trace!("Frame {} score {:.3} read from stats cache", frame_number, score);
            self.last_frame_data = None;
            self.pending_frame = Some(frame.clone());
            return Ok(Some(score));
        }

        let edge_kernel = self.edge_kernel(frame);
        let current_data = FrameData::from_rgb_frame(frame, edge_kernel);

        let previous = match self.last_frame_data.take() {
            Some(data) => Some(data),
            None => self
                .pending_frame
                .take()
                .map(|pending| FrameData::from_rgb_frame(&pending, edge_kernel)),
        };
        self.pending_frame = None;

        let score = match previous {
            Some(last_data) => {
                if !current_data.same_size(&last_data) {
                    return Err(SceneDetectError::frame_error(
                        frame_number,
                        format!("Frame size changed from {}x{} to {}x{}",
                                last_data.width, last_data.height, current_data.width, current_data.height),
                    ));
                }

                let deltas = current_data.deltas(&last_data);
                let final_score = deltas.score(&self.weights);

                trace!("Frame {} components: hue={:.3}, sat={:.3}, lum={:.3}, edges={:.3}, final={:.3}",
                       frame_number, deltas.delta_hue, deltas.delta_sat, deltas.delta_lum,
                       deltas.delta_edges, final_score);

                stats.set_by_id(frame_number, ids[0], final_score);
                stats.set_by_id(frame_number, ids[1], deltas.delta_hue);
                stats.set_by_id(frame_number, ids[2], deltas.delta_sat);
                stats.set_by_id(frame_number, ids[3], deltas.delta_lum);
                if edge_kernel.is_some() {
                    stats.set_by_id(frame_number, ids[4], deltas.delta_edges);
                }

                Some(final_score)
            }
            None => {
                debug!("First frame ({}), no score", frame_number);
                None
            }
        };

        // Store current frame data for next comparison
        self.last_frame_data = Some(current_data);

        Ok(score)
    }

    fn resolve_metric_ids(&mut self, stats: &mut StatsManager) -> [MetricId; 5] {
        if let Some(ids) = self.metric_ids {
            return ids;
        }
        let ids = METRIC_KEYS.map(|key| stats.metric_id_or_insert(key));
        self.metric_ids = Some(ids);
        ids
    }

    fn edge_kernel(&self, frame: &RgbImage) -> Option<usize> {
        if self.weights.delta_edges == 0.0 {
            return None;
        }
        Some(self.kernel_size.unwrap_or_else(|| default_kernel_size(frame.width(), frame.height())))
    }

    /// Get the current threshold setting
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Get the current component weights
    pub fn weights(&self) -> &ComponentWeights {
        &self.weights
    }

    /// Get the number of frames processed so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the minimum scene length setting from the flash filter
    pub fn min_scene_length(&self) -> u64 {
        self.flash_filter.min_scene_length()
    }

    /// Reset the detector state (useful for processing multiple videos)
    pub fn reset(&mut self) {
        debug!("Resetting ContentDetector state");
        self.last_frame_data = None;
        self.pending_frame = None;
        self.metric_ids = None;
        self.flash_filter.reset();
        self.frame_count = 0;
    }
}

impl SceneDetector for ContentDetector {
    fn name(&self) -> &'static str {
        "content"
    }

    fn metric_keys(&self) -> Vec<String> {
        METRIC_KEYS.iter().map(|k| k.to_string()).collect()
    }

    fn process_frame(
        &mut self,
        timecode: FrameTimecode,
        frame: &RgbImage,
        stats: &mut StatsManager,
    ) -> Result<Vec<FrameTimecode>> {
        self.frame_count += 1;

        let frame_score = self.score_frame(timecode, frame, stats)?;
        let above_threshold = frame_score.map_or(false, |score| score >= self.threshold);

        trace!("Frame {} score: {:?} (threshold: {})",
               timecode.frame_number(), frame_score, self.threshold);

        Ok(self.flash_filter.filter(timecode, above_threshold))
    }

    fn post_process(
        &mut self,
        _last_timecode: FrameTimecode,
        _stats: &mut StatsManager,
    ) -> Result<Vec<FrameTimecode>> {
        Ok(self.flash_filter.flush())
    }

    fn max_delay(&self) -> DetectorDelay {
        DetectorDelay::Frames(self.flash_filter.max_delay())
    }
}

// Implement Debug manually to avoid dumping frame planes
impl std::fmt::Debug for ContentDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentDetector")
            .field("threshold", &self.threshold)
            .field("weights", &self.weights)
            .field("kernel_size", &self.kernel_size)
            .field("frame_count", &self.frame_count)
            .field("has_last_frame", &self.last_frame_data.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn create_test_frame(width: u32, height: u32, color: (u8, u8, u8)) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([color.0, color.1, color.2]))
    }

    fn create_timecode(frame: u64) -> FrameTimecode {
        FrameTimecode::new(frame, 25.0)
    }

    #[test]
    fn test_content_detector_creation() {
        let detector = ContentDetector::new(27.0);
        assert_eq!(detector.threshold(), 27.0);
        assert_eq!(detector.frame_count(), 0);
        assert_eq!(detector.min_scene_length(), 15);

        let weights = detector.weights();
        assert_eq!(weights.delta_hue, 1.0);
        assert_eq!(weights.delta_sat, 1.0);
        assert_eq!(weights.delta_lum, 1.0);
        assert_eq!(weights.delta_edges, 0.0);
        assert_eq!(detector.metric_keys().len(), 5);
    }

    #[test]
    #[should_panic(expected = "Threshold must be non-negative")]
    fn test_content_detector_negative_threshold() {
        ContentDetector::new(-1.0);
    }

    #[test]
    fn test_content_detector_luma_only() {
        let detector = ContentDetector::new_luma_only(30.0);
        assert_eq!(detector.weights(), &ComponentWeights::luma_only());
    }

    #[test]
    fn test_component_weights() {
        let weights = ComponentWeights::default();
        assert_eq!(weights.sum_abs(), 3.0);

        let luma_weights = ComponentWeights::luma_only();
        assert_eq!(luma_weights.sum_abs(), 1.0);

        let zero_weights = ComponentWeights {
            delta_hue: 0.0,
            delta_sat: 0.0,
            delta_lum: 0.0,
            delta_edges: 0.0,
        };
        assert!(zero_weights.validate().is_err());

        let valid_weights = ComponentWeights {
            delta_hue: 0.5,
            delta_sat: 0.3,
            delta_lum: 0.2,
            delta_edges: 0.0,
        };
        assert!(valid_weights.validate().is_ok());
    }

    #[test]
    fn test_content_detector_custom_config() {
        let weights = ComponentWeights {
            delta_hue: 0.5,
            delta_sat: 0.3,
            delta_lum: 0.2,
            delta_edges: 0.0,
        };

        let detector = ContentDetector::new_with_config(
            30.0, weights.clone(), 20, FilterMode::Merge
        ).unwrap();

        assert_eq!(detector.threshold(), 30.0);
        assert_eq!(detector.min_scene_length(), 20);
        assert_eq!(detector.weights(), &weights);
        assert_eq!(detector.max_delay(), DetectorDelay::Frames(20));

        assert!(ContentDetector::new_with_config(-2.0, ComponentWeights::default(), 20, FilterMode::Merge).is_err());
    }

    #[test]
    fn test_kernel_size_validation() {
        assert!(ContentDetector::new(27.0).with_kernel_size(Some(5)).is_ok());
        assert!(ContentDetector::new(27.0).with_kernel_size(Some(4)).is_err());
        assert!(ContentDetector::new(27.0).with_kernel_size(Some(1)).is_err());
        assert!(ContentDetector::new(27.0).with_kernel_size(None).is_ok());

        assert_eq!(default_kernel_size(1920, 1080), 13);
        assert_eq!(default_kernel_size(64, 64), 5);
    }

    #[test]
    fn test_rgb_to_hsv() {
        assert_eq!(rgb_to_hsv(0, 0, 0), (0, 0, 0));
        assert_eq!(rgb_to_hsv(255, 255, 255), (0, 0, 255));
        assert_eq!(rgb_to_hsv(255, 0, 0), (0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), (60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), (120, 255, 255));
        assert_eq!(rgb_to_hsv(128, 64, 64).2, 128);
    }

    #[test]
    fn test_frame_processing_basic() {
        let mut detector = ContentDetector::new(27.0);
        let mut stats = StatsManager::new();
        let black = create_test_frame(16, 16, (0, 0, 0));
        let white = create_test_frame(16, 16, (255, 255, 255));

        // First frame should not produce a cut
        let cuts = detector.process_frame(create_timecode(0), &black, &mut stats).unwrap();
        assert!(cuts.is_empty());

        let cuts = detector.process_frame(create_timecode(1), &black, &mut stats).unwrap();
        assert!(cuts.is_empty());
        assert_eq!(stats.get_metrics(1, &[FRAME_SCORE_KEY]), vec![Some(0.0)]);

        // Black to white is a pure luma change: 255 / 3
        let cuts = detector.process_frame(create_timecode(2), &white, &mut stats).unwrap();
        assert_eq!(cuts.len(), 1);
        assert_eq!(cuts[0].frame_number(), 2);
        assert_eq!(stats.get_metrics(2, &[FRAME_SCORE_KEY, DELTA_LUM_KEY]), vec![Some(85.0), Some(255.0)]);
        assert_eq!(detector.frame_count(), 3);
    }

    #[test]
    fn test_luma_only_scoring() {
        let mut detector = ContentDetector::new_luma_only(100.0);
        let mut stats = StatsManager::new();

        detector.process_frame(create_timecode(0), &create_test_frame(8, 8, (0, 0, 0)), &mut stats).unwrap();
        let cuts = detector
            .process_frame(create_timecode(1), &create_test_frame(8, 8, (255, 255, 255)), &mut stats)
            .unwrap();
        assert_eq!(cuts.len(), 1);
        assert_eq!(stats.get_metrics(1, &[FRAME_SCORE_KEY]), vec![Some(255.0)]);
    }

    #[test]
    fn test_cached_scores_are_reused() {
        let mut detector = ContentDetector::new(27.0);
        let mut stats = StatsManager::new();
        stats.set_metrics(1, &[(FRAME_SCORE_KEY, 200.0)]).unwrap();

        let gray = create_test_frame(8, 8, (90, 90, 90));
        detector.process_frame(create_timecode(0), &gray, &mut stats).unwrap();

        // Identical frame, but the cached score says otherwise
        let cuts = detector.process_frame(create_timecode(1), &gray, &mut stats).unwrap();
        assert_eq!(cuts.len(), 1);

        // Frame 2 is compared against the cached frame 1 image
        let cuts = detector.process_frame(create_timecode(2), &gray, &mut stats).unwrap();
        assert!(cuts.is_empty());
        assert_eq!(stats.get_metrics(2, &[FRAME_SCORE_KEY]), vec![Some(0.0)]);
    }

    #[test]
    fn test_edges_channel() {
        let weights = ComponentWeights { delta_hue: 0.0, delta_sat: 0.0, delta_lum: 0.0, delta_edges: 1.0 };
        let mut detector = ContentDetector::new_with_config(1.0, weights, 0, FilterMode::Suppress)
            .unwrap()
            .with_kernel_size(Some(3))
            .unwrap();
        let mut stats = StatsManager::new();

        let flat = create_test_frame(32, 32, (60, 60, 60));
        let mut striped = flat.clone();
        for y in 0..32 {
            for x in 16..32 {
                striped.put_pixel(x, y, Rgb([200, 200, 200]));
            }
        }

        detector.process_frame(create_timecode(0), &flat, &mut stats).unwrap();
        let cuts = detector.process_frame(create_timecode(1), &striped, &mut stats).unwrap();
        assert_eq!(cuts.len(), 1);

        let edges = stats.get_metrics(1, &[DELTA_EDGES_KEY])[0].unwrap();
        assert!(edges > 0.0);
        assert!(edges < 255.0);
    }

    #[test]
    fn test_frame_size_change_is_error() {
        let mut detector = ContentDetector::new(27.0);
        let mut stats = StatsManager::new();
        detector.process_frame(create_timecode(0), &create_test_frame(8, 8, (0, 0, 0)), &mut stats).unwrap();
        let result = detector.process_frame(create_timecode(1), &create_test_frame(4, 4, (0, 0, 0)), &mut stats);
        assert!(matches!(result, Err(SceneDetectError::FrameProcessingFailed { frame: 1, .. })));
    }

    #[test]
    fn test_detector_reset() {
        let mut detector = ContentDetector::new(27.0);
        let mut stats = StatsManager::new();
        detector.process_frame(create_timecode(0), &create_test_frame(4, 4, (1, 2, 3)), &mut stats).unwrap();
        assert_eq!(detector.frame_count(), 1);

        detector.reset();
        assert_eq!(detector.frame_count(), 0);
    }

    #[test]
    fn test_debug_formatting() {
        let detector = ContentDetector::new(27.0);
        let debug_str = format!("{:?}", detector);
        assert!(debug_str.contains("ContentDetector"));
        assert!(debug_str.contains("threshold"));
        assert!(debug_str.contains("27"));
    }
}
