//! Detection configuration files
//!
//! A [`DetectionConfig`] is plain data read from JSON. It describes which
//! detectors to run and with which parameters; [`DetectionConfig::build_detectors`]
//! turns it into detector instances once the framerate of the source is known.
//!
//! ```json
//! {
//!   "min_scene_len": "0.6s",
//!   "detectors": [
//!     { "type": "content", "threshold": 30.0 },
//!     { "type": "threshold", "fade_bias": 0.5, "min_scene_len": "24" }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use crate::{
    adaptive_detector::AdaptiveDetector,
    common::{Result, SceneDetectError},
    content_detector::{ComponentWeights, ContentDetector},
    detector::SceneDetector,
    flash_filter::FilterMode,
    hash_detector::HashDetector,
    histogram_detector::HistogramDetector,
    scene_manager::{DetectOptions, Downscale},
    threshold_detector::{ThresholdDetector, ThresholdMethod, ThresholdParams},
    timecode::FrameTimecode,
};

/// Minimum scene length used when neither the file nor a detector sets one
pub const DEFAULT_MIN_SCENE_LEN: &str = "0.6s";

/// Names accepted for the `type` field
pub const DETECTOR_NAMES: [&str; 5] = ["content", "adaptive", "threshold", "hash", "histogram"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Any timecode string: frames (`"15"`), seconds (`"0.6s"`) or clock time
    pub min_scene_len: String,
    pub frame_skip: u32,
    /// Fixed downscale factor; absent means automatic, 0 or 1 disables it
    pub downscale: Option<u32>,
    pub detectors: Vec<DetectorConfig>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_scene_len: DEFAULT_MIN_SCENE_LEN.to_string(),
            frame_skip: 0,
            downscale: None,
            detectors: vec![DetectorConfig::Content(ContentConfig::default())],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectorConfig {
    Content(ContentConfig),
    Adaptive(AdaptiveConfig),
    Threshold(ThresholdConfig),
    Hash(HashConfig),
    Histogram(HistogramConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub threshold: f64,
    pub weights: ComponentWeights,
    pub luma_only: bool,
    pub kernel_size: Option<usize>,
    pub filter_mode: FilterMode,
    pub min_scene_len: Option<String>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            threshold: crate::content_detector::DEFAULT_THRESHOLD,
            weights: ComponentWeights::default(),
            luma_only: false,
            kernel_size: None,
            filter_mode: FilterMode::default(),
            min_scene_len: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub adaptive_threshold: f64,
    pub window_width: usize,
    pub min_content_val: f64,
    pub weights: ComponentWeights,
    pub luma_only: bool,
    pub kernel_size: Option<usize>,
    pub min_scene_len: Option<String>,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            adaptive_threshold: crate::adaptive_detector::DEFAULT_ADAPTIVE_THRESHOLD,
            window_width: crate::adaptive_detector::DEFAULT_WINDOW_WIDTH,
            min_content_val: crate::adaptive_detector::DEFAULT_MIN_CONTENT_VAL,
            weights: ComponentWeights::default(),
            luma_only: false,
            kernel_size: None,
            min_scene_len: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub threshold: f64,
    pub min_percent: f64,
    pub fade_bias: f64,
    pub add_final_scene: bool,
    pub block_size: usize,
    pub method: ThresholdMethod,
    pub min_scene_len: Option<String>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        let params = ThresholdParams::default();
        Self {
            threshold: params.threshold,
            min_percent: params.min_percent,
            fade_bias: params.fade_bias,
            add_final_scene: params.add_final_scene,
            block_size: params.block_size,
            method: params.method,
            min_scene_len: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    pub threshold: f64,
    pub size: u32,
    pub lowpass: u32,
    pub min_scene_len: Option<String>,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            threshold: crate::hash_detector::DEFAULT_THRESHOLD,
            size: crate::hash_detector::DEFAULT_SIZE,
            lowpass: crate::hash_detector::DEFAULT_LOWPASS,
            min_scene_len: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    pub threshold: f64,
    pub bits: u32,
    pub min_scene_len: Option<String>,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            threshold: crate::histogram_detector::DEFAULT_THRESHOLD,
            bits: crate::histogram_detector::DEFAULT_BITS,
            min_scene_len: None,
        }
    }
}

impl DetectorConfig {
    /// Default settings for the detector called `name`
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "content" => DetectorConfig::Content(ContentConfig::default()),
            "adaptive" => DetectorConfig::Adaptive(AdaptiveConfig::default()),
            "threshold" => DetectorConfig::Threshold(ThresholdConfig::default()),
            "hash" => DetectorConfig::Hash(HashConfig::default()),
            "histogram" => DetectorConfig::Histogram(HistogramConfig::default()),
            other => {
                return Err(SceneDetectError::config_error(format!(
                    "Unknown detector '{}', expected one of: {}",
                    other,
                    DETECTOR_NAMES.join(", ")
                )))
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            DetectorConfig::Content(_) => "content",
            DetectorConfig::Adaptive(_) => "adaptive",
            DetectorConfig::Threshold(_) => "threshold",
            DetectorConfig::Hash(_) => "hash",
            DetectorConfig::Histogram(_) => "histogram",
        }
    }

    /// Replace the main threshold of the detector
    pub fn set_threshold(&mut self, threshold: f64) {
        match self {
            DetectorConfig::Content(c) => c.threshold = threshold,
            DetectorConfig::Adaptive(c) => c.adaptive_threshold = threshold,
            DetectorConfig::Threshold(c) => c.threshold = threshold,
            DetectorConfig::Hash(c) => c.threshold = threshold,
            DetectorConfig::Histogram(c) => c.threshold = threshold,
        }
    }

    /// Set the per-detector minimum scene length
    pub fn set_min_scene_len(&mut self, min_scene_len: impl Into<String>) {
        let value = Some(min_scene_len.into());
        match self {
            DetectorConfig::Content(c) => c.min_scene_len = value,
            DetectorConfig::Adaptive(c) => c.min_scene_len = value,
            DetectorConfig::Threshold(c) => c.min_scene_len = value,
            DetectorConfig::Hash(c) => c.min_scene_len = value,
            DetectorConfig::Histogram(c) => c.min_scene_len = value,
        }
    }

    fn min_scene_len(&self) -> Option<&str> {
        match self {
            DetectorConfig::Content(c) => c.min_scene_len.as_deref(),
            DetectorConfig::Adaptive(c) => c.min_scene_len.as_deref(),
            DetectorConfig::Threshold(c) => c.min_scene_len.as_deref(),
            DetectorConfig::Hash(c) => c.min_scene_len.as_deref(),
            DetectorConfig::Histogram(c) => c.min_scene_len.as_deref(),
        }
    }

    /// Build the detector, with `min_scene_length` in frames unless overridden
    pub fn build(&self, fps: f64, min_scene_length: u64) -> Result<Box<dyn SceneDetector>> {
        let min_scene_length = match self.min_scene_len() {
            Some(text) => FrameTimecode::parse(text, fps)?.frame_number(),
            None => min_scene_length,
        };

        let detector: Box<dyn SceneDetector> = match self {
            DetectorConfig::Content(c) => {
                let weights = if c.luma_only { ComponentWeights::luma_only() } else { c.weights.clone() };
                Box::new(
                    ContentDetector::new_with_config(c.threshold, weights, min_scene_length, c.filter_mode)?
                        .with_kernel_size(c.kernel_size)?,
                )
            }
            DetectorConfig::Adaptive(c) => {
                let weights = if c.luma_only { ComponentWeights::luma_only() } else { c.weights.clone() };
                Box::new(
                    AdaptiveDetector::new(
                        c.adaptive_threshold,
                        min_scene_length,
                        c.window_width,
                        c.min_content_val,
                        weights,
                    )?
                    .with_kernel_size(c.kernel_size)?,
                )
            }
            DetectorConfig::Threshold(c) => Box::new(ThresholdDetector::new(ThresholdParams {
                threshold: c.threshold,
                min_scene_length,
                min_percent: c.min_percent,
                fade_bias: c.fade_bias,
                add_final_scene: c.add_final_scene,
                block_size: c.block_size,
                method: c.method,
            })?),
            DetectorConfig::Hash(c) => Box::new(HashDetector::new(c.threshold, c.size, c.lowpass, min_scene_length)?),
            DetectorConfig::Histogram(c) => Box::new(HistogramDetector::new(c.threshold, c.bits, min_scene_length)?),
        };

        debug!("Built {} detector with min_scene_length={}", self.name(), min_scene_length);
        Ok(detector)
    }
}

impl DetectionConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    #[instrument(skip(path), fields(file = %path.as_ref().display()))]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Build every configured detector for a source running at `fps`
    ///
    /// # Errors
    /// * `InvalidConfig` - If no detector is configured or a parameter is out of range
    /// * `InvalidTimecode` - If a minimum scene length does not parse
    pub fn build_detectors(&self, fps: f64) -> Result<Vec<Box<dyn SceneDetector>>> {
        if self.detectors.is_empty() {
            return Err(SceneDetectError::config_error("At least one detector must be configured"));
        }
        let min_scene_length = FrameTimecode::parse(&self.min_scene_len, fps)?.frame_number();

        self.detectors
            .iter()
            .map(|detector| detector.build(fps, min_scene_length))
            .collect()
    }

    pub fn detect_options(&self) -> DetectOptions {
        let downscale = match self.downscale {
            None => Downscale::Auto,
            Some(0) | Some(1) => Downscale::None,
            Some(factor) => Downscale::Factor(factor),
        };
        DetectOptions {
            end: None,
            frame_skip: self.frame_skip,
            downscale,
        }
    }
}
