//! ThresholdDetector - finds fades to and from a solid colour
//!
//! A frame counts as "faded" when nearly all of its channel values sit on one
//! side of a fixed intensity threshold. Cuts are placed between the frame where
//! the picture faded out and the frame where it came back, shifted by `fade_bias`.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};
use crate::{
    common::{validate_threshold, Result, SceneDetectError},
    detector::SceneDetector,
    stats_manager::{MetricId, StatsManager},
    timecode::FrameTimecode,
};

pub const AVERAGE_RGB_KEY: &str = "average_rgb";
pub const FADE_STATE_KEY: &str = "fade_state";

pub const DEFAULT_THRESHOLD: f64 = 12.0;
pub const DEFAULT_MIN_PERCENT: f64 = 0.95;
pub const DEFAULT_BLOCK_SIZE: usize = 8;

/// Which side of the threshold counts as faded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    /// Fades to black: values at or below the threshold
    #[default]
    Floor,
    /// Fades to white: values at or above the threshold
    Ceiling,
}

impl ThresholdMethod {
    fn matches(self, value: u8, threshold: f64) -> bool {
        match self {
            ThresholdMethod::Floor => value as f64 <= threshold,
            ThresholdMethod::Ceiling => value as f64 >= threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadeState {
    In,
    Out,
}

/// Tunables for [`ThresholdDetector`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdParams {
    pub threshold: f64,
    pub min_scene_length: u64,
    /// Fraction of channel values that must be past the threshold
    pub min_percent: f64,
    /// -1.0 places the cut at the fade-out frame, +1.0 at the fade-in frame
    pub fade_bias: f64,
    /// Emit a cut at a fade-out that never comes back
    pub add_final_scene: bool,
    /// Rows counted per block before checking the budget
    pub block_size: usize,
    pub method: ThresholdMethod,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_scene_length: 15,
            min_percent: DEFAULT_MIN_PERCENT,
            fade_bias: 0.0,
            add_final_scene: false,
            block_size: DEFAULT_BLOCK_SIZE,
            method: ThresholdMethod::Floor,
        }
    }
}

impl ThresholdParams {
    pub fn validate(&self) -> Result<()> {
        validate_threshold("Threshold", self.threshold)?;
        if !(0.0..=1.0).contains(&self.min_percent) {
            return Err(SceneDetectError::config_error(
                format!("min_percent must be within [0, 1], got: {}", self.min_percent)
            ));
        }
        if !(-1.0..=1.0).contains(&self.fade_bias) {
            return Err(SceneDetectError::config_error(
                format!("fade_bias must be within [-1, 1], got: {}", self.fade_bias)
            ));
        }
        if self.block_size == 0 {
            return Err(SceneDetectError::config_error("block_size must be at least 1"));
        }
        Ok(())
    }
}

pub struct ThresholdDetector {
    params: ThresholdParams,
    state: Option<(FadeState, FrameTimecode)>,
    first_frame: Option<FrameTimecode>,
    last_scene_cut: Option<FrameTimecode>,
    metric_ids: Option<[MetricId; 2]>,
}

impl ThresholdDetector {
    #[instrument]
    pub fn new(params: ThresholdParams) -> Result<Self> {
        params.validate()?;
        debug!("Created ThresholdDetector: threshold={}, method={:?}, bias={}",
               params.threshold, params.method, params.fade_bias);

        Ok(Self {
            params,
            state: None,
            first_frame: None,
            last_scene_cut: None,
            metric_ids: None,
        })
    }

    pub fn params(&self) -> &ThresholdParams {
        &self.params
    }

    /// Whether `frame` is past the threshold for at least `min_percent` of its values
    ///
    /// Values are counted a block of rows at a time so a clearly visible frame
    /// is rejected without scanning all of it.
    pub fn is_faded(&self, frame: &RgbImage) -> bool {
        let raw = frame.as_raw();
        let total = raw.len();
        if total == 0 {
            return false;
        }

        let budget = (total as f64 * (1.0 - self.params.min_percent)).floor() as usize;
        let row_len = frame.width() as usize * 3;
        let block_len = (row_len * self.params.block_size).max(1);
        let mut misses = 0usize;

        for block in raw.chunks(block_len) {
            misses += block
                .iter()
                .filter(|v| !self.params.method.matches(**v, self.params.threshold))
                .count();
            if misses > budget {
                return false;
            }
        }
        true
    }

    fn resolve_metric_ids(&mut self, stats: &mut StatsManager) -> [MetricId; 2] {
        if let Some(ids) = self.metric_ids {
            return ids;
        }
        let ids = [stats.metric_id_or_insert(AVERAGE_RGB_KEY), stats.metric_id_or_insert(FADE_STATE_KEY)];
        self.metric_ids = Some(ids);
        ids
    }

    fn split_frame(&self, fade_out: FrameTimecode, fade_in: FrameTimecode) -> FrameTimecode {
        let f_out = fade_out.frame_number() as i64;
        let f_in = fade_in.frame_number() as i64;
        let shift = (self.params.fade_bias * (f_in - f_out) as f64).trunc() as i64;
        let split = (f_in + f_out + shift) / 2;
        fade_in.with_frame(split.max(0) as u64)
    }

    pub fn reset(&mut self) {
        self.state = None;
        self.first_frame = None;
        self.last_scene_cut = None;
        self.metric_ids = None;
    }
}

impl Default for ThresholdDetector {
    fn default() -> Self {
        Self {
            params: ThresholdParams::default(),
            state: None,
            first_frame: None,
            last_scene_cut: None,
            metric_ids: None,
        }
    }
}

/// Mean over every channel value of the frame
pub fn average_rgb(frame: &RgbImage) -> f64 {
    let raw = frame.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    raw.iter().map(|v| *v as u64).sum::<u64>() as f64 / raw.len() as f64
}

impl SceneDetector for ThresholdDetector {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn metric_keys(&self) -> Vec<String> {
        vec![AVERAGE_RGB_KEY.to_string(), FADE_STATE_KEY.to_string()]
    }

    fn process_frame(
        &mut self,
        timecode: FrameTimecode,
        frame: &RgbImage,
        stats: &mut StatsManager,
    ) -> Result<Vec<FrameTimecode>> {
        let frame_number = timecode.frame_number();
        let ids = self.resolve_metric_ids(stats);

        let faded = match stats.get_by_id(frame_number, ids[1]) {
            Some(cached) => cached > 0.5,
            None => {
                let faded = self.is_faded(frame);
                stats.set_by_id(frame_number, ids[0], average_rgb(frame));
                stats.set_by_id(frame_number, ids[1], if faded { 1.0 } else { 0.0 });
                faded
            }
        };
        trace!("Frame {} faded: {}", frame_number, faded);

        let first = *self.first_frame.get_or_insert(timecode);
        let last_scene_cut = *self.last_scene_cut.get_or_insert(first);

        let mut cuts = Vec::new();
        match self.state {
            None => {
                let state = if faded { FadeState::Out } else { FadeState::In };
                self.state = Some((state, timecode));
            }
            Some((FadeState::In, _)) if faded => {
                debug!("Fade out at frame {}", frame_number);
                self.state = Some((FadeState::Out, timecode));
            }
            Some((FadeState::Out, fade_out)) if !faded => {
                debug!("Fade in at frame {}", frame_number);
                if frame_number.saturating_sub(last_scene_cut.frame_number()) >= self.params.min_scene_length {
                    let split = self.split_frame(fade_out, timecode);
                    debug!("Scene cut at frame {} (fade out {}, fade in {})",
                           split.frame_number(), fade_out.frame_number(), frame_number);
                    cuts.push(split);
                    self.last_scene_cut = Some(timecode);
                }
                self.state = Some((FadeState::In, timecode));
            }
            Some(_) => {}
        }

        Ok(cuts)
    }

    fn post_process(
        &mut self,
        _last_timecode: FrameTimecode,
        _stats: &mut StatsManager,
    ) -> Result<Vec<FrameTimecode>> {
        if !self.params.add_final_scene {
            return Ok(Vec::new());
        }
        let (Some((FadeState::Out, fade_out)), Some(first)) = (self.state, self.first_frame) else {
            return Ok(Vec::new());
        };

        let last_cut = self.last_scene_cut.unwrap_or(first).frame_number();
        if fade_out.frame_number() > first.frame_number()
            && fade_out.frame_number().saturating_sub(last_cut) >= self.params.min_scene_length
        {
            debug!("Final scene cut at fade out frame {}", fade_out.frame_number());
            self.last_scene_cut = Some(fade_out);
            return Ok(vec![fade_out]);
        }
        Ok(Vec::new())
    }
}

impl std::fmt::Debug for ThresholdDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdDetector")
            .field("params", &self.params)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn tc(frame: u64) -> FrameTimecode {
        FrameTimecode::new(frame, 30.0)
    }

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb([value, value, value]))
    }

    /// Feed `frames` solid frames where `dark(i)` selects black
    fn run(detector: &mut ThresholdDetector, frames: u64, dark: impl Fn(u64) -> bool) -> Vec<u64> {
        let mut stats = StatsManager::new();
        let mut cuts = Vec::new();
        for i in 0..frames {
            let frame = if dark(i) { solid(0) } else { solid(200) };
            cuts.extend(detector.process_frame(tc(i), &frame, &mut stats).unwrap());
        }
        cuts.extend(detector.post_process(tc(frames - 1), &mut stats).unwrap());
        cuts.iter().map(|c| c.frame_number()).collect()
    }

    fn with_bias(fade_bias: f64) -> ThresholdDetector {
        ThresholdDetector::new(ThresholdParams { fade_bias, ..Default::default() }).unwrap()
    }

    #[test]
    fn test_fade_bias_positions() {
        let dark = |i| (100..140).contains(&i);
        assert_eq!(run(&mut with_bias(0.0), 200, dark), vec![120]);
        assert_eq!(run(&mut with_bias(1.0), 200, dark), vec![140]);
        assert_eq!(run(&mut with_bias(-1.0), 200, dark), vec![100]);
    }

    #[test]
    fn test_min_scene_length_from_start() {
        // Fade in at frame 10 is too close to the first frame
        let mut detector = with_bias(0.0);
        assert!(run(&mut detector, 50, |i| (5..10).contains(&i)).is_empty());
    }

    #[test]
    fn test_final_scene() {
        let params = ThresholdParams { add_final_scene: true, ..Default::default() };
        let mut detector = ThresholdDetector::new(params).unwrap();
        assert_eq!(run(&mut detector, 100, |i| i >= 80), vec![80]);

        // Without the option a trailing fade is ignored
        assert!(run(&mut with_bias(0.0), 100, |i| i >= 80).is_empty());
    }

    #[test]
    fn test_final_scene_requires_fade_after_first_frame() {
        let params = ThresholdParams { add_final_scene: true, ..Default::default() };
        let mut detector = ThresholdDetector::new(params).unwrap();
        assert!(run(&mut detector, 40, |_| true).is_empty());
    }

    #[test]
    fn test_ceiling_method() {
        let params = ThresholdParams {
            threshold: 240.0,
            method: ThresholdMethod::Ceiling,
            ..Default::default()
        };
        let detector = ThresholdDetector::new(params).unwrap();
        assert!(detector.is_faded(&solid(255)));
        assert!(!detector.is_faded(&solid(100)));
    }

    #[test]
    fn test_min_percent_budget() {
        let detector = ThresholdDetector::default();
        let mut frame = solid(0);
        // 2 of 64 pixels bright: 6 of 192 values, within a 5% budget of 9
        frame.put_pixel(0, 0, Rgb([255, 255, 255]));
        frame.put_pixel(7, 7, Rgb([255, 255, 255]));
        assert!(detector.is_faded(&frame));

        for x in 0..4 {
            frame.put_pixel(x, 3, Rgb([255, 255, 255]));
        }
        assert!(!detector.is_faded(&frame));
    }

    #[test]
    fn test_cached_fade_state_is_used() {
        let mut stats = StatsManager::new();
        let mut detector = ThresholdDetector::default();
        stats.set_metrics(1, &[(FADE_STATE_KEY, 1.0)]).unwrap();

        detector.process_frame(tc(0), &solid(200), &mut stats).unwrap();
        // Pixels say bright, cache says faded
        detector.process_frame(tc(1), &solid(200), &mut stats).unwrap();
        assert_eq!(stats.get_metrics(1, &[AVERAGE_RGB_KEY]), vec![None]);
        assert_eq!(stats.get_metrics(0, &[AVERAGE_RGB_KEY]), vec![Some(200.0)]);
        assert!(matches!(detector.state, Some((FadeState::Out, _))));
    }

    #[test]
    fn test_invalid_params() {
        let bad = [
            ThresholdParams { min_percent: 1.5, ..Default::default() },
            ThresholdParams { fade_bias: -2.0, ..Default::default() },
            ThresholdParams { block_size: 0, ..Default::default() },
            ThresholdParams { threshold: -1.0, ..Default::default() },
        ];
        for params in bad {
            assert!(matches!(ThresholdDetector::new(params), Err(SceneDetectError::InvalidConfig { .. })));
        }
    }
}
