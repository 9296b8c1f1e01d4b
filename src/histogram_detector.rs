//! HistogramDetector - colour histogram comparison of consecutive frames

use image::RgbImage;
use tracing::{debug, instrument, trace};
use crate::{
    common::{validate_threshold, Result, SceneDetectError},
    detector::{DetectorDelay, SceneDetector},
    flash_filter::FlashFilter,
    stats_manager::{MetricId, StatsManager},
    timecode::FrameTimecode,
};

pub const HIST_DIFF_KEY: &str = "hist_diff";

pub const DEFAULT_THRESHOLD: f64 = 0.05;
pub const DEFAULT_BITS: u32 = 4;

/// Normalised joint RGB histogram using the top `bits` bits of each channel
pub fn color_histogram(frame: &RgbImage, bits: u32) -> Vec<f64> {
    let shift = 8 - bits;
    let mut bins = vec![0u64; 1 << (3 * bits)];
    for pixel in frame.pixels() {
        let [r, g, b] = pixel.0.map(|c| (c >> shift) as usize);
        bins[(r << (2 * bits)) | (g << bits) | b] += 1;
    }

    let total = (frame.width() as u64 * frame.height() as u64).max(1) as f64;
    bins.into_iter().map(|count| count as f64 / total).collect()
}

/// Total variation distance: half the L1 distance, so `0.0` for identical
/// histograms and `1.0` for disjoint ones
fn histogram_distance(left: &[f64], right: &[f64]) -> f64 {
    0.5 * left.iter().zip(right).map(|(a, b)| (a - b).abs()).sum::<f64>()
}

pub struct HistogramDetector {
    threshold: f64,
    bits: u32,
    last_histogram: Option<Vec<f64>>,
    pending_frame: Option<RgbImage>,
    metric_id: Option<MetricId>,
    flash_filter: FlashFilter,
}

impl HistogramDetector {
    /// Create a HistogramDetector
    ///
    /// # Arguments
    /// * `threshold` - Histogram distance, from 0 to 1, that counts as a cut
    /// * `bits` - Bits kept per channel, 1 to 8
    /// * `min_scene_length` - Minimum frames between scene cuts
    #[instrument]
    pub fn new(threshold: f64, bits: u32, min_scene_length: u64) -> Result<Self> {
        validate_threshold("Threshold", threshold)?;
        if !(1..=8).contains(&bits) {
            return Err(SceneDetectError::config_error(
                format!("Histogram bits must be within 1..=8, got: {}", bits)
            ));
        }

        debug!("Created HistogramDetector: threshold={}, bits={}", threshold, bits);

        Ok(Self {
            threshold,
            bits,
            last_histogram: None,
            pending_frame: None,
            metric_id: None,
            flash_filter: FlashFilter::new(min_scene_length),
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn min_scene_length(&self) -> u64 {
        self.flash_filter.min_scene_length()
    }
}

impl Default for HistogramDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            bits: DEFAULT_BITS,
            last_histogram: None,
            pending_frame: None,
            metric_id: None,
            flash_filter: FlashFilter::new(crate::content_detector::DEFAULT_MIN_SCENE_LEN),
        }
    }
}

impl SceneDetector for HistogramDetector {
    fn name(&self) -> &'static str {
        "histogram"
    }

    fn metric_keys(&self) -> Vec<String> {
        vec![HIST_DIFF_KEY.to_string()]
    }

    fn process_frame(
        &mut self,
        timecode: FrameTimecode,
        frame: &RgbImage,
        stats: &mut StatsManager,
    ) -> Result<Vec<FrameTimecode>> {
        let frame_number = timecode.frame_number();
        let id = *self.metric_id.get_or_insert_with(|| stats.metric_id_or_insert(HIST_DIFF_KEY));

        let difference = match stats.get_by_id(frame_number, id) {
            Some(cached) => {
                self.last_histogram = None;
                self.pending_frame = Some(frame.clone());
                Some(cached)
            }
            None => {
                let current = color_histogram(frame, self.bits);
                let previous = match self.last_histogram.take() {
                    Some(histogram) => Some(histogram),
                    None => self.pending_frame.take().map(|pending| color_histogram(&pending, self.bits)),
                };
                self.pending_frame = None;

                let difference = previous.map(|prev| histogram_distance(&current, &prev));
                if let Some(difference) = difference {
                    stats.set_by_id(frame_number, id, difference);
                }
                self.last_histogram = Some(current);
                difference
            }
        };

        match difference {
            Some(difference) => {
                trace!("Frame {} histogram difference {:.4}", frame_number, difference);
                Ok(self.flash_filter.filter(timecode, difference >= self.threshold))
            }
            None => Ok(Vec::new()),
        }
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

impl std::fmt::Debug for HistogramDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistogramDetector")
            .field("threshold", &self.threshold)
            .field("bits", &self.bits)
            .field("flash_filter", &self.flash_filter)
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

    #[test]
    fn test_histogram_bins() {
        let mut frame = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        frame.put_pixel(1, 1, Rgb([0, 0, 255]));

        let hist = color_histogram(&frame, 2);
        assert_eq!(hist.len(), 64);
        assert_eq!(hist[0b11_00_00], 0.75);
        assert_eq!(hist[0b00_00_11], 0.25);
        assert!((hist.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_range() {
        let red = color_histogram(&RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])), 4);
        let blue = color_histogram(&RgbImage::from_pixel(4, 4, Rgb([0, 0, 255])), 4);
        let half = color_histogram(&RgbImage::from_fn(4, 4, |x, _| {
            if x < 2 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) }
        }), 4);

        assert_eq!(histogram_distance(&red, &red), 0.0);
        assert_eq!(histogram_distance(&red, &blue), 1.0);
        assert_eq!(histogram_distance(&red, &half), 0.5);
        assert_eq!(histogram_distance(&half, &blue), 0.5);
    }

    #[test]
    fn test_detects_colour_change() {
        let mut detector = HistogramDetector::new(0.5, 4, 10).unwrap();
        let mut stats = StatsManager::new();
        let mut cuts = Vec::new();
        for i in 0..60u64 {
            let colour = match i {
                0..=19 => Rgb([200, 30, 30]),
                20..=24 => Rgb([30, 200, 30]),
                _ => Rgb([30, 30, 200]),
            };
            let frame = RgbImage::from_pixel(8, 8, colour);
            cuts.extend(detector.process_frame(tc(i), &frame, &mut stats).unwrap());
        }
        cuts.extend(detector.post_process(tc(59), &mut stats).unwrap());

        // The change at 25 is within 10 frames of the cut at 20
        assert_eq!(cuts.iter().map(|c| c.frame_number()).collect::<Vec<_>>(), vec![20]);
        assert_eq!(stats.get_metrics(25, &[HIST_DIFF_KEY]), vec![Some(1.0)]);
    }

    #[test]
    fn test_bits_validation() {
        assert!(HistogramDetector::new(0.05, 0, 15).is_err());
        assert!(HistogramDetector::new(0.05, 9, 15).is_err());
        assert!(HistogramDetector::new(0.05, 8, 15).is_ok());
        assert!(HistogramDetector::new(f64::NAN, 4, 15).is_err());
    }
}
