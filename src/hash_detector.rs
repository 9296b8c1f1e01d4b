//! HashDetector - perceptual hash comparison of consecutive frames
//!
//! Each frame is reduced to a `size × size` bit hash taken from the low
//! frequency block of its 2-D DCT. The normalised hamming distance between two
//! consecutive hashes is the frame score.

use std::sync::Arc;
use image::{imageops::{self, FilterType}, RgbImage};
use rustdct::{Dct2, DctPlanner};
use tracing::{debug, instrument, trace};
use crate::{
    common::{validate_threshold, Result, SceneDetectError},
    detector::{DetectorDelay, SceneDetector},
    flash_filter::{FilterMode, FlashFilter},
    stats_manager::{MetricId, StatsManager},
    timecode::FrameTimecode,
};

pub const HASH_DIST_KEY: &str = "hash_dist";

pub const DEFAULT_THRESHOLD: f64 = 0.395;
pub const DEFAULT_SIZE: u32 = 16;
pub const DEFAULT_LOWPASS: u32 = 2;

/// Bit hash of one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHash {
    bits: Vec<u64>,
    len: usize,
}

impl FrameHash {
    fn from_bools(values: impl Iterator<Item = bool>) -> Self {
        let mut bits = Vec::new();
        let mut len = 0;
        for value in values {
            if len % 64 == 0 {
                bits.push(0u64);
            }
            if value {
                if let Some(word) = bits.last_mut() {
                    *word |= 1 << (len % 64);
                }
            }
            len += 1;
        }
        Self { bits, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of differing bits
    pub fn hamming(&self, other: &FrameHash) -> u32 {
        self.bits.iter().zip(&other.bits).map(|(a, b)| (a ^ b).count_ones()).sum()
    }
}

/// Computes frame hashes, reusing the DCT plan between frames
pub struct FrameHasher {
    size: u32,
    lowpass: u32,
    dct: Arc<dyn Dct2<f64>>,
}

impl FrameHasher {
    pub fn new(size: u32, lowpass: u32) -> Result<Self> {
        if size == 0 {
            return Err(SceneDetectError::config_error("Hash size must be at least 1"));
        }
        if lowpass == 0 {
            return Err(SceneDetectError::config_error("Lowpass factor must be at least 1"));
        }
        let side = (size * lowpass) as usize;
        let dct = DctPlanner::new().plan_dct2(side);
        Ok(Self { size, lowpass, dct })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn hash(&self, frame: &RgbImage) -> FrameHash {
        let side = self.size * self.lowpass;
        let gray = imageops::grayscale(frame);
        let small = imageops::resize(&gray, side, side, FilterType::Triangle);

        let n = side as usize;
        let mut coeffs: Vec<f64> = small.as_raw().iter().map(|v| *v as f64).collect();
        self.dct_2d(&mut coeffs, n);

        let keep = self.size as usize;
        let block: Vec<f64> = (0..keep)
            .flat_map(|y| coeffs[y * n..y * n + keep].iter().copied())
            .collect();
        let median = median(&block);

        FrameHash::from_bools(block.iter().map(|c| *c > median))
    }

    /// Orthonormal DCT-II over rows then columns of an `n × n` buffer
    fn dct_2d(&self, data: &mut [f64], n: usize) {
        for row in data.chunks_mut(n) {
            self.dct.process_dct2(row);
        }

        let mut column = vec![0.0; n];
        for x in 0..n {
            for y in 0..n {
                column[y] = data[y * n + x];
            }
            self.dct.process_dct2(&mut column);
            for y in 0..n {
                data[y * n + x] = column[y];
            }
        }

        let first = (1.0 / n as f64).sqrt();
        let rest = (2.0 / n as f64).sqrt();
        let scale = |k: usize| if k == 0 { first } else { rest };
        for y in 0..n {
            for x in 0..n {
                data[y * n + x] *= scale(y) * scale(x);
            }
        }
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub struct HashDetector {
    threshold: f64,
    hasher: FrameHasher,
    last_hash: Option<FrameHash>,
    pending_frame: Option<RgbImage>,
    metric_id: Option<MetricId>,
    flash_filter: FlashFilter,
}

impl HashDetector {
    /// Create a HashDetector
    ///
    /// # Arguments
    /// * `threshold` - Normalised hamming distance in `[0, 1]` that counts as a cut
    /// * `size` - Side of the hash in bits
    /// * `lowpass` - Resize factor; the frame is shrunk to `size * lowpass` before the DCT
    /// * `min_scene_length` - Minimum frames between scene cuts
    #[instrument]
    pub fn new(threshold: f64, size: u32, lowpass: u32, min_scene_length: u64) -> Result<Self> {
        validate_threshold("Threshold", threshold)?;
        let hasher = FrameHasher::new(size, lowpass)?;

        debug!("Created HashDetector: threshold={}, size={}, lowpass={}", threshold, size, lowpass);

        Ok(Self {
            threshold,
            hasher,
            last_hash: None,
            pending_frame: None,
            metric_id: None,
            flash_filter: FlashFilter::new_with_mode(FilterMode::Suppress, min_scene_length),
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn min_scene_length(&self) -> u64 {
        self.flash_filter.min_scene_length()
    }

    fn distance(&mut self, timecode: FrameTimecode, frame: &RgbImage, stats: &mut StatsManager) -> Option<f64> {
        let frame_number = timecode.frame_number();
        let id = *self.metric_id.get_or_insert_with(|| stats.metric_id_or_insert(HASH_DIST_KEY));

        if let Some(cached) = stats.get_by_id(frame_number, id) {
            self.last_hash = None;
            self.pending_frame = Some(frame.clone());
            return Some(cached);
        }

        let current = self.hasher.hash(frame);
        let previous = match self.last_hash.take() {
            Some(hash) => Some(hash),
            None => self.pending_frame.take().map(|pending| self.hasher.hash(&pending)),
        };
        self.pending_frame = None;

        let distance = previous.map(|prev| {
            let size = self.hasher.size() as f64;
            let distance = current.hamming(&prev) as f64 / (size * size);
            stats.set_by_id(frame_number, id, distance);
            distance
        });
        self.last_hash = Some(current);
        distance
    }
}

impl Default for HashDetector {
    fn default() -> Self {
        let hasher = FrameHasher {
            size: DEFAULT_SIZE,
            lowpass: DEFAULT_LOWPASS,
            dct: DctPlanner::new().plan_dct2((DEFAULT_SIZE * DEFAULT_LOWPASS) as usize),
        };
        Self {
            threshold: DEFAULT_THRESHOLD,
            hasher,
            last_hash: None,
            pending_frame: None,
            metric_id: None,
            flash_filter: FlashFilter::new(crate::content_detector::DEFAULT_MIN_SCENE_LEN),
        }
    }
}

impl SceneDetector for HashDetector {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn metric_keys(&self) -> Vec<String> {
        vec![HASH_DIST_KEY.to_string()]
    }

    fn process_frame(
        &mut self,
        timecode: FrameTimecode,
        frame: &RgbImage,
        stats: &mut StatsManager,
    ) -> Result<Vec<FrameTimecode>> {
        match self.distance(timecode, frame, stats) {
            Some(distance) => {
                trace!("Frame {} hash distance {:.4}", timecode.frame_number(), distance);
                Ok(self.flash_filter.filter(timecode, distance >= self.threshold))
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

impl std::fmt::Debug for HashDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashDetector")
            .field("threshold", &self.threshold)
            .field("size", &self.hasher.size)
            .field("lowpass", &self.hasher.lowpass)
            .field("flash_filter", &self.flash_filter)
            .finish()
    }
}
