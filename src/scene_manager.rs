//! SceneManager - drives detectors over a frame source
//!
//! The manager owns the detectors and the [`StatsManager`] they share. It reads
//! frames one at a time, hands each to every detector, collects the cuts they
//! return and turns the final cut list into scenes.

use image::{imageops::{self, FilterType}, RgbImage};
use tracing::{instrument, info, debug, warn};
use crate::{
    common::{scenes_from_cuts, Result, Scene, SceneDetectError},
    detector::{DetectorDelay, SceneDetector},
    stats_manager::StatsManager,
    timecode::FrameTimecode,
    video_stream::FrameSource,
};

/// Frame width each automatic downscale step aims for
const AUTO_DOWNSCALE_WIDTH: u32 = 256;

/// How frames are shrunk before detectors see them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Downscale {
    /// Integer factor chosen from the frame width
    #[default]
    Auto,
    /// Divide both dimensions by this factor
    Factor(u32),
    /// Keep the original resolution
    None,
}

impl Downscale {
    /// Resolve to a concrete factor for frames of the given width
    pub fn factor(self, width: u32) -> u32 {
        match self {
            Downscale::Auto if width >= AUTO_DOWNSCALE_WIDTH => width / AUTO_DOWNSCALE_WIDTH,
            Downscale::Auto | Downscale::None => 1,
            Downscale::Factor(factor) => factor.max(1),
        }
    }
}

/// Options for a single [`SceneManager::detect_scenes`] run
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectOptions {
    /// Stop before this position; `None` runs until the source is exhausted
    pub end: Option<FrameTimecode>,
    /// Frames skipped after every processed frame
    pub frame_skip: u32,
    pub downscale: Downscale,
}

pub struct SceneManager {
    detectors: Vec<Box<dyn SceneDetector>>,
    stats: StatsManager,
    cuts: Vec<FrameTimecode>,
    start: Option<FrameTimecode>,
    last_frame: Option<FrameTimecode>,
}

impl SceneManager {
    pub fn new() -> Self {
        Self::with_stats_manager(StatsManager::new())
    }

    /// Use an existing stats manager, e.g. one loaded from a stats file
    pub fn with_stats_manager(stats: StatsManager) -> Self {
        Self {
            detectors: Vec::new(),
            stats,
            cuts: Vec::new(),
            start: None,
            last_frame: None,
        }
    }

    /// Add a detector to the run
    ///
    /// # Errors
    /// * `DuplicateMetric` - If one of the detector's metrics is already taken
    #[instrument(skip(self, detector), fields(name = detector.name()))]
    pub fn add_detector(&mut self, detector: Box<dyn SceneDetector>) -> Result<()> {
        let keys = detector.metric_keys();
        let names: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.stats.register_metrics(&names)?;

        debug!("Added {} detector ({} metrics)", detector.name(), names.len());
        self.detectors.push(detector);
        Ok(())
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Run every detector over `source` and collect their cuts
    ///
    /// Returns the number of frames processed.
    ///
    /// # Errors
    /// * `InvalidConfig` - If no detector was added
    /// * `FramerateMismatch` - If `options.end` uses a different framerate
    /// * Any error from the source or a detector, which aborts the run
    #[instrument(skip(self, source), fields(fps = source.frame_rate()))]
    pub fn detect_scenes(&mut self, source: &mut dyn FrameSource, options: &DetectOptions) -> Result<u64> {
        if self.detectors.is_empty() {
            return Err(SceneDetectError::config_error("No detectors added"));
        }

        let fps = source.frame_rate();
        let end = match options.end {
            Some(end) => {
                let start = source.position();
                if !start.same_rate(&end) {
                    return Err(SceneDetectError::FramerateMismatch { left: fps, right: end.fps() });
                }
                Some(end.frame_number())
            }
            None => None,
        };

        info!("Starting scene detection at frame {} with {} detectors",
              source.frame_number(), self.detectors.len());

        let mut factor: Option<u32> = None;
        let mut frames_processed = 0u64;

        loop {
            let frame_number = source.frame_number();
            if end.map_or(false, |end| frame_number >= end) {
                debug!("Reached end position at frame {}", frame_number);
                break;
            }

            let Some(frame) = source.read()? else {
                break;
            };
            let timecode = FrameTimecode::new(frame_number, fps);
            self.start.get_or_insert(timecode);

            let factor = *factor.get_or_insert_with(|| {
                let factor = options.downscale.factor(frame.width());
                debug!("Downscale factor {} for {}x{} frames", factor, frame.width(), frame.height());
                factor
            });
            let frame = downscale_frame(frame, factor);

            for detector in &mut self.detectors {
                let cuts = detector.process_frame(timecode, &frame, &mut self.stats)?;
                for cut in &cuts {
                    debug!("{} detector reported cut at frame {}", detector.name(), cut.frame_number());
                }
                self.cuts.extend(cuts);
            }

            self.last_frame = Some(timecode);
            frames_processed += 1;

            // Log progress for long sources
            if frames_processed % 1000 == 0 {
                debug!("Processed {} frames ({:.1}s)", frames_processed, timecode.seconds());
            }

            if options.frame_skip > 0 {
                source.skip(options.frame_skip as u64)?;
            }
        }

        match self.last_frame {
            Some(last) => {
                for detector in &mut self.detectors {
                    let cuts = detector.post_process(last, &mut self.stats)?;
                    self.cuts.extend(cuts);
                }
            }
            None => warn!("Frame source produced no frames"),
        }

        info!("Scene detection completed. {} cuts in {} frames", self.cuts.len(), frames_processed);
        Ok(frames_processed)
    }

    /// Sorted, de-duplicated cuts after the first processed frame
    pub fn get_cut_list(&self) -> Vec<FrameTimecode> {
        let Some(start) = self.start else {
            return Vec::new();
        };

        let mut cuts: Vec<FrameTimecode> = self
            .cuts
            .iter()
            .filter(|cut| cut.frame_number() > start.frame_number())
            .copied()
            .collect();
        cuts.sort_by_key(|cut| cut.frame_number());
        cuts.dedup_by_key(|cut| cut.frame_number());
        cuts
    }

    /// Scenes between consecutive cuts, covering every processed frame
    pub fn get_scene_list(&self) -> Vec<Scene> {
        match (self.start, self.last_frame) {
            (Some(start), Some(last)) => {
                let end = last.with_frame(last.frame_number() + 1);
                scenes_from_cuts(&self.get_cut_list(), start, end)
            }
            _ => Vec::new(),
        }
    }

    /// Largest delay of any added detector
    pub fn max_delay(&self) -> DetectorDelay {
        self.detectors
            .iter()
            .fold(DetectorDelay::Frames(0), |delay, d| delay.max(d.max_delay()))
    }

    pub fn stats_manager(&self) -> &StatsManager {
        &self.stats
    }

    pub fn stats_manager_mut(&mut self) -> &mut StatsManager {
        &mut self.stats
    }

    /// Consume the manager, keeping the collected stats
    pub fn into_stats_manager(self) -> StatsManager {
        self.stats
    }

    /// Forget cuts and positions from earlier runs; detectors and stats are kept
    pub fn clear(&mut self) {
        debug!("Clearing scene manager state");
        self.cuts.clear();
        self.start = None;
        self.last_frame = None;
    }
}

impl Default for SceneManager {
    fn default() -> Self {
        Self::new()
    }
}

fn downscale_frame(frame: RgbImage, factor: u32) -> RgbImage {
    if factor <= 1 {
        return frame;
    }
    let width = (frame.width() / factor).max(1);
    let height = (frame.height() / factor).max(1);
    imageops::resize(&frame, width, height, FilterType::Triangle)
}

impl std::fmt::Debug for SceneManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.detectors.iter().map(|d| d.name()).collect();
        f.debug_struct("SceneManager")
            .field("detectors", &names)
            .field("cuts", &self.cuts.len())
            .field("start", &self.start)
            .field("last_frame", &self.last_frame)
            .finish()
    }
}
