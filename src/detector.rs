//! The interface every scene detection algorithm implements

use image::RgbImage;
use crate::common::Result;
use crate::stats_manager::StatsManager;
use crate::timecode::FrameTimecode;

/// How long a detector may hold back a cut after seeing the frame that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorDelay {
    /// Cuts are returned at most this many frames late
    Frames(u64),
    /// Cuts are only known once the whole sequence was seen
    FullSequence,
}

impl DetectorDelay {
    /// The larger of two delays
    pub fn max(self, other: DetectorDelay) -> DetectorDelay {
        match (self, other) {
            (DetectorDelay::Frames(a), DetectorDelay::Frames(b)) => DetectorDelay::Frames(a.max(b)),
            _ => DetectorDelay::FullSequence,
        }
    }
}

/// A scene detection algorithm driven one frame at a time by the scene manager
///
/// Frames arrive in strictly increasing order. The first frame has no
/// predecessor; detectors record it as history and return no cuts. Every
/// metric a detector writes to the [`StatsManager`] must be listed by
/// [`SceneDetector::metric_keys`] so collisions are caught at registration.
pub trait SceneDetector {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Metric names this detector writes to the stats manager
    fn metric_keys(&self) -> Vec<String>;

    /// Analyse one frame and return any cuts that are now confirmed
    ///
    /// Returned cuts may lie before `timecode` when the detector buffers
    /// decisions (see [`SceneDetector::max_delay`]).
    fn process_frame(
        &mut self,
        timecode: FrameTimecode,
        frame: &RgbImage,
        stats: &mut StatsManager,
    ) -> Result<Vec<FrameTimecode>>;

    /// Flush buffered decisions once the last frame was processed
    ///
    /// `last_timecode` is the position of the last frame that was processed.
    fn post_process(
        &mut self,
        _last_timecode: FrameTimecode,
        _stats: &mut StatsManager,
    ) -> Result<Vec<FrameTimecode>> {
        Ok(Vec::new())
    }

    /// Worst-case lag between the frame causing a cut and its return
    fn max_delay(&self) -> DetectorDelay {
        DetectorDelay::Frames(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_max() {
        assert_eq!(DetectorDelay::Frames(3).max(DetectorDelay::Frames(10)), DetectorDelay::Frames(10));
        assert_eq!(DetectorDelay::Frames(3).max(DetectorDelay::FullSequence), DetectorDelay::FullSequence);
        assert_eq!(DetectorDelay::FullSequence.max(DetectorDelay::Frames(0)), DetectorDelay::FullSequence);
    }
}
