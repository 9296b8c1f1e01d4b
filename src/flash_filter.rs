//! Flash filter for enforcing minimum scene length requirements
//!
//! Prevents false positive scene cuts by enforcing a minimum number of frames
//! between emitted cuts. This helps filter out brief flashes, camera flickers,
//! and other transient changes.

use tracing::{instrument, debug, trace};
use serde::{Deserialize, Serialize};
use crate::timecode::FrameTimecode;

/// Filter mode for handling consecutive scene cuts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Collapse a cluster of nearby cuts into one, placed at the last of the cluster
    Merge,
    /// Drop every cut closer than the filter length to the last emitted one
    Suppress,
}

impl Default for FilterMode {
    fn default() -> Self {
        FilterMode::Suppress
    }
}

/// Filters scene cuts to enforce minimum scene length requirements
///
/// The FlashFilter is a pure state machine over `(position, above_threshold)`
/// observations. It never looks at frame content, and its state is only reset
/// by [`FlashFilter::reset`] or by building a new filter.
#[derive(Debug, Clone)]
pub struct FlashFilter {
    mode: FilterMode,
    min_scene_length: u64,
    /// Suppress: last emitted cut. Merge: latest member of the open cluster.
    last_above: Option<FrameTimecode>,
    merge_triggered: bool,
    merge_start: Option<FrameTimecode>,
}

impl FlashFilter {
    /// Create a new FlashFilter with suppress mode
    ///
    /// # Arguments
    /// * `min_scene_length` - Minimum number of frames between scene cuts
    pub fn new(min_scene_length: u64) -> Self {
        Self::new_with_mode(FilterMode::default(), min_scene_length)
    }

    /// Create a new FlashFilter with specified mode
    ///
    /// # Arguments
    /// * `mode` - Filter mode (Merge or Suppress)
    /// * `min_scene_length` - Minimum number of frames between scene cuts
    #[instrument]
    pub fn new_with_mode(mode: FilterMode, min_scene_length: u64) -> Self {
        debug!("Created FlashFilter with mode: {:?}, min_scene_length: {}", mode, min_scene_length);

        Self {
            mode,
            min_scene_length,
            last_above: None,
            merge_triggered: false,
            merge_start: None,
        }
    }

    /// Filter a potential scene cut based on timing requirements
    ///
    /// # Arguments
    /// * `timecode` - Current frame timecode
    /// * `above_threshold` - Whether the current frame exceeded the detection threshold
    ///
    /// # Returns
    /// * `Vec<FrameTimecode>` - Confirmed scene cuts (0 or 1 item). In merge
    ///   mode the cut may lie before `timecode`.
    pub fn filter(&mut self, timecode: FrameTimecode, above_threshold: bool) -> Vec<FrameTimecode> {
        trace!("Filter input: frame={}, above_threshold={}", timecode.frame_number(), above_threshold);

        if self.min_scene_length == 0 {
            return if above_threshold { vec![timecode] } else { vec![] };
        }

        match self.mode {
            FilterMode::Suppress => self.filter_suppress(timecode, above_threshold),
            FilterMode::Merge => self.filter_merge(timecode, above_threshold),
        }
    }

    /// Once a cut is emitted, no additional cuts are allowed until the
    /// minimum scene length has passed.
    fn filter_suppress(&mut self, timecode: FrameTimecode, above_threshold: bool) -> Vec<FrameTimecode> {
        if !above_threshold {
            return vec![];
        }

        if let Some(last) = self.last_above {
            let frames_since_last = timecode.frame_number().saturating_sub(last.frame_number());

            if frames_since_last < self.min_scene_length {
                debug!("Suppressing cut at frame {} (only {} frames since last cut at {})",
                       timecode.frame_number(), frames_since_last, last.frame_number());
                return vec![];
            }
        }

        self.last_above = Some(timecode);
        debug!("Scene cut confirmed at frame {} (suppress mode)", timecode.frame_number());

        vec![timecode]
    }

    /// Above-threshold frames open or extend a cluster. The cluster is closed,
    /// and its last member emitted, once `min_scene_length` frames have passed
    /// without another above-threshold frame.
    fn filter_merge(&mut self, timecode: FrameTimecode, above_threshold: bool) -> Vec<FrameTimecode> {
        if above_threshold {
            if !self.merge_triggered {
                self.merge_triggered = true;
                self.merge_start = Some(timecode);
                debug!("Starting merge at frame {}", timecode.frame_number());
            }
            self.last_above = Some(timecode);
            return vec![];
        }

        if !self.merge_triggered {
            return vec![];
        }

        let Some(last_above) = self.last_above else {
            return vec![];
        };

        let frames_since_above = timecode.frame_number().saturating_sub(last_above.frame_number());
        if frames_since_above < self.min_scene_length {
            return vec![];
        }

        self.merge_triggered = false;
        if let Some(merge_start) = self.merge_start.take() {
            debug!("Ending merge: emitting cut at frame {} (merged from frame {})",
                   last_above.frame_number(), merge_start.frame_number());
        }

        vec![last_above]
    }

    /// Emit any cut still held back by an open merge cluster
    ///
    /// Called once at end of stream so a buffered decision is not lost.
    pub fn flush(&mut self) -> Vec<FrameTimecode> {
        if self.mode != FilterMode::Merge || !self.merge_triggered {
            return vec![];
        }

        self.merge_triggered = false;
        self.merge_start = None;

        match self.last_above {
            Some(last_above) => {
                debug!("Flushing merged cut at frame {}", last_above.frame_number());
                vec![last_above]
            }
            None => vec![],
        }
    }

    /// Worst-case number of frames between a cut's position and its emission
    pub fn max_delay(&self) -> u64 {
        match self.mode {
            FilterMode::Merge => self.min_scene_length,
            FilterMode::Suppress => 0,
        }
    }

    /// Get the minimum scene length setting
    pub fn min_scene_length(&self) -> u64 {
        self.min_scene_length
    }

    /// Get the current filter mode
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Whether a merge cluster is currently open
    pub fn is_merging(&self) -> bool {
        self.merge_triggered
    }

    /// Get the frame number of the last above-threshold frame the filter acted on
    pub fn last_cut_frame(&self) -> Option<u64> {
        self.last_above.map(|tc| tc.frame_number())
    }

    /// Reset the filter state (useful for processing multiple videos)
    pub fn reset(&mut self) {
        debug!("Resetting FlashFilter state");
        self.last_above = None;
        self.merge_triggered = false;
        self.merge_start = None;
    }
}
