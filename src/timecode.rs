//! Frame-accurate timecodes
//!
//! A [`FrameTimecode`] is an exact frame position at a fixed framerate. All
//! time values in the library (cuts, scene boundaries, stats rows) are carried
//! as timecodes and converted to seconds or `HH:MM:SS.mmm` text only at the
//! edges.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use tracing::trace;
use crate::common::{Result, SceneDetectError};

/// Two framerates closer than this are considered equal
pub const MAX_FPS_DELTA: f64 = 1.0 / 100_000.0;

/// Represents a specific frame within a video at a fixed framerate
///
/// Arithmetic never goes below frame zero: subtraction saturates. Timecodes
/// can only be combined or compared when their framerates match; the operator
/// forms panic on a mismatch, the `try_*` forms return an error.
#[derive(Debug, Clone, Copy)]
pub struct FrameTimecode {
    frame_number: u64,
    fps: f64,
}

impl FrameTimecode {
    /// Create a new FrameTimecode
    ///
    /// # Arguments
    /// * `frame_number` - The frame number (0-indexed)
    /// * `fps` - Frames per second of the video
    ///
    /// # Panics
    /// Panics if fps is not positive (fail-fast approach)
    pub fn new(frame_number: u64, fps: f64) -> Self {
        assert!(fps.is_finite() && fps > 0.0, "FPS must be positive, got: {}", fps);
        Self { frame_number, fps }
    }

    /// Create a timecode from a position in seconds
    ///
    /// The position is rounded to the nearest frame.
    pub fn from_seconds(seconds: f64, fps: f64) -> Result<Self> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(SceneDetectError::timecode_error(
                seconds.to_string(),
                "seconds must be a non-negative number",
            ));
        }
        Ok(Self::new(seconds_to_frames(seconds, fps), fps))
    }

    /// Parse a timecode string
    ///
    /// Accepted forms:
    /// * `"1234"` - frame number
    /// * `"12.5s"` - seconds
    /// * `"HH:MM:SS[.fff]"` or `"MM:SS[.fff]"` - clock time
    pub fn parse(text: &str, fps: f64) -> Result<Self> {
        let input = text.trim();

        if input.is_empty() {
            return Err(SceneDetectError::timecode_error(text, "empty timecode"));
        }

        if input.bytes().all(|b| b.is_ascii_digit()) {
            let frames = input.parse::<u64>().map_err(|e| {
                SceneDetectError::timecode_error(text, format!("invalid frame number: {}", e))
            })?;
            return Ok(Self::new(frames, fps));
        }

        if let Some(number) = input.strip_suffix('s') {
            let seconds = parse_decimal(number)
                .ok_or_else(|| SceneDetectError::timecode_error(text, "invalid seconds value"))?;
            return Self::from_seconds(seconds, fps)
                .map_err(|_| SceneDetectError::timecode_error(text, "invalid seconds value"));
        }

        if input.contains(':') {
            let seconds = parse_clock(input).map_err(|reason| SceneDetectError::timecode_error(text, reason))?;
            trace!("Parsed timecode '{}' as {}s", input, seconds);
            return Self::from_seconds(seconds, fps);
        }

        Err(SceneDetectError::timecode_error(
            text,
            "expected frames, seconds (e.g. 1.5s) or HH:MM:SS[.fff]",
        ))
    }

    /// Copy this timecode's framerate with a different frame number
    pub fn with_frame(&self, frame_number: u64) -> Self {
        Self::new(frame_number, self.fps)
    }

    /// Copy this timecode's framerate with a different position in seconds
    pub fn with_seconds(&self, seconds: f64) -> Result<Self> {
        Self::from_seconds(seconds, self.fps)
    }

    /// Get the frame number
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Get the framerate
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Convert to seconds since start of video
    pub fn seconds(&self) -> f64 {
        self.frame_number as f64 / self.fps
    }

    /// Convert to milliseconds since start of video
    pub fn milliseconds(&self) -> f64 {
        self.seconds() * 1000.0
    }

    /// Whether `other` has the same framerate (within [`MAX_FPS_DELTA`])
    pub fn same_rate(&self, other: &FrameTimecode) -> bool {
        (self.fps - other.fps).abs() < MAX_FPS_DELTA
    }

    /// Render as `HH:MM:SS` with `precision` fractional digits
    ///
    /// With `rounding` the fractional part is rounded to the nearest unit and
    /// carries into seconds, minutes and hours; otherwise it is truncated.
    pub fn format(&self, precision: u32, rounding: bool) -> String {
        let precision = precision.min(9);
        let scale = 10u64.pow(precision);
        let exact = self.frame_number as f64 * scale as f64 / self.fps;
        let units = if rounding {
            exact.round()
        } else {
            (exact + 1e-6).floor()
        } as u64;

        let fraction = units % scale;
        let total_seconds = units / scale;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if precision == 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}:{:02}.{:0width$}", hours, minutes, seconds, fraction,
                    width = precision as usize)
        }
    }

    /// Add two timecodes, failing if their framerates differ
    pub fn try_add(self, other: FrameTimecode) -> Result<Self> {
        self.check_rate(&other)?;
        Ok(self.with_frame(self.frame_number.saturating_add(other.frame_number)))
    }

    /// Subtract two timecodes (saturating at zero), failing if their framerates differ
    pub fn try_sub(self, other: FrameTimecode) -> Result<Self> {
        self.check_rate(&other)?;
        Ok(self.with_frame(self.frame_number.saturating_sub(other.frame_number)))
    }

    /// Compare two timecodes, failing if their framerates differ
    pub fn try_cmp(&self, other: &FrameTimecode) -> Result<Ordering> {
        self.check_rate(other)?;
        Ok(self.frame_number.cmp(&other.frame_number))
    }

    fn check_rate(&self, other: &FrameTimecode) -> Result<()> {
        if self.same_rate(other) {
            Ok(())
        } else {
            Err(SceneDetectError::FramerateMismatch { left: self.fps, right: other.fps })
        }
    }

    fn assert_rate(&self, other: &FrameTimecode) {
        assert!(self.same_rate(other),
                "Framerate mismatch: {} != {}", self.fps, other.fps);
    }
}

/// Round a position in seconds to the nearest frame
fn seconds_to_frames(seconds: f64, fps: f64) -> u64 {
    (seconds * fps + 0.5).floor() as u64
}

/// Parse an unsigned decimal like `12` or `12.25` (no sign, no exponent)
fn parse_decimal(text: &str) -> Option<f64> {
    let mut dots = 0;
    let mut digits = 0;
    for b in text.bytes() {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => dots += 1,
            _ => return None,
        }
    }
    if digits == 0 || dots > 1 {
        return None;
    }
    text.parse::<f64>().ok()
}

/// Parse `HH:MM:SS[.fff]` or `MM:SS[.fff]` into seconds
fn parse_clock(text: &str) -> std::result::Result<f64, String> {
    let fields: Vec<&str> = text.split(':').collect();
    let (hours, minutes, seconds) = match fields.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => ("0", *m, *s),
        _ => return Err("expected HH:MM:SS or MM:SS".to_string()),
    };

    let parse_int = |field: &str, name: &str| -> std::result::Result<u64, String> {
        if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid {} field '{}'", name, field));
        }
        field.parse::<u64>().map_err(|e| format!("invalid {} field '{}': {}", name, field, e))
    };

    let hours = parse_int(hours, "hours")?;
    let minutes = parse_int(minutes, "minutes")?;
    let seconds = parse_decimal(seconds).ok_or_else(|| format!("invalid seconds field '{}'", seconds))?;

    if fields.len() == 3 && minutes >= 60 {
        return Err(format!("minutes out of range: {}", minutes));
    }
    if seconds >= 60.0 {
        return Err(format!("seconds out of range: {}", seconds));
    }

    let whole = hours
        .checked_mul(60)
        .and_then(|m| m.checked_add(minutes))
        .and_then(|m| m.checked_mul(60))
        .ok_or_else(|| format!("timecode too large: {}", text))?;

    Ok(whole as f64 + seconds)
}

impl fmt::Display for FrameTimecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(3, true))
    }
}

impl Add for FrameTimecode {
    type Output = FrameTimecode;

    fn add(self, rhs: FrameTimecode) -> FrameTimecode {
        self.assert_rate(&rhs);
        self.with_frame(self.frame_number.saturating_add(rhs.frame_number))
    }
}

impl Sub for FrameTimecode {
    type Output = FrameTimecode;

    fn sub(self, rhs: FrameTimecode) -> FrameTimecode {
        self.assert_rate(&rhs);
        self.with_frame(self.frame_number.saturating_sub(rhs.frame_number))
    }
}

impl Add<u64> for FrameTimecode {
    type Output = FrameTimecode;

    fn add(self, frames: u64) -> FrameTimecode {
        self.with_frame(self.frame_number.saturating_add(frames))
    }
}

impl Sub<u64> for FrameTimecode {
    type Output = FrameTimecode;

    fn sub(self, frames: u64) -> FrameTimecode {
        self.with_frame(self.frame_number.saturating_sub(frames))
    }
}

impl Add<f64> for FrameTimecode {
    type Output = FrameTimecode;

    fn add(self, seconds: f64) -> FrameTimecode {
        assert!(seconds.is_finite(), "Seconds must be finite, got: {}", seconds);
        let frames = seconds_to_frames(seconds.abs(), self.fps);
        if seconds < 0.0 { self - frames } else { self + frames }
    }
}

impl Sub<f64> for FrameTimecode {
    type Output = FrameTimecode;

    fn sub(self, seconds: f64) -> FrameTimecode {
        self + (-seconds)
    }
}

impl AddAssign for FrameTimecode {
    fn add_assign(&mut self, rhs: FrameTimecode) {
        *self = *self + rhs;
    }
}

impl SubAssign for FrameTimecode {
    fn sub_assign(&mut self, rhs: FrameTimecode) {
        *self = *self - rhs;
    }
}

impl AddAssign<u64> for FrameTimecode {
    fn add_assign(&mut self, frames: u64) {
        *self = *self + frames;
    }
}

impl SubAssign<u64> for FrameTimecode {
    fn sub_assign(&mut self, frames: u64) {
        *self = *self - frames;
    }
}

impl AddAssign<f64> for FrameTimecode {
    fn add_assign(&mut self, seconds: f64) {
        *self = *self + seconds;
    }
}

impl SubAssign<f64> for FrameTimecode {
    fn sub_assign(&mut self, seconds: f64) {
        *self = *self - seconds;
    }
}

impl PartialEq for FrameTimecode {
    fn eq(&self, other: &FrameTimecode) -> bool {
        self.assert_rate(other);
        self.frame_number == other.frame_number
    }
}

impl Eq for FrameTimecode {}

impl PartialOrd for FrameTimecode {
    fn partial_cmp(&self, other: &FrameTimecode) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrameTimecode {
    fn cmp(&self, other: &FrameTimecode) -> Ordering {
        self.assert_rate(other);
        self.frame_number.cmp(&other.frame_number)
    }
}

impl PartialEq<u64> for FrameTimecode {
    fn eq(&self, frames: &u64) -> bool {
        self.frame_number == *frames
    }
}

impl PartialOrd<u64> for FrameTimecode {
    fn partial_cmp(&self, frames: &u64) -> Option<Ordering> {
        Some(self.frame_number.cmp(frames))
    }
}

impl PartialEq<f64> for FrameTimecode {
    fn eq(&self, seconds: &f64) -> bool {
        self.partial_cmp(seconds) == Some(Ordering::Equal)
    }
}

impl PartialOrd<f64> for FrameTimecode {
    fn partial_cmp(&self, seconds: &f64) -> Option<Ordering> {
        if seconds.is_nan() {
            return None;
        }
        if *seconds < 0.0 {
            return Some(Ordering::Greater);
        }
        if seconds.is_infinite() {
            return Some(Ordering::Less);
        }
        Some(self.frame_number.cmp(&seconds_to_frames(*seconds, self.fps)))
    }
}

impl PartialEq<&str> for FrameTimecode {
    fn eq(&self, text: &&str) -> bool {
        self.partial_cmp(text) == Some(Ordering::Equal)
    }
}

impl PartialOrd<&str> for FrameTimecode {
    fn partial_cmp(&self, text: &&str) -> Option<Ordering> {
        let other = FrameTimecode::parse(text, self.fps).ok()?;
        Some(self.frame_number.cmp(&other.frame_number))
    }
}
