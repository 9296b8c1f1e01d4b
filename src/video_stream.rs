//! Frame sources feeding the scene manager
//!
//! A [`FrameSource`] hands out decoded RGB frames in presentation order along
//! with the framerate they were captured at. Two sources are provided: an
//! in-memory [`FrameBuffer`] and an [`ImageSequence`] reading a directory of
//! numbered still images.

use std::fs;
use std::path::{Path, PathBuf};
use image::RgbImage;
use tracing::{instrument, debug, info, trace};
use crate::common::{Result, SceneDetectError};
use crate::timecode::FrameTimecode;

/// File extensions recognised by [`ImageSequence`]
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// A sequential supply of decoded frames
pub trait FrameSource {
    /// Frames per second of the source
    fn frame_rate(&self) -> f64;

    /// Index of the frame the next call to [`FrameSource::read`] returns
    fn frame_number(&self) -> u64;

    /// Decode the next frame, `None` once the source is exhausted
    fn read(&mut self) -> Result<Option<RgbImage>>;

    /// Advance past `count` frames without handing them out
    ///
    /// Returns how many frames were actually skipped.
    fn skip(&mut self, count: u64) -> Result<u64> {
        let mut skipped = 0;
        while skipped < count && self.read()?.is_some() {
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Move so that the next frame read is `target`
    fn seek(&mut self, target: FrameTimecode) -> Result<()>;

    /// Rewind to the first frame
    fn reset(&mut self);

    /// Width and height of the frames, if known
    fn frame_size(&self) -> Option<(u32, u32)>;

    /// Position of the next frame as a timecode
    fn position(&self) -> FrameTimecode {
        FrameTimecode::new(self.frame_number(), self.frame_rate())
    }
}

fn check_seek_rate(fps: f64, target: &FrameTimecode) -> Result<()> {
    let here = FrameTimecode::new(0, fps);
    if !here.same_rate(target) {
        return Err(SceneDetectError::FramerateMismatch { left: fps, right: target.fps() });
    }
    Ok(())
}

/// Frames held in memory
pub struct FrameBuffer {
    frames: Vec<RgbImage>,
    fps: f64,
    position: usize,
}

impl FrameBuffer {
    /// Wrap already decoded frames
    ///
    /// # Panics
    /// Panics if `fps` is not positive
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        assert!(fps > 0.0, "FPS must be positive, got: {}", fps);
        debug!("Created FrameBuffer with {} frames at {} fps", frames.len(), fps);
        Self { frames, fps, position: 0 }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for FrameBuffer {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn frame_number(&self) -> u64 {
        self.position as u64
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        let frame = self.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }

    fn skip(&mut self, count: u64) -> Result<u64> {
        let remaining = (self.frames.len() - self.position) as u64;
        let skipped = count.min(remaining);
        self.position += skipped as usize;
        Ok(skipped)
    }

    fn seek(&mut self, target: FrameTimecode) -> Result<()> {
        check_seek_rate(self.fps, &target)?;
        self.position = (target.frame_number() as usize).min(self.frames.len());
        Ok(())
    }

    fn reset(&mut self) {
        self.position = 0;
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        self.frames.first().map(|f| f.dimensions())
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("frames", &self.frames.len())
            .field("fps", &self.fps)
            .field("position", &self.position)
            .finish()
    }
}

/// A directory of still images read in file name order
///
/// Frames are decoded lazily, one per [`FrameSource::read`].
#[derive(Debug)]
pub struct ImageSequence {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    fps: f64,
    position: usize,
    size: (u32, u32),
}

impl ImageSequence {
    /// Open a directory of frames
    ///
    /// # Errors
    /// * `SourceNotFound` - If `dir` is not a directory
    /// * `EmptySource` - If it holds no supported image files
    /// * `InvalidConfig` - If `fps` is not positive
    #[instrument(skip(dir))]
    pub fn open(dir: impl AsRef<Path>, fps: f64) -> Result<Self> {
        let dir = dir.as_ref();
        info!("Opening image sequence: {}", dir.display());

        if !dir.is_dir() {
            return Err(SceneDetectError::SourceNotFound { path: dir.display().to_string() });
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SceneDetectError::config_error(format!("FPS must be positive, got: {}", fps)));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_image_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let first = paths.first().ok_or_else(|| SceneDetectError::EmptySource {
            path: dir.display().to_string(),
        })?;
        let size = image::image_dimensions(first)?;

        info!("Image sequence opened - {} frames, size {}x{}, {} fps",
              paths.len(), size.0, size.1, fps);

        Ok(Self {
            dir: dir.to_path_buf(),
            paths,
            fps,
            position: 0,
            size,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

impl FrameSource for ImageSequence {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn frame_number(&self) -> u64 {
        self.position as u64
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.paths.get(self.position) else {
            debug!("Reached end of image sequence at frame {}", self.position);
            return Ok(None);
        };

        trace!("Decoding frame {} from {}", self.position, path.display());
        let frame = image::open(path)
            .map_err(|e| SceneDetectError::frame_error(self.position as u64, format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        self.position += 1;
        Ok(Some(frame))
    }

    fn skip(&mut self, count: u64) -> Result<u64> {
        let remaining = (self.paths.len() - self.position) as u64;
        let skipped = count.min(remaining);
        self.position += skipped as usize;
        Ok(skipped)
    }

    fn seek(&mut self, target: FrameTimecode) -> Result<()> {
        check_seek_rate(self.fps, &target)?;
        self.position = (target.frame_number() as usize).min(self.paths.len());
        Ok(())
    }

    fn reset(&mut self) {
        self.position = 0;
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        Some(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(4, 3, Rgb([value, value, value]))
    }

    #[test]
    fn test_frame_buffer_reading() {
        let mut source = FrameBuffer::new((0..5).map(|i| solid(i * 10)).collect(), 25.0);
        assert_eq!(source.frame_size(), Some((4, 3)));
        assert_eq!(source.frame_number(), 0);

        assert_eq!(source.read().unwrap().unwrap().get_pixel(0, 0)[0], 0);
        assert_eq!(source.skip(2).unwrap(), 2);
        assert_eq!(source.frame_number(), 3);
        assert_eq!(source.read().unwrap().unwrap().get_pixel(0, 0)[0], 30);
        assert_eq!(source.skip(10).unwrap(), 1);
        assert!(source.read().unwrap().is_none());

        source.reset();
        assert_eq!(source.position(), FrameTimecode::new(0, 25.0));
    }

    #[test]
    fn test_frame_buffer_seek() {
        let mut source = FrameBuffer::new((0..5).map(|i| solid(i * 10)).collect(), 25.0);
        source.seek(FrameTimecode::new(4, 25.0)).unwrap();
        assert_eq!(source.read().unwrap().unwrap().get_pixel(0, 0)[0], 40);

        let result = source.seek(FrameTimecode::new(1, 30.0));
        assert!(matches!(result, Err(SceneDetectError::FramerateMismatch { .. })));
    }

    #[test]
    #[should_panic(expected = "FPS must be positive")]
    fn test_frame_buffer_invalid_fps() {
        FrameBuffer::new(Vec::new(), 0.0);
    }

    #[test]
    fn test_image_sequence() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3u8 {
            solid(i * 100).save(dir.path().join(format!("frame_{:04}.png", i))).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequence::open(dir.path(), 24.0).unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.frame_size(), Some((4, 3)));

        let values: Vec<u8> = std::iter::from_fn(|| source.read().unwrap())
            .map(|frame| frame.get_pixel(0, 0)[0])
            .collect();
        assert_eq!(values, vec![0, 100, 200]);

        source.seek(FrameTimecode::new(1, 24.0)).unwrap();
        assert_eq!(source.frame_number(), 1);
    }

    #[test]
    fn test_image_sequence_errors() {
        let missing = ImageSequence::open("/nonexistent/frames", 24.0);
        assert!(matches!(missing, Err(SceneDetectError::SourceNotFound { .. })));

        let dir = tempfile::tempdir().unwrap();
        let empty = ImageSequence::open(dir.path(), 24.0);
        assert!(matches!(empty, Err(SceneDetectError::EmptySource { .. })));
    }
}
