//! Per-frame metric cache
//!
//! Detectors record the values they compute for each frame (content scores,
//! hash distances, ...) in a [`StatsManager`]. The table can be written to a
//! comma-separated stats file and loaded back, so a later run over the same
//! video can re-use the values instead of decoding and analysing every frame
//! again.
//!
//! Storage is dense: each registered metric gets a small integer
//! [`MetricId`] and a column indexed by frame number.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};
use crate::common::{Result, SceneDetectError};
use crate::timecode::{FrameTimecode, MAX_FPS_DELTA};

const FRAME_RATE_HEADER: &str = "Frame Rate:";
const FRAME_NUMBER_HEADER: &str = "Frame Number";
const TIMECODE_HEADER: &str = "Timecode";

/// Highest frame number accepted in a stats file (about 6 days at 30 fps)
pub const MAX_STATS_FRAME: u64 = 1 << 24;

/// Index of a metric column inside a [`StatsManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(usize);

#[derive(Debug, Clone)]
struct MetricColumn {
    name: String,
    registered: bool,
    values: Vec<Option<f64>>,
}

impl MetricColumn {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            registered: false,
            values: Vec::new(),
        }
    }

    fn get(&self, frame: u64) -> Option<f64> {
        usize::try_from(frame).ok().and_then(|i| self.values.get(i).copied().flatten())
    }

    fn set(&mut self, frame: u64, value: f64) {
        let Some(len) = usize::try_from(frame).ok().and_then(|i| i.checked_add(1)) else {
            warn!("Dropping {} value for unaddressable frame {}", self.name, frame);
            return;
        };
        if len > self.values.len() {
            self.values.resize(len, None);
        }
        self.values[len - 1] = Some(value);
    }
}

/// Frame metric table shared by all detectors of one scene manager
#[derive(Debug, Clone, Default)]
pub struct StatsManager {
    columns: Vec<MetricColumn>,
    index: HashMap<String, MetricId>,
    dirty: bool,
}

impl StatsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the metric names a detector is going to write
    ///
    /// Fails with [`SceneDetectError::DuplicateMetric`] if any name is already
    /// registered, in which case nothing is registered. Columns that only
    /// exist because they were loaded from a stats file can be claimed.
    /// Names that cannot be written to a stats file are rejected with
    /// [`SceneDetectError::InvalidConfig`].
    #[instrument(skip(self))]
    pub fn register_metrics(&mut self, names: &[&str]) -> Result<Vec<MetricId>> {
        for (i, name) in names.iter().enumerate() {
            check_metric_name(name)?;
            let repeated = names[..i].contains(name);
            let taken = self.index.get(*name).map_or(false, |id| self.columns[id.0].registered);
            if repeated || taken {
                return Err(SceneDetectError::DuplicateMetric { name: name.to_string() });
            }
        }

        let ids: Vec<MetricId> = names
            .iter()
            .map(|name| {
                let id = self.column_for(name);
                self.columns[id.0].registered = true;
                id
            })
            .collect();

        debug!("Registered metrics: {:?}", names);
        Ok(ids)
    }

    /// Look up the id of a known metric
    pub fn metric_id(&self, name: &str) -> Option<MetricId> {
        self.index.get(name).copied()
    }

    /// Look up the id of a metric, creating an unregistered column if needed
    pub(crate) fn metric_id_or_insert(&mut self, name: &str) -> MetricId {
        self.column_for(name)
    }

    /// Names of every registered metric, in registration order
    pub fn registered_metrics(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.registered)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn get_by_id(&self, frame: u64, id: MetricId) -> Option<f64> {
        self.columns.get(id.0).and_then(|c| c.get(frame))
    }

    pub fn set_by_id(&mut self, frame: u64, id: MetricId, value: f64) {
        if let Some(column) = self.columns.get_mut(id.0) {
            column.set(frame, value);
            self.dirty = true;
        }
    }

    /// Get the values of `names` for a frame; `None` where nothing is stored
    pub fn get_metrics(&self, frame: u64, names: &[&str]) -> Vec<Option<f64>> {
        names
            .iter()
            .map(|name| self.metric_id(name).and_then(|id| self.get_by_id(frame, id)))
            .collect()
    }

    /// Store values for a frame, overwriting anything already there
    ///
    /// Nothing is stored if any name is invalid.
    pub fn set_metrics(&mut self, frame: u64, values: &[(&str, f64)]) -> Result<()> {
        for (name, _) in values {
            check_metric_name(name)?;
        }
        for (name, value) in values {
            let id = self.column_for(name);
            self.set_by_id(frame, id, *value);
        }
        Ok(())
    }

    /// Whether every one of `names` has a value for this frame
    pub fn metrics_exist(&self, frame: u64, names: &[&str]) -> bool {
        names
            .iter()
            .all(|name| self.metric_id(name).and_then(|id| self.get_by_id(frame, id)).is_some())
    }

    /// Whether values were set since the last save or load
    pub fn is_save_required(&self) -> bool {
        self.dirty
    }

    /// Drop every stored value and registration
    pub fn clear(&mut self) {
        self.columns.clear();
        self.index.clear();
        self.dirty = false;
    }

    fn column_for(&mut self, name: &str) -> MetricId {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = MetricId(self.columns.len());
        self.columns.push(MetricColumn::new(name));
        self.index.insert(name.to_string(), id);
        id
    }

    fn frame_count(&self) -> u64 {
        self.columns.iter().map(|c| c.values.len() as u64).max().unwrap_or(0)
    }

    /// Write every stored frame as a comma-separated table
    #[instrument(skip(self, writer))]
    pub fn save_to_writer<W: Write>(&mut self, writer: W, fps: f64) -> Result<usize> {
        let mut writer = BufWriter::new(writer);

        let mut order: Vec<usize> = (0..self.columns.len()).collect();
        order.sort_by(|a, b| self.columns[*a].name.cmp(&self.columns[*b].name));

        writeln!(writer, "{},{}", FRAME_RATE_HEADER, fps)?;

        let mut header = vec![FRAME_NUMBER_HEADER.to_string(), TIMECODE_HEADER.to_string()];
        header.extend(order.iter().map(|i| self.columns[*i].name.clone()));
        writeln!(writer, "{}", header.join(","))?;

        let base = FrameTimecode::new(0, fps);
        let mut rows = 0;
        for frame in 0..self.frame_count() {
            let values: Vec<Option<f64>> = order.iter().map(|i| self.columns[*i].get(frame)).collect();
            if values.iter().all(Option::is_none) {
                continue;
            }

            let mut row = vec![frame.to_string(), base.with_frame(frame).to_string()];
            row.extend(values.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
            writeln!(writer, "{}", row.join(","))?;
            rows += 1;
        }

        writer.flush()?;
        self.dirty = false;

        info!("Saved {} frame rows of {} metrics", rows, order.len());
        Ok(rows)
    }

    /// Save to a stats file, replacing it if it exists
    ///
    /// The table is written to a temporary file next to `path` and renamed
    /// over it, so a failed save leaves any previous file intact.
    pub fn save_to_path(&mut self, path: impl AsRef<Path>, fps: f64) -> Result<usize> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staging = NamedTempFile::new_in(dir)?;
        let rows = self.save_to_writer(&mut staging, fps)?;
        staging.persist(path).map_err(|e| e.error)?;
        Ok(rows)
    }

    /// Load a stats table written by [`StatsManager::save_to_writer`]
    ///
    /// The recorded framerate must match `expected_fps`. Loading is
    /// all-or-nothing: any malformed line fails the whole load and leaves the
    /// stored values untouched.
    ///
    /// # Returns
    /// * `Result<usize>` - Number of frame rows loaded
    #[instrument(skip(self, reader))]
    pub fn load_from_reader<R: BufRead>(&mut self, reader: R, expected_fps: f64) -> Result<usize> {
        let mut lines = reader.lines().enumerate().map(|(i, line)| (i + 1, line));

        let (line_no, rate_line) = next_line(&mut lines, 1)?;
        let found = parse_rate_header(&rate_line, line_no)?;
        if (found - expected_fps).abs() >= MAX_FPS_DELTA {
            return Err(SceneDetectError::StatsFramerateMismatch { expected: expected_fps, found });
        }

        let (line_no, column_line) = next_line(&mut lines, 2)?;
        let header: Vec<&str> = column_line.split(',').map(str::trim).collect();
        if header.len() < 2 || header[0] != FRAME_NUMBER_HEADER || header[1] != TIMECODE_HEADER {
            return Err(SceneDetectError::corrupt_stats(line_no, "missing Frame Number/Timecode header"));
        }
        let names: Vec<String> = header[2..].iter().map(|s| s.to_string()).collect();
        if names.iter().any(String::is_empty) {
            return Err(SceneDetectError::corrupt_stats(line_no, "empty metric name"));
        }

        let mut staged: Vec<(u64, Vec<Option<f64>>)> = Vec::new();
        for (line_no, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != header.len() {
                return Err(SceneDetectError::corrupt_stats(
                    line_no,
                    format!("expected {} columns, found {}", header.len(), fields.len()),
                ));
            }

            let frame = fields[0].parse::<u64>().map_err(|e| {
                SceneDetectError::corrupt_stats(line_no, format!("invalid frame number '{}': {}", fields[0], e))
            })?;
            if frame > MAX_STATS_FRAME {
                return Err(SceneDetectError::corrupt_stats(
                    line_no,
                    format!("frame number {} exceeds {}", frame, MAX_STATS_FRAME),
                ));
            }

            let values = fields[2..]
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        return Ok(None);
                    }
                    field.parse::<f64>().map(Some).map_err(|e| {
                        SceneDetectError::corrupt_stats(line_no, format!("invalid value '{}': {}", field, e))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            staged.push((frame, values));
        }

        let ids: Vec<MetricId> = names.iter().map(|name| self.column_for(name)).collect();
        for (frame, values) in &staged {
            for (id, value) in ids.iter().zip(values) {
                if let Some(value) = value {
                    self.columns[id.0].set(*frame, *value);
                }
            }
        }
        self.dirty = false;

        info!("Loaded {} frame rows of {} metrics", staged.len(), names.len());
        Ok(staged.len())
    }

    /// Load a stats file from disk
    pub fn load_from_path(&mut self, path: impl AsRef<Path>, expected_fps: f64) -> Result<usize> {
        let file = File::open(path.as_ref())?;
        self.load_from_reader(BufReader::new(file), expected_fps)
    }
}

fn next_line<I>(lines: &mut I, expected_line: usize) -> Result<(usize, String)>
where
    I: Iterator<Item = (usize, std::io::Result<String>)>,
{
    match lines.next() {
        Some((line_no, line)) => Ok((line_no, line?)),
        None => Err(SceneDetectError::corrupt_stats(expected_line, "unexpected end of file")),
    }
}

/// Metric names end up as stats file column headers
fn check_metric_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(&[',', '\n', '\r'][..]) {
        return Err(SceneDetectError::config_error(format!(
            "Invalid metric name {:?}: must be non-empty without commas or line breaks",
            name
        )));
    }
    Ok(())
}

fn parse_rate_header(line: &str, line_no: usize) -> Result<f64> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    match fields.as_slice() {
        [label, rate] if *label == FRAME_RATE_HEADER => {
            let fps = rate.parse::<f64>().map_err(|e| {
                SceneDetectError::corrupt_stats(line_no, format!("invalid frame rate '{}': {}", rate, e))
            })?;
            if !fps.is_finite() || fps <= 0.0 {
                return Err(SceneDetectError::corrupt_stats(line_no, format!("invalid frame rate '{}'", rate)));
            }
            Ok(fps)
        }
        _ => Err(SceneDetectError::corrupt_stats(line_no, "missing frame rate header")),
    }
}
