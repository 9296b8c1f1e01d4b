//! Command-line interface for the scene detection library
//!
//! Runs the configured detectors over a directory of frames and prints the
//! cuts and scenes found. A stats file can be given to cache per-frame metrics
//! between runs.

use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use tracing::{info, warn, debug};
use scenecut::{
    init_tracing, DetectionConfig, DetectorConfig, FrameSource, ImageSequence, Scene,
    SceneDetectError, SceneManager, StatsManager, DETECTOR_NAMES,
};

const DEFAULT_FPS: f64 = 30.0;

/// Command-line arguments structure
#[derive(Debug)]
struct Args {
    frames_dir: PathBuf,
    fps: f64,
    config: Option<PathBuf>,
    detector: Option<String>,
    threshold: Option<f64>,
    min_scene_len: Option<String>,
    stats: Option<PathBuf>,
    output_format: OutputFormat,
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Simple,     // Just cut frame numbers
    Detailed,   // Scenes with timecodes
    Json,       // JSON format for integration
}

impl Default for Args {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::new(),
            fps: DEFAULT_FPS,
            config: None,
            detector: None,
            threshold: None,
            min_scene_len: None,
            stats: None,
            output_format: OutputFormat::Simple,
            verbose: false,
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    // Initialize tracing based on verbosity
    let log_level = if args.verbose { "debug" } else { "info" };
    init_tracing(log_level);

    info!("Scene Detection CLI v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let config = build_config(&args)?;
    let mut source = ImageSequence::open(&args.frames_dir, args.fps)
        .with_context(|| format!("Failed to open frames in {}", args.frames_dir.display()))?;

    let stats = match &args.stats {
        Some(path) => load_stats(path, args.fps)?,
        None => StatsManager::new(),
    };

    let mut manager = SceneManager::with_stats_manager(stats);
    for detector in config.build_detectors(args.fps).context("Invalid detector configuration")? {
        manager.add_detector(detector)?;
    }

    let start_time = Instant::now();
    let frames = manager
        .detect_scenes(&mut source, &config.detect_options())
        .context("Scene detection failed")?;
    let detection_time = start_time.elapsed();

    if let Some(path) = &args.stats {
        if manager.stats_manager().is_save_required() {
            let rows = manager
                .stats_manager_mut()
                .save_to_path(path, source.frame_rate())
                .with_context(|| format!("Failed to write stats file {}", path.display()))?;
            info!("Saved {} stats rows to {}", rows, path.display());
        }
    }

    let scenes = manager.get_scene_list();
    output_results(&manager, &scenes, &args, &config, frames, detection_time)?;

    Ok(())
}

fn parse_args(args: &[String]) -> std::result::Result<Args, String> {
    let program = args.first().map(String::as_str).unwrap_or("scenecut");
    let usage = format!(
        "Usage: {} <frames_dir> [OPTIONS]\n\n\
        Options:\n\
        --fps <value>            Framerate of the image sequence (default: {})\n\
        --config <file>          JSON detection configuration\n\
        --detector <name>        Detector to run: {}\n\
        --threshold <value>      Detection threshold for every detector\n\
        --min-scene-len <tc>     Minimum scene length: frames, seconds (0.6s) or HH:MM:SS\n\
        --stats <file>           Stats file to load and save per-frame metrics\n\
        --format <fmt>           Output format: simple|detailed|json (default: simple)\n\
        --verbose                Enable debug logging\n\
        --help                   Show this help message\n\n\
        Examples:\n\
        {} frames/\n\
        {} frames/ --fps 24 --detector adaptive --verbose\n\
        {} frames/ --config detect.json --stats frames.stats.csv --format json",
        program, DEFAULT_FPS, DETECTOR_NAMES.join("|"), program, program, program
    );

    if args.len() < 2 {
        return Err(usage);
    }
    if args[1] == "--help" {
        return Err(usage);
    }

    let mut parsed_args = Args {
        frames_dir: PathBuf::from(&args[1]),
        ..Args::default()
    };

    let mut i = 2;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = |name: &str| -> std::result::Result<String, String> {
            args.get(i + 1).cloned().ok_or_else(|| format!("{} requires a value", name))
        };

        match flag {
            "--fps" => {
                let fps: f64 = value(flag)?.parse().map_err(|_| "Invalid fps value")?;
                if !fps.is_finite() || fps <= 0.0 {
                    return Err("--fps must be positive".to_string());
                }
                parsed_args.fps = fps;
                i += 2;
            }
            "--config" => {
                parsed_args.config = Some(PathBuf::from(value(flag)?));
                i += 2;
            }
            "--detector" => {
                let name = value(flag)?;
                if !DETECTOR_NAMES.contains(&name.as_str()) {
                    return Err(format!("Invalid detector. Use one of: {}", DETECTOR_NAMES.join(", ")));
                }
                parsed_args.detector = Some(name);
                i += 2;
            }
            "--threshold" => {
                parsed_args.threshold = Some(value(flag)?.parse().map_err(|_| "Invalid threshold value")?);
                i += 2;
            }
            "--min-scene-len" => {
                parsed_args.min_scene_len = Some(value(flag)?);
                i += 2;
            }
            "--stats" => {
                parsed_args.stats = Some(PathBuf::from(value(flag)?));
                i += 2;
            }
            "--format" => {
                parsed_args.output_format = match value(flag)?.as_str() {
                    "simple" => OutputFormat::Simple,
                    "detailed" => OutputFormat::Detailed,
                    "json" => OutputFormat::Json,
                    _ => return Err("Invalid format. Use 'simple', 'detailed', or 'json'".to_string()),
                };
                i += 2;
            }
            "--verbose" => {
                parsed_args.verbose = true;
                i += 1;
            }
            "--help" => return Err(usage),
            _ => {
                return Err(format!("Unknown option: {}", args[i]));
            }
        }
    }

    Ok(parsed_args)
}

/// Merge the config file (if any) with command-line overrides
fn build_config(args: &Args) -> Result<DetectionConfig> {
    let mut config = match &args.config {
        Some(path) => DetectionConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DetectionConfig::default(),
    };

    if let Some(name) = &args.detector {
        config.detectors = vec![DetectorConfig::from_name(name)?];
    }
    if let Some(threshold) = args.threshold {
        for detector in &mut config.detectors {
            detector.set_threshold(threshold);
        }
    }
    if let Some(min_scene_len) = &args.min_scene_len {
        config.min_scene_len = min_scene_len.clone();
    }

    debug!("Detection config: {:?}", config);
    Ok(config)
}

/// Load a stats file, starting fresh when it is missing or unusable
fn load_stats(path: &Path, fps: f64) -> Result<StatsManager> {
    let mut stats = StatsManager::new();
    if !path.exists() {
        info!("Stats file {} does not exist yet, it will be created", path.display());
        return Ok(stats);
    }

    match stats.load_from_path(path, fps) {
        Ok(rows) => {
            info!("Loaded {} cached frames from {}", rows, path.display());
            Ok(stats)
        }
        Err(e @ (SceneDetectError::StatsCorrupt { .. } | SceneDetectError::StatsFramerateMismatch { .. })) => {
            warn!("Ignoring stats file {}: {}", path.display(), e);
            Ok(StatsManager::new())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read stats file {}", path.display())),
    }
}

fn output_results(
    manager: &SceneManager,
    scenes: &[Scene],
    args: &Args,
    config: &DetectionConfig,
    frames: u64,
    detection_time: Duration,
) -> Result<()> {
    let cuts: Vec<u64> = manager.get_cut_list().iter().map(|c| c.frame_number()).collect();

    match args.output_format {
        OutputFormat::Simple => {
            println!("Scene changes detected at frames: {:?}", cuts);
        }
        OutputFormat::Detailed => {
            println!("Scene Detection Results:");
            println!("  Frames processed: {}", frames);
            println!("  Detection time: {}ms", detection_time.as_millis());
            println!("  Scenes found: {}", scenes.len());

            for (i, scene) in scenes.iter().enumerate() {
                println!("    Scene {:>3}: {} - {} (frames {}-{}, {:.2}s)",
                         i + 1, scene.start, scene.end,
                         scene.start.frame_number(), scene.end.frame_number(),
                         scene.duration_seconds());
            }
        }
        OutputFormat::Json => {
            let scene_list: Vec<serde_json::Value> = scenes
                .iter()
                .map(|scene| serde_json::json!({
                    "start_frame": scene.start.frame_number(),
                    "end_frame": scene.end.frame_number(),
                    "start_timecode": scene.start.to_string(),
                    "end_timecode": scene.end.to_string(),
                }))
                .collect();

            // JSON output for programmatic consumption
            let json_output = serde_json::json!({
                "frames_dir": args.frames_dir.display().to_string(),
                "fps": args.fps,
                "frames_processed": frames,
                "detection_time_ms": detection_time.as_millis() as u64,
                "cut_frames": cuts,
                "scenes": scene_list,
                "config": config,
            });

            println!("{}", serde_json::to_string_pretty(&json_output)
                .context("JSON serialization failed")?);
        }
    }

    info!("Detection completed in {}ms, found {} scenes", detection_time.as_millis(), scenes.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("scenecut").chain(list.iter().copied()).map(String::from).collect()
    }

    #[test]
    fn test_args_parsing_basic() {
        let parsed = parse_args(&args(&[
            "frames", "--fps", "24", "--detector", "hash", "--threshold", "0.3",
            "--min-scene-len", "1s", "--format", "json", "--verbose",
        ])).unwrap();

        assert_eq!(parsed.frames_dir, PathBuf::from("frames"));
        assert_eq!(parsed.fps, 24.0);
        assert_eq!(parsed.detector.as_deref(), Some("hash"));
        assert_eq!(parsed.threshold, Some(0.3));
        assert_eq!(parsed.min_scene_len.as_deref(), Some("1s"));
        assert_eq!(parsed.output_format, OutputFormat::Json);
        assert!(parsed.verbose);
    }

    #[test]
    fn test_args_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["frames", "--fps"])).is_err());
        assert!(parse_args(&args(&["frames", "--fps", "-3"])).is_err());
        assert!(parse_args(&args(&["frames", "--detector", "magic"])).is_err());
        assert!(parse_args(&args(&["frames", "--format", "xml"])).is_err());
        assert!(parse_args(&args(&["frames", "--bogus"])).is_err());
    }

    #[test]
    fn test_default_args() {
        let parsed = parse_args(&args(&["frames"])).unwrap();
        assert_eq!(parsed.fps, DEFAULT_FPS);
        assert!(parsed.config.is_none());
        assert!(parsed.stats.is_none());
        assert_eq!(parsed.output_format, OutputFormat::Simple);
    }

    #[test]
    fn test_build_config_overrides() {
        let parsed = parse_args(&args(&["frames", "--detector", "histogram", "--threshold", "0.2",
                                        "--min-scene-len", "10"])).unwrap();
        let config = build_config(&parsed).unwrap();

        assert_eq!(config.min_scene_len, "10");
        assert_eq!(config.detectors.len(), 1);
        match &config.detectors[0] {
            DetectorConfig::Histogram(c) => assert_eq!(c.threshold, 0.2),
            other => panic!("Expected histogram detector, got: {:?}", other),
        }
    }

    #[test]
    fn test_load_stats_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.csv");

        assert!(!load_stats(&path, 30.0).unwrap().is_save_required());

        std::fs::write(&path, "not a stats file\n").unwrap();
        let stats = load_stats(&path, 30.0).unwrap();
        assert!(stats.registered_metrics().is_empty());
    }
}
