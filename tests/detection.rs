//! End-to-end detection runs over synthetic frame sequences

use image::{Rgb, RgbImage};
use scenecut::{
    AdaptiveDetector, ComponentWeights, ContentDetector, DetectOptions, Downscale, FilterMode,
    FrameBuffer, FrameTimecode, HashDetector, HistogramDetector, SceneDetectError, SceneManager,
    StatsManager, ThresholdDetector, ThresholdParams, FRAME_SCORE_KEY,
};

const FPS: f64 = 30.0;

fn solid(value: u8) -> RgbImage {
    RgbImage::from_pixel(16, 16, Rgb([value, value, value]))
}

/// `count` frames, each produced by `frame(i)`
fn source(count: u64, frame: impl Fn(u64) -> RgbImage) -> FrameBuffer {
    FrameBuffer::new((0..count).map(frame).collect(), FPS)
}

/// Black frames with a single white frame at `spike`
fn luma_spike(count: u64, spike: u64) -> FrameBuffer {
    source(count, |i| if i == spike { solid(255) } else { solid(0) })
}

fn cut_frames(manager: &SceneManager) -> Vec<u64> {
    manager.get_cut_list().iter().map(|c| c.frame_number()).collect()
}

fn scene_bounds(manager: &SceneManager) -> Vec<(u64, u64)> {
    manager
        .get_scene_list()
        .iter()
        .map(|s| (s.start.frame_number(), s.end.frame_number()))
        .collect()
}

fn content_luma(threshold: f64, mode: FilterMode) -> Box<ContentDetector> {
    Box::new(ContentDetector::new_with_config(threshold, ComponentWeights::luma_only(), 15, mode).unwrap())
}

#[test]
fn test_single_spike_suppress() {
    let mut manager = SceneManager::new();
    manager.add_detector(content_luma(100.0, FilterMode::Suppress)).unwrap();

    let processed = manager.detect_scenes(&mut luma_spike(100, 50), &DetectOptions::default()).unwrap();

    assert_eq!(processed, 100);
    assert_eq!(cut_frames(&manager), vec![50]);
    assert_eq!(scene_bounds(&manager), vec![(0, 50), (50, 100)]);
}

#[test]
fn test_single_spike_merge() {
    let mut manager = SceneManager::new();
    manager.add_detector(content_luma(100.0, FilterMode::Merge)).unwrap();
    manager.detect_scenes(&mut luma_spike(100, 50), &DetectOptions::default()).unwrap();

    // The spike and the return to black form one cluster, closed at its last member
    assert_eq!(cut_frames(&manager), vec![51]);
}

#[test]
fn test_merge_cluster_flushed_at_end() {
    let mut manager = SceneManager::new();
    manager.add_detector(content_luma(100.0, FilterMode::Merge)).unwrap();
    manager.detect_scenes(&mut luma_spike(55, 50), &DetectOptions::default()).unwrap();

    assert_eq!(cut_frames(&manager), vec![51]);
}

#[test]
fn test_content_and_adaptive_share_metrics() {
    let mut manager = SceneManager::new();
    manager.add_detector(Box::new(ContentDetector::new(27.0))).unwrap();

    let result = manager.add_detector(Box::new(AdaptiveDetector::default()));
    assert!(matches!(result, Err(SceneDetectError::DuplicateMetric { .. })));
    assert_eq!(manager.detector_count(), 1);
}

#[test]
fn test_adaptive_hard_cut() {
    let mut manager = SceneManager::new();
    manager.add_detector(Box::new(AdaptiveDetector::default())).unwrap();
    manager
        .detect_scenes(&mut source(100, |i| if i < 50 { solid(0) } else { solid(255) }), &DetectOptions::default())
        .unwrap();

    assert_eq!(cut_frames(&manager), vec![50]);
    let ratio = manager.stats_manager().get_metrics(50, &["adaptive_ratio (w=2)"]);
    assert_eq!(ratio, vec![Some(255.0)]);
}

#[test]
fn test_threshold_fade_bias() {
    for (bias, expected) in [(0.0, 120), (1.0, 140), (-1.0, 100)] {
        let detector = ThresholdDetector::new(ThresholdParams { fade_bias: bias, ..Default::default() }).unwrap();
        let mut manager = SceneManager::new();
        manager.add_detector(Box::new(detector)).unwrap();

        let mut frames = source(200, |i| if (100..140).contains(&i) { solid(0) } else { solid(180) });
        manager.detect_scenes(&mut frames, &DetectOptions::default()).unwrap();

        assert_eq!(cut_frames(&manager), vec![expected], "fade bias {}", bias);
    }
}

#[test]
fn test_hash_and_histogram_agree() {
    let frame = |i: u64| {
        if i < 30 {
            RgbImage::from_fn(32, 32, |x, y| if (x / 4 + y / 4) % 2 == 0 { Rgb([220, 30, 30]) } else { Rgb([20, 20, 20]) })
        } else {
            RgbImage::from_fn(32, 32, |x, _| if x < 16 { Rgb([30, 30, 220]) } else { Rgb([240, 240, 240]) })
        }
    };

    let mut manager = SceneManager::new();
    manager.add_detector(Box::new(HashDetector::new(0.2, 8, 2, 15).unwrap())).unwrap();
    manager.add_detector(Box::new(HistogramDetector::default())).unwrap();
    manager.detect_scenes(&mut source(60, frame), &DetectOptions::default()).unwrap();

    assert_eq!(cut_frames(&manager), vec![30]);
    assert_eq!(scene_bounds(&manager), vec![(0, 30), (30, 60)]);
}

#[test]
fn test_stats_cache_drives_second_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.csv");

    let mut manager = SceneManager::new();
    manager.add_detector(content_luma(100.0, FilterMode::Suppress)).unwrap();
    manager.detect_scenes(&mut luma_spike(100, 50), &DetectOptions::default()).unwrap();
    assert!(manager.stats_manager().is_save_required());
    manager.stats_manager_mut().save_to_path(&path, FPS).unwrap();

    let mut stats = StatsManager::new();
    assert_eq!(stats.load_from_path(&path, FPS).unwrap(), 99);
    assert_eq!(stats.get_metrics(50, &[FRAME_SCORE_KEY]), vec![Some(255.0)]);

    // Pixels are all black now; the cached scores still place the cut
    let mut manager = SceneManager::with_stats_manager(stats);
    manager.add_detector(content_luma(100.0, FilterMode::Suppress)).unwrap();
    manager.detect_scenes(&mut source(100, |_| solid(0)), &DetectOptions::default()).unwrap();
    assert_eq!(cut_frames(&manager), vec![50]);

    let mut wrong_rate = StatsManager::new();
    assert!(matches!(
        wrong_rate.load_from_path(&path, 25.0),
        Err(SceneDetectError::StatsFramerateMismatch { .. })
    ));
}

#[test]
fn test_end_position_stops_early() {
    let mut manager = SceneManager::new();
    manager.add_detector(content_luma(100.0, FilterMode::Suppress)).unwrap();

    let options = DetectOptions {
        end: Some(FrameTimecode::new(40, FPS)),
        frame_skip: 0,
        downscale: Downscale::None,
    };
    let processed = manager.detect_scenes(&mut luma_spike(100, 50), &options).unwrap();

    assert_eq!(processed, 40);
    assert!(cut_frames(&manager).is_empty());
    assert_eq!(scene_bounds(&manager), vec![(0, 40)]);
}

#[test]
fn test_empty_source() {
    let mut manager = SceneManager::new();
    manager.add_detector(Box::new(ContentDetector::new(27.0))).unwrap();

    let processed = manager.detect_scenes(&mut source(0, |_| solid(0)), &DetectOptions::default()).unwrap();
    assert_eq!(processed, 0);
    assert!(manager.get_scene_list().is_empty());
}
