//! Integration tests for the fetching loop and the frame buffer behind it
//!
//! These drive the loop through the `Enhancer` against the synthetic pattern
//! camera and check tick timing, buffer policies, and the stop guarantees.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{EventLog, VIDEO_H, VIDEO_W, config, pattern_enhancer, wait_for};
use scan_capture::acquisition::{LoopPhase, RunState};
use scan_capture::capture::{CaptureSource, SourceKind, VideoDeviceInfo};
use scan_capture::core::RawFrame;
use scan_capture::{
    Enhancer, EnhancerResult, EventKind, FitMode, Region, SourceProvider, SourceRequest,
};
use scan_geometry::cpu::PixelRect;

#[tokio::test(start_paused = true)]
async fn test_ring_buffer_keeps_newest_frames_in_order() {
    let (enhancer, _) = pattern_enhancer(config(10, 3, 0));
    enhancer.open().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(enhancer.number_of_frames_in_buffer(), 3);
    let stats = enhancer.loop_stats();
    assert!(stats.buffer.evicted > 0, "ring mode should evict: {stats:?}");

    let first = enhancer.get_frame_from_buffer(Some(0)).unwrap();
    let second = enhancer.get_frame_from_buffer(Some(0)).unwrap();
    assert!(first.sequence < second.sequence);
    assert!(first.timestamp <= second.timestamp);
    assert_eq!(enhancer.number_of_frames_in_buffer(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_latch_mode_keeps_first_frames_until_drained() {
    let (enhancer, _) = pattern_enhancer(config(10, 2, -1));
    enhancer.open().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let oldest = enhancer.peek_latest_frame().unwrap();
    assert_eq!(enhancer.number_of_frames_in_buffer(), 2);
    assert!(enhancer.loop_stats().buffer.rejected_full > 0);

    // Latched frames are the first two grabbed, however long we wait.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(enhancer.peek_latest_frame().unwrap().sequence, oldest.sequence);

    // Draining one slot lets the next tick in.
    enhancer.get_frame_from_buffer(Some(0)).unwrap();
    assert!(
        wait_for(Duration::from_millis(50), || {
            enhancer
                .peek_latest_frame()
                .map(|f| f.sequence > oldest.sequence)
                .unwrap_or(false)
        })
        .await
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_spaces_buffered_frames() {
    let (enhancer, _) = pattern_enhancer(config(10, 10, 45));
    enhancer.open().await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = enhancer.loop_stats();
    assert!(stats.buffer.rejected_rate > 0);

    let mut previous = None;
    while let Ok(frame) = enhancer.get_frame_from_buffer(Some(0)) {
        if let Some(prev) = previous {
            assert!(frame.timestamp - prev >= Duration::from_millis(45));
        }
        previous = Some(frame.timestamp);
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_and_clears_buffer() {
    let (enhancer, _) = pattern_enhancer(config(10, 5, 0));
    let log = EventLog::attach(&enhancer);
    enhancer.open().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(enhancer.number_of_frames_in_buffer() > 0);

    enhancer.stop_fetching_loop();
    enhancer.stop_fetching_loop();

    assert!(!enhancer.is_fetching_loop_started());
    assert_eq!(enhancer.number_of_frames_in_buffer(), 0);
    assert_eq!(log.count(EventKind::FetchingLoopStarted), 1);
    assert_eq!(log.count(EventKind::FetchingLoopStopped), 1);
    // The source stays open; only the loop stopped.
    assert!(enhancer.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_no_frame_lands_after_stop() {
    let (enhancer, _) = pattern_enhancer(config(10, 5, 0));
    enhancer.open().await.unwrap();
    tokio::time::sleep(Duration::from_millis(35)).await;

    enhancer.stop_fetching_loop();
    let ticks = enhancer.loop_stats().ticks;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(enhancer.number_of_frames_in_buffer(), 0);
    assert_eq!(enhancer.loop_stats().ticks, ticks);
    assert!(enhancer.get_frame_from_buffer(None).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_restart_resumes_ticking() {
    let (enhancer, _) = pattern_enhancer(config(10, 5, 0));
    enhancer.open().await.unwrap();
    enhancer.stop_fetching_loop();

    enhancer.start_fetching_loop().unwrap();
    enhancer.start_fetching_loop().unwrap();
    assert_eq!(enhancer.loop_phase(), LoopPhase::Running(RunState::Active));

    assert!(wait_for(Duration::from_millis(50), || enhancer.number_of_frames_in_buffer() > 0).await);
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_applies_while_running() {
    let (enhancer, _) = pattern_enhancer(config(10, 100, 0));
    enhancer.open().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    enhancer.set_loop_interval(Duration::from_millis(50)).unwrap();
    // Let the pending 10ms tick pick up the new period.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let before = enhancer.loop_stats().ticks;

    tokio::time::sleep(Duration::from_millis(500)).await;
    let ticks = enhancer.loop_stats().ticks - before;
    assert!((9..=11).contains(&ticks), "expected ~10 ticks, got {ticks}");
    assert_eq!(enhancer.get_loop_interval(), Duration::from_millis(50));

    assert!(enhancer.set_loop_interval(Duration::ZERO).is_err());
    assert_eq!(enhancer.get_loop_interval(), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_ticks_without_source_are_skipped() {
    let mut cfg = config(10, 5, 0);
    cfg.start_fetching_on_play = false;
    let (enhancer, _) = pattern_enhancer(cfg);

    enhancer.start_fetching_loop().unwrap();
    tokio::time::sleep(Duration::from_millis(55)).await;

    let stats = enhancer.loop_stats();
    assert!(stats.ticks >= 5);
    assert_eq!(stats.skipped, stats.ticks);
    assert_eq!(enhancer.number_of_frames_in_buffer(), 0);

    // Opening does not restart the loop; the armed loop starts delivering.
    enhancer.open().await.unwrap();
    assert!(wait_for(Duration::from_millis(50), || enhancer.number_of_frames_in_buffer() > 0).await);
}

#[tokio::test(start_paused = true)]
async fn test_frames_are_cropped_to_scan_region() {
    let (enhancer, _) = pattern_enhancer(config(10, 5, 0));
    enhancer
        .set_scan_region(Region::percent(25.0, 25.0, 75.0, 75.0))
        .unwrap();
    enhancer.open().await.unwrap();

    let frame = enhancer.get_frame().await.unwrap();
    assert!(frame.is_cropped);
    assert_eq!(
        frame.source,
        PixelRect {
            x: VIDEO_W / 4,
            y: VIDEO_H / 4,
            w: VIDEO_W / 2,
            h: VIDEO_H / 2,
        }
    );
    assert_eq!((frame.width, frame.height), (VIDEO_W / 2, VIDEO_H / 2));
    assert_eq!(frame.data.len(), frame.len_bytes());
    assert_eq!(frame.region, Region::percent(25.0, 25.0, 75.0, 75.0));
    assert_eq!(frame.region_index, None);
}

#[tokio::test(start_paused = true)]
async fn test_cover_fit_crops_to_visible_area() {
    let (enhancer, _) = pattern_enhancer(config(10, 5, 0));
    enhancer.set_video_fit(FitMode::Cover);
    // A square container shows the middle 120x120 of the 160x120 frame.
    enhancer.set_container_size(100.0, 100.0).unwrap();
    enhancer.open().await.unwrap();

    let frame = enhancer.get_frame().await.unwrap();
    assert_eq!(frame.source, PixelRect { x: 20, y: 0, w: 120, h: 120 });
    assert_eq!((frame.width, frame.height), (120, 120));
}

#[tokio::test(start_paused = true)]
async fn test_canvas_max_side_downscales() {
    let (enhancer, _) = pattern_enhancer(config(10, 5, 0));
    enhancer.set_canvas_max_side(40).unwrap();
    enhancer.open().await.unwrap();

    let frame = enhancer.get_frame().await.unwrap();
    assert_eq!(frame.source, PixelRect::full(VIDEO_W, VIDEO_H));
    assert_eq!((frame.width, frame.height), (40, 30));
    assert!(enhancer.set_canvas_max_side(0).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_cropping_regions_auto_advance() {
    let (enhancer, _) = pattern_enhancer(config(10, 10, 0));
    let regions = vec![
        Region::percent(0.0, 0.0, 50.0, 50.0),
        Region::percent(50.0, 50.0, 100.0, 100.0),
    ];
    enhancer.set_cropping_regions(regions.clone()).unwrap();
    enhancer.set_auto_advance_region_index(true);
    enhancer.open().await.unwrap();

    tokio::time::sleep(Duration::from_millis(45)).await;
    let mut indexes = Vec::new();
    while let Ok(frame) = enhancer.get_frame_from_buffer(Some(0)) {
        assert_eq!(frame.region, regions[frame.region_index.unwrap()]);
        indexes.push(frame.region_index.unwrap());
    }
    assert!(indexes.len() >= 4);
    for pair in indexes.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_capacity_and_refresh_setters() {
    let (enhancer, _) = pattern_enhancer(config(10, 5, 0));
    enhancer.open().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(enhancer.number_of_frames_in_buffer(), 5);

    enhancer.set_max_number_of_frames_in_buffer(2).unwrap();
    assert_eq!(enhancer.number_of_frames_in_buffer(), 2);
    assert_eq!(enhancer.get_max_number_of_frames_in_buffer(), 2);
    assert!(enhancer.set_max_number_of_frames_in_buffer(0).is_err());

    enhancer.set_refresh_interval(-1).unwrap();
    assert_eq!(enhancer.get_refresh_interval(), -1);
    assert!(enhancer.set_refresh_interval(-2).is_err());
    assert_eq!(enhancer.get_refresh_interval(), -1);

    assert!(enhancer.buffer_staleness().is_some());
    enhancer.clear_buffer();
    assert_eq!(enhancer.buffer_staleness(), None);
}

/// Camera whose frames claim a row stride shorter than a row of pixels.
struct ShortStrideSource;

#[async_trait]
impl CaptureSource for ShortStrideSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn device_id(&self) -> Option<&str> {
        Some("short-stride")
    }

    fn intrinsic_size(&self) -> (u32, u32) {
        (4, 3)
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn capture_frame(&mut self) -> EnhancerResult<RawFrame> {
        Ok(RawFrame {
            data: vec![0u8; 4 * 3 * 4].into(),
            width: 4,
            height: 3,
            stride: 4,
        })
    }

    async fn shutdown(&mut self) -> EnhancerResult<()> {
        Ok(())
    }
}

struct ShortStrideProvider;

#[async_trait]
impl SourceProvider for ShortStrideProvider {
    async fn devices(&self) -> EnhancerResult<Vec<VideoDeviceInfo>> {
        Ok(Vec::new())
    }

    async fn open(&self, _request: &SourceRequest) -> EnhancerResult<Box<dyn CaptureSource>> {
        Ok(Box::new(ShortStrideSource))
    }
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_are_skipped_and_loop_keeps_ticking() {
    let enhancer = Enhancer::new(config(10, 5, 0), Arc::new(ShortStrideProvider)).unwrap();
    enhancer.open().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = enhancer.loop_stats();
    assert!(stats.ticks >= 5, "loop stopped ticking: {stats:?}");
    assert_eq!(stats.skipped, stats.ticks);
    assert!(enhancer.is_fetching_loop_started());
    assert_eq!(enhancer.number_of_frames_in_buffer(), 0);
}
