//! # Enhancer
//!
//! Application-facing facade. One instance owns one capture source, one
//! scan-region store, one acquisition loop and one event hub, all configured
//! from the [`EnhancerConfig`] given at construction.
//!
//! ```text
//!  LayoutEvent ─▶ Enhancer ─▶ RegionStore ─▶ overlays
//!                    │
//!                    ├─▶ PlaybackController ─▶ SourceSlot ◀─┐
//!                    │                                      │ capture
//!                    └─▶ AcquisitionLoop ─▶ RegionGrabber ──┘
//!                              │
//!                              └─▶ FrameBuffer ─▶ get_frame_from_buffer()
//! ```
//!
//! All methods must be called from within a tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use scan_geometry::{FitMode, Region, Size};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::acquisition::{AcquisitionLoop, LoopPhase, LoopStats, RegionGrabber};
use crate::capture::{SourceProvider, SourceRequest, SourceSlot, VideoDeviceInfo};
use crate::config::EnhancerConfig;
use crate::core::frame::Frame;
use crate::core::frame_buffer::RefreshPolicy;
use crate::error::{EnhancerError, EnhancerResult, classify};
use crate::events::{EnhancerEvent, EventHub, EventKind, ListenerId};
use crate::playback::{PlayInfo, PlayOutcome, PlaybackController, PlaybackState};
use crate::region::{Layout, MaskStyle, OverlayHandle, RegionStore};

/// Notifications from the layout/visibility observer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LayoutEvent {
    /// Container resized, in display pixels.
    Resized { width: f64, height: f64 },
    /// Container moved, in display pixels.
    Moved { x: f64, y: f64 },
    VisibilityChanged { visible: bool },
}

pub struct Enhancer {
    config: RwLock<EnhancerConfig>,
    regions: Arc<RegionStore>,
    layout: Arc<RwLock<Layout>>,
    grabber: Arc<RegionGrabber>,
    acquisition: Arc<AcquisitionLoop>,
    playback: PlaybackController,
    events: EventHub,
    destroyed: AtomicBool,
}

impl Enhancer {
    /// Validate `config` and wire up a closed instance.
    pub fn new(config: EnhancerConfig, provider: Arc<dyn SourceProvider>) -> EnhancerResult<Self> {
        config.validate()?;
        let slot = Arc::new(SourceSlot::new());
        let regions = Arc::new(RegionStore::new());
        regions.set_auto_advance(config.auto_advance_region_index);
        let layout = Arc::new(RwLock::new(Layout::new(config.video_fit)));
        let grabber = Arc::new(RegionGrabber::new(
            slot.clone(),
            regions.clone(),
            layout.clone(),
            config.canvas_max_side,
        ));
        let acquisition = Arc::new(AcquisitionLoop::new(
            grabber.clone(),
            config.loop_interval(),
            config.max_number_of_frames_in_buffer,
            config.refresh_policy()?,
        )?);
        let events = EventHub::new();
        let playback = PlaybackController::new(
            provider,
            slot,
            acquisition.clone(),
            events.clone(),
            config.start_fetching_on_play,
        );
        debug!(?config, "enhancer created");
        Ok(Self {
            config: RwLock::new(config),
            regions,
            layout,
            grabber,
            acquisition,
            playback,
            events,
            destroyed: AtomicBool::new(false),
        })
    }

    fn ensure_alive(&self, operation: &str) -> EnhancerResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(EnhancerError::destroyed(operation));
        }
        Ok(())
    }

    pub fn config(&self) -> EnhancerConfig {
        read(&self.config).clone()
    }

    // ---- playback ----

    /// Open the source described by the configuration.
    pub async fn open(&self) -> EnhancerResult<PlayOutcome> {
        let request = SourceRequest {
            single_frame: read(&self.config).single_frame_mode,
            ..SourceRequest::default()
        };
        self.play(request).await
    }

    /// Open (or switch to) the source described by `request`.
    pub async fn play(&self, request: SourceRequest) -> EnhancerResult<PlayOutcome> {
        self.ensure_alive("open")?;
        let outcome = self.playback.open(&request).await?;
        if let PlayOutcome::Opened(_) = outcome {
            self.relayout();
        }
        Ok(outcome)
    }

    /// Switch to another camera.
    pub async fn select_camera(&self, device_id: &str) -> EnhancerResult<PlayOutcome> {
        self.play(SourceRequest::device(device_id)).await
    }

    pub async fn pause(&self) -> EnhancerResult<()> {
        self.ensure_alive("pause")?;
        self.playback.pause().await
    }

    pub async fn resume(&self) -> EnhancerResult<()> {
        self.ensure_alive("resume")?;
        self.playback.resume().await
    }

    /// Release the source and stop fetching.
    pub async fn close(&self) -> EnhancerResult<()> {
        self.playback.close().await?;
        self.relayout();
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.playback.is_open()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn play_info(&self) -> Option<PlayInfo> {
        self.playback.play_info()
    }

    pub fn get_resolution(&self) -> Option<(u32, u32)> {
        self.playback.resolution()
    }

    pub async fn get_all_cameras(&self) -> EnhancerResult<Vec<VideoDeviceInfo>> {
        self.ensure_alive("get_all_cameras")?;
        self.playback.devices().await
    }

    pub async fn get_capabilities(&self) -> EnhancerResult<serde_json::Value> {
        self.ensure_alive("get_capabilities")?;
        self.playback.capabilities().await
    }

    pub async fn apply_constraints(&self, constraints: &serde_json::Value) -> EnhancerResult<()> {
        self.ensure_alive("apply_constraints")?;
        self.playback.apply_constraints(constraints).await
    }

    // ---- scan region ----

    pub fn set_scan_region(&self, region: Region) -> EnhancerResult<()> {
        self.ensure_alive("set_scan_region")?;
        self.regions.set_region(region)?;
        self.events.emit(EnhancerEvent::ScanRegionChanged(region));
        Ok(())
    }

    pub fn get_scan_region(&self) -> Region {
        self.regions.region()
    }

    /// Enter list mode; an empty list returns to the single scan region.
    pub fn set_cropping_regions(&self, regions: Vec<Region>) -> EnhancerResult<()> {
        self.ensure_alive("set_cropping_regions")?;
        self.regions.set_regions(regions)?;
        self.events
            .emit(EnhancerEvent::ScanRegionChanged(self.regions.region()));
        Ok(())
    }

    pub fn get_cropping_regions(&self) -> Vec<Region> {
        self.regions.regions()
    }

    pub fn set_cropping_region_index(&self, index: usize) -> EnhancerResult<()> {
        self.ensure_alive("set_cropping_region_index")?;
        self.regions.set_index(index)?;
        self.events
            .emit(EnhancerEvent::ScanRegionChanged(self.regions.region()));
        Ok(())
    }

    pub fn get_cropping_region_index(&self) -> Option<usize> {
        self.regions.index()
    }

    pub fn add_scan_region_overlay_canvas(&self) -> EnhancerResult<OverlayHandle> {
        self.ensure_alive("add_scan_region_overlay_canvas")?;
        Ok(self.regions.add_overlay())
    }

    pub fn list_overlay_canvases(&self) -> Vec<OverlayHandle> {
        self.regions.overlays()
    }

    pub fn scan_region_mask(&self) -> OverlayHandle {
        self.regions.scan_region_overlay()
    }

    pub fn set_scan_region_mask_style(&self, style: MaskStyle) {
        self.regions.set_mask_style(style);
    }

    pub fn get_scan_region_mask_style(&self) -> MaskStyle {
        self.regions.mask_style()
    }

    pub fn set_show_scan_region_mask(&self, show: bool) {
        self.regions.set_show_mask(show);
    }

    pub fn if_show_scan_region_mask(&self) -> bool {
        self.regions.show_mask()
    }

    /// Visible part of the video in intrinsic pixels, or in percent of the
    /// intrinsic frame. Empty when nothing is displayed.
    pub fn get_visible_region(&self, in_pixels: bool) -> Region {
        self.display_mapper()
            .map(|m| m.visible_region(in_pixels).region)
            .unwrap_or_else(Region::empty)
    }

    // ---- layout ----

    pub fn set_video_fit(&self, fit: FitMode) {
        write(&self.layout).fit = fit;
        write(&self.config).video_fit = fit;
        self.relayout();
    }

    pub fn get_video_fit(&self) -> FitMode {
        read(&self.layout).fit
    }

    /// Container resized. Negative or non-finite sizes are rejected.
    pub fn set_container_size(&self, width: f64, height: f64) -> EnhancerResult<()> {
        let size = Size::new(width, height)
            .checked("container")
            .map_err(|e| EnhancerError::geometry("set_container_size", e))?;
        write(&self.layout).container = size;
        self.relayout();
        Ok(())
    }

    pub fn set_container_origin(&self, x: f64, y: f64) -> EnhancerResult<()> {
        if !x.is_finite() || !y.is_finite() {
            return Err(EnhancerError::invalid_geometry(
                "set_container_origin",
                format!("origin ({}, {}) is not finite", x, y),
            ));
        }
        write(&self.layout).origin = (x, y);
        self.relayout();
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        *read(&self.layout)
    }

    fn display_mapper(&self) -> Option<scan_geometry::GeometryMapper> {
        let (w, h) = self.playback.resolution()?;
        self.layout()
            .display_mapper(Size::from((w, h)))
            .map_err(|e| warn!(error = %e, "unusable layout"))
            .ok()
    }

    fn relayout(&self) -> usize {
        self.regions.relayout(self.display_mapper())
    }

    /// Document visibility changed.
    pub async fn on_visibility_change(&self, visible: bool) -> EnhancerResult<()> {
        self.playback.on_visibility_change(visible).await
    }

    /// Apply one observer notification.
    pub async fn handle_layout_event(&self, event: LayoutEvent) -> EnhancerResult<()> {
        match event {
            LayoutEvent::Resized { width, height } => self.set_container_size(width, height),
            LayoutEvent::Moved { x, y } => self.set_container_origin(x, y),
            LayoutEvent::VisibilityChanged { visible } => self.on_visibility_change(visible).await,
        }
    }

    /// Feed observer notifications from `events` until the channel closes or
    /// the enhancer is dropped or disposed.
    pub fn attach_layout_observer(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<LayoutEvent>,
    ) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(enhancer) = weak.upgrade() else { break };
                if enhancer.is_context_destroyed() {
                    break;
                }
                if let Err(e) = enhancer.handle_layout_event(event).await {
                    if classify::is_fatal(&e) {
                        warn!(?event, error = %e, "layout observer detached");
                        break;
                    }
                    warn!(?event, error = %e, "layout event rejected");
                }
            }
        })
    }

    // ---- fetching loop ----

    pub fn start_fetching_loop(&self) -> EnhancerResult<()> {
        self.ensure_alive("start_fetching_loop")?;
        if self.acquisition.start() {
            self.events.emit(EnhancerEvent::FetchingLoopStarted);
        }
        Ok(())
    }

    pub fn stop_fetching_loop(&self) {
        if self.acquisition.stop() {
            self.events.emit(EnhancerEvent::FetchingLoopStopped);
        }
    }

    pub fn is_fetching_loop_started(&self) -> bool {
        self.acquisition.is_started()
    }

    pub fn loop_phase(&self) -> LoopPhase {
        self.acquisition.phase()
    }

    /// Remove and return a buffered frame: the one at `index` (0 is the
    /// oldest), or the newest when `index` is `None`.
    pub fn get_frame_from_buffer(&self, index: Option<usize>) -> EnhancerResult<Frame> {
        match index {
            Some(index) => self.acquisition.take_frame(index),
            None => self.acquisition.take_latest(),
        }
    }

    /// Newest buffered frame, left in the buffer.
    pub fn peek_latest_frame(&self) -> EnhancerResult<Frame> {
        self.acquisition.latest()
    }

    pub fn number_of_frames_in_buffer(&self) -> usize {
        self.acquisition.buffered()
    }

    pub fn clear_buffer(&self) {
        self.acquisition.clear_buffer();
    }

    /// Capture one frame with the current region now, bypassing the buffer.
    pub async fn get_frame(&self) -> EnhancerResult<Frame> {
        self.ensure_alive("get_frame")?;
        self.acquisition.grab_once().await
    }

    pub fn set_loop_interval(&self, interval: Duration) -> EnhancerResult<()> {
        self.acquisition.set_interval(interval)?;
        write(&self.config).loop_interval_ms = interval.as_millis() as u64;
        Ok(())
    }

    pub fn get_loop_interval(&self) -> Duration {
        self.acquisition.interval()
    }

    pub fn set_max_number_of_frames_in_buffer(&self, capacity: usize) -> EnhancerResult<()> {
        self.acquisition.set_capacity(capacity)?;
        write(&self.config).max_number_of_frames_in_buffer = capacity;
        Ok(())
    }

    pub fn get_max_number_of_frames_in_buffer(&self) -> usize {
        self.acquisition.capacity()
    }

    /// `-1` latch, `0` ring, `> 0` rate limit in milliseconds.
    pub fn set_refresh_interval(&self, ms: i64) -> EnhancerResult<()> {
        let policy = RefreshPolicy::from_interval_ms(ms)?;
        self.acquisition.set_refresh_policy(policy);
        write(&self.config).refresh_interval_ms = ms;
        Ok(())
    }

    pub fn get_refresh_interval(&self) -> i64 {
        self.acquisition.refresh_policy().as_interval_ms()
    }

    pub fn set_canvas_max_side(&self, max_side: u32) -> EnhancerResult<()> {
        if max_side == 0 {
            return Err(EnhancerError::config("canvasMaxSide", "0", "must be greater than 0"));
        }
        self.grabber.set_canvas_max_side(max_side);
        write(&self.config).canvas_max_side = max_side;
        Ok(())
    }

    pub fn set_auto_advance_region_index(&self, on: bool) {
        self.regions.set_auto_advance(on);
        write(&self.config).auto_advance_region_index = on;
    }

    /// Time since the newest buffered frame was captured.
    pub fn buffer_staleness(&self) -> Option<Duration> {
        self.acquisition.staleness()
    }

    pub fn loop_stats(&self) -> LoopStats {
        self.acquisition.stats()
    }

    // ---- events ----

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&EnhancerEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    // ---- lifecycle ----

    /// Close the source, detach overlays and drop listeners. Every later call
    /// that would change state fails with `Destroyed`.
    pub async fn dispose(&self) -> EnhancerResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let closed = self.playback.close().await;
        self.acquisition.stop();
        self.regions.detach_overlays();
        self.events.clear();
        debug!("enhancer disposed");
        closed
    }

    pub fn is_context_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
