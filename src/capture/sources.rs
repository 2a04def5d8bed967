// # Built-in Capture Sources
//
// - `PatternSource`: synthetic live video (moving gradient) with a warm-up
//   period during which it reports not ready, like a camera whose metadata
//   has not arrived yet.
// - `StillImageSource`: the single-frame fallback. Serves one BGRA image,
//   decoded with the `image` crate or snapshotted from another source.
//
// Providers for both implement `SourceProvider`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;
use tracing::debug;

use crate::capture::source::{
    CaptureSource, SourceKind, SourceProvider, SourceRequest, VideoDeviceInfo,
};
use crate::core::frame::RawFrame;
use crate::error::{EnhancerError, EnhancerResult};

/// Open/shutdown counters shared between a provider and its sources.
#[derive(Debug, Default)]
pub struct SourceStats {
    opened: AtomicUsize,
    shut_down: AtomicUsize,
}

impl SourceStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn shut_down(&self) -> usize {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Sources opened and not yet released.
    pub fn live(&self) -> usize {
        self.opened().saturating_sub(self.shut_down())
    }
}

/// Synthetic live video.
pub struct PatternSource {
    device_id: String,
    width: u32,
    height: u32,
    ready_at: Instant,
    frame_no: u64,
    paused: bool,
    settings: serde_json::Value,
    stats: Arc<SourceStats>,
    closed: bool,
}

impl PatternSource {
    pub fn new(device_id: impl Into<String>, width: u32, height: u32, warm_up: Duration) -> Self {
        Self {
            device_id: device_id.into(),
            width,
            height,
            ready_at: Instant::now() + warm_up,
            frame_no: 0,
            paused: false,
            settings: json!({}),
            stats: Arc::new(SourceStats::default()),
            closed: false,
        }
    }

    fn with_stats(mut self, stats: Arc<SourceStats>) -> Self {
        stats.opened.fetch_add(1, Ordering::SeqCst);
        self.stats = stats;
        self
    }

    /// Render frame `n`: B follows x, G follows y, both drifting with `n`.
    fn render(&self, n: u64) -> RawFrame {
        let (w, h) = (self.width as usize, self.height as usize);
        let shift = n as usize;
        let mut data = vec![0u8; w * h * 4];
        for (y, row) in data.chunks_exact_mut(w * 4).enumerate() {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                px[0] = ((x + shift * 4) & 0xff) as u8;
                px[1] = ((y + shift * 2) & 0xff) as u8;
                px[2] = ((x ^ y) & 0xff) as u8;
                px[3] = 255;
            }
        }
        RawFrame::packed(data, self.width, self.height)
    }
}

#[async_trait]
impl CaptureSource for PatternSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn device_id(&self) -> Option<&str> {
        Some(&self.device_id)
    }

    fn intrinsic_size(&self) -> (u32, u32) {
        if self.is_ready() {
            (self.width, self.height)
        } else {
            (0, 0)
        }
    }

    fn is_ready(&self) -> bool {
        !self.closed && Instant::now() >= self.ready_at
    }

    async fn capture_frame(&mut self) -> EnhancerResult<RawFrame> {
        if !self.is_ready() {
            return Err(EnhancerError::capture_unavailable(format!(
                "{} is still warming up",
                self.device_id
            )));
        }
        let frame = self.render(self.frame_no);
        if !self.paused {
            self.frame_no += 1;
        }
        Ok(frame)
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    fn capabilities(&self) -> serde_json::Value {
        json!({
            "width": { "min": 1, "max": self.width },
            "height": { "min": 1, "max": self.height },
            "frameRate": { "min": 1.0, "max": 30.0 },
            "torch": [false, true],
            "zoom": { "min": 1.0, "max": 4.0, "step": 0.1 },
            "settings": self.settings,
        })
    }

    async fn apply_constraints(&mut self, constraints: &serde_json::Value) -> EnhancerResult<()> {
        let Some(obj) = constraints.as_object() else {
            return Err(EnhancerError::config(
                "constraints",
                constraints.to_string(),
                "expected a JSON object",
            ));
        };
        if let Some(settings) = self.settings.as_object_mut() {
            for (k, v) in obj {
                settings.insert(k.clone(), v.clone());
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> EnhancerResult<()> {
        if !self.closed {
            self.closed = true;
            self.stats.shut_down.fetch_add(1, Ordering::SeqCst);
            debug!(device = %self.device_id, frames = self.frame_no, "pattern source shut down");
        }
        Ok(())
    }
}

/// Single-frame fallback serving one fixed image.
pub struct StillImageSource {
    label: String,
    frame: RawFrame,
    stats: Arc<SourceStats>,
    closed: bool,
}

impl StillImageSource {
    pub fn from_raw(label: impl Into<String>, frame: RawFrame) -> Self {
        Self {
            label: label.into(),
            frame,
            stats: Arc::new(SourceStats::default()),
            closed: false,
        }
    }

    /// Convert a decoded image into a BGRA still.
    pub fn from_image(label: impl Into<String>, image: &image::DynamicImage) -> Self {
        let mut rgba = image.to_rgba8();
        for px in rgba.pixels_mut() {
            px.0.swap(0, 2);
        }
        let (w, h) = rgba.dimensions();
        Self::from_raw(label, RawFrame::packed(rgba.into_raw(), w, h))
    }

    /// Decode an image file.
    pub fn open(path: impl AsRef<Path>) -> EnhancerResult<Self> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| {
            EnhancerError::external("image", e).with_path(path.display().to_string())
        })?;
        Ok(Self::from_image(path.display().to_string(), &image))
    }

    fn with_stats(mut self, stats: Arc<SourceStats>) -> Self {
        stats.opened.fetch_add(1, Ordering::SeqCst);
        self.stats = stats;
        self
    }
}

#[async_trait]
impl CaptureSource for StillImageSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SingleFrame
    }

    fn device_id(&self) -> Option<&str> {
        None
    }

    fn intrinsic_size(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    fn is_ready(&self) -> bool {
        !self.closed
    }

    async fn capture_frame(&mut self) -> EnhancerResult<RawFrame> {
        if self.closed {
            return Err(EnhancerError::capture_unavailable(format!(
                "{} has been released",
                self.label
            )));
        }
        Ok(self.frame.clone())
    }

    async fn shutdown(&mut self) -> EnhancerResult<()> {
        if !self.closed {
            self.closed = true;
            self.stats.shut_down.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Provider of [`PatternSource`] devices.
///
/// Opening takes `open_delay` (per device if overridden), which is what lets
/// a later request overtake an earlier one.
pub struct PatternProvider {
    devices: Vec<VideoDeviceInfo>,
    width: u32,
    height: u32,
    warm_up: Duration,
    open_delay: Duration,
    device_delays: HashMap<String, Duration>,
    stats: Arc<SourceStats>,
}

impl PatternProvider {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            devices: vec![
                VideoDeviceInfo {
                    device_id: "pattern-0".into(),
                    label: "Pattern camera (back)".into(),
                },
                VideoDeviceInfo {
                    device_id: "pattern-1".into(),
                    label: "Pattern camera (front)".into(),
                },
            ],
            width,
            height,
            warm_up: Duration::ZERO,
            open_delay: Duration::ZERO,
            device_delays: HashMap::new(),
            stats: Arc::new(SourceStats::default()),
        }
    }

    pub fn with_warm_up(mut self, warm_up: Duration) -> Self {
        self.warm_up = warm_up;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_device_delay(mut self, device_id: impl Into<String>, delay: Duration) -> Self {
        self.device_delays.insert(device_id.into(), delay);
        self
    }

    pub fn stats(&self) -> Arc<SourceStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl SourceProvider for PatternProvider {
    async fn devices(&self) -> EnhancerResult<Vec<VideoDeviceInfo>> {
        Ok(self.devices.clone())
    }

    async fn open(&self, request: &SourceRequest) -> EnhancerResult<Box<dyn CaptureSource>> {
        let device_id = match &request.device_id {
            Some(id) => {
                if !self.devices.iter().any(|d| &d.device_id == id) {
                    return Err(EnhancerError::source(Some(id.clone()), "no such device")
                        .with_recovery_suggestion("pick a device from getAllCameras()"));
                }
                id.clone()
            }
            None => self
                .devices
                .first()
                .map(|d| d.device_id.clone())
                .ok_or_else(|| EnhancerError::source(None, "no video devices"))?,
        };
        let delay = self
            .device_delays
            .get(&device_id)
            .copied()
            .unwrap_or(self.open_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (width, height) = request.resolution.unwrap_or((self.width, self.height));
        if width == 0 || height == 0 {
            return Err(EnhancerError::source(
                Some(device_id),
                format!("unsupported resolution {}x{}", width, height),
            ));
        }
        let live = PatternSource::new(device_id.clone(), width, height, self.warm_up);
        if request.single_frame {
            // Still fallback: one snapshot of the pattern.
            let still = StillImageSource::from_raw(device_id, live.render(0));
            return Ok(Box::new(still.with_stats(self.stats.clone())));
        }
        debug!(device = %device_id, width, height, "opened pattern source");
        Ok(Box::new(live.with_stats(self.stats.clone())))
    }
}

/// Provider that always yields the same still image.
pub struct StillImageProvider {
    label: String,
    frame: RawFrame,
    stats: Arc<SourceStats>,
}

impl StillImageProvider {
    pub fn new(label: impl Into<String>, frame: RawFrame) -> Self {
        Self {
            label: label.into(),
            frame,
            stats: Arc::new(SourceStats::default()),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> EnhancerResult<Self> {
        let still = StillImageSource::open(path)?;
        Ok(Self::new(still.label, still.frame))
    }

    pub fn stats(&self) -> Arc<SourceStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl SourceProvider for StillImageProvider {
    async fn devices(&self) -> EnhancerResult<Vec<VideoDeviceInfo>> {
        Ok(Vec::new())
    }

    async fn open(&self, _request: &SourceRequest) -> EnhancerResult<Box<dyn CaptureSource>> {
        let still = StillImageSource::from_raw(self.label.clone(), self.frame.clone());
        Ok(Box::new(still.with_stats(self.stats.clone())))
    }
}
