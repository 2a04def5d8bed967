//! One tick's worth of work: read the region, capture, crop, build a frame.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use fast_image_resize::Resizer;
use scan_geometry::cpu::{PixelRect, crop_bgra, downscale_bgra};
use scan_geometry::{PixelSpace, Size};
use tokio::time::Instant;

use crate::capture::SourceSlot;
use crate::core::frame::Frame;
use crate::error::{EnhancerError, EnhancerResult};
use crate::lock;
use crate::region::{Layout, RegionStore};

/// Produces frames for the acquisition loop.
#[async_trait]
pub trait FrameGrabber: Send + Sync {
    /// Capture one frame. `CaptureUnavailable` means "skip this tick".
    async fn grab(&self, sequence: u64) -> EnhancerResult<Frame>;

    /// Called after a grabbed frame was offered to the buffer.
    fn frame_delivered(&self) {}
}

/// Grabs from the installed source and crops to the active scan region.
pub struct RegionGrabber {
    slot: Arc<SourceSlot>,
    regions: Arc<RegionStore>,
    layout: Arc<RwLock<Layout>>,
    canvas_max_side: AtomicU32,
    resizer: Mutex<Resizer>,
}

impl RegionGrabber {
    pub fn new(
        slot: Arc<SourceSlot>,
        regions: Arc<RegionStore>,
        layout: Arc<RwLock<Layout>>,
        canvas_max_side: u32,
    ) -> Self {
        Self {
            slot,
            regions,
            layout,
            canvas_max_side: AtomicU32::new(canvas_max_side),
            resizer: Mutex::new(Resizer::new()),
        }
    }

    pub fn set_canvas_max_side(&self, max_side: u32) {
        self.canvas_max_side.store(max_side.max(1), Ordering::Relaxed);
    }

    fn layout(&self) -> Layout {
        match self.layout.read() {
            Ok(layout) => *layout,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl FrameGrabber for RegionGrabber {
    async fn grab(&self, sequence: u64) -> EnhancerResult<Frame> {
        let snapshot = self.regions.snapshot();
        let started = Instant::now();

        let raw = {
            let mut slot = self.slot.lock().await;
            let source = slot
                .as_mut()
                .ok_or_else(|| EnhancerError::capture_unavailable("no capture source"))?;
            if !source.is_ready() {
                return Err(EnhancerError::capture_unavailable("source not ready"));
            }
            source.capture_frame().await?
        };

        let mapper = self
            .layout()
            .crop_mapper(Size::from((raw.width, raw.height)))?;
        let projection = mapper
            .to_pixels(&snapshot.region, PixelSpace::Video)
            .map_err(|e| EnhancerError::geometry("crop", e))?;
        if !projection.valid {
            return Err(EnhancerError::capture_unavailable("frame has no visible area"));
        }
        let rect = PixelRect::from_region(&projection.region, raw.width, raw.height)
            .ok_or_else(|| {
                EnhancerError::invalid_geometry(
                    "crop",
                    format!(
                        "region {} lies outside the {}x{} frame",
                        snapshot.region, raw.width, raw.height
                    ),
                )
            })?;

        let is_cropped = !rect.covers(raw.width, raw.height);
        let pixels = crop_bgra(&raw.data, raw.width, raw.height, raw.stride, rect)?;
        let max_side = self.canvas_max_side.load(Ordering::Relaxed);
        let (pixels, width, height) = {
            let mut resizer = lock(&self.resizer);
            downscale_bgra(&mut resizer, pixels, rect.w, rect.h, max_side)?
        };

        Ok(Frame {
            data: pixels.into(),
            width,
            height,
            timestamp: started,
            region: snapshot.region,
            region_index: snapshot.index,
            source: rect,
            is_cropped,
            sequence,
            time_spent: started.elapsed(),
        })
    }

    fn frame_delivered(&self) {
        self.regions.advance();
    }
}
