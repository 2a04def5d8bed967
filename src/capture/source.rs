//! # Capture Source Interfaces
//!
//! Abstract interface for frame sources and the provider that opens them.
//! Device negotiation, permissions and hardware controls live behind these
//! traits; the rest of the crate only sees BGRA frames and opaque JSON
//! capability objects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::core::frame::RawFrame;
use crate::error::{EnhancerError, EnhancerResult};

/// Live video or a single still image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Live,
    SingleFrame,
}

/// Entry of the provider's device list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDeviceInfo {
    pub device_id: String,
    pub label: String,
}

/// What `open()` asks the provider for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceRequest {
    /// Specific device, or the provider's default when `None`.
    pub device_id: Option<String>,
    /// Ask for a single still image instead of live video.
    pub single_frame: bool,
    /// Preferred resolution; providers may ignore it.
    pub resolution: Option<(u32, u32)>,
}

impl SourceRequest {
    pub fn device(id: impl Into<String>) -> Self {
        Self {
            device_id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// Abstract interface for frame capture sources.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn device_id(&self) -> Option<&str>;

    /// Intrinsic frame size, `(0, 0)` while the source has no metadata yet.
    fn intrinsic_size(&self) -> (u32, u32);

    /// Whether `capture_frame` can deliver a frame right now.
    fn is_ready(&self) -> bool;

    /// Captures the current frame. Sources that are not ready return
    /// `CaptureUnavailable`.
    async fn capture_frame(&mut self) -> EnhancerResult<RawFrame>;

    /// Freeze or unfreeze the stream without releasing the device.
    fn set_paused(&mut self, _paused: bool) {}

    /// Opaque capability object (torch, zoom, exposure, frame rate ...).
    fn capabilities(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }

    /// Pass an opaque constraint object through to the device.
    async fn apply_constraints(&mut self, _constraints: &serde_json::Value) -> EnhancerResult<()> {
        Err(EnhancerError::unsupported("applyConstraints"))
    }

    /// Releases the device.
    async fn shutdown(&mut self) -> EnhancerResult<()>;
}

/// Supplies capture sources: a live stream or, when unavailable, a still image.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn devices(&self) -> EnhancerResult<Vec<VideoDeviceInfo>>;

    async fn open(&self, request: &SourceRequest) -> EnhancerResult<Box<dyn CaptureSource>>;
}

/// The currently installed source, shared by playback (install/release) and
/// the acquisition loop (capture).
#[derive(Default)]
pub struct SourceSlot {
    source: Mutex<Option<Box<dyn CaptureSource>>>,
}

impl SourceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, Option<Box<dyn CaptureSource>>> {
        self.source.lock().await
    }

    /// Remove the installed source, if any, and shut it down.
    pub async fn release(&self) -> EnhancerResult<bool> {
        let taken = self.source.lock().await.take();
        match taken {
            Some(mut source) => {
                source.shutdown().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
