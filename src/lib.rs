//! # Scan Capture Library
//!
//! Frame acquisition for a camera enhancer: a capture source, a timed fetching
//! loop that crops every frame to a user-defined scan region, and a bounded
//! frame buffer that decouples the fixed tick rate from consumers.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `capture`: capture source traits plus synthetic and still-image sources
//! - `core`: frames and the bounded frame buffer
//! - `region`: the active scan region, overlays and container layout
//! - `acquisition`: the fetching loop and the region-cropping grabber
//! - `playback`: open/close/pause/resume of the source with play rounds
//! - `enhancer`: the facade tying everything together
//! - `config`, `error`, `events`: configuration, error stack, subscriptions
//!
//! Region geometry (fit modes, percent ⇄ pixel mapping, crop and downscale)
//! lives in the `scan-geometry` crate.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scan_capture::{Enhancer, EnhancerConfig, PatternProvider, Region};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let enhancer = Enhancer::new(
//!     EnhancerConfig::default(),
//!     Arc::new(PatternProvider::new(1280, 720)),
//! )?;
//! enhancer.set_container_size(800.0, 600.0)?;
//! enhancer.set_scan_region(Region::percent(25.0, 25.0, 75.0, 75.0))?;
//! enhancer.open().await?;
//!
//! tokio::time::sleep(std::time::Duration::from_millis(500)).await;
//! let frame = enhancer.get_frame_from_buffer(None)?;
//! println!("{}x{} from {:?}", frame.width, frame.height, frame.source);
//! enhancer.dispose().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Mutex, MutexGuard};

pub mod acquisition;
pub mod capture;
pub mod config;
pub mod core;
pub mod enhancer;
pub mod error;
pub mod events;
pub mod playback;
pub mod region;

/// Re-export error types for convenience
pub use error::{EnhancerError, EnhancerResult, HasRecoverySuggestion, HasSeverity, Retryable};

pub use capture::{PatternProvider, SourceProvider, SourceRequest, StillImageProvider};
pub use config::EnhancerConfig;
pub use crate::core::{Frame, FrameBuffer, RefreshPolicy};
pub use enhancer::{Enhancer, LayoutEvent};
pub use events::{EnhancerEvent, EventKind};
pub use playback::{PlayInfo, PlayOutcome, PlaybackState};

/// Re-export commonly used geometry types
pub use scan_geometry::{FitMode, Region};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
