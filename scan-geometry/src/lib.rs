// SPDX-License-Identifier: MIT
//! # scan-geometry: Visible-Area Geometry for Scan Regions
//!
//! Pure geometry used by `scan_capture` to keep a scan region aligned with a
//! video element no matter how the frame is fitted into its container, plus
//! the CPU crop/downscale used to cut that region out of captured frames.
//!
//! ## Key Components
//!
//! - [`fit`]: `object-fit` modes and visible-area computation
//! - [`region`]: the [`Region`] rectangle and its invariants
//! - [`mapper`]: percent ⇄ pixel conversion in display or video space
//! - [`cpu`]: BGRA crop (row copy) and downscale (fast_image_resize)
//!
//! ## Usage Example
//!
//! ```rust
//! use scan_geometry::{FitMode, GeometryMapper, PixelSpace, Region, Size};
//!
//! let mapper = GeometryMapper::new(
//!     Size::new(1920.0, 1080.0), // intrinsic video size
//!     Size::new(800.0, 800.0),   // container size
//!     FitMode::Cover,
//! )?;
//! let region = Region::percent(25.0, 25.0, 75.0, 75.0);
//! let crop = mapper.to_pixels(&region, PixelSpace::Video)?;
//! assert!(crop.valid);
//! # Ok::<(), scan_geometry::GeometryError>(())
//! ```

pub mod cpu;
pub mod error;
pub mod fit;
pub mod mapper;
pub mod region;

pub use error::GeometryError;
pub use fit::{fit_long_side, visible_area, FitMode, Rect, Size, VisibleArea};
pub use mapper::{to_percentage, to_pixels, GeometryMapper, PixelSpace, Projection};
pub use region::Region;
