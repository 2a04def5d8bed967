// SPDX-License-Identifier: MIT
//! # Fit Modes and Visible-Area Computation
//!
//! A video element renders its intrinsic frame into a container box according
//! to the CSS `object-fit` rule. This module computes, for a given fit mode,
//! which part of the intrinsic frame actually ends up on screen and where.
//!
//! ## Fit Modes
//!
//! - **Contain**: uniform scale so the whole frame fits; letterboxed on one axis
//! - **Cover**: uniform scale so the frame fills the box; cropped on one axis
//! - **Fill**: non-uniform stretch to the box, nothing cropped or letterboxed
//! - **None**: intrinsic size, centered, clipped by the box
//!
//! The rendered frame is always centered (`object-position: 50% 50%`).
//!
//! ## Degenerate Layouts
//!
//! A zero-width or zero-height container (hidden or not yet laid out) or a
//! video without metadata has no visible area. [`visible_area`] returns `None`
//! for these instead of dividing by zero.

use crate::error::GeometryError;

/// Width and height in pixels. Display sizes may be fractional CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub w: f64,
    pub h: f64,
}

impl Size {
    pub const ZERO: Size = Size { w: 0.0, h: 0.0 };

    pub fn new(w: f64, h: f64) -> Self {
        Self { w, h }
    }

    /// True when either side is zero.
    pub fn is_empty(&self) -> bool {
        self.w == 0.0 || self.h == 0.0
    }

    /// Reject negative and non-finite sides.
    pub fn checked(self, what: &'static str) -> Result<Self, GeometryError> {
        if !self.w.is_finite() || !self.h.is_finite() || self.w < 0.0 || self.h < 0.0 {
            return Err(GeometryError::InvalidDimensions {
                what,
                w: self.w,
                h: self.h,
            });
        }
        Ok(self)
    }
}

impl From<(u32, u32)> for Size {
    fn from((w, h): (u32, u32)) -> Self {
        Self::new(w as f64, h as f64)
    }
}

/// Axis-aligned rectangle, origin at top-left.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    /// Translate by `(dx, dy)`.
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.w, self.h)
    }

    /// Component-wise comparison within `tolerance`.
    pub fn approx_eq(&self, other: &Rect, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.w - other.w).abs() <= tolerance
            && (self.h - other.h).abs() <= tolerance
    }
}

/// CSS `object-fit` value applied to the video element.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    clap::ValueEnum,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Letterbox: the whole frame is visible.
    #[default]
    Contain,
    /// Crop: the box is filled, one axis overflows.
    Cover,
    /// Stretch to the box on both axes independently.
    Fill,
    /// Intrinsic size, centered.
    None,
}

impl FitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitMode::Contain => "contain",
            FitMode::Cover => "cover",
            FitMode::Fill => "fill",
            FitMode::None => "none",
        }
    }

    /// Horizontal and vertical scale from intrinsic to display pixels.
    fn scales(self, video: Size, container: Size) -> (f64, f64) {
        let sx = container.w / video.w;
        let sy = container.h / video.h;
        match self {
            FitMode::Contain => {
                let s = sx.min(sy);
                (s, s)
            }
            FitMode::Cover => {
                let s = sx.max(sy);
                (s, s)
            }
            FitMode::Fill => (sx, sy),
            FitMode::None => (1.0, 1.0),
        }
    }
}

impl std::fmt::Display for FitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contain" => Ok(FitMode::Contain),
            "cover" => Ok(FitMode::Cover),
            "fill" => Ok(FitMode::Fill),
            "none" => Ok(FitMode::None),
            other => Err(format!(
                "Invalid fit mode: {}. Use: contain, cover, fill, none",
                other
            )),
        }
    }
}

/// The part of the intrinsic frame that is rendered on screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibleArea {
    /// Visible rectangle in container-relative display pixels.
    pub display: Rect,
    /// The same rectangle in video-intrinsic pixels.
    pub source: Rect,
    /// Where the whole (unclipped) frame is drawn, container-relative.
    pub rendered: Rect,
    /// Display pixels per intrinsic pixel, horizontally and vertically.
    pub scale: (f64, f64),
}

/// Compute the visible area of `video` rendered into `container` with `fit`.
///
/// Returns `Ok(None)` when either size has zero area, and an error when a
/// dimension is negative or not finite.
///
/// # Performance
/// O(1), a handful of floating-point operations.
pub fn visible_area(
    video: Size,
    container: Size,
    fit: FitMode,
) -> Result<Option<VisibleArea>, GeometryError> {
    let video = video.checked("video")?;
    let container = container.checked("container")?;
    if video.is_empty() || container.is_empty() {
        return Ok(None);
    }

    let (sx, sy) = fit.scales(video, container);
    let rw = video.w * sx;
    let rh = video.h * sy;
    let rendered = Rect::new((container.w - rw) / 2.0, (container.h - rh) / 2.0, rw, rh);

    let left = rendered.x.max(0.0);
    let top = rendered.y.max(0.0);
    let right = rendered.right().min(container.w);
    let bottom = rendered.bottom().min(container.h);
    let display = Rect::new(left, top, right - left, bottom - top);

    let source = Rect::new(
        (left - rendered.x) / sx,
        (top - rendered.y) / sy,
        display.w / sx,
        display.h / sy,
    );

    Ok(Some(VisibleArea {
        display,
        source,
        rendered,
        scale: (sx, sy),
    }))
}

/// Fit `(w, h)` so the longest side is at most `max_long`, preserving aspect
/// ratio. Never upscales and never returns a zero side.
pub fn fit_long_side(w: u32, h: u32, max_long: u32) -> (u32, u32) {
    let (wf, hf) = (w as f64, h as f64);
    let long = wf.max(hf);
    if long == 0.0 {
        return (w.max(1), h.max(1));
    }
    let s = (max_long as f64 / long).min(1.0);
    (
        ((wf * s).round() as u32).max(1),
        ((hf * s).round() as u32).max(1),
    )
}
