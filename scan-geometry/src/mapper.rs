// SPDX-License-Identifier: MIT
//! # Region Coordinate Mapping
//!
//! Converts scan regions between three coordinate spaces:
//!
//! ```text
//!   percent of visible area  ──to_pixels(Display)──▶  page/display pixels
//!            │                                              (overlays)
//!            └──────────────to_pixels(Video)────▶  video-intrinsic pixels
//!                                                           (cropping)
//! ```
//!
//! Percentages are mapped linearly onto the [`VisibleArea`] and then offset by
//! the container origin (display space) or by the visible source rectangle
//! (video space). The inverse [`GeometryMapper::to_percentage`] undoes exactly
//! that, so a round trip reproduces the input up to floating-point error.
//!
//! When there is nothing visible (zero-size container or video), mappings
//! produce an empty region flagged invalid instead of failing.

use crate::error::GeometryError;
use crate::fit::{visible_area, FitMode, Rect, Size, VisibleArea};
use crate::region::Region;

/// Target pixel space of a mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelSpace {
    /// Display pixels, offset by the container origin.
    Display,
    /// Pixels of the intrinsic video frame.
    Video,
}

/// Result of a mapping: the region plus whether the layout allowed a real one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub region: Region,
    pub valid: bool,
}

impl Projection {
    fn valid(region: Region) -> Self {
        Self {
            region,
            valid: true,
        }
    }

    fn invalid() -> Self {
        Self {
            region: Region::empty(),
            valid: false,
        }
    }
}

/// Current layout: intrinsic video size, container size and origin, fit mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryMapper {
    video: Size,
    container: Size,
    origin: (f64, f64),
    fit: FitMode,
}

impl GeometryMapper {
    /// Build a mapper, rejecting negative or non-finite sizes.
    pub fn new(video: Size, container: Size, fit: FitMode) -> Result<Self, GeometryError> {
        Ok(Self {
            video: video.checked("video")?,
            container: container.checked("container")?,
            origin: (0.0, 0.0),
            fit,
        })
    }

    /// Set the container's own position, added to display-space results.
    pub fn with_origin(mut self, x: f64, y: f64) -> Result<Self, GeometryError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(GeometryError::InvalidOrigin { x, y });
        }
        self.origin = (x, y);
        Ok(self)
    }

    pub fn video(&self) -> Size {
        self.video
    }

    pub fn container(&self) -> Size {
        self.container
    }

    pub fn fit(&self) -> FitMode {
        self.fit
    }

    /// Visible area for the current layout, `None` if nothing is visible.
    pub fn visible_area(&self) -> Option<VisibleArea> {
        // Sizes were validated at construction.
        visible_area(self.video, self.container, self.fit)
            .ok()
            .flatten()
    }

    /// The rectangle percentages are measured against, in `space`.
    fn frame_of(&self, area: &VisibleArea, space: PixelSpace) -> Rect {
        match space {
            PixelSpace::Display => area.display.offset(self.origin.0, self.origin.1),
            PixelSpace::Video => area.source,
        }
    }

    /// Map `region` into pixels of `space`. Pixel regions pass through after
    /// validation.
    pub fn to_pixels(&self, region: &Region, space: PixelSpace) -> Result<Projection, GeometryError> {
        region.validate()?;
        if !region.is_measured_in_percentage {
            return Ok(Projection::valid(*region));
        }
        let Some(area) = self.visible_area() else {
            return Ok(Projection::invalid());
        };
        let frame = self.frame_of(&area, space);
        Ok(Projection::valid(Region::pixels(
            frame.x + region.left / 100.0 * frame.w,
            frame.y + region.top / 100.0 * frame.h,
            frame.x + region.right / 100.0 * frame.w,
            frame.y + region.bottom / 100.0 * frame.h,
        )))
    }

    /// Map a pixel `region` of `space` back into percent of the visible area.
    /// Percentage regions pass through after validation.
    ///
    /// Pixels outside the visible area map to values outside `[0, 100]`; the
    /// result is reported as-is rather than clamped. Edges must still be
    /// finite and ordered.
    pub fn to_percentage(
        &self,
        region: &Region,
        space: PixelSpace,
    ) -> Result<Projection, GeometryError> {
        if region.is_measured_in_percentage {
            region.validate()?;
            return Ok(Projection::valid(*region));
        }
        region.validate_unbounded()?;
        let Some(area) = self.visible_area() else {
            return Ok(Projection::invalid());
        };
        let frame = self.frame_of(&area, space);
        Ok(Projection::valid(Region::percent(
            (region.left - frame.x) / frame.w * 100.0,
            (region.top - frame.y) / frame.h * 100.0,
            (region.right - frame.x) / frame.w * 100.0,
            (region.bottom - frame.y) / frame.h * 100.0,
        )))
    }

    /// Where `region` is drawn on screen, in display pixels. Percentage regions
    /// map as in [`GeometryMapper::to_pixels`]; pixel regions are taken as
    /// video-intrinsic and follow the rendered frame, so parts outside the
    /// visible area land outside the container.
    pub fn display_projection(&self, region: &Region) -> Result<Projection, GeometryError> {
        if region.is_measured_in_percentage {
            return self.to_pixels(region, PixelSpace::Display);
        }
        region.validate()?;
        let Some(area) = self.visible_area() else {
            return Ok(Projection::invalid());
        };
        let (sx, sy) = area.scale;
        let x0 = self.origin.0 + area.rendered.x;
        let y0 = self.origin.1 + area.rendered.y;
        Ok(Projection::valid(Region::pixels(
            x0 + region.left * sx,
            y0 + region.top * sy,
            x0 + region.right * sx,
            y0 + region.bottom * sy,
        )))
    }

    /// Visible part of the video in intrinsic pixels, or in percent of the
    /// whole intrinsic frame when `in_pixels` is false.
    pub fn visible_region(&self, in_pixels: bool) -> Projection {
        let Some(area) = self.visible_area() else {
            return Projection::invalid();
        };
        let s = area.source;
        if in_pixels {
            Projection::valid(Region::pixels(s.x, s.y, s.right(), s.bottom()))
        } else {
            Projection::valid(Region::percent(
                s.x / self.video.w * 100.0,
                s.y / self.video.h * 100.0,
                s.right() / self.video.w * 100.0,
                s.bottom() / self.video.h * 100.0,
            ))
        }
    }
}

/// Map a percentage region to display pixels for the given layout.
pub fn to_pixels(
    region: &Region,
    video: Size,
    display: Size,
    fit: FitMode,
) -> Result<Projection, GeometryError> {
    GeometryMapper::new(video, display, fit)?.to_pixels(region, PixelSpace::Display)
}

/// Map a display-pixel region back to percent of the visible area.
pub fn to_percentage(
    region: &Region,
    video: Size,
    display: Size,
    fit: FitMode,
) -> Result<Projection, GeometryError> {
    GeometryMapper::new(video, display, fit)?.to_percentage(region, PixelSpace::Display)
}
