//! Overlay canvases kept aligned with the scan region.
//!
//! An overlay is a handle to a surface owned by the region store. The store
//! renders into it; the application reads what was drawn. Rendering the same
//! mask twice is not a redraw, which keeps layout passes idempotent.

use std::sync::{Arc, Mutex};

use scan_geometry::Rect;
use serde::{Deserialize, Serialize};

use crate::lock;

/// Styling of the scan-region mask.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaskStyle {
    /// Fill of the area outside the region.
    pub fill_style: String,
    /// Outline of the region.
    pub stroke_style: String,
    pub line_width: f64,
}

impl Default for MaskStyle {
    fn default() -> Self {
        Self {
            fill_style: "rgba(0,0,0,0.5)".into(),
            stroke_style: "rgb(254,142,20)".into(),
            line_width: 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayRole {
    /// Built-in mask drawn around the scan region.
    ScanRegion,
    /// Canvas added by the application.
    Custom,
}

/// What a surface currently shows.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawnMask {
    /// Region rectangle in display pixels.
    pub rect: Rect,
    pub style: MaskStyle,
}

#[derive(Debug)]
struct OverlaySurface {
    drawn: Option<DrawnMask>,
    redraws: u64,
    attached: bool,
}

/// Shared handle to an overlay canvas.
#[derive(Clone, Debug)]
pub struct OverlayHandle {
    id: u64,
    role: OverlayRole,
    surface: Arc<Mutex<OverlaySurface>>,
}

impl OverlayHandle {
    pub(crate) fn new(id: u64, role: OverlayRole) -> Self {
        Self {
            id,
            role,
            surface: Arc::new(Mutex::new(OverlaySurface {
                drawn: None,
                redraws: 0,
                attached: true,
            })),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> OverlayRole {
        self.role
    }

    /// Current contents, `None` when blank.
    pub fn drawn(&self) -> Option<DrawnMask> {
        lock(&self.surface).drawn.clone()
    }

    /// Number of times the contents actually changed.
    pub fn redraw_count(&self) -> u64 {
        lock(&self.surface).redraws
    }

    /// False once the owning instance detached its overlays.
    pub fn is_attached(&self) -> bool {
        lock(&self.surface).attached
    }

    /// Draw `next`; returns whether anything changed.
    pub(crate) fn render(&self, next: Option<DrawnMask>) -> bool {
        let mut surface = lock(&self.surface);
        if !surface.attached || surface.drawn == next {
            return false;
        }
        surface.drawn = next;
        surface.redraws += 1;
        true
    }

    pub(crate) fn detach(&self) {
        let mut surface = lock(&self.surface);
        surface.drawn = None;
        surface.attached = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_counts_only_changes() {
        let overlay = OverlayHandle::new(1, OverlayRole::Custom);
        let mask = DrawnMask {
            rect: Rect::new(1.0, 2.0, 3.0, 4.0),
            style: MaskStyle::default(),
        };
        assert!(overlay.render(Some(mask.clone())));
        assert!(!overlay.render(Some(mask.clone())));
        assert_eq!(overlay.redraw_count(), 1);
        assert!(overlay.render(None));
        assert_eq!(overlay.redraw_count(), 2);

        overlay.detach();
        assert!(!overlay.render(Some(mask)));
        assert!(!overlay.is_attached());
        assert!(overlay.drawn().is_none());
    }
}
