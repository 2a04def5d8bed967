//! # Region Store
//!
//! Holds the active scan region and the overlays aligned with it.
//!
//! Two modes:
//! - **single**: one region set with [`RegionStore::set_region`]
//! - **list**: `croppingRegions` plus an index, optionally advanced after
//!   every captured frame
//!
//! Every accepted change and every [`RegionStore::relayout`] recomputes the
//! region's display projection and renders it into the built-in scan-region
//! overlay and each registered overlay. Rejected changes leave the store
//! untouched.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use scan_geometry::{GeometryMapper, Rect, Region};
use tracing::{debug, trace};

use crate::error::{EnhancerError, EnhancerResult};
use crate::lock;
use crate::region::overlay::{DrawnMask, MaskStyle, OverlayHandle, OverlayRole};

/// Region in effect for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionSnapshot {
    pub region: Region,
    /// Position in `croppingRegions`, `None` in single mode.
    pub index: Option<usize>,
}

#[derive(Debug)]
struct RegionList {
    regions: Vec<Region>,
    index: usize,
}

#[derive(Debug)]
struct RegionState {
    single: Region,
    list: Option<RegionList>,
    auto_advance: bool,
    mask: MaskStyle,
    show_mask: bool,
    scan_overlay: OverlayHandle,
    overlays: Vec<OverlayHandle>,
    mapper: Option<GeometryMapper>,
}

impl RegionState {
    fn snapshot(&self) -> RegionSnapshot {
        match &self.list {
            Some(list) => RegionSnapshot {
                region: list.regions[list.index],
                index: Some(list.index),
            },
            None => RegionSnapshot {
                region: self.single,
                index: None,
            },
        }
    }

    fn display_rect(&self) -> Option<Rect> {
        let mapper = self.mapper.as_ref()?;
        let projection = mapper.display_projection(&self.snapshot().region).ok()?;
        projection.valid.then(|| projection.region.to_rect())
    }

    /// Render the current projection into every overlay. Returns the number
    /// of overlays whose contents changed.
    fn redraw(&self) -> usize {
        let rect = self.display_rect();
        let mask = rect.map(|rect| DrawnMask {
            rect,
            style: self.mask.clone(),
        });
        let scan = if self.show_mask { mask.clone() } else { None };

        let mut changed = usize::from(self.scan_overlay.render(scan));
        for overlay in &self.overlays {
            changed += usize::from(overlay.render(mask.clone()));
        }
        trace!(?rect, changed, "region redraw pass");
        changed
    }
}

#[derive(Debug)]
pub struct RegionStore {
    state: Mutex<RegionState>,
    next_overlay: AtomicU64,
}

impl Default for RegionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionStore {
    /// Full-frame region, mask shown, not laid out.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegionState {
                single: Region::full(),
                list: None,
                auto_advance: false,
                mask: MaskStyle::default(),
                show_mask: true,
                scan_overlay: OverlayHandle::new(0, OverlayRole::ScanRegion),
                overlays: Vec::new(),
                mapper: None,
            }),
            next_overlay: AtomicU64::new(1),
        }
    }

    /// Replace the active region and leave list mode. Invalid regions are
    /// rejected and the previous region stays active.
    pub fn set_region(&self, region: Region) -> EnhancerResult<()> {
        region
            .validate()
            .map_err(|e| EnhancerError::geometry("set_scan_region", e))?;
        let mut state = lock(&self.state);
        state.single = region;
        state.list = None;
        debug!(%region, "scan region set");
        state.redraw();
        Ok(())
    }

    /// The region currently in effect.
    pub fn region(&self) -> Region {
        lock(&self.state).snapshot().region
    }

    /// Enter list mode at index 0. An empty list returns to single mode.
    /// Nothing changes if any region is invalid.
    pub fn set_regions(&self, regions: Vec<Region>) -> EnhancerResult<()> {
        for (i, region) in regions.iter().enumerate() {
            region.validate().map_err(|e| {
                EnhancerError::geometry("set_cropping_regions", e)
                    .with_metadata("index", i.to_string())
            })?;
        }
        let mut state = lock(&self.state);
        state.list = if regions.is_empty() {
            None
        } else {
            Some(RegionList { regions, index: 0 })
        };
        state.redraw();
        Ok(())
    }

    /// `croppingRegions`, empty in single mode.
    pub fn regions(&self) -> Vec<Region> {
        lock(&self.state)
            .list
            .as_ref()
            .map(|l| l.regions.clone())
            .unwrap_or_default()
    }

    /// Switch the active list entry.
    pub fn set_index(&self, index: usize) -> EnhancerResult<()> {
        let mut state = lock(&self.state);
        let Some(list) = state.list.as_mut() else {
            return Err(EnhancerError::state(
                "single-region mode",
                "set_cropping_region_index",
                "no cropping regions are set",
            ));
        };
        if index >= list.regions.len() {
            return Err(EnhancerError::invalid_geometry(
                "set_cropping_region_index",
                format!("index {} out of range for {} regions", index, list.regions.len()),
            ));
        }
        list.index = index;
        state.redraw();
        Ok(())
    }

    pub fn index(&self) -> Option<usize> {
        lock(&self.state).list.as_ref().map(|l| l.index)
    }

    pub fn set_auto_advance(&self, on: bool) {
        lock(&self.state).auto_advance = on;
    }

    pub fn auto_advance(&self) -> bool {
        lock(&self.state).auto_advance
    }

    /// Consistent copy of the active region for a capture.
    pub fn snapshot(&self) -> RegionSnapshot {
        lock(&self.state).snapshot()
    }

    /// Move to the next list entry when auto-advance is on.
    pub fn advance(&self) -> Option<usize> {
        let mut state = lock(&self.state);
        if !state.auto_advance {
            return None;
        }
        let list = state.list.as_mut()?;
        list.index = (list.index + 1) % list.regions.len();
        let index = list.index;
        state.redraw();
        Some(index)
    }

    /// Register a new overlay and draw the current region into it.
    pub fn add_overlay(&self) -> OverlayHandle {
        let id = self.next_overlay.fetch_add(1, Ordering::Relaxed);
        let overlay = OverlayHandle::new(id, OverlayRole::Custom);
        let mut state = lock(&self.state);
        state.overlays.push(overlay.clone());
        state.redraw();
        overlay
    }

    /// Registered overlays in insertion order.
    pub fn overlays(&self) -> Vec<OverlayHandle> {
        lock(&self.state).overlays.clone()
    }

    pub fn scan_region_overlay(&self) -> OverlayHandle {
        lock(&self.state).scan_overlay.clone()
    }

    /// Blank and drop every overlay, the built-in one included.
    pub fn detach_overlays(&self) {
        let mut state = lock(&self.state);
        state.scan_overlay.detach();
        for overlay in state.overlays.drain(..) {
            overlay.detach();
        }
    }

    pub fn set_mask_style(&self, style: MaskStyle) {
        let mut state = lock(&self.state);
        state.mask = style;
        state.redraw();
    }

    pub fn mask_style(&self) -> MaskStyle {
        lock(&self.state).mask.clone()
    }

    pub fn set_show_mask(&self, show: bool) {
        let mut state = lock(&self.state);
        state.show_mask = show;
        state.redraw();
    }

    pub fn show_mask(&self) -> bool {
        lock(&self.state).show_mask
    }

    /// Adopt a new layout (`None` when nothing is displayed) and redraw.
    /// Returns the number of overlays whose contents changed.
    pub fn relayout(&self, mapper: Option<GeometryMapper>) -> usize {
        let mut state = lock(&self.state);
        state.mapper = mapper;
        state.redraw()
    }

    /// The active region's rectangle in display pixels.
    pub fn display_rect(&self) -> Option<Rect> {
        lock(&self.state).display_rect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_geometry::{FitMode, Size};

    fn mapper(container: (f64, f64)) -> GeometryMapper {
        GeometryMapper::new(
            Size::new(1280.0, 720.0),
            Size::new(container.0, container.1),
            FitMode::Contain,
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_region_keeps_previous() {
        let store = RegionStore::new();
        let good = Region::percent(10.0, 10.0, 90.0, 90.0);
        store.set_region(good).unwrap();

        for bad in [
            Region::percent(50.0, 10.0, 50.0, 90.0),
            Region::percent(60.0, 10.0, 40.0, 90.0),
            Region::percent(0.0, 0.0, 100.0, 120.0),
            Region::pixels(-1.0, 0.0, 10.0, 10.0),
            Region::pixels(0.0, f64::NAN, 10.0, 10.0),
        ] {
            let err = store.set_region(bad).unwrap_err();
            assert_eq!(err.category(), "invalid_geometry");
            assert_eq!(store.region(), good);
        }
    }

    #[test]
    fn test_relayout_is_idempotent() {
        let store = RegionStore::new();
        let overlay = store.add_overlay();
        assert!(overlay.drawn().is_none());

        assert_eq!(store.relayout(Some(mapper((1280.0, 720.0)))), 2);
        assert_eq!(store.relayout(Some(mapper((1280.0, 720.0)))), 0);
        assert_eq!(overlay.redraw_count(), 1);

        let drawn = overlay.drawn().unwrap();
        assert!(drawn.rect.approx_eq(&Rect::new(0.0, 0.0, 1280.0, 720.0), 1e-9));

        // Resize redraws everything once.
        assert_eq!(store.relayout(Some(mapper((640.0, 640.0)))), 2);
        assert_eq!(overlay.redraw_count(), 2);
        assert!(overlay
            .drawn()
            .unwrap()
            .rect
            .approx_eq(&Rect::new(0.0, 140.0, 640.0, 360.0), 1e-9));
    }

    #[test]
    fn test_hidden_container_blanks_overlays() {
        let store = RegionStore::new();
        let overlay = store.add_overlay();
        store.relayout(Some(mapper((1280.0, 720.0))));
        store.relayout(Some(mapper((0.0, 720.0))));
        assert!(overlay.drawn().is_none());
        assert!(store.display_rect().is_none());
    }

    #[test]
    fn test_mask_toggle_only_affects_scan_overlay() {
        let store = RegionStore::new();
        let custom = store.add_overlay();
        store.relayout(Some(mapper((1280.0, 720.0))));
        store.set_show_mask(false);
        assert!(store.scan_region_overlay().drawn().is_none());
        assert!(custom.drawn().is_some());

        store.set_show_mask(true);
        let style = MaskStyle {
            line_width: 4.0,
            ..MaskStyle::default()
        };
        store.set_mask_style(style.clone());
        assert_eq!(store.scan_region_overlay().drawn().unwrap().style, style);
    }

    #[test]
    fn test_list_mode_and_auto_advance() {
        let store = RegionStore::new();
        let a = Region::percent(0.0, 0.0, 50.0, 50.0);
        let b = Region::percent(50.0, 50.0, 100.0, 100.0);
        store.set_regions(vec![a, b]).unwrap();
        assert_eq!(store.snapshot(), RegionSnapshot { region: a, index: Some(0) });

        assert_eq!(store.advance(), None);
        store.set_auto_advance(true);
        assert_eq!(store.advance(), Some(1));
        assert_eq!(store.region(), b);
        assert_eq!(store.advance(), Some(0));

        assert!(store.set_index(2).is_err());
        assert_eq!(store.index(), Some(0));
        store.set_index(1).unwrap();
        assert_eq!(store.region(), b);

        // A bad entry rejects the whole list.
        assert!(store
            .set_regions(vec![a, Region::percent(10.0, 10.0, 5.0, 20.0)])
            .is_err());
        assert_eq!(store.regions(), vec![a, b]);

        store.set_regions(Vec::new()).unwrap();
        assert_eq!(store.index(), None);
        assert_eq!(store.region(), Region::full());
    }

    #[test]
    fn test_switching_index_redraws() {
        let store = RegionStore::new();
        let overlay = store.add_overlay();
        store.relayout(Some(mapper((1280.0, 720.0))));
        store
            .set_regions(vec![
                Region::percent(0.0, 0.0, 50.0, 50.0),
                Region::percent(50.0, 50.0, 100.0, 100.0),
            ])
            .unwrap();
        let before = overlay.redraw_count();
        store.set_index(1).unwrap();
        assert_eq!(overlay.redraw_count(), before + 1);
        assert!(overlay
            .drawn()
            .unwrap()
            .rect
            .approx_eq(&Rect::new(640.0, 360.0, 640.0, 360.0), 1e-9));
    }

    #[test]
    fn test_detach_overlays() {
        let store = RegionStore::new();
        let overlay = store.add_overlay();
        store.relayout(Some(mapper((1280.0, 720.0))));
        store.detach_overlays();
        assert!(store.overlays().is_empty());
        assert!(!overlay.is_attached());
        assert!(!store.scan_region_overlay().is_attached());
    }
}
