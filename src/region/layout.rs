//! Container layout as reported by the layout observer.

use scan_geometry::{FitMode, GeometryMapper, Size};

use crate::error::{EnhancerError, EnhancerResult};

/// Size and position of the video container plus its fit mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layout {
    pub container: Size,
    pub origin: (f64, f64),
    pub fit: FitMode,
}

impl Default for Layout {
    /// Not laid out yet.
    fn default() -> Self {
        Self {
            container: Size::ZERO,
            origin: (0.0, 0.0),
            fit: FitMode::Contain,
        }
    }
}

impl Layout {
    pub fn new(fit: FitMode) -> Self {
        Self {
            fit,
            ..Self::default()
        }
    }

    /// Mapper for drawing on screen.
    pub fn display_mapper(&self, video: Size) -> EnhancerResult<GeometryMapper> {
        GeometryMapper::new(video, self.container, self.fit)
            .and_then(|m| m.with_origin(self.origin.0, self.origin.1))
            .map_err(|e| EnhancerError::geometry("layout", e))
    }

    /// Mapper for cropping captured frames. Without a laid-out container the
    /// whole intrinsic frame counts as visible.
    pub fn crop_mapper(&self, video: Size) -> EnhancerResult<GeometryMapper> {
        let mapper = if self.container.is_empty() {
            GeometryMapper::new(video, video, FitMode::Fill)
        } else {
            GeometryMapper::new(video, self.container, self.fit)
        };
        mapper.map_err(|e| EnhancerError::geometry("crop", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_geometry::{PixelSpace, Region};

    #[test]
    fn test_crop_mapper_falls_back_to_whole_frame() {
        let layout = Layout::new(FitMode::Cover);
        let mapper = layout.crop_mapper(Size::new(640.0, 480.0)).unwrap();
        let px = mapper.to_pixels(&Region::full(), PixelSpace::Video).unwrap();
        assert!(px.region.approx_eq(&Region::pixels(0.0, 0.0, 640.0, 480.0), 1e-9));
    }

    #[test]
    fn test_display_mapper_rejects_bad_container() {
        let layout = Layout {
            container: Size::new(f64::NAN, 10.0),
            ..Layout::default()
        };
        let err = layout.display_mapper(Size::new(10.0, 10.0)).unwrap_err();
        assert_eq!(err.category(), "invalid_geometry");
    }
}
