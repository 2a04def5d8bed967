//! # Frames
//!
//! [`RawFrame`] is what a capture source hands over: a full BGRA8 image with
//! its row stride. [`Frame`] is what the acquisition loop stores: the cropped,
//! possibly downscaled pixels plus the region snapshot that produced them.
//!
//! Pixel data lives behind `Arc<[u8]>`. Cloning a frame shares the pixels and
//! nobody can mutate them, so a frame evicted from the buffer stays valid for
//! every consumer still holding it.

use std::sync::Arc;
use std::time::Duration;

use scan_geometry::Region;
use scan_geometry::cpu::PixelRect;
use tokio::time::Instant;

/// Full BGRA8 image as delivered by a capture source.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Bytes per row, at least `width * 4`.
    pub stride: usize,
}

impl RawFrame {
    /// Tightly packed frame (`stride == width * 4`).
    pub fn packed(data: impl Into<Arc<[u8]>>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            stride: width as usize * 4,
        }
    }
}

/// An immutable snapshot pushed into the frame buffer.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Tightly packed BGRA8 pixels.
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Capture time.
    pub timestamp: Instant,
    /// Region in effect when the frame was captured, as configured by the user.
    pub region: Region,
    /// Index into `croppingRegions` when the region came from the list.
    pub region_index: Option<usize>,
    /// Crop rectangle in video-intrinsic pixels.
    pub source: PixelRect,
    /// `false` when the crop covered the whole intrinsic frame.
    pub is_cropped: bool,
    /// Monotonic counter assigned by the acquisition loop.
    pub sequence: u64,
    /// Time spent between capture start and frame construction.
    pub time_spent: Duration,
}

impl Frame {
    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }

    /// Copy into an RGBA image, swapping the blue and red channels.
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        let mut rgba = self.data.to_vec();
        for px in rgba.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
        image::RgbaImage::from_raw(self.width, self.height, rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_conversion_swaps_channels() {
        let frame = Frame {
            data: Arc::from(vec![1u8, 2, 3, 255, 4, 5, 6, 255]),
            width: 2,
            height: 1,
            timestamp: Instant::now(),
            region: Region::full(),
            region_index: None,
            source: PixelRect::full(2, 1),
            is_cropped: false,
            sequence: 0,
            time_spent: Duration::ZERO,
        };
        let img = frame.to_rgba_image().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [3, 2, 1, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [6, 5, 4, 255]);
    }

    #[test]
    fn test_clone_shares_pixels() {
        let raw = RawFrame::packed(vec![0u8; 16], 2, 2);
        let copy = raw.clone();
        assert!(Arc::ptr_eq(&raw.data, &copy.data));
        assert_eq!(raw.stride, 8);
    }
}
