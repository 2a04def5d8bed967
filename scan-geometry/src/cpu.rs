// SPDX-License-Identifier: MIT
// CPU crop + downscale for BGRA8 frames.
// Crop is a row copy; downscale goes through fast_image_resize (SIMD).

use fast_image_resize as fir;
use fir::images::{TypedImage, TypedImageRef};
use fir::pixels::U8x4;
use fir::{ResizeOptions, Resizer};

use crate::fit::fit_long_side;
use crate::region::Region;

#[derive(Debug)]
pub enum ScaleError {
    BufferTooSmall { needed: usize, got: usize },
    StrideTooSmall { stride: usize, row_bytes: usize },
    CropOutOfBounds,
    Fir(fir::ResizeError),
    ImageBuf(fir::ImageBufferError),
}

impl From<fir::ResizeError> for ScaleError { fn from(e: fir::ResizeError) -> Self { Self::Fir(e) } }
impl From<fir::ImageBufferError> for ScaleError { fn from(e: fir::ImageBufferError) -> Self { Self::ImageBuf(e) } }

impl std::fmt::Display for ScaleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleError::BufferTooSmall { needed, got } => {
                write!(f, "Source buffer too small: need {} bytes, got {}", needed, got)
            }
            ScaleError::StrideTooSmall { stride, row_bytes } => {
                write!(f, "Row stride {} is shorter than a {}-byte row", stride, row_bytes)
            }
            ScaleError::CropOutOfBounds => write!(f, "Crop rectangle lies outside the frame"),
            ScaleError::Fir(e) => write!(f, "Fast image resize error: {}", e),
            ScaleError::ImageBuf(e) => write!(f, "Image buffer error: {}", e),
        }
    }
}

impl std::error::Error for ScaleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScaleError::Fir(e) => Some(e),
            ScaleError::ImageBuf(e) => Some(e),
            _ => None,
        }
    }
}

/// Integer pixel rectangle inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PixelRect {
    pub fn full(w: u32, h: u32) -> Self {
        Self { x: 0, y: 0, w, h }
    }

    pub fn covers(&self, w: u32, h: u32) -> bool {
        self.x == 0 && self.y == 0 && self.w == w && self.h == h
    }

    /// Snap a pixel region outward to whole pixels and intersect it with a
    /// `w` x `h` frame. `None` when nothing of it lies inside the frame.
    ///
    /// Edges within rounding noise of a whole pixel are taken as that pixel,
    /// so `19.999999999` does not widen the crop by one column.
    pub fn from_region(region: &Region, w: u32, h: u32) -> Option<Self> {
        let left = snap(region.left).floor().max(0.0);
        let top = snap(region.top).floor().max(0.0);
        let right = snap(region.right).ceil().min(w as f64);
        let bottom = snap(region.bottom).ceil().min(h as f64);
        if !(right > left && bottom > top) {
            return None;
        }
        Some(Self {
            x: left as u32,
            y: top as u32,
            w: (right - left) as u32,
            h: (bottom - top) as u32,
        })
    }
}

const SNAP_EPSILON: f64 = 1e-6;

fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPSILON { r } else { v }
}

/// Copy `rect` out of a BGRA frame into a tightly packed buffer.
pub fn crop_bgra(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    stride: usize,
    rect: PixelRect,
) -> Result<Vec<u8>, ScaleError> {
    if rect.x + rect.w > src_w || rect.y + rect.h > src_h {
        return Err(ScaleError::CropOutOfBounds);
    }
    let min_stride = src_w as usize * 4;
    if stride < min_stride {
        return Err(ScaleError::StrideTooSmall { stride, row_bytes: min_stride });
    }
    let needed = stride * (src_h as usize);
    if src.len() < needed {
        return Err(ScaleError::BufferTooSmall { needed, got: src.len() });
    }

    let row_bytes = rect.w as usize * 4;
    let mut out = Vec::with_capacity(row_bytes * rect.h as usize);
    for row in rect.y as usize..(rect.y + rect.h) as usize {
        let start = row * stride + rect.x as usize * 4;
        out.extend_from_slice(&src[start..start + row_bytes]);
    }
    Ok(out)
}

/// Downscale a tightly packed BGRA image so its long side is at most
/// `max_long`. Returns the input unchanged (no copy) when it already fits.
pub fn downscale_bgra(
    resizer: &mut Resizer,
    src: Vec<u8>,
    w: u32,
    h: u32,
    max_long: u32,
) -> Result<(Vec<u8>, u32, u32), ScaleError> {
    let (out_w, out_h) = fit_long_side(w, h, max_long);
    if out_w == w && out_h == h {
        return Ok((src, w, h));
    }

    let src_view = TypedImageRef::<U8x4>::from_buffer(w, h, &src)?;
    let mut dst = vec![0u8; out_w as usize * out_h as usize * 4];
    {
        let mut dst_view = TypedImage::<U8x4>::from_buffer(out_w, out_h, &mut dst)?;
        let opts = ResizeOptions::new().use_alpha(false);
        resizer.resize_typed::<U8x4>(&src_view, &mut dst_view, &opts)?;
    }
    Ok((dst, out_w, out_h))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x3 frame where every pixel is [x, y, 0, 255].
    fn coordinate_frame(w: u32, h: u32, stride: usize) -> Vec<u8> {
        let mut data = vec![0u8; stride * h as usize];
        for y in 0..h as usize {
            for x in 0..w as usize {
                let i = y * stride + x * 4;
                data[i..i + 4].copy_from_slice(&[x as u8, y as u8, 0, 255]);
            }
        }
        data
    }

    #[test]
    fn test_crop_respects_stride() {
        let stride = 4 * 4 + 8; // padded rows
        let frame = coordinate_frame(4, 3, stride);
        let rect = PixelRect { x: 1, y: 1, w: 2, h: 2 };
        let out = crop_bgra(&frame, 4, 3, stride, rect).unwrap();
        assert_eq!(out.len(), 2 * 2 * 4);
        assert_eq!(&out[0..4], &[1, 1, 0, 255]);
        assert_eq!(&out[12..16], &[2, 2, 0, 255]);
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let frame = coordinate_frame(4, 3, 16);
        let rect = PixelRect { x: 3, y: 0, w: 2, h: 1 };
        assert!(matches!(
            crop_bgra(&frame, 4, 3, 16, rect),
            Err(ScaleError::CropOutOfBounds)
        ));
    }

    #[test]
    fn test_crop_rejects_short_stride() {
        let frame = vec![0u8; 4 * 3 * 4];
        let rect = PixelRect { x: 1, y: 0, w: 3, h: 3 };
        assert!(matches!(
            crop_bgra(&frame, 4, 3, 4, rect),
            Err(ScaleError::StrideTooSmall { stride: 4, row_bytes: 16 })
        ));
    }

    #[test]
    fn test_pixel_rect_snaps_outward_and_clamps() {
        let r = Region::pixels(10.4, 5.6, 99.2, 300.0);
        let rect = PixelRect::from_region(&r, 100, 200).unwrap();
        assert_eq!(rect, PixelRect { x: 10, y: 5, w: 90, h: 195 });
        assert!(PixelRect::from_region(&Region::pixels(150.0, 0.0, 160.0, 10.0), 100, 100).is_none());

        let noisy = Region::pixels(19.999_999_999, 0.0, 140.000_000_001, 120.0);
        let rect = PixelRect::from_region(&noisy, 160, 120).unwrap();
        assert_eq!(rect, PixelRect { x: 20, y: 0, w: 120, h: 120 });
    }

    #[test]
    fn test_downscale_long_side() {
        let mut resizer = Resizer::new();
        let src = vec![128u8; 200 * 100 * 4];
        let (out, w, h) = downscale_bgra(&mut resizer, src, 200, 100, 50).unwrap();
        assert_eq!((w, h), (50, 25));
        assert_eq!(out.len(), 50 * 25 * 4);
    }

    #[test]
    fn test_downscale_noop_when_small() {
        let mut resizer = Resizer::new();
        let src = vec![7u8; 10 * 10 * 4];
        let (out, w, h) = downscale_bgra(&mut resizer, src, 10, 10, 4096).unwrap();
        assert_eq!((w, h), (10, 10));
        assert!(out.iter().all(|&b| b == 7));
    }
}
