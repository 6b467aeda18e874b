// ============================================================================
// CROP ENGINE — rectangular region selection with an aspect-ratio policy
// ============================================================================

use crate::bitmap::Bitmap;
use image::imageops;

/// Crop rectangle in source-pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Aspect-ratio constraint for the crop rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Free,
    /// 1:1
    Square,
    /// 16:9
    Widescreen,
    /// 4:3
    Standard,
}

impl AspectRatio {
    pub fn label(&self) -> &'static str {
        match self {
            AspectRatio::Free => "Free",
            AspectRatio::Square => "1:1",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Standard => "4:3",
        }
    }

    pub fn all() -> &'static [AspectRatio] {
        &[
            AspectRatio::Free,
            AspectRatio::Square,
            AspectRatio::Widescreen,
            AspectRatio::Standard,
        ]
    }

    /// Width-over-height, `None` for the unconstrained ratio.
    pub fn ratio(&self) -> Option<f32> {
        match self {
            AspectRatio::Free => None,
            AspectRatio::Square => Some(1.0),
            AspectRatio::Widescreen => Some(16.0 / 9.0),
            AspectRatio::Standard => Some(4.0 / 3.0),
        }
    }
}

/// Parameter set for the crop tool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropParams {
    pub rect: CropRect,
    pub aspect: AspectRatio,
}

impl CropParams {
    /// Defaults for a freshly selected crop tool: the full frame, free ratio.
    pub fn for_source(src_w: u32, src_h: u32) -> Self {
        Self {
            rect: CropRect::new(0, 0, src_w, src_h),
            aspect: AspectRatio::Free,
        }
    }

    /// Move/resize the rectangle; it is clamped into the source bounds.
    pub fn set_rect(&mut self, rect: CropRect, src_w: u32, src_h: u32) {
        self.rect = clamp_rect(rect, src_w, src_h);
    }

    /// Change the ratio constraint. The rectangle is re-fit by deriving
    /// height from the current width (`height = width / ratio`), keeping the
    /// top-left origin, then re-clamped.
    pub fn set_aspect(&mut self, aspect: AspectRatio, src_w: u32, src_h: u32) {
        self.aspect = aspect;
        if let Some(ratio) = aspect.ratio() {
            let height = ((self.rect.width as f32 / ratio).round() as u32).max(1);
            self.rect = clamp_rect(
                CropRect::new(self.rect.x, self.rect.y, self.rect.width, height),
                src_w,
                src_h,
            );
        }
    }
}

/// Clamp a rectangle fully inside `src_w` × `src_h`. The size is kept when
/// possible by shifting the origin; rectangles larger than the source shrink
/// to fit. A rectangle entirely outside the bounds ends up flush against the
/// nearest edge rather than out-of-range.
pub fn clamp_rect(rect: CropRect, src_w: u32, src_h: u32) -> CropRect {
    let width = rect.width.min(src_w);
    let height = rect.height.min(src_h);
    let x = rect.x.min(src_w.saturating_sub(width));
    let y = rect.y.min(src_h.saturating_sub(height));
    CropRect { x, y, width, height }
}

/// Cut the rectangle out of `source` as a 1:1 pixel copy. Returns `None` for
/// a zero-area rectangle — the tool fires no preview callback in that case.
pub fn crop(source: &Bitmap, rect: CropRect) -> Option<Bitmap> {
    if rect.is_empty() {
        return None;
    }
    let rect = clamp_rect(rect, source.width(), source.height());
    if rect.is_empty() {
        return None;
    }
    let sub = imageops::crop_imm(source.pixels(), rect.x, rect.y, rect.width, rect.height);
    Some(Bitmap::from_rgba(sub.to_image()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn checker(w: u32, h: u32) -> Bitmap {
        let mut img = RgbaImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                img.put_pixel(x, y, Rgba([v, v, v, 255]));
            }
        }
        Bitmap::from_rgba(img)
    }

    #[test]
    fn overhanging_rect_is_shifted_inside() {
        let r = clamp_rect(CropRect::new(900, 900, 300, 300), 1000, 1000);
        assert_eq!(r, CropRect::new(700, 700, 300, 300));
    }

    #[test]
    fn oversized_rect_shrinks_to_source() {
        let r = clamp_rect(CropRect::new(0, 0, 5000, 40), 1000, 1000);
        assert_eq!(r, CropRect::new(0, 0, 1000, 40));
    }

    #[test]
    fn zero_area_rect_produces_no_output() {
        let src = checker(10, 10);
        assert!(crop(&src, CropRect::new(2, 2, 0, 5)).is_none());
        assert!(crop(&src, CropRect::new(2, 2, 5, 0)).is_none());
    }

    #[test]
    fn crop_copies_the_region_verbatim() {
        let src = checker(10, 10);
        let out = crop(&src, CropRect::new(3, 4, 4, 2)).unwrap();
        assert_eq!(out.dimensions(), (4, 2));
        for y in 0..2 {
            for x in 0..4 {
                assert_eq!(
                    out.pixels().get_pixel(x, y),
                    src.pixels().get_pixel(x + 3, y + 4)
                );
            }
        }
    }

    #[test]
    fn ratio_change_derives_height_and_keeps_origin() {
        let mut p = CropParams::for_source(1000, 1000);
        p.set_rect(CropRect::new(100, 200, 400, 400), 1000, 1000);
        p.set_aspect(AspectRatio::Widescreen, 1000, 1000);
        assert_eq!(p.rect.x, 100);
        assert_eq!(p.rect.y, 200);
        assert_eq!(p.rect.width, 400);
        assert_eq!(p.rect.height, 225); // 400 / (16/9)
    }

    #[test]
    fn square_ratio_on_full_frame_reclamps() {
        let mut p = CropParams::for_source(800, 600);
        // Full-frame 800x600 → square derives 800x800, clamped to 800x600
        // is still too tall, so the clamp shrinks height to fit.
        p.set_aspect(AspectRatio::Square, 800, 600);
        assert!(p.rect.height <= 600);
        assert_eq!(p.rect.x, 0);
        assert_eq!(p.rect.y, 0);
    }
}
