// ============================================================================
// OVERLAY FLATTEN — rasterize the annotation scene onto a bitmap
// ============================================================================
//
// Shapes are rendered from signed-distance functions with antialiased
// coverage; text goes through the glyph rasterizer. Each element becomes an
// RGBA patch that is alpha-composited over a copy of the base image, in
// insertion order. The scene is left untouched — only the raster result
// enters the session as the new preview.

use std::collections::HashMap;

use ab_glyph::FontArc;
use image::RgbaImage;
use rayon::prelude::*;

use crate::bitmap::Bitmap;
use crate::ops::text::{self, FontStyle};
use crate::overlay::{CircleElement, LineElement, OverlayElement, OverlayScene, RectElement};

/// A flatten that cannot complete. The attempted edit is abandoned and the
/// preview stays as it was; the committed image is never at risk.
#[derive(Debug)]
pub enum RenderError {
    /// No usable font for a text element's family (fallbacks included).
    FontUnavailable(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::FontUnavailable(family) => {
                write!(f, "no usable font for family \"{}\"", family)
            }
        }
    }
}

impl std::error::Error for RenderError {}

/// Flattens overlay scenes. Holds a font cache so repeated flattens of a
/// text-bearing scene do not hit the system font source every time.
#[derive(Default)]
pub struct OverlayRenderer {
    fonts: HashMap<(String, FontStyle), Option<FontArc>>,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a font (embedding contexts and tests use this to avoid the
    /// system lookup).
    pub fn with_font(mut self, family: &str, style: FontStyle, font: FontArc) -> Self {
        self.fonts.insert((family.to_string(), style), Some(font));
        self
    }

    /// Render the whole scene over `base` and return the result.
    pub fn flatten(&mut self, scene: &OverlayScene, base: &Bitmap) -> Result<Bitmap, RenderError> {
        let mut img = base.pixels().clone();
        let (w, h) = (img.width(), img.height());

        for element in scene.elements() {
            match element {
                OverlayElement::Rect(e) => blend_patch(&mut img, &rasterize_rect(e, w, h)),
                OverlayElement::Circle(e) => blend_patch(&mut img, &rasterize_circle(e, w, h)),
                OverlayElement::Line(e) => blend_patch(&mut img, &rasterize_line(e, w, h)),
                OverlayElement::Text(e) => {
                    let font = self.font_for(&e.font_family, e.style)?;
                    let raster = text::rasterize_text(
                        &font,
                        &e.content,
                        e.font_size,
                        e.align,
                        e.style,
                        e.x,
                        e.y,
                        e.fill,
                        w,
                        h,
                    );
                    if !raster.is_empty() {
                        blend_patch(
                            &mut img,
                            &Patch {
                                buf: raster.buf,
                                w: raster.buf_w,
                                h: raster.buf_h,
                                x0: raster.off_x,
                                y0: raster.off_y,
                            },
                        );
                    }
                }
            }
        }

        Ok(Bitmap::from_rgba(img))
    }

    fn font_for(&mut self, family: &str, style: FontStyle) -> Result<FontArc, RenderError> {
        let key = (family.to_string(), style);
        if !self.fonts.contains_key(&key) {
            let mut loaded = text::load_system_font(family, style);
            if loaded.is_none() {
                for fallback in text::fallback_families() {
                    loaded = text::load_system_font(fallback, style);
                    if loaded.is_some() {
                        break;
                    }
                }
            }
            if loaded.is_none() {
                crate::log_warn!("overlay: no font found for family \"{}\"", family);
            }
            self.fonts.insert(key.clone(), loaded);
        }
        self.fonts
            .get(&key)
            .and_then(|f| f.clone())
            .ok_or_else(|| RenderError::FontUnavailable(family.to_string()))
    }
}

// ---------------------------------------------------------------------------
//  SDF rasterization
// ---------------------------------------------------------------------------

/// An RGBA patch positioned on the canvas.
struct Patch {
    buf: Vec<u8>,
    w: u32,
    h: u32,
    x0: i32,
    y0: i32,
}

impl Patch {
    fn empty() -> Self {
        Self {
            buf: Vec::new(),
            w: 0,
            h: 0,
            x0: 0,
            y0: 0,
        }
    }
}

fn rasterize_rect(e: &RectElement, canvas_w: u32, canvas_h: u32) -> Patch {
    let hx = e.width * 0.5;
    let hy = e.height * 0.5;
    rasterize_sdf(
        canvas_w,
        canvas_h,
        (e.x, e.y),
        e.rotation.to_radians(),
        (hx, hy),
        e.stroke_width,
        e.fill,
        e.stroke,
        move |px, py| sdf_box(px, py, hx, hy),
    )
}

fn rasterize_circle(e: &CircleElement, canvas_w: u32, canvas_h: u32) -> Patch {
    let r = e.radius;
    rasterize_sdf(
        canvas_w,
        canvas_h,
        (e.x, e.y),
        e.rotation.to_radians(),
        (r, r),
        e.stroke_width,
        e.fill,
        e.stroke,
        move |px, py| (px * px + py * py).sqrt() - r,
    )
}

fn rasterize_line(e: &LineElement, canvas_w: u32, canvas_h: u32) -> Patch {
    let [(ax, ay), (bx, by)] = e.points;
    let hx = ax.abs().max(bx.abs()) + e.stroke_width;
    let hy = ay.abs().max(by.abs()) + e.stroke_width;
    let half_width = (e.stroke_width * 0.5).max(0.5);
    // A line is pure stroke: treat the stroked segment as the fill region.
    rasterize_sdf(
        canvas_w,
        canvas_h,
        (e.x, e.y),
        e.rotation.to_radians(),
        (hx, hy),
        0.0,
        e.stroke,
        e.stroke,
        move |px, py| sdf_segment(px, py, ax, ay, bx, by) - half_width,
    )
}

/// Rasterize an SDF into an RGBA patch: fill coverage inside the surface,
/// a stroke band of `stroke_width` straddling it, stroke composited on top.
fn rasterize_sdf<F>(
    canvas_w: u32,
    canvas_h: u32,
    center: (f32, f32),
    rotation: f32,
    half_extents: (f32, f32),
    stroke_width: f32,
    fill: [u8; 4],
    stroke: [u8; 4],
    sdf: F,
) -> Patch
where
    F: Fn(f32, f32) -> f32 + Sync,
{
    let (cx, cy) = center;
    let (hx, hy) = half_extents;
    let cos_r = rotation.cos();
    let sin_r = rotation.sin();

    // Axis-aligned bounding box of the rotated extents, padded for the
    // stroke band and antialiasing.
    let pad = stroke_width + 2.0;
    let ex = hx.abs() * cos_r.abs() + hy.abs() * sin_r.abs() + pad;
    let ey = hx.abs() * sin_r.abs() + hy.abs() * cos_r.abs() + pad;

    let x0 = ((cx - ex).floor() as i32).max(0);
    let y0 = ((cy - ey).floor() as i32).max(0);
    let x1 = ((cx + ex).ceil() as i32).min(canvas_w as i32);
    let y1 = ((cy + ey).ceil() as i32).min(canvas_h as i32);
    let buf_w = (x1 - x0).max(0) as u32;
    let buf_h = (y1 - y0).max(0) as u32;
    if buf_w == 0 || buf_h == 0 {
        return Patch::empty();
    }

    let row_bytes = buf_w as usize * 4;
    let mut buf = vec![0u8; row_bytes * buf_h as usize];
    let outline_half = stroke_width * 0.5;
    // Inverse rotation = transpose for rotation matrices
    let inv_cos = cos_r;
    let inv_sin = -sin_r;

    buf.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(row, row_buf)| {
            let py_canvas = (y0 + row as i32) as f32 + 0.5;
            for col in 0..buf_w as usize {
                let px_canvas = (x0 + col as i32) as f32 + 0.5;
                let dx = px_canvas - cx;
                let dy = py_canvas - cy;
                let lx = dx * inv_cos - dy * inv_sin;
                let ly = dx * inv_sin + dy * inv_cos;

                let d = sdf(lx, ly);
                let fill_cov = smoothstep(0.5, -0.5, d);
                let stroke_cov = if outline_half > 0.0 {
                    smoothstep(0.5, -0.5, d.abs() - outline_half)
                } else {
                    0.0
                };

                // Stroke sits on top of the fill.
                let oa = stroke_cov;
                let fa = fill_cov * (1.0 - oa);
                let sa = oa * stroke[3] as f32 / 255.0 + fa * fill[3] as f32 / 255.0;
                if sa > 0.004 {
                    let weight_o = oa * stroke[3] as f32 / 255.0;
                    let weight_f = fa * fill[3] as f32 / 255.0;
                    let total = weight_o + weight_f;
                    let idx = col * 4;
                    row_buf[idx] = ((stroke[0] as f32 * weight_o + fill[0] as f32 * weight_f)
                        / total) as u8;
                    row_buf[idx + 1] = ((stroke[1] as f32 * weight_o + fill[1] as f32 * weight_f)
                        / total) as u8;
                    row_buf[idx + 2] = ((stroke[2] as f32 * weight_o + fill[2] as f32 * weight_f)
                        / total) as u8;
                    row_buf[idx + 3] = (sa * 255.0).round().min(255.0) as u8;
                }
            }
        });

    Patch {
        buf,
        w: buf_w,
        h: buf_h,
        x0,
        y0,
    }
}

/// SDF for a box centred at origin with half-extents (hx, hy).
#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

/// Distance to the segment (ax,ay)→(bx,by).
#[inline]
fn sdf_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 1e-8 {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

/// Smoothstep between edge0 and edge1.
#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// ---------------------------------------------------------------------------
//  Compositing
// ---------------------------------------------------------------------------

/// Source-over blend of a patch onto the image.
fn blend_patch(dst: &mut RgbaImage, patch: &Patch) {
    if patch.w == 0 || patch.h == 0 {
        return;
    }
    let dst_w = dst.width() as i32;
    let dst_h = dst.height() as i32;

    for row in 0..patch.h as i32 {
        let dy = patch.y0 + row;
        if dy < 0 || dy >= dst_h {
            continue;
        }
        for col in 0..patch.w as i32 {
            let dx = patch.x0 + col;
            if dx < 0 || dx >= dst_w {
                continue;
            }
            let si = (row as usize * patch.w as usize + col as usize) * 4;
            let sa = patch.buf[si + 3] as f32 / 255.0;
            if sa <= 0.0 {
                continue;
            }
            let d = dst.get_pixel_mut(dx as u32, dy as u32);
            let da = d.0[3] as f32 / 255.0;
            let oa = sa + da * (1.0 - sa);
            if oa <= 0.0 {
                continue;
            }
            for c in 0..3 {
                let sc = patch.buf[si + c] as f32;
                let dc = d.0[c] as f32;
                d.0[c] = (((sc * sa) + dc * da * (1.0 - sa)) / oa).round().min(255.0) as u8;
            }
            d.0[3] = (oa * 255.0).round().min(255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn white_base() -> Bitmap {
        Bitmap::filled(200, 200, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn empty_scene_flattens_to_the_base_bytes() {
        let mut renderer = OverlayRenderer::new();
        let scene = OverlayScene::new();
        let base = white_base();
        let out = renderer.flatten(&scene, &base).unwrap();
        assert_eq!(out, base);
        assert!(!out.same_identity(&base));
    }

    #[test]
    fn rect_marks_pixels_inside_its_bounds() {
        let mut renderer = OverlayRenderer::new();
        let mut scene = OverlayScene::new();
        let id = scene.add_rect(100.0, 100.0);
        scene.set_element_color(id, [255, 0, 0, 255]);

        let out = renderer.flatten(&scene, &white_base()).unwrap();
        // Center of the rect is solid fill color
        assert_eq!(out.pixels().get_pixel(100, 100).0, [255, 0, 0, 255]);
        // Far corner is untouched
        assert_eq!(out.pixels().get_pixel(5, 5).0, [255, 255, 255, 255]);
    }

    #[test]
    fn line_touches_only_its_band() {
        let mut renderer = OverlayRenderer::new();
        let mut scene = OverlayScene::new();
        scene.add_line(100.0, 100.0); // horizontal, 120px long, 4px wide

        let out = renderer.flatten(&scene, &white_base()).unwrap();
        assert_eq!(out.pixels().get_pixel(100, 100).0, [0, 0, 0, 255]);
        assert_eq!(out.pixels().get_pixel(100, 120).0, [255, 255, 255, 255]);
    }

    #[test]
    fn flatten_is_deterministic() {
        let mut renderer = OverlayRenderer::new();
        let mut scene = OverlayScene::new();
        scene.add_circle(80.0, 80.0);
        scene.add_rect(140.0, 140.0);

        let a = renderer.flatten(&scene, &white_base()).unwrap();
        let b = renderer.flatten(&scene, &white_base()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn insertion_order_decides_stacking() {
        let mut renderer = OverlayRenderer::new();

        let mut scene = OverlayScene::new();
        let below = scene.add_rect(100.0, 100.0);
        let above = scene.add_circle(100.0, 100.0);
        scene.set_element_color(below, [0, 0, 255, 255]);
        scene.set_element_color(above, [0, 255, 0, 255]);
        let out = renderer.flatten(&scene, &white_base()).unwrap();
        // The circle was added later, so its color wins where both overlap.
        assert_eq!(out.pixels().get_pixel(100, 100).0, [0, 255, 0, 255]);
    }
}
