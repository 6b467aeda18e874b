// ============================================================================
// ADJUSTMENT ENGINE — one combined per-pixel color pass
// ============================================================================
//
// Brightness and contrast are independent linear adjustments in channel
// space; saturation and temperature act through HSL. All five sliders are
// folded into a single pass so a preview costs one traversal of the source,
// parallelized per row via rayon.

use crate::bitmap::Bitmap;
use image::RgbaImage;
use rayon::prelude::*;

/// Neutral white point in Kelvin.
pub const NEUTRAL_KELVIN: f32 = 6500.0;

/// Parameter set for the adjust tool. Documented ranges:
///
/// * `brightness`  ∈ [-1, 1]        — additive, scaled by 255 in channel space
/// * `contrast`    ∈ [-100, 100]    — multiplier around the 128 midpoint
/// * `saturation`  ∈ [-1, 1]        — 0 = unchanged, -1 = fully desaturated
/// * `exposure`    ∈ [0, 2]         — 1 = unchanged
/// * `temperature` ∈ [2000, 10000]  — Kelvin, 6500 = neutral
///
/// Exposure multiplies the same HSL saturation channel as the saturation
/// slider. The mapping is kept for parity with the shipped behavior; a true
/// luminance gain would be `pixel * 2^ev` instead.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdjustParams {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub exposure: f32,
    pub temperature: f32,
}

impl Default for AdjustParams {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            exposure: 1.0,
            temperature: NEUTRAL_KELVIN,
        }
    }
}

impl AdjustParams {
    /// True when every slider sits at its neutral position.
    pub fn is_neutral(&self) -> bool {
        self.brightness == 0.0
            && self.contrast == 0.0
            && self.saturation == 0.0
            && self.exposure == 1.0
            && self.temperature == NEUTRAL_KELVIN
    }

    /// Clamp every slider into its documented range.
    pub fn clamped(&self) -> Self {
        Self {
            brightness: self.brightness.clamp(-1.0, 1.0),
            contrast: self.contrast.clamp(-100.0, 100.0),
            saturation: self.saturation.clamp(-1.0, 1.0),
            exposure: self.exposure.clamp(0.0, 2.0),
            temperature: self.temperature.clamp(2000.0, 10000.0),
        }
    }
}

/// Color temperature → hue-rotation delta in degrees. Monotonic, zero at
/// 6500 K: warmer (lower K) rotates positive, cooler rotates negative.
pub fn kelvin_to_hue(kelvin: f32) -> f32 {
    -(kelvin.clamp(2000.0, 10000.0) - NEUTRAL_KELVIN) / 150.0
}

/// Apply the combined adjustment pass to `source`. Always recomputed from
/// the image handed in — callers pass the committed bitmap, never a previous
/// preview, so slider changes are non-cumulative.
pub fn adjust(source: &Bitmap, params: &AdjustParams) -> Bitmap {
    let p = params.clamped();

    let brightness_offset = p.brightness * 255.0;
    let contrast_factor = contrast_factor(p.contrast);
    let hue_delta = kelvin_to_hue(p.temperature) / 360.0;
    let sat_scale = (1.0 + p.saturation) * p.exposure;
    // The HSL stage at its neutral point is an identity up to rounding;
    // skip it entirely so neutral sliders reproduce the source bytes.
    let hsl_active = hue_delta != 0.0 || sat_scale != 1.0;

    let out = map_pixels(source.pixels(), move |r, g, b, a| {
        // Linear stage: brightness offset, then contrast around the midpoint
        let r = contrast_factor * (r + brightness_offset - 128.0) + 128.0;
        let g = contrast_factor * (g + brightness_offset - 128.0) + 128.0;
        let b = contrast_factor * (b + brightness_offset - 128.0) + 128.0;
        if !hsl_active {
            return (r, g, b, a);
        }

        // Hue/saturation stage
        let (h, s, l) = rgb_to_hsl(
            (r / 255.0).clamp(0.0, 1.0),
            (g / 255.0).clamp(0.0, 1.0),
            (b / 255.0).clamp(0.0, 1.0),
        );
        let nh = wrap_unit(h + hue_delta);
        let ns = (s * sat_scale).clamp(0.0, 1.0);
        let (nr, ng, nb) = hsl_to_rgb(nh, ns, l);

        (nr * 255.0, ng * 255.0, nb * 255.0, a)
    });

    Bitmap::from_rgba(out)
}

/// Midpoint contrast multiplier for `contrast` in [-100, 100].
pub(crate) fn contrast_factor(contrast: f32) -> f32 {
    (259.0 * (contrast + 255.0)) / (255.0 * (259.0 - contrast))
}

fn wrap_unit(v: f32) -> f32 {
    let v = v.fract();
    if v < 0.0 { v + 1.0 } else { v }
}

// ============================================================================
// SHARED HELPER — row-parallel per-pixel transform
// ============================================================================

/// Map every pixel of `src` through `transform`, which receives and returns
/// (r, g, b, a) as f32 in 0..255 channel space. Results are rounded and
/// clamped back to u8.
pub(crate) fn map_pixels<F>(src: &RgbaImage, transform: F) -> RgbaImage
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }

    let src_raw = src.as_raw();
    let mut dst_raw = vec![0u8; w * h * 4];
    let stride = w * 4;

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            let row_in = &src_raw[y * stride..(y + 1) * stride];
            for x in 0..w {
                let pi = x * 4;
                let (nr, ng, nb, na) = transform(
                    row_in[pi] as f32,
                    row_in[pi + 1] as f32,
                    row_in[pi + 2] as f32,
                    row_in[pi + 3] as f32,
                );
                row_out[pi] = nr.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 1] = ng.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 2] = nb.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 3] = na.round().clamp(0.0, 255.0) as u8;
            }
        });

    // Dimensions and length are preserved above, so this cannot fail.
    RgbaImage::from_raw(w as u32, h as u32, dst_raw)
        .unwrap_or_else(|| src.clone())
}

// ============================================================================
// COLOR SPACE HELPERS
// ============================================================================

/// RGB (0..1) → HSL (H: 0..1, S: 0..1, L: 0..1)
pub fn rgb_to_hsl(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if (max - min).abs() < 1e-6 {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };

    let h = if (max - r).abs() < 1e-6 {
        let mut h = (g - b) / d;
        if h < 0.0 {
            h += 6.0;
        }
        h / 6.0
    } else if (max - g).abs() < 1e-6 {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };

    (h, s, l)
}

/// HSL (H: 0..1, S: 0..1, L: 0..1) → RGB (0..1)
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s.abs() < 1e-6 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient_card() -> Bitmap {
        let mut img = RgbaImage::new(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                img.put_pixel(
                    x,
                    y,
                    Rgba([x as u8 * 30, y as u8 * 30, 128, 255]),
                );
            }
        }
        Bitmap::from_rgba(img)
    }

    #[test]
    fn neutral_params_are_an_identity() {
        let src = gradient_card();
        let out = adjust(&src, &AdjustParams::default());
        assert_eq!(out, src);
    }

    #[test]
    fn brightness_moves_channels_up() {
        let src = Bitmap::filled(4, 4, Rgba([100, 100, 100, 255]));
        let out = adjust(
            &src,
            &AdjustParams {
                brightness: 0.2,
                ..Default::default()
            },
        );
        let px = out.pixels().get_pixel(0, 0).0;
        assert!(px[0] > 100 && px[1] > 100 && px[2] > 100);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn full_desaturation_produces_gray() {
        let src = Bitmap::filled(2, 2, Rgba([200, 40, 90, 255]));
        let out = adjust(
            &src,
            &AdjustParams {
                saturation: -1.0,
                ..Default::default()
            },
        );
        let px = out.pixels().get_pixel(0, 0).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn exposure_modulates_saturation_channel() {
        // Parity quirk: exposure 0 collapses saturation exactly like the
        // saturation slider at -1 does.
        let src = Bitmap::filled(2, 2, Rgba([200, 40, 90, 255]));
        let via_exposure = adjust(
            &src,
            &AdjustParams {
                exposure: 0.0,
                ..Default::default()
            },
        );
        let via_saturation = adjust(
            &src,
            &AdjustParams {
                saturation: -1.0,
                ..Default::default()
            },
        );
        assert_eq!(via_exposure, via_saturation);
    }

    #[test]
    fn kelvin_mapping_is_monotonic_and_neutral_at_6500() {
        assert_eq!(kelvin_to_hue(6500.0), 0.0);
        assert!(kelvin_to_hue(2000.0) > 0.0);
        assert!(kelvin_to_hue(10000.0) < 0.0);
        // Monotonic decreasing, clamped at the documented bounds
        assert!(kelvin_to_hue(3000.0) > kelvin_to_hue(5000.0));
        assert_eq!(kelvin_to_hue(1000.0), kelvin_to_hue(2000.0));
    }

    #[test]
    fn hsl_round_trip_is_stable() {
        for &(r, g, b) in &[(0.1f32, 0.5f32, 0.9f32), (1.0, 0.0, 0.0), (0.3, 0.3, 0.3)] {
            let (h, s, l) = rgb_to_hsl(r, g, b);
            let (nr, ng, nb) = hsl_to_rgb(h, s, l);
            assert!((nr - r).abs() < 1e-3);
            assert!((ng - g).abs() < 1e-3);
            assert!((nb - b).abs() < 1e-3);
        }
    }
}
