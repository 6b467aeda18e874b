// ============================================================================
// FILTER ENGINE — named stylistic presets as ordered pass lists
// ============================================================================

use crate::bitmap::Bitmap;
use crate::ops::adjustments::{contrast_factor, hsl_to_rgb, map_pixels, rgb_to_hsl};
use image::{RgbaImage, imageops};

/// Edge length of the thumbnails shown in the filter selection menu.
pub const THUMBNAIL_EDGE: u32 = 74;

/// Stylistic presets offered in the filter menu.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FilterKind {
    #[default]
    None,
    Grayscale,
    Sepia,
    Vintage,
}

impl FilterKind {
    pub fn label(&self) -> &'static str {
        match self {
            FilterKind::None => "None",
            FilterKind::Grayscale => "Black&White",
            FilterKind::Sepia => "Sepia",
            FilterKind::Vintage => "Vintage",
        }
    }

    pub fn all() -> &'static [FilterKind] {
        &[
            FilterKind::None,
            FilterKind::Grayscale,
            FilterKind::Sepia,
            FilterKind::Vintage,
        ]
    }

    /// The ordered pass list this preset expands to.
    pub fn passes(&self) -> &'static [FilterPass] {
        match self {
            FilterKind::None => &[],
            FilterKind::Grayscale => &[FilterPass::Grayscale],
            FilterKind::Sepia => &[FilterPass::Sepia],
            FilterKind::Vintage => &[
                FilterPass::Sepia,
                FilterPass::Contrast(-0.1),
                FilterPass::Saturation(-0.3),
                FilterPass::HueRotate(20.0),
            ],
        }
    }
}

/// One per-pixel pass. `Contrast` takes the adjustment engine's [-100, 100]
/// scale, `Saturation` is a signed delta on the multiplier (negative values
/// desaturate), `HueRotate` is in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterPass {
    Grayscale,
    Sepia,
    Contrast(f32),
    Saturation(f32),
    HueRotate(f32),
}

/// Apply a preset to `source`. Deterministic: the same source and preset
/// always produce byte-identical output.
pub fn apply_filter(source: &Bitmap, kind: FilterKind) -> Bitmap {
    Bitmap::from_rgba(run_passes(source.pixels(), kind.passes()))
}

/// Fixed-size preview of a preset for the selection menu. Downscales first
/// so the pass list runs over thumbnail-sized data; session state is never
/// touched.
pub fn filter_thumbnail(source: &Bitmap, kind: FilterKind, edge: u32) -> Bitmap {
    let small = imageops::resize(
        source.pixels(),
        edge.max(1),
        edge.max(1),
        imageops::FilterType::Triangle,
    );
    Bitmap::from_rgba(run_passes(&small, kind.passes()))
}

fn run_passes(src: &RgbaImage, passes: &[FilterPass]) -> RgbaImage {
    let mut img = src.clone();
    for pass in passes {
        img = run_pass(&img, *pass);
    }
    img
}

fn run_pass(src: &RgbaImage, pass: FilterPass) -> RgbaImage {
    match pass {
        FilterPass::Grayscale => map_pixels(src, |r, g, b, a| {
            let luma = 0.299 * r + 0.587 * g + 0.114 * b;
            (luma, luma, luma, a)
        }),
        FilterPass::Sepia => map_pixels(src, |r, g, b, a| {
            let sr = 0.393 * r + 0.769 * g + 0.189 * b;
            let sg = 0.349 * r + 0.686 * g + 0.168 * b;
            let sb = 0.272 * r + 0.534 * g + 0.131 * b;
            (sr.min(255.0), sg.min(255.0), sb.min(255.0), a)
        }),
        FilterPass::Contrast(c) => {
            let factor = contrast_factor(c.clamp(-100.0, 100.0));
            map_pixels(src, move |r, g, b, a| {
                (
                    factor * (r - 128.0) + 128.0,
                    factor * (g - 128.0) + 128.0,
                    factor * (b - 128.0) + 128.0,
                    a,
                )
            })
        }
        FilterPass::Saturation(delta) => {
            let scale = (1.0 + delta).max(0.0);
            map_pixels(src, move |r, g, b, a| {
                let (h, s, l) = rgb_to_hsl(r / 255.0, g / 255.0, b / 255.0);
                let (nr, ng, nb) = hsl_to_rgb(h, (s * scale).clamp(0.0, 1.0), l);
                (nr * 255.0, ng * 255.0, nb * 255.0, a)
            })
        }
        FilterPass::HueRotate(degrees) => {
            let delta = degrees / 360.0;
            map_pixels(src, move |r, g, b, a| {
                let (h, s, l) = rgb_to_hsl(r / 255.0, g / 255.0, b / 255.0);
                let mut nh = (h + delta).fract();
                if nh < 0.0 {
                    nh += 1.0;
                }
                let (nr, ng, nb) = hsl_to_rgb(nh, s, l);
                (nr * 255.0, ng * 255.0, nb * 255.0, a)
            })
        }
    }
}
