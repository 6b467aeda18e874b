// ============================================================================
// TRANSFORM OPERATIONS — resize and rotate/flip engines
// ============================================================================
//
// Both engines are pure: they read a source bitmap and parameters and return
// a freshly allocated bitmap. Neither ever compounds onto a previous result —
// the session always hands them the committed image, so repeated parameter
// changes stay lossless.

use crate::bitmap::Bitmap;
use image::imageops;

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn label(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "Nearest",
            Interpolation::Bilinear => "Bilinear",
            Interpolation::Bicubic => "Bicubic",
            Interpolation::Lanczos3 => "Lanczos3",
        }
    }

    pub fn all() -> &'static [Interpolation] {
        &[
            Interpolation::Nearest,
            Interpolation::Bilinear,
            Interpolation::Bicubic,
            Interpolation::Lanczos3,
        ]
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

// ---------------------------------------------------------------------------
//  Resize engine
// ---------------------------------------------------------------------------

/// Parameter set for the resize tool. When `lock_aspect` is set, changing one
/// dimension re-derives the other from the SOURCE aspect ratio (not from the
/// previously entered value), so the lock can never drift.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
    pub lock_aspect: bool,
    pub filter: Interpolation,
}

impl ResizeParams {
    /// Defaults for a freshly selected resize tool: target = source size.
    pub fn for_source(src_w: u32, src_h: u32) -> Self {
        Self {
            width: src_w,
            height: src_h,
            lock_aspect: true,
            filter: Interpolation::default(),
        }
    }

    pub fn set_width(&mut self, width: u32, src_w: u32, src_h: u32) {
        self.width = width;
        if self.lock_aspect && src_w > 0 {
            self.height = derive_locked_dim(width, src_h, src_w);
        }
    }

    pub fn set_height(&mut self, height: u32, src_w: u32, src_h: u32) {
        self.height = height;
        if self.lock_aspect && src_h > 0 {
            self.width = derive_locked_dim(height, src_w, src_h);
        }
    }
}

/// `changed * other_src / this_src`, rounded — the locked counterpart of an
/// edited dimension.
fn derive_locked_dim(changed: u32, other_src: u32, this_src: u32) -> u32 {
    ((changed as f64 * other_src as f64 / this_src as f64).round() as u32).max(1)
}

/// Single resample pass source → target. Returns `None` for a zero-area
/// target (the tool withholds its callback instead of producing garbage).
pub fn resize(source: &Bitmap, width: u32, height: u32, filter: Interpolation) -> Option<Bitmap> {
    if width == 0 || height == 0 {
        return None;
    }
    let resized = imageops::resize(source.pixels(), width, height, filter.to_filter());
    Some(Bitmap::from_rgba(resized))
}

// ---------------------------------------------------------------------------
//  Rotate/flip engine
// ---------------------------------------------------------------------------

/// Parameter set for the rotate/flip tool. The angle only ever moves in 90°
/// steps and wraps modulo 360, which keeps every output an exact pixel
/// permutation of the source: four steps in either direction restore the
/// original bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RotateParams {
    /// One of 0, 90, 180, 270 (degrees clockwise).
    pub angle: u16,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl RotateParams {
    pub fn rotate_cw(&mut self) {
        self.angle = (self.angle + 90) % 360;
    }

    pub fn rotate_ccw(&mut self) {
        self.angle = (self.angle + 270) % 360;
    }

    pub fn toggle_flip_horizontal(&mut self) {
        self.flip_horizontal = !self.flip_horizontal;
    }

    pub fn toggle_flip_vertical(&mut self) {
        self.flip_vertical = !self.flip_vertical;
    }

    pub fn is_identity(&self) -> bool {
        self.angle == 0 && !self.flip_horizontal && !self.flip_vertical
    }
}

/// Apply flips (in source orientation) followed by the rotation. The output
/// canvas is the rotated bounding box: 90/270 swap width and height.
pub fn rotate_flip(source: &Bitmap, params: RotateParams) -> Bitmap {
    let mut img = source.pixels().clone();

    if params.flip_horizontal {
        img = imageops::flip_horizontal(&img);
    }
    if params.flip_vertical {
        img = imageops::flip_vertical(&img);
    }

    let img = match params.angle % 360 {
        90 => imageops::rotate90(&img),
        180 => imageops::rotate180(&img),
        270 => imageops::rotate270(&img),
        _ => img,
    };

    Bitmap::from_rgba(img)
}
