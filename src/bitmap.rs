// ============================================================================
// BITMAP — the immutable pixel value every tool engine produces and consumes
// ============================================================================

use image::RgbaImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic identity counter. Every constructed `Bitmap` gets a fresh id so
/// the session can tell "new preview result" apart from "same image again"
/// without comparing pixels.
static NEXT_BITMAP_ID: AtomicU64 = AtomicU64::new(1);

/// An owned, immutable-once-created RGBA8 image.
///
/// Cloning is cheap (the pixel buffer is shared); mutation is impossible
/// through this type — every edit step builds a new `RgbaImage` and wraps it
/// in a new `Bitmap` with a new identity. The committed image, the preview
/// image, and every undo/redo entry are all `Bitmap`s, so a buffer is freed
/// exactly when the last of those references drops it.
#[derive(Clone)]
pub struct Bitmap {
    id: u64,
    pixels: Arc<RgbaImage>,
}

impl Bitmap {
    /// Wrap a decoded or freshly-computed pixel buffer.
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self {
            id: NEXT_BITMAP_ID.fetch_add(1, Ordering::Relaxed),
            pixels: Arc::new(pixels),
        }
    }

    /// Solid-color bitmap, mostly useful in tests and as a decode placeholder.
    pub fn filled(width: u32, height: u32, color: image::Rgba<u8>) -> Self {
        Self::from_rgba(RgbaImage::from_pixel(width, height, color))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Identity of this bitmap value (not of its pixel content).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Read access to the pixel grid.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Approximate heap footprint (pixel data only).
    pub fn memory_bytes(&self) -> usize {
        self.pixels.as_raw().len()
    }

    /// True when both handles refer to the same underlying buffer.
    pub fn same_identity(&self, other: &Bitmap) -> bool {
        self.id == other.id
    }
}

/// Equality is by pixel content — two independently computed bitmaps with the
/// same bytes compare equal even though their identities differ.
impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.pixels.dimensions() == other.pixels.dimensions()
            && self.pixels.as_raw() == other.pixels.as_raw()
    }
}

impl Eq for Bitmap {}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Bitmap#{} {}x{}",
            self.id,
            self.pixels.width(),
            self.pixels.height()
        )
    }
}

/// Fit an image into a viewport, preserving aspect ratio.
///
/// Returns the display dimensions (never larger than the viewport on either
/// axis, never upscaled past the source size). Called synchronously on
/// viewport resize — display geometry only, no re-decode.
pub fn fit_to_viewport(img_w: u32, img_h: u32, vp_w: u32, vp_h: u32) -> (u32, u32) {
    if img_w == 0 || img_h == 0 || vp_w == 0 || vp_h == 0 {
        return (0, 0);
    }
    let scale = (vp_w as f32 / img_w as f32)
        .min(vp_h as f32 / img_h as f32)
        .min(1.0);
    let w = ((img_w as f32 * scale).round() as u32).max(1);
    let h = ((img_h as f32 * scale).round() as u32).max(1);
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn identity_is_fresh_per_construction() {
        let a = Bitmap::filled(4, 4, Rgba([10, 20, 30, 255]));
        let b = Bitmap::filled(4, 4, Rgba([10, 20, 30, 255]));
        assert_ne!(a.id(), b.id());
        assert!(!a.same_identity(&b));
        // ...but content equality still holds
        assert_eq!(a, b);
    }

    #[test]
    fn clone_shares_identity_and_bytes() {
        let a = Bitmap::filled(8, 2, Rgba([1, 2, 3, 4]));
        let c = a.clone();
        assert!(a.same_identity(&c));
        assert_eq!(a, c);
    }

    #[test]
    fn viewport_fit_preserves_aspect() {
        // Landscape image into a square viewport: width-bound
        assert_eq!(fit_to_viewport(1000, 500, 400, 400), (400, 200));
        // Never upscales
        assert_eq!(fit_to_viewport(100, 50, 400, 400), (100, 50));
        // Degenerate inputs collapse to zero
        assert_eq!(fit_to_viewport(0, 10, 100, 100), (0, 0));
    }
}
