// ============================================================================
// TEXT RASTERIZATION — glyph layout and coverage rendering for text overlays
// ============================================================================

use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};

/// Text alignment options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
}

impl TextAlignment {
    pub fn label(&self) -> &'static str {
        match self {
            TextAlignment::Left => "Left",
            TextAlignment::Center => "Center",
            TextAlignment::Right => "Right",
        }
    }

    pub fn all() -> &'static [TextAlignment] {
        &[
            TextAlignment::Left,
            TextAlignment::Center,
            TextAlignment::Right,
        ]
    }
}

/// Font style for a text element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
    Bold,
}

impl FontStyle {
    pub fn label(&self) -> &'static str {
        match self {
            FontStyle::Normal => "Normal",
            FontStyle::Italic => "Italic",
            FontStyle::Bold => "Bold",
        }
    }

    pub fn all() -> &'static [FontStyle] {
        &[FontStyle::Normal, FontStyle::Italic, FontStyle::Bold]
    }
}

/// An RGBA patch of rasterized text plus its placement on the canvas.
pub struct RasterizedText {
    pub buf: Vec<u8>,
    pub buf_w: u32,
    pub buf_h: u32,
    pub off_x: i32,
    pub off_y: i32,
}

impl RasterizedText {
    fn empty() -> Self {
        Self {
            buf: Vec::new(),
            buf_w: 0,
            buf_h: 0,
            off_x: 0,
            off_y: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf_w == 0 || self.buf_h == 0
    }
}

/// Lay out one line of text left-aligned at x=0, returning positioned glyph
/// ids and the advance width.
fn layout_line(font: &FontArc, line: &str, font_size: f32) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in line.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    (glyphs, cursor_x)
}

/// Rasterize text into an RGBA patch.
///
/// `origin` is the canvas position of the first line's baseline start (its
/// left edge for left alignment, center/right edge otherwise). Multiline via
/// '\n'. The patch is clipped to the canvas; fully off-canvas text yields an
/// empty result.
pub fn rasterize_text(
    font: &FontArc,
    text: &str,
    font_size: f32,
    alignment: TextAlignment,
    style: FontStyle,
    origin_x: f32,
    origin_y: f32,
    color: [u8; 4],
    canvas_w: u32,
    canvas_h: u32,
) -> RasterizedText {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();
    let line_height = scaled.height();
    let italic = style == FontStyle::Italic;
    let bold = style == FontStyle::Bold;

    // Lay out all lines; glyph positions are relative to the origin.
    let mut all_glyphs: Vec<(GlyphId, f32, f32)> = Vec::new();
    for (line_idx, line) in text.split('\n').enumerate() {
        let (glyphs, width) = layout_line(font, line, font_size);
        let align_offset = match alignment {
            TextAlignment::Left => 0.0,
            TextAlignment::Center => -width * 0.5,
            TextAlignment::Right => -width,
        };
        let baseline_y = ascent + line_idx as f32 * line_height;
        for (id, x) in glyphs {
            all_glyphs.push((id, x + align_offset, baseline_y));
        }
    }

    if all_glyphs.is_empty() {
        return RasterizedText::empty();
    }

    // Bounding box over all glyphs, in origin-relative space.
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for &(glyph_id, gx, gy) in &all_glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(gx, gy));
        let bounds = font.glyph_bounds(&glyph);
        min_x = min_x.min(bounds.min.x);
        min_y = min_y.min(bounds.min.y);
        max_x = max_x.max(bounds.max.x);
        max_y = max_y.max(bounds.max.y);
    }
    if min_x >= max_x || min_y >= max_y {
        return RasterizedText::empty();
    }

    // Pad for the italic shear / bold double-strike, convert to canvas space,
    // clip to the canvas.
    let pad = 2.0 + if italic { font_size * 0.2 } else { 0.0 };
    let x0 = ((origin_x + min_x - pad).floor() as i32).max(0);
    let y0 = ((origin_y + min_y - pad).floor() as i32).max(0);
    let x1 = ((origin_x + max_x + pad).ceil() as i32).min(canvas_w as i32);
    let y1 = ((origin_y + max_y + pad).ceil() as i32).min(canvas_h as i32);
    let buf_w = (x1 - x0).max(0) as u32;
    let buf_h = (y1 - y0).max(0) as u32;
    if buf_w == 0 || buf_h == 0 {
        return RasterizedText::empty();
    }

    // Single-channel coverage accumulation, then a conversion to RGBA.
    let mut coverage = vec![0.0f32; buf_w as usize * buf_h as usize];
    for &(glyph_id, gx, gy) in &all_glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(gx, gy));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        let baseline_canvas_y = origin_y + gy;
        outlined.draw(|px, py, cov| {
            let mut cx = origin_x + bounds.min.x + px as f32;
            let cy = origin_y + bounds.min.y + py as f32;
            if italic {
                cx += (baseline_canvas_y - cy) * 0.2;
            }
            let ix = cx.round() as i32 - x0;
            let iy = cy.round() as i32 - y0;
            if ix >= 0 && iy >= 0 && (ix as u32) < buf_w && (iy as u32) < buf_h {
                let idx = iy as usize * buf_w as usize + ix as usize;
                coverage[idx] = coverage[idx].max(cov);
                if bold && (ix + 1) < buf_w as i32 {
                    coverage[idx + 1] = coverage[idx + 1].max(cov);
                }
            }
        });
    }

    let mut buf = vec![0u8; buf_w as usize * buf_h as usize * 4];
    for (i, &cov) in coverage.iter().enumerate() {
        if cov > 0.001 {
            let idx = i * 4;
            buf[idx] = color[0];
            buf[idx + 1] = color[1];
            buf[idx + 2] = color[2];
            buf[idx + 3] = (color[3] as f32 * cov.min(1.0)).round() as u8;
        }
    }

    RasterizedText {
        buf,
        buf_w,
        buf_h,
        off_x: x0,
        off_y: y0,
    }
}

// ============================================================================
// SYSTEM FONT LOOKUP
// ============================================================================

/// Load a font by family name and style from the system.
/// Returns `None` if no matching font can be found or its data cannot be read.
pub fn load_system_font(family: &str, style: FontStyle) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Style, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    match style {
        FontStyle::Normal => {}
        FontStyle::Italic => props.style = Style::Italic,
        FontStyle::Bold => props.weight = Weight::BOLD,
    }

    let source = SystemSource::new();
    let handle = source
        .select_best_match(&[FamilyName::Title(family.to_string())], &props)
        .ok()?;

    let font_data = handle.load().ok()?;
    let font_data_copy = font_data.copy_font_data()?;
    let bytes: Vec<u8> = (*font_data_copy).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// Platform-typical fallback families tried when the requested family is
/// missing.
pub fn fallback_families() -> &'static [&'static str] {
    #[cfg(target_os = "linux")]
    {
        &["Liberation Sans", "DejaVu Sans", "FreeSans"]
    }
    #[cfg(not(target_os = "linux"))]
    {
        &["Arial", "Helvetica", "Times New Roman"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_and_alignment_catalogs_are_complete() {
        assert_eq!(FontStyle::all().len(), 3);
        assert_eq!(TextAlignment::all().len(), 3);
        assert_eq!(FontStyle::Bold.label(), "Bold");
        assert_eq!(TextAlignment::Center.label(), "Center");
    }

    #[test]
    fn empty_patch_reports_empty() {
        assert!(RasterizedText::empty().is_empty());
    }
}
