use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::Rgba;

use crate::canvas::{parse_hex_color, PixelBuffer};
use crate::compositor::blend_over;
use crate::error::{EditorError, EditorResult};

/// Distance between consecutive baselines, as a multiple of the font size.
pub const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// Horizontal shear applied per pixel above the baseline for synthetic italic.
const ITALIC_SHEAR: f32 = 0.2;

/// Everything needed to re-render a text layer from scratch.
///
/// `x`/`y` locate the first line's baseline in layer space.
#[derive(Clone, Debug, PartialEq)]
pub struct TextData {
    pub content: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub font_family: String,
    pub color_hex: String,
    pub bold: bool,
    pub italic: bool,
}

impl TextData {
    pub fn new(content: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            content: content.into(),
            x,
            y,
            ..Self::default()
        }
    }

    /// Baseline y of every line, in order.
    pub fn baselines(&self) -> impl Iterator<Item = (&str, f32)> {
        let step = self.font_size * LINE_HEIGHT_FACTOR;
        self.content
            .split('\n')
            .enumerate()
            .map(move |(i, line)| (line, self.y + i as f32 * step))
    }
}

impl Default for TextData {
    fn default() -> Self {
        Self {
            content: String::new(),
            x: 0.0,
            y: 0.0,
            font_size: 24.0,
            font_family: "DejaVu Sans".to_string(),
            color_hex: "#000000".to_string(),
            bold: false,
            italic: false,
        }
    }
}

/// Glyph backend used to paint text lines into a layer buffer.
pub trait TextRasterizer {
    /// Resolve whatever the backend needs (fonts) for `data`.  Called before
    /// the target buffer is cleared, so a failure leaves it untouched.
    fn prepare(&mut self, data: &TextData) -> EditorResult<()>;

    /// Draw one line with its baseline starting at (`x`, `baseline`).
    fn draw_line(
        &mut self,
        buffer: &mut PixelBuffer,
        line: &str,
        x: f32,
        baseline: f32,
        data: &TextData,
        color: Rgba<u8>,
    );
}

/// Clear `buffer` and draw every newline-split line of `data` into it.
pub fn render_text(
    buffer: &mut PixelBuffer,
    data: &TextData,
    rasterizer: &mut dyn TextRasterizer,
) -> EditorResult<()> {
    let color = parse_hex_color(&data.color_hex)?;
    rasterizer.prepare(data)?;
    buffer.clear();
    for (line, baseline) in data.baselines() {
        if line.is_empty() {
            continue;
        }
        rasterizer.draw_line(buffer, line, data.x, baseline, data, color);
    }
    Ok(())
}

// ============================================================================
// SYSTEM FONT BACKEND — ab_glyph outlines, font-kit lookup
// ============================================================================

/// Rasterizes with system fonts.  The last resolved font is kept so repeated
/// edits of the same layer don't hit the font database again.
#[derive(Default)]
pub struct FontTextRasterizer {
    cached: Option<(String, FontArc)>,
}

impl FontTextRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn font(&self) -> Option<&FontArc> {
        self.cached.as_ref().map(|(_, f)| f)
    }
}

impl TextRasterizer for FontTextRasterizer {
    fn prepare(&mut self, data: &TextData) -> EditorResult<()> {
        if let Some((family, _)) = &self.cached
            && *family == data.font_family
        {
            return Ok(());
        }
        let font = load_system_font(&data.font_family)
            .or_else(|| {
                crate::log_warn!("font '{}' not found, falling back to sans-serif", data.font_family);
                load_fallback_font()
            })
            .ok_or_else(|| EditorError::FontUnavailable(data.font_family.clone()))?;
        self.cached = Some((data.font_family.clone(), font));
        Ok(())
    }

    fn draw_line(
        &mut self,
        buffer: &mut PixelBuffer,
        line: &str,
        x: f32,
        baseline: f32,
        data: &TextData,
        color: Rgba<u8>,
    ) {
        let Some(font) = self.font() else {
            return;
        };
        let (w, h) = buffer.dimensions();
        let mut coverage = vec![0.0f32; w as usize * h as usize];

        for (glyph_id, gx) in layout_line(font, line, data.font_size) {
            let glyph = glyph_id.with_scale_and_position(data.font_size, point(x + gx, baseline));
            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, cov| {
                let mut cx = bounds.min.x + px as f32;
                let cy = bounds.min.y + py as f32;
                if data.italic {
                    cx += (baseline - cy) * ITALIC_SHEAR;
                }
                let ix = cx.round() as i64;
                let iy = cy.round() as i64;
                if iy < 0 || iy >= h as i64 {
                    return;
                }
                let spread = if data.bold { 1 } else { 0 };
                for dx in 0..=spread {
                    let tx = ix + dx;
                    if tx >= 0 && tx < w as i64 {
                        let idx = iy as usize * w as usize + tx as usize;
                        coverage[idx] = coverage[idx].max(cov);
                    }
                }
            });
        }

        for (idx, px) in buffer.as_raw_mut().chunks_exact_mut(4).enumerate() {
            let cov = coverage[idx];
            if cov > 0.001 {
                let out = blend_over(Rgba([px[0], px[1], px[2], px[3]]), color, cov.min(1.0));
                px.copy_from_slice(&out.0);
            }
        }
    }
}

/// Lay out a single line left-aligned at x = 0, returning each glyph with its
/// pen position.  Kerning applied between consecutive glyphs.
pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> Vec<(GlyphId, f32)> {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }
    glyphs
}

/// Load a regular-weight upright face by family name.  Bold and italic are
/// synthesized at draw time so every family supports them.
pub fn load_system_font(family: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    load_font_matching(&[FamilyName::Title(family.to_string())])
}

fn load_fallback_font() -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    load_font_matching(&[FamilyName::SansSerif])
}

fn load_font_matching(families: &[font_kit::family_name::FamilyName]) -> Option<FontArc> {
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let handle = SystemSource::new()
        .select_best_match(families, &Properties::new())
        .ok()?;
    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}
