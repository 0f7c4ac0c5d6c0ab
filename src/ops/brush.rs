use image::Rgba;

use crate::canvas::PixelBuffer;
use crate::compositor::blend_over;

/// Brush/eraser tip.  `size` is the diameter in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushSettings {
    pub size: f32,
    pub color: Rgba<u8>,
    pub opacity: f32,
    /// Fade the outermost pixel of the tip instead of a hard disc edge.
    pub anti_aliased: bool,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            size: 5.0,
            color: Rgba([0, 0, 0, 255]),
            opacity: 1.0,
            anti_aliased: false,
        }
    }
}

impl BrushSettings {
    pub fn radius(&self) -> f32 {
        self.size.max(1.0) * 0.5
    }

    /// Coverage in [0, 1] of a pixel at distance `dist` from the stroke centre line.
    fn coverage(&self, dist: f32) -> f32 {
        let radius = self.radius();
        if !dist.is_finite() || dist > radius {
            return 0.0;
        }
        if !self.anti_aliased {
            return 1.0;
        }
        let inner = (radius - 1.0).max(0.0);
        if dist <= inner {
            1.0
        } else {
            let t = ((dist - inner) / (radius - inner)).clamp(0.0, 1.0);
            1.0 - t * t * (3.0 - 2.0 * t)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrokeMode {
    /// Source-over with the brush colour.
    Paint,
    /// Destination-out: reduce alpha, reaching fully transparent at full coverage.
    Erase,
}

/// Circular stamp of diameter `brush.size` centred on (`x`, `y`).
pub fn stamp(buffer: &mut PixelBuffer, x: f32, y: f32, brush: &BrushSettings, mode: StrokeMode) {
    stroke_segment(buffer, (x, y), (x, y), brush, mode);
}

/// Round-capped line of width `brush.size` from `from` to `to`.
///
/// Every pixel within `radius` of the segment is touched exactly once, so a
/// semi-transparent brush does not darken where stamps would overlap.  Pixel
/// distance is measured from the pixel's integer coordinate.  Points outside
/// the buffer are clipped.
pub fn stroke_segment(
    buffer: &mut PixelBuffer,
    from: (f32, f32),
    to: (f32, f32),
    brush: &BrushSettings,
    mode: StrokeMode,
) {
    if ![from.0, from.1, to.0, to.1].iter().all(|v| v.is_finite()) {
        return;
    }
    let radius = brush.radius();
    let (w, h) = buffer.dimensions();

    let min_x = (from.0.min(to.0) - radius).floor().max(0.0);
    let min_y = (from.1.min(to.1) - radius).floor().max(0.0);
    let max_x = (from.0.max(to.0) + radius).ceil().min(w as f32 - 1.0);
    let max_y = (from.1.max(to.1) + radius).ceil().min(h as f32 - 1.0);
    if min_x > max_x || min_y > max_y {
        return;
    }

    let opacity = brush.opacity.clamp(0.0, 1.0);
    let stride = w as usize * 4;
    let raw = buffer.as_raw_mut();

    for py in min_y as usize..=max_y as usize {
        for px in min_x as usize..=max_x as usize {
            let dist = distance_to_segment(px as f32, py as f32, from, to);
            let cov = brush.coverage(dist);
            if cov <= 0.0 {
                continue;
            }
            let i = py * stride + px * 4;
            let dst = &mut raw[i..i + 4];
            match mode {
                StrokeMode::Paint => {
                    let out = blend_over(Rgba([dst[0], dst[1], dst[2], dst[3]]), brush.color, cov * opacity);
                    dst.copy_from_slice(&out.0);
                }
                StrokeMode::Erase => {
                    let keep = 1.0 - cov * opacity;
                    let a = (dst[3] as f32 * keep).round().clamp(0.0, 255.0) as u8;
                    if a == 0 {
                        dst.fill(0);
                    } else {
                        dst[3] = a;
                    }
                }
            }
        }
    }
}

fn distance_to_segment(px: f32, py: f32, a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        (((px - a.0) * dx + (py - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}
