// ============================================================================
// PIXEL FILTERS — grayscale, sepia, invert, brightness, contrast, saturate, blur
// ============================================================================
//
// Every filter works directly on the layer's raw RGBA channel array.  Colour
// filters rewrite R, G, B in place and leave alpha alone; blur reads from an
// untouched copy of the source so no output pixel ever sees partially
// blurred neighbours.  Rows are processed in parallel with rayon.
// ============================================================================

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::PixelBuffer;
use crate::error::EditorError;

pub const BRIGHTNESS_RANGE: (f32, f32) = (-100.0, 100.0);
pub const CONTRAST_RANGE: (f32, f32) = (-100.0, 100.0);
/// Saturation is a plain multiplier: 1.0 leaves colours unchanged, 0.0 is grey.
pub const SATURATE_RANGE: (f32, f32) = (0.0, 2.0);
pub const MAX_BLUR_RADIUS: u32 = 10;

/// A filter and its parameter, as accepted from configuration:
/// `{"type": "brightness", "value": 20}` or `{"type": "invert"}`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterSpec {
    Grayscale,
    Sepia,
    Invert,
    Brightness { value: f32 },
    Contrast { value: f32 },
    /// `value` is the decimal factor (1.0 = identity), not a percentage.
    /// A 0–200 UI slider must be divided by 100 before it gets here.
    Saturate { value: f32 },
    /// `value` is the integer box radius.
    Blur { value: u32 },
}

impl FilterSpec {
    pub fn name(&self) -> &'static str {
        match self {
            FilterSpec::Grayscale => "grayscale",
            FilterSpec::Sepia => "sepia",
            FilterSpec::Invert => "invert",
            FilterSpec::Brightness { .. } => "brightness",
            FilterSpec::Contrast { .. } => "contrast",
            FilterSpec::Saturate { .. } => "saturate",
            FilterSpec::Blur { .. } => "blur",
        }
    }

    /// Clamp the parameter into its documented range.
    pub fn clamped(self) -> Self {
        let clamp = |v: f32, (lo, hi): (f32, f32)| if v.is_nan() { 0.0 } else { v.clamp(lo, hi) };
        let out = match self {
            FilterSpec::Brightness { value } => FilterSpec::Brightness {
                value: clamp(value, BRIGHTNESS_RANGE),
            },
            FilterSpec::Contrast { value } => FilterSpec::Contrast {
                value: clamp(value, CONTRAST_RANGE),
            },
            FilterSpec::Saturate { value } => FilterSpec::Saturate {
                value: if value.is_nan() { 1.0 } else { value.clamp(SATURATE_RANGE.0, SATURATE_RANGE.1) },
            },
            FilterSpec::Blur { value } => FilterSpec::Blur {
                value: value.min(MAX_BLUR_RADIUS),
            },
            other => other,
        };
        if out != self {
            crate::log_warn!("filter parameter out of range: {} clamped to {}", self, out);
        }
        out
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterSpec::Grayscale | FilterSpec::Sepia | FilterSpec::Invert => write!(f, "{}", self.name()),
            FilterSpec::Brightness { value }
            | FilterSpec::Contrast { value }
            | FilterSpec::Saturate { value } => write!(f, "{}:{}", self.name(), value),
            FilterSpec::Blur { value } => write!(f, "{}:{}", self.name(), value),
        }
    }
}

/// Compact command-line form: `invert`, `brightness:20`, `blur:3`.
impl FromStr for FilterSpec {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = match s.split_once(':') {
            Some((n, v)) => (n.trim(), Some(v.trim())),
            None => (s.trim(), None),
        };
        let number = |v: Option<&str>| -> Result<f32, EditorError> {
            let v = v.ok_or_else(|| EditorError::InvalidFilter(format!("'{}' needs a value", name)))?;
            v.parse::<f32>()
                .map_err(|_| EditorError::InvalidFilter(format!("'{}' is not a number", v)))
        };
        match name.to_lowercase().as_str() {
            "grayscale" | "greyscale" => Ok(FilterSpec::Grayscale),
            "sepia" => Ok(FilterSpec::Sepia),
            "invert" => Ok(FilterSpec::Invert),
            "brightness" => Ok(FilterSpec::Brightness { value: number(value)? }),
            "contrast" => Ok(FilterSpec::Contrast { value: number(value)? }),
            "saturate" => Ok(FilterSpec::Saturate { value: number(value)? }),
            "blur" => {
                let v = number(value)?;
                if v < 0.0 {
                    return Err(EditorError::InvalidFilter("blur radius cannot be negative".into()));
                }
                Ok(FilterSpec::Blur { value: v.round() as u32 })
            }
            other => Err(EditorError::InvalidFilter(format!("unknown filter '{}'", other))),
        }
    }
}

/// Apply a filter to the buffer in place.
pub fn apply_filter(buffer: &mut PixelBuffer, spec: &FilterSpec) {
    match spec.clamped() {
        FilterSpec::Grayscale => grayscale(buffer),
        FilterSpec::Sepia => sepia(buffer),
        FilterSpec::Invert => invert(buffer),
        FilterSpec::Brightness { value } => brightness(buffer, value),
        FilterSpec::Contrast { value } => contrast(buffer, value),
        FilterSpec::Saturate { value } => saturate(buffer, value),
        FilterSpec::Blur { value } => box_blur(buffer, value),
    }
}

/// `max(0, min(255, round(v)))`
#[inline]
fn clamp_channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Run `transform` over every pixel's RGB, row-parallel, alpha preserved.
fn apply_pixel_transform<F>(buffer: &mut PixelBuffer, transform: F)
where
    F: Fn(u8, u8, u8) -> [u8; 3] + Sync,
{
    let stride = buffer.width() as usize * 4;
    buffer.as_raw_mut().par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let [r, g, b] = transform(px[0], px[1], px[2]);
            px[0] = r;
            px[1] = g;
            px[2] = b;
        }
    });
}

/// Unweighted channel average, integer-truncated.
pub fn grayscale(buffer: &mut PixelBuffer) {
    apply_pixel_transform(buffer, |r, g, b| {
        let v = ((r as u16 + g as u16 + b as u16) / 3) as u8;
        [v, v, v]
    });
}

pub fn sepia(buffer: &mut PixelBuffer) {
    apply_pixel_transform(buffer, |r, g, b| {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        [
            clamp_channel(0.393 * r + 0.769 * g + 0.189 * b),
            clamp_channel(0.349 * r + 0.686 * g + 0.168 * b),
            clamp_channel(0.272 * r + 0.534 * g + 0.131 * b),
        ]
    });
}

pub fn invert(buffer: &mut PixelBuffer) {
    apply_pixel_transform(buffer, |r, g, b| [255 - r, 255 - g, 255 - b]);
}

/// Add `value` (−100..100) to every colour channel.
pub fn brightness(buffer: &mut PixelBuffer, value: f32) {
    apply_pixel_transform(buffer, |r, g, b| {
        [
            clamp_channel(r as f32 + value),
            clamp_channel(g as f32 + value),
            clamp_channel(b as f32 + value),
        ]
    });
}

/// Contrast correction factor for `value` in −100..100 (0 → 1.0).
pub fn contrast_factor(value: f32) -> f32 {
    (259.0 * (value + 255.0)) / (255.0 * (259.0 - value))
}

pub fn contrast(buffer: &mut PixelBuffer, value: f32) {
    let factor = contrast_factor(value);
    apply_pixel_transform(buffer, |r, g, b| {
        let adjust = |c: u8| clamp_channel(factor * (c as f32 - 128.0) + 128.0);
        [adjust(r), adjust(g), adjust(b)]
    });
}

/// Scale each channel's distance from the pixel's luma by `factor`.
pub fn saturate(buffer: &mut PixelBuffer, factor: f32) {
    apply_pixel_transform(buffer, |r, g, b| {
        let (rf, gf, bf) = (r as f32, g as f32, b as f32);
        let gray = 0.2989 * rf + 0.5870 * gf + 0.1140 * bf;
        [
            clamp_channel(gray + factor * (rf - gray)),
            clamp_channel(gray + factor * (gf - gray)),
            clamp_channel(gray + factor * (bf - gray)),
        ]
    });
}

/// Box blur over the `(2r+1)²` neighbourhood, all four channels.
///
/// Neighbourhoods are clipped at the buffer edges (edge pixels average fewer
/// samples).  Computed as two separable passes over an immutable copy of the
/// source; the clipped window is a rectangle, so the separable sum equals the
/// naive per-pixel sum exactly.
pub fn box_blur(buffer: &mut PixelBuffer, radius: u32) {
    if radius == 0 {
        return;
    }
    let w = buffer.width() as usize;
    let h = buffer.height() as usize;
    let r = radius as usize;
    let stride = w * 4;
    let src = buffer.as_raw().to_vec();

    // Horizontal pass: per-pixel window sums along each row.
    let mut row_sums = vec![0u32; w * h * 4];
    row_sums
        .par_chunks_mut(stride)
        .zip(src.par_chunks(stride))
        .for_each(|(sums, row)| {
            for x in 0..w {
                let x0 = x.saturating_sub(r);
                let x1 = (x + r).min(w - 1);
                let mut acc = [0u32; 4];
                for sx in x0..=x1 {
                    let p = sx * 4;
                    acc[0] += row[p] as u32;
                    acc[1] += row[p + 1] as u32;
                    acc[2] += row[p + 2] as u32;
                    acc[3] += row[p + 3] as u32;
                }
                sums[x * 4..x * 4 + 4].copy_from_slice(&acc);
            }
        });

    // Vertical pass: sum the row sums, divide by the clipped window area.
    buffer
        .as_raw_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, out_row)| {
            let y0 = y.saturating_sub(r);
            let y1 = (y + r).min(h - 1);
            let rows = (y1 - y0 + 1) as u32;
            for x in 0..w {
                let cols = ((x + r).min(w - 1) - x.saturating_sub(r) + 1) as u32;
                let count = rows * cols;
                for c in 0..4 {
                    let mut total = 0u32;
                    for sy in y0..=y1 {
                        total += row_sums[sy * stride + x * 4 + c];
                    }
                    out_row[x * 4 + c] = ((total + count / 2) / count) as u8;
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, c: [u8; 4]) -> PixelBuffer {
        PixelBuffer::new_filled(w, h, Rgba(c)).unwrap()
    }

    /// A deterministic non-uniform test image.
    fn pattern(w: u32, h: u32) -> PixelBuffer {
        let mut buf = PixelBuffer::new(w, h).unwrap();
        for y in 0..h {
            for x in 0..w {
                let v = (x * 37 + y * 91) as u8;
                buf.set_pixel(x as i64, y as i64, Rgba([v, v.wrapping_mul(3), 255 - v, (x * 20 + 15) as u8]))
                    .unwrap();
            }
        }
        buf
    }

    #[test]
    fn grayscale_averages_and_keeps_alpha() {
        let mut buf = solid(2, 2, [30, 60, 90, 255]);
        grayscale(&mut buf);
        assert_eq!(buf.get_pixel(1, 1).unwrap(), Rgba([60, 60, 60, 255]));

        let mut red = solid(1, 1, [255, 0, 0, 255]);
        apply_filter(&mut red, &FilterSpec::Grayscale);
        assert_eq!(red.get_pixel(0, 0).unwrap(), Rgba([85, 85, 85, 255]));

        // 100 / 3 truncates rather than rounds
        let mut odd = solid(1, 1, [50, 50, 1, 7]);
        grayscale(&mut odd);
        assert_eq!(odd.get_pixel(0, 0).unwrap(), Rgba([33, 33, 33, 7]));
    }

    #[test]
    fn sepia_matches_matrix_and_clamps() {
        let mut buf = solid(1, 1, [100, 100, 100, 200]);
        sepia(&mut buf);
        assert_eq!(buf.get_pixel(0, 0).unwrap(), Rgba([135, 120, 94, 200]));

        let mut white = solid(1, 1, [255, 255, 255, 255]);
        sepia(&mut white);
        assert_eq!(white.get_pixel(0, 0).unwrap(), Rgba([255, 255, 239, 255]));
    }

    #[test]
    fn invert_twice_is_identity() {
        let original = pattern(7, 5);
        let mut buf = original.clone();
        invert(&mut buf);
        assert_ne!(buf, original);
        invert(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn neutral_parameters_are_identity() {
        let original = pattern(9, 4);
        for spec in [
            FilterSpec::Brightness { value: 0.0 },
            FilterSpec::Contrast { value: 0.0 },
            FilterSpec::Saturate { value: 1.0 },
            FilterSpec::Blur { value: 0 },
        ] {
            let mut buf = original.clone();
            apply_filter(&mut buf, &spec);
            assert_eq!(buf, original, "{} changed the image", spec);
        }
    }

    #[test]
    fn brightness_clamps_at_both_ends() {
        let mut buf = solid(1, 1, [10, 128, 250, 90]);
        brightness(&mut buf, 20.0);
        assert_eq!(buf.get_pixel(0, 0).unwrap(), Rgba([30, 148, 255, 90]));
        brightness(&mut buf, -100.0);
        assert_eq!(buf.get_pixel(0, 0).unwrap(), Rgba([0, 48, 155, 90]));
    }

    #[test]
    fn contrast_stretches_around_midpoint() {
        let mut buf = solid(1, 1, [200, 128, 255, 255]);
        contrast(&mut buf, 50.0);
        let px = buf.get_pixel(0, 0).unwrap();
        assert_eq!(px[0], 235);
        assert_eq!(px[1], 128);
        assert_eq!(px[2], 255);

        assert!((contrast_factor(0.0) - 1.0).abs() < 1e-6);
        assert!(contrast_factor(-100.0) < 1.0);
    }

    #[test]
    fn zero_saturation_is_luma_gray() {
        let mut buf = solid(1, 1, [255, 0, 0, 255]);
        saturate(&mut buf, 0.0);
        assert_eq!(buf.get_pixel(0, 0).unwrap(), Rgba([76, 76, 76, 255]));
    }

    #[test]
    fn blur_averages_clipped_neighbourhood() {
        let mut buf = PixelBuffer::from_raw_rgba(
            3,
            1,
            &[0, 0, 0, 255, 90, 90, 90, 255, 180, 180, 180, 0],
        )
        .unwrap();
        box_blur(&mut buf, 1);
        assert_eq!(buf.get_pixel(0, 0).unwrap(), Rgba([45, 45, 45, 255]));
        assert_eq!(buf.get_pixel(1, 0).unwrap(), Rgba([90, 90, 90, 170]));
        assert_eq!(buf.get_pixel(2, 0).unwrap(), Rgba([135, 135, 135, 128]));
    }

    #[test]
    fn blur_matches_naive_definition() {
        let src = pattern(11, 8);
        for radius in [1u32, 2, 4] {
            let mut fast = src.clone();
            box_blur(&mut fast, radius);

            let r = radius as i64;
            for y in 0..8i64 {
                for x in 0..11i64 {
                    let mut sum = [0u32; 4];
                    let mut count = 0u32;
                    for dy in -r..=r {
                        for dx in -r..=r {
                            if src.contains(x + dx, y + dy) {
                                let p = src.get_pixel(x + dx, y + dy).unwrap();
                                for c in 0..4 {
                                    sum[c] += p[c] as u32;
                                }
                                count += 1;
                            }
                        }
                    }
                    let got = fast.get_pixel(x, y).unwrap();
                    for c in 0..4 {
                        let exact = sum[c] as f32 / count as f32;
                        assert!(
                            (got[c] as f32 - exact).abs() <= 0.5 + 1e-3,
                            "radius {} at ({}, {}) channel {}: {} vs {}",
                            radius, x, y, c, got[c], exact
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn parses_compact_form() {
        assert_eq!("invert".parse::<FilterSpec>().unwrap(), FilterSpec::Invert);
        assert_eq!(
            "Brightness:-20".parse::<FilterSpec>().unwrap(),
            FilterSpec::Brightness { value: -20.0 }
        );
        assert_eq!("blur:3".parse::<FilterSpec>().unwrap(), FilterSpec::Blur { value: 3 });
        assert!("contrast".parse::<FilterSpec>().is_err());
        assert!("emboss".parse::<FilterSpec>().is_err());
        assert!("blur:-2".parse::<FilterSpec>().is_err());
    }

    #[test]
    fn deserializes_tagged_json() {
        let specs: Vec<FilterSpec> = serde_json::from_str(
            r#"[{"type": "sepia"}, {"type": "saturate", "value": 1.5}, {"type": "blur", "value": 2}]"#,
        )
        .unwrap();
        assert_eq!(
            specs,
            vec![
                FilterSpec::Sepia,
                FilterSpec::Saturate { value: 1.5 },
                FilterSpec::Blur { value: 2 },
            ]
        );
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        assert_eq!(FilterSpec::Blur { value: 40 }.clamped(), FilterSpec::Blur { value: 10 });
        assert_eq!(
            FilterSpec::Contrast { value: 300.0 }.clamped(),
            FilterSpec::Contrast { value: 100.0 }
        );
        assert_eq!(
            FilterSpec::Saturate { value: 150.0 }.clamped(),
            FilterSpec::Saturate { value: 2.0 }
        );
    }
}
