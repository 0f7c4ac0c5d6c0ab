// ============================================================================
// COMPOSITOR — flatten the layer stack into one RGBA buffer
// ============================================================================

use image::Rgba;
use rayon::prelude::*;

use crate::canvas::{Layer, PixelBuffer};

/// Straight-alpha source-over of `top` onto `base`.  `opacity` scales the
/// top pixel's own alpha (layer opacity, brush coverage).
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let top_a = top[3] as f32 / 255.0 * opacity.clamp(0.0, 1.0);
    if top_a <= 0.0 {
        return base;
    }
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mix = |t: u8, b: u8| {
        let v = (t as f32 * top_a + b as f32 * base_a * (1.0 - top_a)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        mix(top[0], base[0]),
        mix(top[1], base[1]),
        mix(top[2], base[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Composite `layers` bottom-to-top into a new buffer sized to the first
/// layer.  Hidden layers and layers at zero opacity contribute nothing.
///
/// Each output pixel centre is mapped back through the layer's position and
/// transform and sampled nearest-neighbour.  Returns `None` for an empty stack.
pub fn composite(layers: &[Layer]) -> Option<PixelBuffer> {
    let base = layers.first()?;
    let (width, height) = base.buffer.dimensions();
    let mut out = PixelBuffer::new(width, height).ok()?;
    for layer in layers {
        if !layer.visible || layer.opacity() <= 0.0 {
            continue;
        }
        draw_layer(&mut out, layer);
    }
    Some(out)
}

fn draw_layer(out: &mut PixelBuffer, layer: &Layer) {
    let width = out.width() as usize;
    let stride = width * 4;
    let opacity = layer.opacity();
    let src = &layer.buffer;

    out.as_raw_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let Some((lx, ly)) = layer.to_local(x as f32 + 0.5, y as f32 + 0.5) else {
                    continue;
                };
                let sx = lx.floor() as i64;
                let sy = ly.floor() as i64;
                let Ok(top) = src.get_pixel(sx, sy) else {
                    continue;
                };
                let blended = blend_over(Rgba([px[0], px[1], px[2], px[3]]), top, opacity);
                px.copy_from_slice(&blended.0);
            }
        });
}
