use std::fmt;
use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::{ImageEncoder, Rgba, RgbaImage};
use uuid::Uuid;

use crate::error::{EditorError, EditorResult};
use crate::ops::text::TextData;

/// Default longest-edge dimension for layer thumbnails.
pub const THUMBNAIL_MAX_EDGE: u32 = 64;

/// Largest accepted buffer edge (keeps `width * height * 4` well inside usize).
const MAX_DIMENSION: u32 = 16384;

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// PIXEL BUFFER – flat RGBA8, non-premultiplied
// ============================================================================

/// Rectangular grid of RGBA8 samples backing one layer.
///
/// The channel data is a single contiguous `width * height * 4` byte array,
/// row-major.  `clone()` is a full deep copy, which is what history snapshots
/// rely on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Create a fully transparent buffer.
    pub fn new(width: u32, height: u32) -> EditorResult<Self> {
        check_dimensions(width, height)?;
        Ok(Self {
            image: RgbaImage::new(width, height),
        })
    }

    /// Create a buffer filled with a single color.
    pub fn new_filled(width: u32, height: u32, color: Rgba<u8>) -> EditorResult<Self> {
        check_dimensions(width, height)?;
        Ok(Self {
            image: RgbaImage::from_pixel(width, height, color),
        })
    }

    /// Copy raw RGBA bytes (row-major, 4 bytes per pixel) into a new buffer.
    pub fn from_raw_rgba(width: u32, height: u32, data: &[u8]) -> EditorResult<Self> {
        check_dimensions(width, height)?;
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(EditorError::UnsupportedImportFormat(format!(
                "expected {} bytes of RGBA data for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        let image = RgbaImage::from_raw(width, height, data.to_vec())
            .ok_or(EditorError::InvalidDimensions { width, height })?;
        Ok(Self { image })
    }

    pub fn from_rgba_image(image: RgbaImage) -> EditorResult<Self> {
        check_dimensions(image.width(), image.height())?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width() as i64 && y < self.height() as i64
    }

    fn check(&self, x: i64, y: i64) -> EditorResult<(u32, u32)> {
        if self.contains(x, y) {
            Ok((x as u32, y as u32))
        } else {
            Err(EditorError::OutOfBounds {
                x,
                y,
                width: self.width(),
                height: self.height(),
            })
        }
    }

    pub fn get_pixel(&self, x: i64, y: i64) -> EditorResult<Rgba<u8>> {
        let (x, y) = self.check(x, y)?;
        Ok(*self.image.get_pixel(x, y))
    }

    pub fn set_pixel(&mut self, x: i64, y: i64, pixel: Rgba<u8>) -> EditorResult<()> {
        let (x, y) = self.check(x, y)?;
        self.image.put_pixel(x, y, pixel);
        Ok(())
    }

    /// Read a pixel with the coordinates clamped into the buffer.
    /// Tool-driven coordinates may legitimately leave the canvas mid-drag.
    pub fn get_pixel_clamped(&self, x: i64, y: i64) -> Rgba<u8> {
        let cx = x.clamp(0, self.width() as i64 - 1) as u32;
        let cy = y.clamp(0, self.height() as i64 - 1) as u32;
        *self.image.get_pixel(cx, cy)
    }

    /// Copy out a `w`×`h` region starting at (`x`, `y`).  The region must lie
    /// entirely inside the buffer.
    pub fn region(&self, x: u32, y: u32, w: u32, h: u32) -> EditorResult<PixelBuffer> {
        check_dimensions(w, h)?;
        let x_end = x as i64 + w as i64 - 1;
        let y_end = y as i64 + h as i64 - 1;
        self.check(x as i64, y as i64)?;
        self.check(x_end, y_end)?;

        let src_stride = self.width() as usize * 4;
        let row_len = w as usize * 4;
        let mut out = Vec::with_capacity(row_len * h as usize);
        let raw = self.as_raw();
        for row in y..y + h {
            let start = row as usize * src_stride + x as usize * 4;
            out.extend_from_slice(&raw[start..start + row_len]);
        }
        PixelBuffer::from_raw_rgba(w, h, &out)
    }

    /// Raw channel data, `width * height * 4` bytes.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    pub fn as_rgba_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_rgba_image(self) -> RgbaImage {
        self.image
    }

    pub fn fill(&mut self, color: Rgba<u8>) {
        for px in self.image.pixels_mut() {
            *px = color;
        }
    }

    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        self.as_raw_mut().fill(0);
    }

    /// Overwrite this buffer's pixels with `other`'s.  Dimensions are adopted
    /// from `other` when they differ.
    pub fn copy_from(&mut self, other: &PixelBuffer) {
        if self.dimensions() == other.dimensions() {
            self.as_raw_mut().copy_from_slice(other.as_raw());
        } else {
            self.image = other.image.clone();
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.as_raw().len()
    }
}

fn check_dimensions(width: u32, height: u32) -> EditorResult<()> {
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(EditorError::InvalidDimensions { width, height });
    }
    Ok(())
}

// ============================================================================
// COLOR HELPERS
// ============================================================================

/// Parse `#rrggbb` (leading `#` optional) into an opaque color.
pub fn parse_hex_color(text: &str) -> EditorResult<Rgba<u8>> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EditorError::InvalidColor(text.to_string()));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| EditorError::InvalidColor(text.to_string()))
    };
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
}

/// Format the RGB part of a pixel as a 7-character `#rrggbb` string.
pub fn to_hex(color: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

// ============================================================================
// LAYER
// ============================================================================

/// Stable, unique identifier of a layer for its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Offset applied to a layer at composite time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Scale and rotation applied to a layer at composite time, around the
/// layer's `position`.  Rotation is in radians; no tool sets it today.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation: f32,
}

impl Default for LayerTransform {
    fn default() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
        }
    }
}

impl LayerTransform {
    pub fn is_identity(&self) -> bool {
        self.scale_x == 1.0 && self.scale_y == 1.0 && self.rotation == 0.0
    }

    /// Map a document-space point into layer-local pixel space.
    /// Returns `None` for a degenerate (zero) scale.
    pub fn to_local(&self, position: Position, x: f32, y: f32) -> Option<(f32, f32)> {
        if self.scale_x == 0.0 || self.scale_y == 0.0 {
            return None;
        }
        let tx = x - position.x;
        let ty = y - position.y;
        let (rx, ry) = if self.rotation == 0.0 {
            (tx, ty)
        } else {
            let (sin, cos) = self.rotation.sin_cos();
            (tx * cos + ty * sin, -tx * sin + ty * cos)
        };
        Some((rx / self.scale_x, ry / self.scale_y))
    }

    /// Map a layer-local point into document space.
    pub fn to_document(&self, position: Position, x: f32, y: f32) -> (f32, f32) {
        let sx = x * self.scale_x;
        let sy = y * self.scale_y;
        let (rx, ry) = if self.rotation == 0.0 {
            (sx, sy)
        } else {
            let (sin, cos) = self.rotation.sin_cos();
            (sx * cos - sy * sin, sx * sin + sy * cos)
        };
        (rx + position.x, ry + position.y)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LayerKind {
    Raster,
    /// Buffer content is derived from this text; re-rendered on every edit.
    Text(TextData),
}

#[derive(Clone, Debug)]
pub struct Layer {
    id: LayerId,
    pub name: String,
    pub visible: bool,
    opacity: f32,
    pub buffer: PixelBuffer,
    /// PNG-encoded preview, regenerated after every committed mutation.
    pub thumbnail: Option<Vec<u8>>,
    pub kind: LayerKind,
    pub position: Position,
    pub transform: LayerTransform,
}

impl Layer {
    /// A new transparent raster layer.
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> EditorResult<Self> {
        Ok(Self::from_buffer(name, PixelBuffer::new(width, height)?))
    }

    pub fn from_buffer(name: impl Into<String>, buffer: PixelBuffer) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            visible: true,
            opacity: 1.0,
            buffer,
            thumbnail: None,
            kind: LayerKind::Raster,
            position: Position::default(),
            transform: LayerTransform::default(),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Opacity is clamped into [0, 1]; NaN becomes fully opaque.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, LayerKind::Text(_))
    }

    pub fn text_data(&self) -> Option<&TextData> {
        match &self.kind {
            LayerKind::Text(data) => Some(data),
            LayerKind::Raster => None,
        }
    }

    /// Map a document-space point into this layer's pixel space.
    pub fn to_local(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        self.transform.to_local(self.position, x, y)
    }

    /// Regenerate the PNG thumbnail.  Encode failures leave no thumbnail.
    pub fn refresh_thumbnail(&mut self, max_edge: u32) {
        match encode_thumbnail(&self.buffer, max_edge) {
            Ok(bytes) => self.thumbnail = Some(bytes),
            Err(e) => {
                crate::log_warn!("thumbnail for layer '{}' failed: {}", self.name, e);
                self.thumbnail = None;
            }
        }
    }
}

/// Downscale (longest edge ≤ `max_edge`) and PNG-encode a buffer.
pub fn encode_thumbnail(buffer: &PixelBuffer, max_edge: u32) -> EditorResult<Vec<u8>> {
    let (w, h) = buffer.dimensions();
    let longest = w.max(h);
    let max_edge = max_edge.max(1);
    let (nw, nh) = if longest <= max_edge {
        (w, h)
    } else {
        let scale = max_edge as f32 / longest as f32;
        (
            ((w as f32 * scale).round() as u32).max(1),
            ((h as f32 * scale).round() as u32).max(1),
        )
    };
    let resized;
    let img = if (nw, nh) == (w, h) {
        buffer.as_rgba_image()
    } else {
        resized = image::imageops::resize(
            buffer.as_rgba_image(),
            nw,
            nh,
            image::imageops::FilterType::Triangle,
        );
        &resized
    };

    let mut out = Cursor::new(Vec::new());
    PngEncoder::new(&mut out).write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(out.into_inner())
}
