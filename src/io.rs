use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, ImageOutputFormat, Rgba, RgbImage, RgbaImage};

use crate::canvas::PixelBuffer;
use crate::compositor::blend_over;
use crate::error::{EditorError, EditorResult};

/// Palette slot reserved for transparent pixels in GIF output.
const GIF_TRANSPARENT_INDEX: u8 = 255;

// ============================================================================
// IMPORT
// ============================================================================

/// Decode any raster format `image` understands into an RGBA8 buffer.
pub fn decode_image(bytes: &[u8]) -> EditorResult<PixelBuffer> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| EditorError::UnsupportedImportFormat(e.to_string()))?;
    PixelBuffer::from_rgba_image(decoded.to_rgba8())
}

pub fn load_image(path: &Path) -> EditorResult<PixelBuffer> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes).map_err(|e| match e {
        EditorError::UnsupportedImportFormat(reason) => {
            EditorError::UnsupportedImportFormat(format!("{}: {}", path.display(), reason))
        }
        other => other,
    })
}

// ============================================================================
// EXPORT
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
    Gif,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Webp => "webp",
            ExportFormat::Bmp => "bmp",
            ExportFormat::Gif => "gif",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "webp" => Some(ExportFormat::Webp),
            "bmp" => Some(ExportFormat::Bmp),
            "gif" => Some(ExportFormat::Gif),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// JPEG and BMP carry no alpha; transparent areas become white.
    pub fn flattens_alpha(&self) -> bool {
        matches!(self, ExportFormat::Jpeg | ExportFormat::Bmp)
    }
}

/// Encode a flattened image.  `quality` (0–100) applies to JPEG only; the
/// WebP encoder is lossless.
pub fn encode_image(image: &PixelBuffer, format: ExportFormat, quality: u8) -> EditorResult<Vec<u8>> {
    let mut out = Vec::new();
    write_encoded(image, format, quality, &mut out)?;
    Ok(out)
}

/// Encode and write to `path`.
pub fn export_image(image: &PixelBuffer, path: &Path, format: ExportFormat, quality: u8) -> EditorResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_encoded(image, format, quality, &mut writer)?;
    writer.flush()?;
    crate::log_info!(
        "exported {}x{} {:?} to {}",
        image.width(),
        image.height(),
        format,
        path.display()
    );
    Ok(())
}

fn write_encoded<W: Write>(image: &PixelBuffer, format: ExportFormat, quality: u8, writer: &mut W) -> EditorResult<()> {
    let (w, h) = image.dimensions();
    match format {
        ExportFormat::Png => {
            PngEncoder::new(writer).write_image(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        ExportFormat::Jpeg => {
            let rgb = flatten_onto_white(image);
            JpegEncoder::new_with_quality(writer, quality.clamp(1, 100))
                .write_image(rgb.as_raw(), w, h, ColorType::Rgb8)?;
        }
        ExportFormat::Webp => {
            // the WebP encoder needs a seekable sink
            let mut cursor = Cursor::new(Vec::new());
            DynamicImage::ImageRgba8(image.as_rgba_image().clone()).write_to(&mut cursor, ImageOutputFormat::WebP)?;
            writer.write_all(cursor.get_ref())?;
        }
        ExportFormat::Bmp => {
            let rgb = flatten_onto_white(image);
            BmpEncoder::new(writer).write_image(rgb.as_raw(), w, h, ColorType::Rgb8)?;
        }
        ExportFormat::Gif => {
            let bytes = encode_gif(image.as_rgba_image())?;
            writer.write_all(&bytes)?;
        }
    }
    Ok(())
}

/// Composite every pixel over opaque white and drop alpha.
pub fn flatten_onto_white(image: &PixelBuffer) -> RgbImage {
    let white = Rgba([255, 255, 255, 255]);
    let src = image.as_rgba_image();
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let px = blend_over(white, *src.get_pixel(x, y), 1.0);
        image::Rgb([px[0], px[1], px[2]])
    })
}

/// Single-frame GIF with a NeuQuant palette.  Pixels with alpha below 128
/// map to the reserved transparent index.
fn encode_gif(image: &RgbaImage) -> EditorResult<Vec<u8>> {
    if image.width() > u16::MAX as u32 || image.height() > u16::MAX as u32 {
        return Err(EditorError::Encode(
            "image dimensions exceed GIF maximum (65535x65535)".to_string(),
        ));
    }
    let (w, h) = (image.width() as u16, image.height() as u16);
    let (palette, indexed) = quantize_rgba(image, GIF_TRANSPARENT_INDEX as usize);

    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, w, h, &palette)
            .map_err(|e| EditorError::Encode(format!("GIF encoder init error: {}", e)))?;
        let frame = gif::Frame {
            width: w,
            height: h,
            transparent: Some(GIF_TRANSPARENT_INDEX),
            buffer: std::borrow::Cow::Borrowed(&indexed),
            ..Default::default()
        };
        encoder
            .write_frame(&frame)
            .map_err(|e| EditorError::Encode(format!("GIF write error: {}", e)))?;
    }
    Ok(out)
}

/// Quantize to `max_colors` opaque colours plus one transparent slot.
/// Returns (flat RGB palette of 256 entries, one index per pixel).
fn quantize_rgba(image: &RgbaImage, max_colors: usize) -> (Vec<u8>, Vec<u8>) {
    let pixels: Vec<u8> = image
        .pixels()
        .flat_map(|p| [p[0], p[1], p[2], 255])
        .collect();

    let nq = color_quant::NeuQuant::new(10, max_colors, &pixels);

    let mut palette = Vec::with_capacity(256 * 3);
    for i in 0..256 {
        match nq.lookup(i) {
            Some(color) if i < max_colors => palette.extend_from_slice(&color[..3]),
            _ => palette.extend_from_slice(&[0, 0, 0]),
        }
    }

    let indices = image
        .pixels()
        .map(|p| {
            if p[3] < 128 {
                GIF_TRANSPARENT_INDEX
            } else {
                nq.index_of(&[p[0], p[1], p[2], 255]) as u8
            }
        })
        .collect();

    (palette, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(w: u32, h: u32) -> PixelBuffer {
        let mut buf = PixelBuffer::new(w, h).unwrap();
        for y in 0..h as i64 {
            for x in 0..w as i64 {
                let px = if (x + y) % 2 == 0 {
                    Rgba([200, 30, 30, 255])
                } else {
                    Rgba([0, 0, 0, 0])
                };
                buf.set_pixel(x, y, px).unwrap();
            }
        }
        buf
    }

    #[test]
    fn png_preserves_pixels() {
        let src = checker(5, 4);
        let bytes = encode_image(&src, ExportFormat::Png, 0).unwrap();
        let back = decode_image(&bytes).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn jpeg_and_bmp_flatten_onto_white() {
        let clear = PixelBuffer::new(8, 8).unwrap();
        for format in [ExportFormat::Jpeg, ExportFormat::Bmp] {
            let bytes = encode_image(&clear, format, 90).unwrap();
            let back = decode_image(&bytes).unwrap();
            let px = back.get_pixel(3, 3).unwrap();
            assert_eq!(px[3], 255, "{:?}", format);
            assert!(px[0] > 245 && px[1] > 245 && px[2] > 245, "{:?}: {:?}", format, px);
        }
    }

    #[test]
    fn zero_quality_jpeg_still_encodes() {
        let img = checker(8, 8);
        assert!(encode_image(&img, ExportFormat::Jpeg, 0).is_ok());
    }

    #[test]
    fn webp_is_lossless_with_alpha() {
        let src = checker(6, 6);
        let bytes = encode_image(&src, ExportFormat::Webp, 50).unwrap();
        let back = decode_image(&bytes).unwrap();
        assert_eq!(back.get_pixel(0, 0).unwrap(), Rgba([200, 30, 30, 255]));
        assert_eq!(back.get_pixel(1, 0).unwrap()[3], 0);
    }

    #[test]
    fn gif_keeps_binary_transparency() {
        let src = checker(16, 16);
        let bytes = encode_image(&src, ExportFormat::Gif, 0).unwrap();
        assert_eq!(&bytes[..3], b"GIF");
        let back = decode_image(&bytes).unwrap();
        assert_eq!(back.dimensions(), (16, 16));
        assert_eq!(back.get_pixel(1, 0).unwrap()[3], 0);
        assert_eq!(back.get_pixel(0, 0).unwrap()[3], 255);
    }

    #[test]
    fn garbage_is_unsupported_import() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(EditorError::UnsupportedImportFormat(_))
        ));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ExportFormat::from_extension("JPEG"), Some(ExportFormat::Jpeg));
        assert_eq!(ExportFormat::from_path(Path::new("out/a.webp")), Some(ExportFormat::Webp));
        assert_eq!(ExportFormat::from_path(Path::new("noext")), None);
        assert!(ExportFormat::Bmp.flattens_alpha());
        assert!(!ExportFormat::Gif.flattens_alpha());
    }

    #[test]
    fn export_writes_file() {
        let dir = std::env::temp_dir().join(format!("epigimp-io-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.png");
        let src = checker(3, 3);
        export_image(&src, &path, ExportFormat::Png, 0).unwrap();
        assert_eq!(load_image(&path).unwrap(), src);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
