//! Image compression pipeline for attachments.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;

use crate::error::{Error, Result};

/// Configuration for attachment compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOptions {
    /// Maximum output width in pixels.
    pub max_width: u32,
    /// Maximum output height in pixels.
    pub max_height: u32,
    /// JPEG re-encode quality (0-100).
    pub jpeg_quality: u8,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            jpeg_quality: 80,
        }
    }
}

/// Compressed attachment payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Compress image bytes: resize to fit within the configured bounding box
/// preserving aspect ratio (no upscale), then re-encode as JPEG at the
/// configured quality.
pub fn compress_image(source_bytes: &[u8], options: CompressionOptions) -> Result<CompressedImage> {
    if source_bytes.is_empty() {
        return Err(Error::InvalidInput(
            "Compression source bytes cannot be empty".to_string(),
        ));
    }
    if options.max_width == 0 || options.max_height == 0 {
        return Err(Error::InvalidInput(
            "Compression max dimensions must be greater than zero".to_string(),
        ));
    }

    let source = image::load_from_memory(source_bytes).map_err(|error| {
        Error::MediaEncoding(format!("Failed to decode source image: {error}"))
    })?;

    let (source_width, source_height) = source.dimensions();
    let resized = if source_width <= options.max_width && source_height <= options.max_height {
        source
    } else {
        source.thumbnail(options.max_width, options.max_height)
    };
    let (width, height) = resized.dimensions();

    let mut cursor = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, options.jpeg_quality);
    encoder
        .encode_image(&resized)
        .map_err(|error| Error::MediaEncoding(format!("Failed to encode JPEG: {error}")))?;

    Ok(CompressedImage {
        bytes: cursor.into_inner(),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};

    fn source_png(width: u32, height: u32) -> Vec<u8> {
        let image = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_fn(width, height, |x, y| {
            Rgba([(x % 251) as u8, (y % 241) as u8, ((x + y) % 233) as u8, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut cursor, ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn compress_bounds_dimensions_and_preserves_ratio() {
        let source = source_png(3840, 2160);
        let result = compress_image(&source, CompressionOptions::default()).unwrap();

        assert_eq!(result.width, 1920);
        assert_eq!(result.height, 1080);
        assert!(!result.bytes.is_empty());
    }

    #[test]
    fn compress_does_not_upscale_small_images() {
        let source = source_png(640, 480);
        let result = compress_image(&source, CompressionOptions::default()).unwrap();

        assert_eq!(result.width, 640);
        assert_eq!(result.height, 480);
    }

    #[test]
    fn compress_rejects_undecodable_source() {
        let err = compress_image(b"not-an-image", CompressionOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MediaEncoding(_)));
    }

    #[test]
    fn compress_rejects_empty_source() {
        let err = compress_image(&[], CompressionOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
