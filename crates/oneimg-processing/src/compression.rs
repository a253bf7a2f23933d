use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

use crate::error::ProcessingError;

/// Quality used when an upload is compressed.
pub const COMPRESS_QUALITY: f32 = 85.0;
/// Quality used when an upload is transcoded without compressing.
pub const ORIGINAL_QUALITY: f32 = 100.0;
/// Files at or below this size are never compressed.
pub const COMPRESS_SIZE_THRESHOLD: usize = 1024 * 1024;

/// Whether and how hard to compress one upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionPolicy {
    pub compress: bool,
    pub quality: f32,
}

impl CompressionPolicy {
    /// Compression is skipped when the original is to be kept or the file is small.
    pub fn for_upload(keep_original: bool, file_size: usize) -> Self {
        let compress = !keep_original && file_size > COMPRESS_SIZE_THRESHOLD;
        Self {
            compress,
            quality: if compress {
                COMPRESS_QUALITY
            } else {
                ORIGINAL_QUALITY
            },
        }
    }
}

/// Encode to WebP via libwebp
pub fn encode_webp(img: &DynamicImage, quality: f32) -> Result<Bytes, ProcessingError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ProcessingError::Encode("cannot encode an empty image".to_string()));
    }
    let rgba_img = img.to_rgba8();
    let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);
    let webp_data = encoder.encode(quality.clamp(0.0, 100.0));
    Ok(Bytes::copy_from_slice(&webp_data))
}

/// Encode to JPEG using mozjpeg
pub fn encode_jpeg(img: &DynamicImage, quality: f32) -> Result<Bytes, ProcessingError> {
    let rgb_img = img.to_rgb8();
    let (width, height) = rgb_img.dimensions();

    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(quality);
    comp.set_progressive_mode();
    comp.set_optimize_coding(true);

    let mut comp = comp
        .start_compress(Vec::new())
        .map_err(|e| ProcessingError::Encode(format!("jpeg: {}", e)))?;
    comp.write_scanlines(&rgb_img)
        .map_err(|e| ProcessingError::Encode(format!("jpeg: {}", e)))?;
    let jpeg_data = comp
        .finish()
        .map_err(|e| ProcessingError::Encode(format!("jpeg: {}", e)))?;

    Ok(Bytes::from(jpeg_data))
}

/// Encode to PNG (lossless)
pub fn encode_png(img: &DynamicImage) -> Result<Bytes, ProcessingError> {
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);
    img.write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| ProcessingError::Encode(format!("png: {}", e)))?;
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 48, Rgba([200, 30, 30, 255])))
    }

    #[test]
    fn test_policy_skips_small_files() {
        let policy = CompressionPolicy::for_upload(false, COMPRESS_SIZE_THRESHOLD);
        assert!(!policy.compress);
        assert_eq!(policy.quality, 100.0);

        let policy = CompressionPolicy::for_upload(false, COMPRESS_SIZE_THRESHOLD + 1);
        assert!(policy.compress);
        assert_eq!(policy.quality, 85.0);
    }

    #[test]
    fn test_policy_skips_when_keeping_original() {
        let policy = CompressionPolicy::for_upload(true, 50 * 1024 * 1024);
        assert!(!policy.compress);
        assert_eq!(policy.quality, 100.0);
    }

    #[test]
    fn test_encoders_produce_decodable_output() {
        let img = sample();

        let webp = encode_webp(&img, 80.0).unwrap();
        assert_eq!(image::guess_format(&webp).unwrap(), ImageFormat::WebP);

        let jpeg = encode_jpeg(&img, 85.0).unwrap();
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));

        let png = encode_png(&img).unwrap();
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0), &Rgba([200, 30, 30, 255]));
    }
}
