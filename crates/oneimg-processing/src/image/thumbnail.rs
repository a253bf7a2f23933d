use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::compression::{encode_jpeg, encode_webp};
use crate::error::ProcessingError;

pub const THUMBNAIL_MAX_WIDTH: u32 = 300;
pub const THUMBNAIL_MAX_HEIGHT: u32 = 300;
pub const THUMBNAIL_QUALITY: f32 = 80.0;

/// Thumbnail outcome of one upload.
#[derive(Debug, Clone, PartialEq)]
pub enum Thumbnail {
    Generated { data: Bytes, mime_type: &'static str },
    /// No thumbnail could be rendered; the original bytes stand in for it.
    Degraded(Bytes),
    Absent,
}

impl Thumbnail {
    /// Bytes to store as the thumbnail object, if any.
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Thumbnail::Generated { data, .. } | Thumbnail::Degraded(data) => Some(data),
            Thumbnail::Absent => None,
        }
    }

    pub fn mime_type(&self, original_mime: &str) -> String {
        match self {
            Thumbnail::Generated { mime_type, .. } => mime_type.to_string(),
            _ => original_mime.to_string(),
        }
    }
}

/// Fit into the thumbnail box, keeping aspect ratio and never upscaling.
pub fn fit(img: &DynamicImage) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= THUMBNAIL_MAX_WIDTH && height <= THUMBNAIL_MAX_HEIGHT {
        return img.clone();
    }
    img.resize(THUMBNAIL_MAX_WIDTH, THUMBNAIL_MAX_HEIGHT, FilterType::Lanczos3)
}

pub fn webp_thumbnail(img: &DynamicImage) -> Result<Thumbnail, ProcessingError> {
    let data = encode_webp(&fit(img), THUMBNAIL_QUALITY)?;
    Ok(Thumbnail::Generated {
        data,
        mime_type: "image/webp",
    })
}

/// JPEG thumbnail, used for animated formats.
pub fn jpeg_thumbnail(img: &DynamicImage) -> Result<Thumbnail, ProcessingError> {
    let data = encode_jpeg(&fit(img), THUMBNAIL_QUALITY)?;
    Ok(Thumbnail::Generated {
        data,
        mime_type: "image/jpeg",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255])))
    }

    #[test]
    fn test_fit_preserves_aspect_ratio() {
        assert_eq!(fit(&image(1200, 600)).dimensions(), (300, 150));
        assert_eq!(fit(&image(400, 1000)).dimensions(), (120, 300));
    }

    #[test]
    fn test_fit_never_upscales() {
        assert_eq!(fit(&image(120, 80)).dimensions(), (120, 80));
    }

    #[test]
    fn test_thumbnail_formats() {
        let webp = webp_thumbnail(&image(640, 480)).unwrap();
        match &webp {
            Thumbnail::Generated { data, mime_type } => {
                assert_eq!(*mime_type, "image/webp");
                assert_eq!(image::guess_format(data).unwrap(), image::ImageFormat::WebP);
            }
            other => panic!("unexpected {:?}", other),
        }

        let jpeg = jpeg_thumbnail(&image(640, 480)).unwrap();
        assert_eq!(jpeg.mime_type("image/gif"), "image/jpeg");
        let decoded = image::load_from_memory(jpeg.bytes().unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (300, 225));
    }

    #[test]
    fn test_degraded_uses_original_mime() {
        let degraded = Thumbnail::Degraded(Bytes::from_static(b"<svg/>"));
        assert_eq!(degraded.mime_type("image/svg+xml"), "image/svg+xml");
        assert_eq!(degraded.bytes().unwrap().as_ref(), b"<svg/>");
        assert!(Thumbnail::Absent.bytes().is_none());
    }
}
