//! Format detection and decoding

use image::{DynamicImage, ImageFormat};

use crate::error::ProcessingError;

const SVG_MIME: &str = "image/svg+xml";
const SVG_SNIFF_LEN: usize = 100;

/// Codecs tried in order before falling back to content sniffing.
const DECODE_ORDER: [(ImageFormat, SourceFormat); 4] = [
    (ImageFormat::WebP, SourceFormat::WebP),
    (ImageFormat::Gif, SourceFormat::Gif),
    (ImageFormat::Png, SourceFormat::Png),
    (ImageFormat::Jpeg, SourceFormat::Jpeg),
];

/// Format an upload was decoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Svg,
    WebP,
    Gif,
    Png,
    Jpeg,
    /// Anything the generic sniffing decoder recognised (bmp, tiff, ...).
    Other(ImageFormat),
}

impl SourceFormat {
    pub fn name(self) -> String {
        match self {
            SourceFormat::Svg => "svg".to_string(),
            SourceFormat::WebP => "webp".to_string(),
            SourceFormat::Gif => "gif".to_string(),
            SourceFormat::Png => "png".to_string(),
            SourceFormat::Jpeg => "jpeg".to_string(),
            SourceFormat::Other(f) => format!("{:?}", f).to_lowercase(),
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            SourceFormat::Svg => SVG_MIME,
            SourceFormat::WebP => "image/webp",
            SourceFormat::Gif => "image/gif",
            SourceFormat::Png => "image/png",
            SourceFormat::Jpeg => "image/jpeg",
            SourceFormat::Other(f) => f.to_mime_type(),
        }
    }
}

/// An upload after decoding. SVG is never rasterised, so it carries no pixels.
#[derive(Debug)]
pub enum Decoded {
    Svg,
    Raster {
        format: SourceFormat,
        image: DynamicImage,
    },
}

impl Decoded {
    pub fn format(&self) -> SourceFormat {
        match self {
            Decoded::Svg => SourceFormat::Svg,
            Decoded::Raster { format, .. } => *format,
        }
    }
}

/// Whether the payload is an SVG document, by declared type or leading bytes.
pub fn is_svg(data: &[u8], declared_mime: &str) -> bool {
    if declared_mime.eq_ignore_ascii_case(SVG_MIME) {
        return true;
    }
    let head = &data[..data.len().min(SVG_SNIFF_LEN)];
    String::from_utf8_lossy(head)
        .to_lowercase()
        .starts_with("<svg")
}

pub fn decode(data: &[u8], declared_mime: &str) -> Result<Decoded, ProcessingError> {
    if is_svg(data, declared_mime) {
        return Ok(Decoded::Svg);
    }

    for (codec, format) in DECODE_ORDER {
        if let Ok(image) = image::load_from_memory_with_format(data, codec) {
            return Ok(Decoded::Raster { format, image });
        }
    }

    let format = image::guess_format(data)
        .map_err(|e| ProcessingError::UnsupportedFormat(e.to_string()))?;
    let image = image::load_from_memory_with_format(data, format)
        .map_err(|e| ProcessingError::UnsupportedFormat(e.to_string()))?;
    Ok(Decoded::Raster {
        format: SourceFormat::Other(format),
        image,
    })
}
