//! Upload processing: decode, watermark, transcode and thumbnail.

use bytes::Bytes;
use image::{DynamicImage, GenericImageView};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use oneimg_core::models::Settings;

use super::decode::{self, Decoded, SourceFormat};
use super::naming::output_file_name;
use super::thumbnail::{jpeg_thumbnail, webp_thumbnail, Thumbnail};
use super::watermark::{self, FontLoader, WatermarkConfig};
use crate::compression::{encode_jpeg, encode_png, encode_webp, CompressionPolicy};
use crate::error::ProcessingError;

/// Quality used when a watermarked JPEG is written back unchanged otherwise.
const WATERMARK_JPEG_QUALITY: f32 = 90.0;

/// Output of processing one upload, owned by the caller.
#[derive(Debug, Clone)]
pub struct ProcessedArtifact {
    pub data: Bytes,
    pub thumbnail: Thumbnail,
    /// 0 for SVG.
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    pub format: String,
    pub file_name: String,
}

impl ProcessedArtifact {
    pub fn size(&self) -> i64 {
        self.data.len() as i64
    }
}

pub struct ImageEngine {
    fonts: FontLoader,
}

impl ImageEngine {
    pub fn new(font_path: impl Into<PathBuf>) -> Self {
        Self {
            fonts: FontLoader::new(font_path),
        }
    }

    pub fn with_font_loader(fonts: FontLoader) -> Self {
        Self { fonts }
    }

    /// Process on the blocking pool.
    pub async fn process(
        self: &Arc<Self>,
        data: Bytes,
        declared_mime: String,
        original_name: String,
        settings: Settings,
    ) -> Result<ProcessedArtifact, ProcessingError> {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            engine.process_blocking(&data, &declared_mime, &original_name, &settings)
        })
        .await
        .map_err(|e| ProcessingError::Task(e.to_string()))?
    }

    pub fn process_blocking(
        &self,
        data: &Bytes,
        declared_mime: &str,
        original_name: &str,
        settings: &Settings,
    ) -> Result<ProcessedArtifact, ProcessingError> {
        let start = Instant::now();
        let decoded = decode::decode(data, declared_mime)?;
        let source = decoded.format();

        let artifact = match decoded {
            Decoded::Svg => self.svg_artifact(data, original_name, settings),
            Decoded::Raster { image, format } if is_special(format, declared_mime) => {
                self.animated_artifact(data, &image, declared_mime, original_name, settings)
            }
            Decoded::Raster { image, format } => {
                self.raster_artifact(data, image, format, original_name, settings)?
            }
        };

        tracing::debug!(
            source_format = %source.name(),
            final_mime = %artifact.mime_type,
            input_bytes = data.len(),
            output_bytes = artifact.data.len(),
            width = artifact.width,
            height = artifact.height,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Image processed"
        );

        Ok(artifact)
    }

    fn svg_artifact(&self, data: &Bytes, original_name: &str, settings: &Settings) -> ProcessedArtifact {
        let mime = SourceFormat::Svg.mime_type();
        let thumbnail = if settings.thumbnail {
            Thumbnail::Degraded(data.clone())
        } else {
            Thumbnail::Absent
        };
        ProcessedArtifact {
            data: data.clone(),
            thumbnail,
            width: 0,
            height: 0,
            mime_type: mime.to_string(),
            format: SourceFormat::Svg.name(),
            file_name: output_file_name(original_name, mime, settings.save_original_name),
        }
    }

    /// GIF is stored byte-identical under its declared type, with a JPEG thumbnail.
    fn animated_artifact(
        &self,
        data: &Bytes,
        image: &DynamicImage,
        declared_mime: &str,
        original_name: &str,
        settings: &Settings,
    ) -> ProcessedArtifact {
        let mime = if declared_mime.trim().is_empty() {
            SourceFormat::Gif.mime_type().to_string()
        } else {
            declared_mime.trim().to_lowercase()
        };
        let (width, height) = image.dimensions();
        let thumbnail = if settings.thumbnail {
            thumbnail_or_absent(jpeg_thumbnail(image))
        } else {
            Thumbnail::Absent
        };
        ProcessedArtifact {
            data: data.clone(),
            thumbnail,
            width,
            height,
            file_name: output_file_name(original_name, &mime, settings.save_original_name),
            mime_type: mime,
            format: SourceFormat::Gif.name(),
        }
    }

    fn raster_artifact(
        &self,
        data: &Bytes,
        image: DynamicImage,
        format: SourceFormat,
        original_name: &str,
        settings: &Settings,
    ) -> Result<ProcessedArtifact, ProcessingError> {
        let (width, height) = image.dimensions();

        // Thumbnails are cut from the unmarked decode.
        let thumbnail = if settings.thumbnail {
            thumbnail_or_absent(webp_thumbnail(&image))
        } else {
            Thumbnail::Absent
        };

        let (image, watermarked) = if settings.watermark_enable {
            let font = self.fonts.load()?;
            let config = WatermarkConfig::from_settings(settings);
            (watermark::apply(&image, &font, &config), true)
        } else {
            (image, false)
        };

        let policy = CompressionPolicy::for_upload(settings.original_image, data.len());
        let (out, out_format) = transcode(data, &image, format, watermarked, policy, settings.save_webp)?;

        let mime = out_format.mime_type();
        Ok(ProcessedArtifact {
            data: out,
            thumbnail,
            width,
            height,
            mime_type: mime.to_string(),
            format: out_format.name(),
            file_name: output_file_name(original_name, mime, settings.save_original_name),
        })
    }
}

/// GIF and SVG skip watermarking and transcoding.
fn is_special(format: SourceFormat, declared_mime: &str) -> bool {
    matches!(format, SourceFormat::Gif | SourceFormat::Svg)
        || matches!(
            declared_mime.trim().to_lowercase().as_str(),
            "image/gif" | "image/svg+xml"
        )
}

fn thumbnail_or_absent(result: Result<Thumbnail, ProcessingError>) -> Thumbnail {
    match result {
        Ok(thumbnail) => thumbnail,
        Err(e) => {
            tracing::warn!(error = %e, "Thumbnail generation failed");
            Thumbnail::Absent
        }
    }
}

/// Pick the stored bytes and their format.
fn transcode(
    original: &Bytes,
    image: &DynamicImage,
    format: SourceFormat,
    watermarked: bool,
    policy: CompressionPolicy,
    save_webp: bool,
) -> Result<(Bytes, SourceFormat), ProcessingError> {
    if save_webp || format == SourceFormat::WebP {
        if format == SourceFormat::WebP && !policy.compress && !watermarked {
            return Ok((original.clone(), SourceFormat::WebP));
        }
        return Ok((encode_webp(image, policy.quality)?, SourceFormat::WebP));
    }

    if !policy.compress {
        if !watermarked {
            return Ok((original.clone(), format));
        }
        return reencode(image, format, WATERMARK_JPEG_QUALITY);
    }

    reencode(image, format, policy.quality)
}

/// Write pixels back in the source format. Formats without an encoder here become JPEG.
fn reencode(
    image: &DynamicImage,
    format: SourceFormat,
    quality: f32,
) -> Result<(Bytes, SourceFormat), ProcessingError> {
    match format {
        SourceFormat::Png => Ok((encode_png(image)?, SourceFormat::Png)),
        SourceFormat::WebP => Ok((encode_webp(image, quality)?, SourceFormat::WebP)),
        _ => Ok((encode_jpeg(image, quality)?, SourceFormat::Jpeg)),
    }
}
