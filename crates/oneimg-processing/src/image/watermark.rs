//! Text watermark overlay

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{imageops, DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use oneimg_core::models::Settings;

use crate::error::ProcessingError;

pub const MIN_FONT_SIZE: u32 = 10;
pub const MAX_FONT_SIZE: u32 = 600;
const MIN_MARGIN: i32 = 10;
const LENGTH_REFERENCE: f64 = 10.0;
const WHITE: [u8; 3] = [255, 255, 255];

const SYSTEM_FONTS: [&str; 3] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "C:/Windows/Fonts/simhei.ttf",
];

/// Watermark position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl WatermarkPosition {
    /// Unknown values fall back to bottom-right.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "top-left" => WatermarkPosition::TopLeft,
            "top-right" => WatermarkPosition::TopRight,
            "bottom-left" => WatermarkPosition::BottomLeft,
            "center" => WatermarkPosition::Center,
            _ => WatermarkPosition::BottomRight,
        }
    }
}

/// Watermark configuration derived from the admin settings.
#[derive(Debug, Clone)]
pub struct WatermarkConfig {
    pub text: String,
    pub position: WatermarkPosition,
    /// Font size as a fraction of the shorter side.
    pub size_ratio: f64,
    pub color: [u8; 3],
    pub opacity: f32,
}

impl WatermarkConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            text: settings.watermark_text.clone(),
            position: WatermarkPosition::parse(&settings.watermark_pos),
            size_ratio: f64::from(settings.watermark_size) / 100.0,
            color: parse_color(&settings.watermark_color),
            opacity: settings.watermark_opac.clamp(0.0, 1.0) as f32,
        }
    }
}

/// Parse `#RRGGBB` (the `#` is optional). Anything else is white.
pub fn parse_color(s: &str) -> [u8; 3] {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return WHITE;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
    match (channel(0), channel(2), channel(4)) {
        (Ok(r), Ok(g), Ok(b)) => [r, g, b],
        _ => WHITE,
    }
}

/// Font size scaled to the image, shrunk for long texts.
pub fn font_size(width: u32, height: u32, ratio: f64, text: &str) -> u32 {
    if width == 0 || height == 0 {
        return MIN_FONT_SIZE;
    }
    let mut size = f64::from(width.min(height)) * ratio;
    if size < f64::from(MIN_FONT_SIZE) {
        return MIN_FONT_SIZE;
    }
    if size > f64::from(MAX_FONT_SIZE) {
        return MAX_FONT_SIZE;
    }

    let len = text.chars().count() as f64;
    if len > LENGTH_REFERENCE {
        size = (size * LENGTH_REFERENCE / len).max(f64::from(MIN_FONT_SIZE));
    }
    size.round() as u32
}

pub fn margin(width: u32) -> i32 {
    MIN_MARGIN.max((f64::from(width) * 0.01) as i32)
}

/// Rendered text width from glyph advances, or an estimate without a font.
pub fn text_width(font: Option<&FontVec>, text: &str, size: u32) -> i32 {
    match font {
        Some(font) => {
            let scaled = font.as_scaled(PxScale::from(size as f32));
            text.chars()
                .map(|c| scaled.h_advance(scaled.glyph_id(c)) as i32)
                .sum()
        }
        None => text.chars().count() as i32 * size as i32 * 2 / 3,
    }
}

/// Baseline origin of the text, kept inside the image.
pub fn text_origin(
    width: u32,
    height: u32,
    text_width: i32,
    size: u32,
    position: WatermarkPosition,
) -> (i32, i32) {
    let (w, h) = (width as i32, height as i32);
    let text_height = size as i32;
    let margin = margin(width);

    let (mut x, mut y) = match position {
        WatermarkPosition::TopLeft => (margin, text_height + margin),
        WatermarkPosition::TopRight => (w - text_width - margin, text_height + margin),
        WatermarkPosition::BottomLeft => (margin, h - margin),
        WatermarkPosition::BottomRight => (w - text_width - margin, h - margin),
        WatermarkPosition::Center => ((w - text_width) / 2, (h + text_height) / 2),
    };

    if x < 0 {
        x = margin;
    }
    if y < text_height {
        y = text_height + margin;
    }
    if x + text_width > w {
        x = w - text_width - margin;
    }
    if y > h {
        y = h - margin;
    }
    (x, y)
}

/// Draw the watermark text onto a copy of `img`.
pub fn apply(
    img: &DynamicImage,
    font: &FontVec,
    config: &WatermarkConfig,
) -> DynamicImage {
    let (width, height) = img.dimensions();
    let size = font_size(width, height, config.size_ratio, &config.text);
    let advance = text_width(Some(font), &config.text, size);
    let (x, baseline) = text_origin(width, height, advance, size, config.position);

    let [r, g, b] = config.color;
    let mut overlay = RgbaImage::new(width, height);
    draw_text_mut(
        &mut overlay,
        Rgba([r, g, b, 255]),
        x,
        baseline - size as i32,
        PxScale::from(size as f32),
        font,
        &config.text,
    );

    // coverage becomes alpha, scaled by opacity
    for pixel in overlay.pixels_mut() {
        if pixel[3] > 0 {
            let alpha = (f32::from(pixel[3]) * config.opacity).round() as u8;
            *pixel = Rgba([r, g, b, alpha]);
        }
    }

    let mut base = img.to_rgba8();
    imageops::overlay(&mut base, &overlay, 0, 0);
    DynamicImage::ImageRgba8(base)
}

/// Loads the watermark font once and keeps it for later uploads.
#[derive(Debug)]
pub struct FontLoader {
    primary: PathBuf,
    fallbacks: Vec<PathBuf>,
    cached: Mutex<Option<Arc<FontVec>>>,
}

impl FontLoader {
    /// Configured path first, then common system fonts.
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        Self::with_fallbacks(primary, SYSTEM_FONTS.iter().map(PathBuf::from).collect())
    }

    pub fn with_fallbacks(primary: impl Into<PathBuf>, fallbacks: Vec<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            fallbacks,
            cached: Mutex::new(None),
        }
    }

    pub fn load(&self) -> Result<Arc<FontVec>, ProcessingError> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| ProcessingError::Watermark("font cache poisoned".to_string()))?;
        if let Some(font) = cached.as_ref() {
            return Ok(Arc::clone(font));
        }

        for path in std::iter::once(&self.primary).chain(self.fallbacks.iter()) {
            match read_font(path) {
                Ok(font) => {
                    tracing::debug!(path = %path.display(), "Loaded watermark font");
                    let font = Arc::new(font);
                    *cached = Some(Arc::clone(&font));
                    return Ok(font);
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Watermark font unavailable");
                }
            }
        }

        Err(ProcessingError::Watermark(format!(
            "no usable font at {} or any fallback",
            self.primary.display()
        )))
    }
}

fn read_font(path: &Path) -> Result<FontVec, String> {
    let data = std::fs::read(path).map_err(|e| e.to_string())?;
    FontVec::try_from_vec(data).map_err(|e| e.to_string())
}
